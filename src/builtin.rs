// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::artifacts::{PolicyDefinition, PolicySetDefinition};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Supplies policy and policy set definitions owned by the cloud provider.
///
/// Implementations deal with transport, paging and retries. `version` is
/// either an exact version or a constraint such as `1.*.*`; `None` asks for
/// the latest version.
pub trait BuiltInDefinitionSource: Send + Sync {
    fn policy_definition(&self, id: &str, version: Option<&str>) -> anyhow::Result<PolicyDefinition>;

    fn policy_set_definition(
        &self,
        id: &str,
        version: Option<&str>,
    ) -> anyhow::Result<PolicySetDefinition>;
}

/// Cooperative cancellation flag shared between a caller and a fetch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
