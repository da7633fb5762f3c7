// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{AlzError, Result};
use serde::{Deserialize, Serialize};

/// Maximum depth of a management group hierarchy below its root groups.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Default number of hierarchies resolved concurrently.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Configuration for [`crate::AlzLib`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlzLibOptions {
    /// Upper bound on hierarchies resolved concurrently.
    pub parallelism: usize,
    /// Allow a later library to replace an artifact of the same name and version.
    pub allow_overwrite: bool,
    /// Derive a distinct role definition name per management group.
    pub unique_role_definitions: bool,
    /// Deepest level a management group may occupy. Root groups are level 0,
    /// so the longest parent chain holds `max_depth + 1` groups.
    pub max_depth: usize,
    /// Reject architectures with more than one root management group.
    pub single_root: bool,
}

impl Default for AlzLibOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            allow_overwrite: false,
            unique_role_definitions: true,
            max_depth: DEFAULT_MAX_DEPTH,
            single_root: false,
        }
    }
}

impl AlzLibOptions {
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(AlzError::InvalidOptions(
                "parallelism must be greater than zero".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(AlzError::InvalidOptions(
                "max_depth must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| AlzError::InvalidOptions(format!("{e}")))?;
        options.validate()?;
        Ok(options)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let options: Self = serde_yaml::from_str(yaml)
            .map_err(|e| AlzError::InvalidOptions(format!("{e}")))?;
        options.validate()?;
        Ok(options)
    }
}
