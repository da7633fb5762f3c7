// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed models of the ARM resources a library is made of.
//!
//! Only the fields the resolution engine reads are modelled; everything else
//! is carried through `extra` so the resources round-trip unchanged.

mod policy_assignment;
mod policy_definition;
mod policy_set_definition;
mod role_definition;

pub use policy_assignment::*;
pub use policy_definition::*;
pub use policy_set_definition::*;
pub use role_definition::*;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declaration of a parameter on a policy or policy set definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    #[serde(rename = "type")]
    pub parameter_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ParameterMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParameterDefinition {
    /// Whether a value of this parameter is a scope the assigning identity
    /// must also be granted the policy's roles on.
    pub fn grants_permission(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.assign_permissions)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_permissions: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A parameter value as supplied by an assignment or a set member reference.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterValue {
    #[serde(default)]
    pub value: Value,
}

impl ParameterValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// Returns the value as a scope string, or `None` for non-strings and empty
/// strings.
pub(crate) fn scope_value(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}
