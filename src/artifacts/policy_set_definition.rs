// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{ParameterDefinition, ParameterValue};
use crate::error::ArtifactKind;
use crate::versioned::Versioned;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySetDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub properties: PolicySetDefinitionProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySetDefinitionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterDefinition>,
    #[serde(default)]
    pub policy_definitions: Vec<PolicyDefinitionReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A member of a policy set definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinitionReference {
    pub policy_definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_definition_reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_version: Option<String>,
    /// Member parameter name to value, usually a `[parameters('setParam')]`
    /// reference to one of the set's own parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterValue>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PolicySetDefinition {
    pub fn new(name: impl Into<String>, properties: PolicySetDefinitionProperties) -> Self {
        Self {
            name: name.into(),
            id: None,
            resource_type: Some("Microsoft.Authorization/policySetDefinitions".to_string()),
            properties,
        }
    }

    pub fn members(&self) -> &[PolicyDefinitionReference] {
        &self.properties.policy_definitions
    }
}

impl Versioned for PolicySetDefinition {
    const KIND: ArtifactKind = ArtifactKind::PolicySetDefinition;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.properties.version.as_deref()
    }
}
