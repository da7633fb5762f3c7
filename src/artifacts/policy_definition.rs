// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::ParameterDefinition;
use crate::error::{AlzError, ArtifactKind, Result};
use crate::versioned::Versioned;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    pub properties: PolicyDefinitionProperties,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDefinitionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterDefinition>,
    /// Opaque rule body; only `then.details.roleDefinitionIds` is ever read.
    #[serde(default)]
    pub policy_rule: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// The slice of a policy rule that names the roles a deployIfNotExists or
// modify effect needs.
#[derive(Deserialize)]
struct RuleRoles {
    #[serde(default)]
    then: Option<ThenRoles>,
}

#[derive(Deserialize)]
struct ThenRoles {
    #[serde(default)]
    details: Option<DetailsRoles>,
}

// `details` is an array for some effects (e.g. append).
#[derive(Deserialize)]
#[serde(untagged)]
enum DetailsRoles {
    Object {
        #[serde(rename = "roleDefinitionIds", default)]
        role_definition_ids: Vec<String>,
    },
    Other(IgnoredAny),
}

impl PolicyDefinition {
    pub fn new(name: impl Into<String>, properties: PolicyDefinitionProperties) -> Self {
        Self {
            name: name.into(),
            id: None,
            resource_type: Some("Microsoft.Authorization/policyDefinitions".to_string()),
            properties,
        }
    }

    /// Role definition ids listed in `then.details.roleDefinitionIds`.
    pub fn role_definition_ids(&self) -> Result<Vec<String>> {
        if self.properties.policy_rule.is_null() {
            return Ok(vec![]);
        }
        let rule = RuleRoles::deserialize(&self.properties.policy_rule).map_err(|e| {
            AlzError::InvalidPolicyRule {
                definition: self.name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(match rule.then.and_then(|t| t.details) {
            Some(DetailsRoles::Object {
                role_definition_ids,
            }) => role_definition_ids,
            _ => vec![],
        })
    }

    /// Parameters whose metadata sets `assignPermissions`.
    pub fn grants_permission_parameters(
        &self,
    ) -> impl Iterator<Item = (&String, &ParameterDefinition)> {
        self.properties
            .parameters
            .iter()
            .filter(|(_, p)| p.grants_permission())
    }
}

impl Versioned for PolicyDefinition {
    const KIND: ArtifactKind = ArtifactKind::PolicyDefinition;

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.properties.version.as_deref()
    }
}
