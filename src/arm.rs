// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Resource id helpers and the `[parameters('name')]` reference parser.
//!
//! Only the exact `[parameters('name')]` form is understood. Other ARM
//! template functions (`concat`, `format`, nested calls, property access) are
//! not evaluated and are reported as not being a parameter reference.

use crate::error::{AlzError, Result};

pub const POLICY_DEFINITIONS: &str = "policyDefinitions";
pub const POLICY_SET_DEFINITIONS: &str = "policySetDefinitions";
pub const POLICY_ASSIGNMENTS: &str = "policyAssignments";
pub const ROLE_DEFINITIONS: &str = "roleDefinitions";

const MANAGEMENT_GROUPS_PREFIX: &str = "/providers/Microsoft.Management/managementGroups/";
const AUTHORIZATION_PROVIDER: &str = "providers/Microsoft.Authorization";

const PARAMETER_REFERENCE_PREFIX: &str = "[parameters('";
const PARAMETER_REFERENCE_SUFFIX: &str = "')]";

/// Resource id of a management group.
pub fn management_group_resource_id(management_group: &str) -> String {
    format!("{MANAGEMENT_GROUPS_PREFIX}{management_group}")
}

/// Resource id of a `Microsoft.Authorization` resource deployed at a
/// management group.
pub fn authorization_resource_id(
    management_group: &str,
    resource_type: &str,
    name: &str,
) -> String {
    format!(
        "{MANAGEMENT_GROUPS_PREFIX}{management_group}/{AUTHORIZATION_PROVIDER}/{resource_type}/{name}"
    )
}

/// The last two segments of a resource id: its resource type and name.
pub fn last_type_and_name(id: &str) -> Result<(&str, &str)> {
    let mut segments = id.trim_end_matches('/').rsplit('/');
    match (segments.next(), segments.next()) {
        (Some(name), Some(resource_type)) if !name.is_empty() && !resource_type.is_empty() => {
            Ok((resource_type, name))
        }
        _ => Err(AlzError::InvalidResourceId(id.to_string())),
    }
}

/// What a policy assignment or set member points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionType {
    Policy,
    PolicySet,
}

impl DefinitionType {
    /// Classify a resource type segment. Resource types compare
    /// case-insensitively.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        if resource_type.eq_ignore_ascii_case(POLICY_DEFINITIONS) {
            Some(DefinitionType::Policy)
        } else if resource_type.eq_ignore_ascii_case(POLICY_SET_DEFINITIONS) {
            Some(DefinitionType::PolicySet)
        } else {
            None
        }
    }

    pub fn resource_type(self) -> &'static str {
        match self {
            DefinitionType::Policy => POLICY_DEFINITIONS,
            DefinitionType::PolicySet => POLICY_SET_DEFINITIONS,
        }
    }
}

/// The parameter name inside `[parameters('name')]`, or `None` if `expr` is
/// not exactly of that shape.
pub fn parameter_reference_name(expr: &str) -> Option<&str> {
    let name = expr
        .strip_prefix(PARAMETER_REFERENCE_PREFIX)?
        .strip_suffix(PARAMETER_REFERENCE_SUFFIX)?;
    if name.is_empty() || name.contains('\'') {
        return None;
    }
    Some(name)
}
