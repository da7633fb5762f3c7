// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Fixtures shared by the integration tests.
//!
//! The library models a small landing zone: a root group owning the custom
//! definitions and a diagnostics assignment, and a landing zones group
//! assigning a policy set whose member needs a role on a DNS resource group.

use alzlib::*;

use anyhow::Result;
use serde_json::{json, Value};

pub const ROLE_X: &str = "/providers/Microsoft.Authorization/roleDefinitions/b24988ac-6180-42a0-ab88-20f7382dd24c";
pub const ROLE_Y: &str = "/providers/Microsoft.Authorization/roleDefinitions/4d97b98b-1d4f-4787-a291-c67834d212e7";

pub const SCOPE_R: &str = "/subscriptions/S/resourceGroups/R";
pub const SCOPE_R2: &str = "/subscriptions/S/resourceGroups/R2";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn placeholder_id(resource_type: &str, name: &str) -> String {
    format!(
        "/providers/Microsoft.Management/managementGroups/placeholder/providers/Microsoft.Authorization/{resource_type}/{name}"
    )
}

pub fn mg_scope(id: &str) -> String {
    format!("/providers/Microsoft.Management/managementGroups/{id}")
}

fn from_json<T: serde::de::DeserializeOwned>(v: Value) -> T {
    serde_json::from_value(v).unwrap()
}

pub fn deploy_diagnostics() -> PolicyDefinition {
    from_json(json!({
        "name": "Deploy-Diagnostics",
        "properties": {
            "displayName": "Deploy diagnostic settings",
            "mode": "Indexed",
            "parameters": {
                "scopeParam": {
                    "type": "String",
                    "metadata": { "assignPermissions": true }
                },
                "effect": { "type": "String", "defaultValue": "DeployIfNotExists" }
            },
            "policyRule": {
                "if": { "field": "type", "equals": "Microsoft.Network/virtualNetworks" },
                "then": {
                    "effect": "[parameters('effect')]",
                    "details": {
                        "type": "Microsoft.Insights/diagnosticSettings",
                        "roleDefinitionIds": [ROLE_X]
                    }
                }
            }
        }
    }))
}

pub fn deploy_dns_zone() -> PolicyDefinition {
    from_json(json!({
        "name": "Deploy-DNS-Zone",
        "properties": {
            "parameters": {
                "memberParam": {
                    "type": "String",
                    "metadata": { "assignPermissions": true }
                }
            },
            "policyRule": {
                "if": { "field": "type", "equals": "Microsoft.Network/privateEndpoints" },
                "then": {
                    "effect": "deployIfNotExists",
                    "details": { "roleDefinitionIds": [ROLE_Y] }
                }
            }
        }
    }))
}

pub fn audit_only() -> PolicyDefinition {
    from_json(json!({
        "name": "Audit-Only",
        "properties": {
            "policyRule": {
                "if": { "field": "location", "equals": "westeurope" },
                "then": { "effect": "audit" }
            }
        }
    }))
}

pub fn dns_set() -> PolicySetDefinition {
    from_json(json!({
        "name": "Deploy-Private-DNS",
        "properties": {
            "parameters": {
                "setParam": { "type": "String" }
            },
            "policyDefinitions": [
                {
                    "policyDefinitionId": placeholder_id("policyDefinitions", "Deploy-DNS-Zone"),
                    "policyDefinitionReferenceId": "dns",
                    "parameters": {
                        "memberParam": { "value": "[parameters('setParam')]" }
                    }
                },
                {
                    "policyDefinitionId": placeholder_id("policyDefinitions", "Audit-Only"),
                    "policyDefinitionReferenceId": "audit"
                }
            ]
        }
    }))
}

pub fn custom_role() -> RoleDefinition {
    from_json(json!({
        "name": "00000000-0000-0000-0000-000000000001",
        "properties": {
            "roleName": "Network-Subnet-Contributor",
            "permissions": [{ "actions": ["Microsoft.Network/virtualNetworks/subnets/*"] }],
            "assignableScopes": ["/providers/Microsoft.Management/managementGroups/placeholder"]
        }
    }))
}

pub fn diagnostics_assignment(scope_param: Value) -> PolicyAssignment {
    from_json(json!({
        "name": "Deploy-Diag",
        "identity": { "type": "SystemAssigned" },
        "properties": {
            "policyDefinitionId": placeholder_id("policyDefinitions", "Deploy-Diagnostics"),
            "parameters": { "scopeParam": { "value": scope_param } }
        }
    }))
}

pub fn dns_assignment() -> PolicyAssignment {
    from_json(json!({
        "name": "Deploy-DNS",
        "identity": { "type": "SystemAssigned" },
        "properties": {
            "policyDefinitionId": placeholder_id("policySetDefinitions", "Deploy-Private-DNS"),
            "parameters": { "setParam": { "value": SCOPE_R2 } }
        }
    }))
}

pub fn audit_assignment() -> PolicyAssignment {
    from_json(json!({
        "name": "Audit-Location",
        "properties": {
            "policyDefinitionId": placeholder_id("policyDefinitions", "Audit-Only")
        }
    }))
}

pub fn architecture() -> Architecture {
    from_json(json!({
        "name": "alz",
        "management_groups": [
            { "id": "alz", "display_name": "Azure Landing Zones", "archetypes": ["root"] },
            { "id": "landing-zones", "display_name": "Landing zones", "parent_id": "alz", "archetypes": ["landing_zones"] },
            { "id": "corp", "display_name": "Corp", "parent_id": "landing-zones", "archetypes": ["empty"] }
        ]
    }))
}

pub fn library_with(diagnostics_scope: Value) -> LibraryContents {
    LibraryContents {
        metadata: LibraryMetadata {
            name: "alz".to_string(),
            ..Default::default()
        },
        policy_definitions: vec![deploy_diagnostics(), deploy_dns_zone(), audit_only()],
        policy_set_definitions: vec![dns_set()],
        role_definitions: vec![custom_role()],
        policy_assignments: vec![
            diagnostics_assignment(diagnostics_scope),
            dns_assignment(),
            audit_assignment(),
        ],
        archetypes: from_json(json!([
            {
                "name": "root",
                "policy_definitions": ["Deploy-Diagnostics", "Deploy-DNS-Zone", "Audit-Only"],
                "policy_set_definitions": ["Deploy-Private-DNS"],
                "role_definitions": ["Network-Subnet-Contributor"],
                "policy_assignments": ["Deploy-Diag", "Audit-Location"]
            },
            {
                "name": "landing_zones",
                "policy_assignments": ["Deploy-DNS"]
            }
        ])),
        architectures: vec![architecture()],
        default_policy_values: from_json(json!([
            {
                "default_name": "log_analytics_workspace_id",
                "policy_assignments": [
                    { "policy_assignment_name": "Deploy-Diag", "parameter_names": ["scopeParam"] }
                ]
            }
        ])),
        ..Default::default()
    }
}

pub fn library() -> LibraryContents {
    library_with(json!(SCOPE_R))
}

pub fn alzlib_with(libraries: Vec<LibraryContents>) -> Result<AlzLib> {
    let lib = AlzLib::new(AlzLibOptions::default())?;
    lib.init(libraries)?;
    Ok(lib)
}

pub fn request(architecture: &str) -> HierarchyRequest {
    HierarchyRequest {
        architecture: architecture.to_string(),
        external_parent_id: "tenant-root".to_string(),
        values: WellKnownPolicyValues::default(),
    }
}
