// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Inference of the role assignments that managed-identity policy
//! assignments need.
//!
//! For every assignment with a managed identity, the roles named in the
//! policy rule (`then.details.roleDefinitionIds`) are granted on the
//! management group's own scope, and on every scope passed through a parameter
//! whose metadata sets `assignPermissions`. For policy sets, member
//! parameters are traced back to the set's parameters through their
//! `[parameters('name')]` references.

use crate::arm::{last_type_and_name, parameter_reference_name, DefinitionType};
use crate::artifacts::{scope_value, PolicyAssignment, PolicyDefinition, PolicySetDefinition};
use crate::error::{AlzError, Result};
use crate::management_group::ManagementGroup;
use crate::store::Artifacts;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use log::debug;

/// A role that must be assigned to a policy assignment's identity at a scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyRoleAssignment {
    pub role_definition_id: String,
    pub scope: String,
    pub assignment_name: String,
}

/// Infers role assignments for one management group at a time.
///
/// Definitions are looked up in the shared artifact store, so assignments may
/// reference definitions owned by other groups or built into the platform.
pub struct RoleAssignmentInferencer<'a> {
    artifacts: &'a Artifacts,
}

impl<'a> RoleAssignmentInferencer<'a> {
    pub fn new(artifacts: &'a Artifacts) -> Self {
        Self { artifacts }
    }

    /// All role assignments required by the group's assignments. Any failure
    /// discards the whole result.
    pub fn infer(&self, mg: &ManagementGroup) -> Result<BTreeSet<PolicyRoleAssignment>> {
        let mut out = BTreeSet::new();
        for assignment in mg.policy_assignments().map(|(_, a)| a) {
            if !assignment.has_managed_identity() {
                continue;
            }
            // The group's own id, whether or not library scopes were rewritten yet.
            let scope = mg.resource_id();
            let mut emit = Emitter {
                out: &mut out,
                assignment: &assignment.name,
                own_scope: &scope,
            };
            self.infer_assignment(assignment, &mut emit)?;
        }
        debug!(
            "management group '{}' needs {} role assignments",
            mg.id(),
            out.len()
        );
        Ok(out)
    }

    fn infer_assignment(&self, assignment: &PolicyAssignment, emit: &mut Emitter<'_>) -> Result<()> {
        let id = &assignment.properties.policy_definition_id;
        let (resource_type, name) = last_type_and_name(id)?;
        let version = assignment.properties.definition_version.as_deref();

        match DefinitionType::from_resource_type(resource_type) {
            Some(DefinitionType::Policy) => {
                let definition = self.policy_definition(name, version, assignment)?;
                let roles = definition.role_definition_ids()?;
                if roles.is_empty() {
                    return Err(AlzError::NoRoleDefinitionIds {
                        definition: definition.name.clone(),
                        assignment: assignment.name.clone(),
                    });
                }
                emit.own_scope(&roles);
                for (param, param_def) in definition.grants_permission_parameters() {
                    let value = assignment
                        .parameter(param)
                        .or(param_def.default_value.as_ref())
                        .ok_or_else(|| missing_parameter(param, assignment))?;
                    emit.scope_from(&roles, value);
                }
                Ok(())
            }
            Some(DefinitionType::PolicySet) => {
                let set = self.policy_set_definition(name, version, assignment)?;
                self.infer_policy_set(set, assignment, emit)
            }
            None => Err(AlzError::UnsupportedDefinitionType {
                assignment: assignment.name.clone(),
                id: id.clone(),
                definition_type: resource_type.to_string(),
            }),
        }
    }

    fn infer_policy_set(
        &self,
        set: &PolicySetDefinition,
        assignment: &PolicyAssignment,
        emit: &mut Emitter<'_>,
    ) -> Result<()> {
        for member in set.members() {
            let (resource_type, name) = last_type_and_name(&member.policy_definition_id)?;
            if DefinitionType::from_resource_type(resource_type) != Some(DefinitionType::Policy) {
                return Err(AlzError::UnsupportedDefinitionType {
                    assignment: assignment.name.clone(),
                    id: member.policy_definition_id.clone(),
                    definition_type: resource_type.to_string(),
                });
            }
            let definition =
                self.policy_definition(name, member.definition_version.as_deref(), assignment)?;
            let roles = definition.role_definition_ids()?;
            if roles.is_empty() {
                continue;
            }
            emit.own_scope(&roles);

            for (member_param, member_param_def) in definition.grants_permission_parameters() {
                let value = match member.parameters.get(member_param) {
                    Some(mapped) => {
                        let set_param = mapped
                            .value
                            .as_str()
                            .and_then(parameter_reference_name)
                            .ok_or_else(|| AlzError::NotAParameterReference {
                                set_definition: set.name.clone(),
                                parameter: member_param.clone(),
                                value: value_text(&mapped.value),
                            })?;
                        let set_default = set
                            .properties
                            .parameters
                            .get(set_param)
                            .and_then(|p| p.default_value.as_ref());
                        assignment
                            .parameter(set_param)
                            .or(set_default)
                            .ok_or_else(|| missing_parameter(set_param, assignment))?
                    }
                    None => member_param_def
                        .default_value
                        .as_ref()
                        .ok_or_else(|| missing_parameter(member_param, assignment))?,
                };
                emit.scope_from(&roles, value);
            }
        }
        Ok(())
    }

    fn policy_definition(
        &self,
        name: &str,
        version: Option<&str>,
        assignment: &PolicyAssignment,
    ) -> Result<&'a PolicyDefinition> {
        match self.artifacts.policy_definition(name, version) {
            Err(AlzError::ArtifactNotFound { kind, name }) => Err(AlzError::DefinitionNotFound {
                kind,
                name,
                assignment: assignment.name.clone(),
            }),
            r => r,
        }
    }

    fn policy_set_definition(
        &self,
        name: &str,
        version: Option<&str>,
        assignment: &PolicyAssignment,
    ) -> Result<&'a PolicySetDefinition> {
        match self.artifacts.policy_set_definition(name, version) {
            Err(AlzError::ArtifactNotFound { kind, name }) => Err(AlzError::DefinitionNotFound {
                kind,
                name,
                assignment: assignment.name.clone(),
            }),
            r => r,
        }
    }
}

struct Emitter<'o> {
    out: &'o mut BTreeSet<PolicyRoleAssignment>,
    assignment: &'o str,
    own_scope: &'o str,
}

impl Emitter<'_> {
    fn emit(&mut self, roles: &[String], scope: &str) {
        for role in roles {
            self.out.insert(PolicyRoleAssignment {
                role_definition_id: role.clone(),
                scope: scope.to_string(),
                assignment_name: self.assignment.to_string(),
            });
        }
    }

    fn own_scope(&mut self, roles: &[String]) {
        let scope = self.own_scope;
        self.emit(roles, scope);
    }

    // Non-string and empty values contribute no scope.
    fn scope_from(&mut self, roles: &[String], value: &Value) {
        if let Some(scope) = scope_value(value) {
            self.emit(roles, scope);
        }
    }
}

fn missing_parameter(parameter: &str, assignment: &PolicyAssignment) -> AlzError {
    AlzError::MissingParameter {
        parameter: parameter.to_string(),
        assignment: assignment.name.clone(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

