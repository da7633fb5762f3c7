// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::archetype::ArtifactSets;
use crate::arm::{
    authorization_resource_id, last_type_and_name, management_group_resource_id, DefinitionType,
    POLICY_ASSIGNMENTS, POLICY_DEFINITIONS, POLICY_SET_DEFINITIONS, ROLE_DEFINITIONS,
};
use crate::artifacts::{
    AssignmentIdentity, EnforcementMode, NonComplianceMessage, PolicyAssignment, PolicyDefinition,
    PolicySetDefinition, RoleDefinition,
};
use crate::error::{AlzError, ArtifactKind, Result};
use crate::role_assignments::PolicyRoleAssignment;
use crate::store::Artifacts;

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use uuid::Uuid;

/// Namespace for role definition names derived per management group.
const ROLE_DEFINITION_NAMESPACE: Uuid = Uuid::from_u128(0x5a3c_9d7e_0b4f_4c61_8e2a_71d6_f0c9_b318);

/// Where a management group hangs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentRef {
    /// A group outside the hierarchy, e.g. the tenant root group.
    External(String),
    /// Another group of the same hierarchy.
    Internal(String),
}

impl ParentRef {
    pub fn id(&self) -> &str {
        match self {
            ParentRef::External(id) | ParentRef::Internal(id) => id,
        }
    }
}

/// Changes to apply to one policy assignment of a management group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyAssignmentModification {
    /// Upserted into the assignment's parameters.
    pub parameters: BTreeMap<String, Value>,
    pub enforcement_mode: Option<EnforcementMode>,
    pub identity: Option<AssignmentIdentity>,
    pub non_compliance_messages: Option<Vec<NonComplianceMessage>>,
}

/// A resolved node of a [`crate::Hierarchy`].
#[derive(Debug, Clone)]
pub struct ManagementGroup {
    id: String,
    display_name: String,
    exists: bool,
    parent: ParentRef,
    children: BTreeSet<String>,
    policy_definitions: BTreeMap<String, PolicyDefinition>,
    policy_set_definitions: BTreeMap<String, PolicySetDefinition>,
    role_definitions: BTreeMap<String, RoleDefinition>,
    policy_assignments: BTreeMap<String, PolicyAssignment>,
    role_assignments: BTreeSet<PolicyRoleAssignment>,
}

/// Name-to-owning-group index used while rewriting references.
pub(crate) struct OwnerIndex {
    policy_definitions: BTreeMap<String, BTreeSet<String>>,
    policy_set_definitions: BTreeMap<String, BTreeSet<String>>,
}

impl OwnerIndex {
    pub(crate) fn new<'a>(groups: impl Iterator<Item = &'a ManagementGroup>) -> Self {
        let mut index = OwnerIndex {
            policy_definitions: BTreeMap::new(),
            policy_set_definitions: BTreeMap::new(),
        };
        for mg in groups {
            for name in mg.policy_definitions.keys() {
                index
                    .policy_definitions
                    .entry(name.clone())
                    .or_default()
                    .insert(mg.id.clone());
            }
            for name in mg.policy_set_definitions.keys() {
                index
                    .policy_set_definitions
                    .entry(name.clone())
                    .or_default()
                    .insert(mg.id.clone());
            }
        }
        index
    }

    /// The group owning `name`, preferring the referencing group and then its
    /// nearest ancestor. `None` means no group owns it (a built-in).
    fn owner<'i>(
        &'i self,
        definition_type: DefinitionType,
        name: &str,
        ancestry: &[String],
    ) -> Option<&'i str> {
        let owners = match definition_type {
            DefinitionType::Policy => self.policy_definitions.get(name)?,
            DefinitionType::PolicySet => self.policy_set_definitions.get(name)?,
        };
        if let Some(owner) = ancestry.iter().find(|id| owners.contains(*id)) {
            return owners.get(owner).map(String::as_str);
        }
        let first = owners.iter().next().map(String::as_str);
        if let Some(first) = first {
            warn!(
                "{} '{name}' is not owned by '{}' or its ancestors, using '{first}'",
                definition_kind(definition_type),
                ancestry.first().map(String::as_str).unwrap_or_default()
            );
        }
        first
    }
}

impl ManagementGroup {
    /// Resolve the union of `sets` against the store.
    pub(crate) fn new(
        id: String,
        display_name: String,
        exists: bool,
        parent: ParentRef,
        sets: &ArtifactSets,
        artifacts: &Artifacts,
    ) -> Result<Self> {
        let mut mg = ManagementGroup {
            id,
            display_name,
            exists,
            parent,
            children: BTreeSet::new(),
            policy_definitions: BTreeMap::new(),
            policy_set_definitions: BTreeMap::new(),
            role_definitions: BTreeMap::new(),
            policy_assignments: BTreeMap::new(),
            role_assignments: BTreeSet::new(),
        };
        for name in &sets.policy_definitions {
            let d = artifacts.policy_definition(name, None)?;
            mg.policy_definitions.insert(name.clone(), d.clone());
        }
        for name in &sets.policy_set_definitions {
            let d = artifacts.policy_set_definition(name, None)?;
            mg.policy_set_definitions.insert(name.clone(), d.clone());
        }
        for name in &sets.role_definitions {
            let d = artifacts.role_definition(name)?;
            mg.role_definitions.insert(name.clone(), d.clone());
        }
        for name in &sets.policy_assignments {
            let a = artifacts.policy_assignment(name)?;
            mg.policy_assignments.insert(name.clone(), a.clone());
        }
        Ok(mg)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Whether the group already exists and is only being configured.
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn parent(&self) -> &ParentRef {
        &self.parent
    }

    /// Child ids, sorted.
    pub fn children(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(String::as_str)
    }

    pub fn resource_id(&self) -> String {
        management_group_resource_id(&self.id)
    }

    pub fn policy_definitions(&self) -> impl Iterator<Item = (&String, &PolicyDefinition)> {
        self.policy_definitions.iter()
    }

    pub fn policy_set_definitions(&self) -> impl Iterator<Item = (&String, &PolicySetDefinition)> {
        self.policy_set_definitions.iter()
    }

    /// Role definitions keyed by role name.
    pub fn role_definitions(&self) -> impl Iterator<Item = (&String, &RoleDefinition)> {
        self.role_definitions.iter()
    }

    pub fn policy_assignments(&self) -> impl Iterator<Item = (&String, &PolicyAssignment)> {
        self.policy_assignments.iter()
    }

    pub fn policy_definition(&self, name: &str) -> Option<&PolicyDefinition> {
        self.policy_definitions.get(name)
    }

    pub fn policy_set_definition(&self, name: &str) -> Option<&PolicySetDefinition> {
        self.policy_set_definitions.get(name)
    }

    pub fn role_definition(&self, name: &str) -> Option<&RoleDefinition> {
        self.role_definitions.get(name)
    }

    pub fn policy_assignment(&self, name: &str) -> Option<&PolicyAssignment> {
        self.policy_assignments.get(name)
    }

    pub fn policy_role_assignments(&self) -> &BTreeSet<PolicyRoleAssignment> {
        &self.role_assignments
    }

    pub(crate) fn add_child(&mut self, id: &str) {
        self.children.insert(id.to_string());
    }

    pub(crate) fn set_role_assignments(&mut self, role_assignments: BTreeSet<PolicyRoleAssignment>) {
        self.role_assignments = role_assignments;
    }

    /// Set `value` on the named parameters of the named assignment, if this
    /// group has it. Returns whether anything changed.
    pub(crate) fn apply_default_value(
        &mut self,
        assignment: &str,
        parameters: &[String],
        value: &Value,
    ) -> bool {
        let Some(a) = self.policy_assignments.get_mut(assignment) else {
            return false;
        };
        for parameter in parameters {
            a.set_parameter(parameter.clone(), value.clone());
        }
        !parameters.is_empty()
    }

    pub(crate) fn set_assignment_location(&mut self, location: &str) {
        for a in self.policy_assignments.values_mut() {
            a.location = Some(location.to_string());
        }
    }

    pub(crate) fn modify_policy_assignment(
        &mut self,
        name: &str,
        modification: PolicyAssignmentModification,
    ) -> Result<()> {
        let Some(a) = self.policy_assignments.get_mut(name) else {
            return Err(AlzError::PolicyAssignmentNotFound {
                management_group: self.id.clone(),
                assignment: name.to_string(),
            });
        };
        let PolicyAssignmentModification {
            parameters,
            enforcement_mode,
            identity,
            non_compliance_messages,
        } = modification;

        for (parameter, value) in parameters {
            a.set_parameter(parameter, value);
        }
        if let Some(mode) = enforcement_mode {
            a.properties.enforcement_mode = Some(mode);
        }
        if let Some(identity) = identity {
            a.identity = Some(identity);
        }
        if let Some(messages) = non_compliance_messages {
            a.properties.non_compliance_messages = messages;
        }
        Ok(())
    }

    /// Point every resource id at this group, and every reference at the
    /// group owning the referenced definition. Idempotent.
    pub(crate) fn rewrite_resource_ids(
        &mut self,
        index: &OwnerIndex,
        ancestry: &[String],
        unique_role_definitions: bool,
    ) {
        let mg_id = self.id.clone();
        let scope = self.resource_id();

        for (name, d) in self.policy_definitions.iter_mut() {
            d.id = Some(authorization_resource_id(&mg_id, POLICY_DEFINITIONS, name));
        }

        for (name, set) in self.policy_set_definitions.iter_mut() {
            set.id = Some(authorization_resource_id(&mg_id, POLICY_SET_DEFINITIONS, name));
            for member in set.properties.policy_definitions.iter_mut() {
                if let Some(id) =
                    rewrite_reference(&member.policy_definition_id, index, ancestry)
                {
                    member.policy_definition_id = id;
                }
            }
        }

        for (name, a) in self.policy_assignments.iter_mut() {
            a.id = Some(authorization_resource_id(&mg_id, POLICY_ASSIGNMENTS, name));
            a.properties.scope = Some(scope.clone());
            if let Some(id) = rewrite_reference(&a.properties.policy_definition_id, index, ancestry)
            {
                a.properties.policy_definition_id = id;
            }
        }

        for (role_name, r) in self.role_definitions.iter_mut() {
            if unique_role_definitions {
                r.name = role_definition_name(&mg_id, &r.properties.role_name, role_name);
            }
            r.id = Some(authorization_resource_id(&mg_id, ROLE_DEFINITIONS, &r.name));
            r.properties.assignable_scopes = vec![scope.clone()];
        }
    }
}

fn definition_kind(t: DefinitionType) -> ArtifactKind {
    match t {
        DefinitionType::Policy => ArtifactKind::PolicyDefinition,
        DefinitionType::PolicySet => ArtifactKind::PolicySetDefinition,
    }
}

/// The rewritten id of a definition reference, or `None` to leave it as is.
fn rewrite_reference(id: &str, index: &OwnerIndex, ancestry: &[String]) -> Option<String> {
    let (resource_type, name) = last_type_and_name(id).ok()?;
    let definition_type = DefinitionType::from_resource_type(resource_type)?;
    let owner = index.owner(definition_type, name, ancestry)?;
    Some(authorization_resource_id(
        owner,
        definition_type.resource_type(),
        name,
    ))
}

/// Stable role definition name for a role deployed at a management group.
fn role_definition_name(management_group: &str, role_name: &str, fallback: &str) -> String {
    let role = if role_name.is_empty() { fallback } else { role_name };
    Uuid::new_v5(
        &ROLE_DEFINITION_NAMESPACE,
        format!("{management_group}/{role}").as_bytes(),
    )
    .to_string()
}
