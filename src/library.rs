// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Records produced by a library processor.
//!
//! The file layout of a library is not this crate's concern; a processor
//! reads it and hands over one [`LibraryContents`] per library.

use crate::archetype::{Archetype, ArchetypeOverride, ArtifactSets};
use crate::artifacts::{PolicyAssignment, PolicyDefinition, PolicySetDefinition, RoleDefinition};
use crate::error::{AlzError, Result};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Names of libraries that must be loaded first.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Everything one library contributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryContents {
    pub metadata: LibraryMetadata,
    pub policy_definitions: Vec<PolicyDefinition>,
    pub policy_set_definitions: Vec<PolicySetDefinition>,
    pub role_definitions: Vec<RoleDefinition>,
    pub policy_assignments: Vec<PolicyAssignment>,
    pub archetypes: Vec<ArchetypeDefinition>,
    pub archetype_overrides: Vec<ArchetypeOverrideDefinition>,
    pub architectures: Vec<Architecture>,
    pub default_policy_values: Vec<DefaultPolicyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchetypeDefinition {
    pub name: String,
    #[serde(default)]
    pub policy_assignments: BTreeSet<String>,
    #[serde(default)]
    pub policy_definitions: BTreeSet<String>,
    #[serde(default)]
    pub policy_set_definitions: BTreeSet<String>,
    #[serde(default)]
    pub role_definitions: BTreeSet<String>,
}

impl From<ArchetypeDefinition> for Archetype {
    fn from(d: ArchetypeDefinition) -> Self {
        Archetype::with_sets(
            d.name,
            ArtifactSets {
                policy_definitions: d.policy_definitions,
                policy_set_definitions: d.policy_set_definitions,
                role_definitions: d.role_definitions,
                policy_assignments: d.policy_assignments,
            },
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchetypeOverrideDefinition {
    pub name: String,
    pub base_archetype: String,
    pub policy_assignments_to_add: BTreeSet<String>,
    pub policy_assignments_to_remove: BTreeSet<String>,
    pub policy_definitions_to_add: BTreeSet<String>,
    pub policy_definitions_to_remove: BTreeSet<String>,
    pub policy_set_definitions_to_add: BTreeSet<String>,
    pub policy_set_definitions_to_remove: BTreeSet<String>,
    pub role_definitions_to_add: BTreeSet<String>,
    pub role_definitions_to_remove: BTreeSet<String>,
}

impl From<ArchetypeOverrideDefinition> for ArchetypeOverride {
    fn from(d: ArchetypeOverrideDefinition) -> Self {
        ArchetypeOverride {
            name: d.name,
            base_archetype: d.base_archetype,
            add: ArtifactSets {
                policy_definitions: d.policy_definitions_to_add,
                policy_set_definitions: d.policy_set_definitions_to_add,
                role_definitions: d.role_definitions_to_add,
                policy_assignments: d.policy_assignments_to_add,
            },
            remove: ArtifactSets {
                policy_definitions: d.policy_definitions_to_remove,
                policy_set_definitions: d.policy_set_definitions_to_remove,
                role_definitions: d.role_definitions_to_remove,
                policy_assignments: d.policy_assignments_to_remove,
            },
        }
    }
}

/// A flat description of a management group hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
    pub name: String,
    #[serde(default)]
    pub management_groups: Vec<ManagementGroupDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementGroupDescriptor {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    /// `None` makes this a root group under the hierarchy's external parent.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// `parent_id` names a group outside the architecture.
    #[serde(default)]
    pub parent_is_external: bool,
    /// The group already exists and will not be created.
    #[serde(default)]
    pub exists: bool,
    #[serde(default)]
    pub archetypes: BTreeSet<String>,
}

impl ManagementGroupDescriptor {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none() || self.parent_is_external
    }
}

/// A named value that libraries route into specific assignment parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPolicyValue {
    pub default_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub policy_assignments: Vec<DefaultPolicyValueTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPolicyValueTarget {
    pub policy_assignment_name: String,
    #[serde(default)]
    pub parameter_names: Vec<String>,
}

/// Order libraries so that each comes after the libraries it depends on.
/// Libraries without a mutual dependency keep their relative order.
pub fn dependency_order(libraries: Vec<LibraryContents>) -> Result<Vec<LibraryContents>> {
    let names: BTreeSet<&str> = libraries
        .iter()
        .map(|l| l.metadata.name.as_str())
        .collect();
    for library in &libraries {
        if let Some(dependency) = library
            .metadata
            .dependencies
            .iter()
            .find(|d| !names.contains(d.as_str()))
        {
            return Err(AlzError::MissingDependency {
                library: library.metadata.name.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    let mut pending: BTreeMap<usize, LibraryContents> = libraries.into_iter().enumerate().collect();
    let mut loaded: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = pending.iter().find_map(|(idx, l)| {
            l.metadata
                .dependencies
                .iter()
                .all(|d| loaded.contains(d))
                .then_some(*idx)
        });
        let Some(idx) = ready else {
            let stuck = pending
                .values()
                .next()
                .map(|l| l.metadata.name.clone())
                .unwrap_or_default();
            return Err(AlzError::DependencyCycle(stuck));
        };
        if let Some(library) = pending.remove(&idx) {
            loaded.insert(library.metadata.name.clone());
            ordered.push(library);
        }
    }

    Ok(ordered)
}
