// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::ArtifactKind;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Name of the archetype that is always available and references nothing.
pub const EMPTY_ARCHETYPE: &str = "empty";

/// Artifact names grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSets {
    pub policy_definitions: BTreeSet<String>,
    pub policy_set_definitions: BTreeSet<String>,
    pub role_definitions: BTreeSet<String>,
    pub policy_assignments: BTreeSet<String>,
}

impl ArtifactSets {
    pub fn get(&self, kind: ArtifactKind) -> &BTreeSet<String> {
        match kind {
            ArtifactKind::PolicyDefinition => &self.policy_definitions,
            ArtifactKind::PolicySetDefinition => &self.policy_set_definitions,
            ArtifactKind::RoleDefinition => &self.role_definitions,
            ArtifactKind::PolicyAssignment => &self.policy_assignments,
        }
    }

    fn get_mut(&mut self, kind: ArtifactKind) -> &mut BTreeSet<String> {
        match kind {
            ArtifactKind::PolicyDefinition => &mut self.policy_definitions,
            ArtifactKind::PolicySetDefinition => &mut self.policy_set_definitions,
            ArtifactKind::RoleDefinition => &mut self.role_definitions,
            ArtifactKind::PolicyAssignment => &mut self.policy_assignments,
        }
    }

    pub fn is_empty(&self) -> bool {
        ArtifactKind::ALL.iter().all(|k| self.get(*k).is_empty())
    }

    /// Every referenced name with its kind, kinds in [`ArtifactKind::ALL`]
    /// order and names sorted within a kind.
    pub fn references(&self) -> impl Iterator<Item = (ArtifactKind, &str)> {
        ArtifactKind::ALL
            .into_iter()
            .flat_map(move |k| self.get(k).iter().map(move |n| (k, n.as_str())))
    }

    /// `(self ∪ add) − remove`, per kind.
    pub fn compose(&self, add: &ArtifactSets, remove: &ArtifactSets) -> ArtifactSets {
        let mut result = ArtifactSets::default();
        for kind in ArtifactKind::ALL {
            let removed = remove.get(kind);
            *result.get_mut(kind) = self
                .get(kind)
                .union(add.get(kind))
                .filter(|n| !removed.contains(*n))
                .cloned()
                .collect();
        }
        result
    }
}

/// A named, reusable bundle of artifact references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archetype {
    name: String,
    sets: ArtifactSets,
}

impl Archetype {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_sets(name, ArtifactSets::default())
    }

    pub fn with_sets(name: impl Into<String>, sets: ArtifactSets) -> Self {
        Self {
            name: name.into(),
            sets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sets(&self) -> &ArtifactSets {
        &self.sets
    }

    pub fn policy_definitions(&self) -> &BTreeSet<String> {
        &self.sets.policy_definitions
    }

    pub fn policy_set_definitions(&self) -> &BTreeSet<String> {
        &self.sets.policy_set_definitions
    }

    pub fn role_definitions(&self) -> &BTreeSet<String> {
        &self.sets.role_definitions
    }

    pub fn policy_assignments(&self) -> &BTreeSet<String> {
        &self.sets.policy_assignments
    }

    /// A new archetype named `name` holding `(self ∪ add) − remove`.
    pub fn compose(
        &self,
        name: impl Into<String>,
        add: &ArtifactSets,
        remove: &ArtifactSets,
    ) -> Archetype {
        Archetype::with_sets(name, self.sets.compose(add, remove))
    }
}

/// An archetype derived from another by adding and removing references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchetypeOverride {
    pub name: String,
    pub base_archetype: String,
    pub add: ArtifactSets,
    pub remove: ArtifactSets,
}
