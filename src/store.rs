// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::archetype::Archetype;
use crate::artifacts::{PolicyAssignment, PolicyDefinition, PolicySetDefinition, RoleDefinition};
use crate::error::{AlzError, ArtifactKind, Result};
use crate::library::{Architecture, DefaultPolicyValue, LibraryContents, LibraryMetadata};
use crate::registry::{ArchetypeRegistry, ArchitectureRegistry};
use crate::versioned::{Versioned, VersionedArtifactCollection};

use std::collections::BTreeMap;

use log::{debug, info};

type Collections<T> = BTreeMap<String, VersionedArtifactCollection<T>>;

/// Policy and role artifacts, keyed by library name.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    policy_definitions: Collections<PolicyDefinition>,
    policy_set_definitions: Collections<PolicySetDefinition>,
    role_definitions: BTreeMap<String, RoleDefinition>,
    policy_assignments: BTreeMap<String, PolicyAssignment>,
}

fn add_versioned<T: Versioned>(
    collections: &mut Collections<T>,
    artifact: T,
    allow_overwrite: bool,
) -> Result<()> {
    let name = artifact.name().to_string();
    debug!("adding {} '{name}'", T::KIND);
    collections
        .entry(name.clone())
        .or_insert_with(|| VersionedArtifactCollection::new(name))
        .add(artifact, allow_overwrite)
}

fn add_unversioned<T>(
    map: &mut BTreeMap<String, T>,
    kind: ArtifactKind,
    name: &str,
    artifact: T,
    allow_overwrite: bool,
) -> Result<()> {
    if map.contains_key(name) && !allow_overwrite {
        return Err(AlzError::DuplicateArtifact {
            kind,
            name: name.to_string(),
        });
    }
    debug!("adding {kind} '{name}'");
    map.insert(name.to_string(), artifact);
    Ok(())
}

impl Artifacts {
    pub fn add_policy_definition(&mut self, d: PolicyDefinition, allow_overwrite: bool) -> Result<()> {
        add_versioned(&mut self.policy_definitions, d, allow_overwrite)
    }

    pub fn add_policy_set_definition(
        &mut self,
        d: PolicySetDefinition,
        allow_overwrite: bool,
    ) -> Result<()> {
        add_versioned(&mut self.policy_set_definitions, d, allow_overwrite)
    }

    pub fn add_role_definition(&mut self, d: RoleDefinition, allow_overwrite: bool) -> Result<()> {
        let name = d.library_name().to_string();
        add_unversioned(
            &mut self.role_definitions,
            ArtifactKind::RoleDefinition,
            &name,
            d,
            allow_overwrite,
        )
    }

    pub fn add_policy_assignment(&mut self, a: PolicyAssignment, allow_overwrite: bool) -> Result<()> {
        let name = a.name.clone();
        add_unversioned(
            &mut self.policy_assignments,
            ArtifactKind::PolicyAssignment,
            &name,
            a,
            allow_overwrite,
        )
    }

    pub fn contains(&self, kind: ArtifactKind, name: &str) -> bool {
        match kind {
            ArtifactKind::PolicyDefinition => self.policy_definitions.contains_key(name),
            ArtifactKind::PolicySetDefinition => self.policy_set_definitions.contains_key(name),
            ArtifactKind::RoleDefinition => self.role_definitions.contains_key(name),
            ArtifactKind::PolicyAssignment => self.policy_assignments.contains_key(name),
        }
    }

    /// Whether a policy definition with this name has a version matching `version`.
    pub fn contains_policy_definition_version(&self, name: &str, version: Option<&str>) -> bool {
        self.policy_definitions
            .get(name)
            .is_some_and(|c| c.get_version(version).is_ok())
    }

    pub fn contains_policy_set_definition_version(&self, name: &str, version: Option<&str>) -> bool {
        self.policy_set_definitions
            .get(name)
            .is_some_and(|c| c.get_version(version).is_ok())
    }

    pub fn policy_definition(&self, name: &str, version: Option<&str>) -> Result<&PolicyDefinition> {
        self.policy_definitions
            .get(name)
            .ok_or_else(|| AlzError::ArtifactNotFound {
                kind: ArtifactKind::PolicyDefinition,
                name: name.to_string(),
            })?
            .get_version(version)
    }

    pub fn policy_definition_versions(
        &self,
        name: &str,
    ) -> Option<&VersionedArtifactCollection<PolicyDefinition>> {
        self.policy_definitions.get(name)
    }

    pub fn policy_set_definition(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<&PolicySetDefinition> {
        self.policy_set_definitions
            .get(name)
            .ok_or_else(|| AlzError::ArtifactNotFound {
                kind: ArtifactKind::PolicySetDefinition,
                name: name.to_string(),
            })?
            .get_version(version)
    }

    pub fn policy_set_definition_versions(
        &self,
        name: &str,
    ) -> Option<&VersionedArtifactCollection<PolicySetDefinition>> {
        self.policy_set_definitions.get(name)
    }

    pub fn role_definition(&self, name: &str) -> Result<&RoleDefinition> {
        self.role_definitions
            .get(name)
            .ok_or_else(|| AlzError::ArtifactNotFound {
                kind: ArtifactKind::RoleDefinition,
                name: name.to_string(),
            })
    }

    pub fn policy_assignment(&self, name: &str) -> Result<&PolicyAssignment> {
        self.policy_assignments
            .get(name)
            .ok_or_else(|| AlzError::ArtifactNotFound {
                kind: ArtifactKind::PolicyAssignment,
                name: name.to_string(),
            })
    }

    /// Names of the artifacts of one kind, sorted.
    pub fn names(&self, kind: ArtifactKind) -> Vec<String> {
        match kind {
            ArtifactKind::PolicyDefinition => self.policy_definitions.keys().cloned().collect(),
            ArtifactKind::PolicySetDefinition => {
                self.policy_set_definitions.keys().cloned().collect()
            }
            ArtifactKind::RoleDefinition => self.role_definitions.keys().cloned().collect(),
            ArtifactKind::PolicyAssignment => self.policy_assignments.keys().cloned().collect(),
        }
    }

    /// Every stored version of every policy set definition.
    pub(crate) fn all_policy_set_definitions(&self) -> impl Iterator<Item = &PolicySetDefinition> {
        self.policy_set_definitions.values().flat_map(|c| c.versions())
    }

    pub(crate) fn policy_assignments(&self) -> impl Iterator<Item = &PolicyAssignment> {
        self.policy_assignments.values()
    }
}

/// Everything loaded from libraries and built-in sources.
///
/// This is the data behind [`crate::AlzLib`]'s lock. Hierarchies hold an
/// immutable, shared copy of it.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    pub(crate) artifacts: Artifacts,
    pub(crate) archetypes: ArchetypeRegistry,
    pub(crate) architectures: ArchitectureRegistry,
    pub(crate) default_policy_values: BTreeMap<String, DefaultPolicyValue>,
    pub(crate) libraries: Vec<LibraryMetadata>,
}

impl ArtifactStore {
    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub fn archetype(&self, name: &str) -> Result<&Archetype> {
        self.archetypes
            .get(name)
            .ok_or_else(|| AlzError::ArchetypeNotFound(name.to_string()))
    }

    pub fn archetype_names(&self) -> Vec<String> {
        self.archetypes.list_names()
    }

    pub fn architecture(&self, name: &str) -> Result<&Architecture> {
        self.architectures
            .get(name)
            .ok_or_else(|| AlzError::ArchitectureNotFound(name.to_string()))
    }

    pub fn architecture_names(&self) -> Vec<String> {
        self.architectures.list_names()
    }

    pub fn default_policy_value(&self, name: &str) -> Result<&DefaultPolicyValue> {
        self.default_policy_values
            .get(name)
            .ok_or_else(|| AlzError::DefaultValueNotFound(name.to_string()))
    }

    pub fn default_policy_value_names(&self) -> Vec<String> {
        self.default_policy_values.keys().cloned().collect()
    }

    pub fn libraries(&self) -> &[LibraryMetadata] {
        &self.libraries
    }

    /// Load one library: artifacts first, then archetypes, then overrides.
    pub(crate) fn add_library(&mut self, library: LibraryContents, allow_overwrite: bool) -> Result<()> {
        let LibraryContents {
            metadata,
            policy_definitions,
            policy_set_definitions,
            role_definitions,
            policy_assignments,
            archetypes,
            archetype_overrides,
            architectures,
            default_policy_values,
        } = library;

        info!("loading library '{}'", metadata.name);

        for d in policy_definitions {
            self.artifacts.add_policy_definition(d, allow_overwrite)?;
        }
        for d in policy_set_definitions {
            self.artifacts.add_policy_set_definition(d, allow_overwrite)?;
        }
        for d in role_definitions {
            self.artifacts.add_role_definition(d, allow_overwrite)?;
        }
        for a in policy_assignments {
            self.artifacts.add_policy_assignment(a, allow_overwrite)?;
        }

        let artifacts = &self.artifacts;
        self.archetypes.generate(
            archetypes.into_iter().map(Archetype::from).collect(),
            |kind, name| artifacts.contains(kind, name),
        )?;
        self.archetypes.generate_overrides(
            archetype_overrides.into_iter().map(Into::into).collect(),
            |kind, name| artifacts.contains(kind, name),
        )?;

        for architecture in architectures {
            self.architectures
                .register(architecture.name.clone(), architecture)?;
        }

        for value in default_policy_values {
            if self.default_policy_values.contains_key(&value.default_name) {
                return Err(AlzError::DuplicateDefaultValue(value.default_name));
            }
            self.default_policy_values
                .insert(value.default_name.clone(), value);
        }

        info!(
            "library '{}' loaded, {} archetypes and {} architectures known",
            metadata.name,
            self.archetypes.len(),
            self.architectures.len()
        );
        self.libraries.push(metadata);
        Ok(())
    }
}
