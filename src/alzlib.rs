// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::archetype::Archetype;
use crate::arm::{last_type_and_name, DefinitionType};
use crate::artifacts::{PolicyAssignment, PolicyDefinition, PolicySetDefinition, RoleDefinition};
use crate::builtin::{BuiltInDefinitionSource, CancellationToken};
use crate::error::{AlzError, ArtifactKind, Result};
use crate::hierarchy::{Hierarchy, HierarchyBuilder, HierarchyRequest};
use crate::library::{dependency_order, Architecture, LibraryContents, LibraryMetadata};
use crate::options::AlzLibOptions;
use crate::store::{ArtifactStore, Artifacts};

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info};

/// The library store: every artifact, archetype and architecture loaded so
/// far, behind a single reader/writer lock.
///
/// Accessors return owned copies. Hierarchies are built against an immutable
/// [`ArtifactStore`] snapshot, so later loads never affect a built tree.
#[derive(Debug)]
pub struct AlzLib {
    options: AlzLibOptions,
    store: RwLock<ArtifactStore>,
}

impl AlzLib {
    pub fn new(options: AlzLibOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            store: RwLock::new(ArtifactStore::default()),
        })
    }

    pub fn options(&self) -> &AlzLibOptions {
        &self.options
    }

    /// Load `libraries`, dependencies first.
    ///
    /// Each library is loaded as a whole or not at all; libraries loaded
    /// before a failing one stay loaded.
    pub fn init(&self, libraries: Vec<LibraryContents>) -> Result<()> {
        let libraries = dependency_order(libraries)?;
        let mut store = self.store.write();
        for library in libraries {
            let mut next = store.clone();
            next.add_library(library, self.options.allow_overwrite)?;
            *store = next;
        }
        Ok(())
    }

    pub fn add_policy_definitions(&self, definitions: Vec<PolicyDefinition>) -> Result<()> {
        self.update_artifacts(|a, overwrite| {
            definitions
                .into_iter()
                .try_for_each(|d| a.add_policy_definition(d, overwrite))
        })
    }

    pub fn add_policy_set_definitions(&self, definitions: Vec<PolicySetDefinition>) -> Result<()> {
        self.update_artifacts(|a, overwrite| {
            definitions
                .into_iter()
                .try_for_each(|d| a.add_policy_set_definition(d, overwrite))
        })
    }

    pub fn add_role_definitions(&self, definitions: Vec<RoleDefinition>) -> Result<()> {
        self.update_artifacts(|a, overwrite| {
            definitions
                .into_iter()
                .try_for_each(|d| a.add_role_definition(d, overwrite))
        })
    }

    pub fn add_policy_assignments(&self, assignments: Vec<PolicyAssignment>) -> Result<()> {
        self.update_artifacts(|a, overwrite| {
            assignments
                .into_iter()
                .try_for_each(|d| a.add_policy_assignment(d, overwrite))
        })
    }

    // All or nothing.
    fn update_artifacts<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Artifacts, bool) -> Result<()>,
    {
        let mut store = self.store.write();
        let mut artifacts = store.artifacts.clone();
        f(&mut artifacts, self.options.allow_overwrite)?;
        store.artifacts = artifacts;
        Ok(())
    }

    pub fn contains(&self, kind: ArtifactKind, name: &str) -> bool {
        self.store.read().artifacts.contains(kind, name)
    }

    pub fn policy_definition(&self, name: &str, version: Option<&str>) -> Result<PolicyDefinition> {
        self.store
            .read()
            .artifacts
            .policy_definition(name, version)
            .cloned()
    }

    pub fn policy_set_definition(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<PolicySetDefinition> {
        self.store
            .read()
            .artifacts
            .policy_set_definition(name, version)
            .cloned()
    }

    pub fn role_definition(&self, name: &str) -> Result<RoleDefinition> {
        self.store.read().artifacts.role_definition(name).cloned()
    }

    pub fn policy_assignment(&self, name: &str) -> Result<PolicyAssignment> {
        self.store.read().artifacts.policy_assignment(name).cloned()
    }

    pub fn names(&self, kind: ArtifactKind) -> Vec<String> {
        self.store.read().artifacts.names(kind)
    }

    pub fn archetype(&self, name: &str) -> Result<Archetype> {
        self.store.read().archetype(name).cloned()
    }

    pub fn archetype_names(&self) -> Vec<String> {
        self.store.read().archetype_names()
    }

    pub fn architecture(&self, name: &str) -> Result<Architecture> {
        self.store.read().architecture(name).cloned()
    }

    pub fn architecture_names(&self) -> Vec<String> {
        self.store.read().architecture_names()
    }

    pub fn default_policy_value_names(&self) -> Vec<String> {
        self.store.read().default_policy_value_names()
    }

    pub fn libraries(&self) -> Vec<LibraryMetadata> {
        self.store.read().libraries().to_vec()
    }

    /// An immutable copy of the current store.
    pub fn snapshot(&self) -> Arc<ArtifactStore> {
        Arc::new(self.store.read().clone())
    }

    /// Fetch every policy and policy set definition that library artifacts
    /// reference but the store lacks, including the members of fetched sets.
    ///
    /// Nothing is merged unless every fetch succeeds. Returns the number of
    /// definitions added.
    pub fn fetch_built_in_definitions(
        &self,
        source: &dyn BuiltInDefinitionSource,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut missing = {
            let store = self.store.read();
            MissingDefinitions::discover(&store.artifacts)?
        };
        info!(
            "fetching {} policy definitions and {} policy set definitions",
            missing.policies.len(),
            missing.sets.len()
        );

        let mut sets = Vec::new();
        for ((name, version), id) in std::mem::take(&mut missing.sets) {
            if cancel.is_cancelled() {
                return Err(AlzError::Cancelled);
            }
            debug!("fetching policy set definition '{name}'");
            let set = source
                .policy_set_definition(&id, version.as_deref())
                .map_err(|e| fetch_error(&id, e))?;
            sets.push(set);
        }

        // Members of fetched sets may be built-ins too.
        {
            let store = self.store.read();
            for set in &sets {
                for member in set.members() {
                    missing.policy(
                        &store.artifacts,
                        &member.policy_definition_id,
                        member.definition_version.as_deref(),
                    )?;
                }
            }
        }

        let mut policies = Vec::new();
        for ((name, version), id) in std::mem::take(&mut missing.policies) {
            if cancel.is_cancelled() {
                return Err(AlzError::Cancelled);
            }
            debug!("fetching policy definition '{name}'");
            let definition = source
                .policy_definition(&id, version.as_deref())
                .map_err(|e| fetch_error(&id, e))?;
            policies.push(definition);
        }

        if cancel.is_cancelled() {
            return Err(AlzError::Cancelled);
        }

        let mut store = self.store.write();
        let mut artifacts = store.artifacts.clone();
        let mut added = 0;
        for d in policies {
            if !artifacts
                .contains_policy_definition_version(&d.name, d.properties.version.as_deref())
            {
                artifacts.add_policy_definition(d, false)?;
                added += 1;
            }
        }
        for d in sets {
            if !artifacts
                .contains_policy_set_definition_version(&d.name, d.properties.version.as_deref())
            {
                artifacts.add_policy_set_definition(d, false)?;
                added += 1;
            }
        }
        store.artifacts = artifacts;
        info!("merged {added} built-in definitions");
        Ok(added)
    }

    fn builder(&self, store: Arc<ArtifactStore>) -> HierarchyBuilder {
        HierarchyBuilder::new(store)
            .with_max_depth(self.options.max_depth)
            .with_single_root(self.options.single_root)
            .with_unique_role_definitions(self.options.unique_role_definitions)
    }

    /// Build, update and infer one hierarchy.
    pub fn build_hierarchy(&self, request: &HierarchyRequest) -> Result<Hierarchy> {
        build_with(&self.builder(self.snapshot()), request)
    }

    /// Resolve independent hierarchies concurrently, at most `parallelism`
    /// at a time. Results are in request order.
    pub fn build_hierarchies(&self, requests: &[HierarchyRequest]) -> Vec<Result<Hierarchy>> {
        let builder = self.builder(self.snapshot());
        let thread_count = requests.len().clamp(1, self.options.parallelism);
        if thread_count == 1 {
            return requests.iter().map(|r| build_with(&builder, r)).collect();
        }

        let per_thread = requests.len().div_ceil(thread_count);
        let mut results = Vec::with_capacity(requests.len());
        std::thread::scope(|s| {
            let builder = &builder;
            let tasks: Vec<_> = requests
                .chunks(per_thread)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|r| build_with(builder, r))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for task in tasks {
                match task.join() {
                    Ok(chunk) => results.extend(chunk),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });
        results
    }
}

fn build_with(builder: &HierarchyBuilder, request: &HierarchyRequest) -> Result<Hierarchy> {
    let architecture = builder.store().architecture(&request.architecture)?;
    let mut hierarchy = builder.build(architecture, &request.external_parent_id)?;
    hierarchy.update(&request.values)?;
    Ok(hierarchy)
}

fn fetch_error(id: &str, e: anyhow::Error) -> AlzError {
    AlzError::BuiltInFetch {
        id: id.to_string(),
        message: format!("{e:#}"),
    }
}

type Wanted = BTreeMap<(String, Option<String>), String>;

/// Definitions referenced by id but absent from the store, keyed by name and
/// version constraint, valued by the referencing id.
#[derive(Default)]
struct MissingDefinitions {
    policies: Wanted,
    sets: Wanted,
}

impl MissingDefinitions {
    fn discover(artifacts: &Artifacts) -> Result<Self> {
        let mut missing = Self::default();
        for a in artifacts.policy_assignments() {
            let id = &a.properties.policy_definition_id;
            let version = a.properties.definition_version.as_deref();
            let (resource_type, name) = last_type_and_name(id)?;
            match DefinitionType::from_resource_type(resource_type) {
                Some(DefinitionType::Policy) => missing.policy(artifacts, id, version)?,
                Some(DefinitionType::PolicySet) => {
                    if !artifacts.contains_policy_set_definition_version(name, version) {
                        missing
                            .sets
                            .insert((name.to_string(), version.map(str::to_string)), id.clone());
                    }
                }
                None => {
                    return Err(AlzError::UnsupportedDefinitionType {
                        assignment: a.name.clone(),
                        id: id.clone(),
                        definition_type: resource_type.to_string(),
                    })
                }
            }
        }
        // Older versions may be pinned by an assignment's definitionVersion.
        for set in artifacts.all_policy_set_definitions() {
            for member in set.members() {
                missing.policy(
                    artifacts,
                    &member.policy_definition_id,
                    member.definition_version.as_deref(),
                )?;
            }
        }
        Ok(missing)
    }

    fn policy(&mut self, artifacts: &Artifacts, id: &str, version: Option<&str>) -> Result<()> {
        let (_, name) = last_type_and_name(id)?;
        if !artifacts.contains_policy_definition_version(name, version) {
            self.policies
                .insert((name.to_string(), version.map(str::to_string)), id.to_string());
        }
        Ok(())
    }
}
