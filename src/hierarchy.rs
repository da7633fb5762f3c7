// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Building a management group tree from an architecture.
//!
//! Descriptors are attached level by level: roots first, then every
//! descriptor whose parent sits on the previous level. The number of levels
//! is bounded, so cyclic or overly deep declarations fail instead of looping.

use crate::archetype::ArtifactSets;
use crate::error::{AlzError, Result};
use crate::library::{Architecture, ManagementGroupDescriptor};
use crate::management_group::{ManagementGroup, OwnerIndex, ParentRef, PolicyAssignmentModification};
use crate::options::DEFAULT_MAX_DEPTH;
use crate::role_assignments::{PolicyRoleAssignment, RoleAssignmentInferencer};
use crate::store::ArtifactStore;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, info};

/// Default value names the well-known values are routed through.
pub const LOCATION_DEFAULT: &str = "location";
pub const LOG_ANALYTICS_WORKSPACE_DEFAULT: &str = "log_analytics_workspace_id";
pub const PRIVATE_DNS_ZONE_RESOURCE_GROUP_DEFAULT: &str = "private_dns_zone_resource_group_id";

/// Deployment-specific values injected into library assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WellKnownPolicyValues {
    pub location: Option<String>,
    pub log_analytics_workspace_id: Option<String>,
    pub private_dns_zone_resource_group_id: Option<String>,
}

impl WellKnownPolicyValues {
    fn defaults(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (LOCATION_DEFAULT, self.location.as_deref()),
            (LOG_ANALYTICS_WORKSPACE_DEFAULT, self.log_analytics_workspace_id.as_deref()),
            (
                PRIVATE_DNS_ZONE_RESOURCE_GROUP_DEFAULT,
                self.private_dns_zone_resource_group_id.as_deref(),
            ),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}

/// One hierarchy to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyRequest {
    pub architecture: String,
    /// Where root groups are attached, typically the tenant root group.
    pub external_parent_id: String,
    #[serde(default)]
    pub values: WellKnownPolicyValues,
}

pub struct HierarchyBuilder {
    store: Arc<ArtifactStore>,
    max_depth: usize,
    single_root: bool,
    unique_role_definitions: bool,
}

impl HierarchyBuilder {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            max_depth: DEFAULT_MAX_DEPTH,
            single_root: false,
            unique_role_definitions: true,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_single_root(mut self, single_root: bool) -> Self {
        self.single_root = single_root;
        self
    }

    pub fn with_unique_role_definitions(mut self, unique: bool) -> Self {
        self.unique_role_definitions = unique;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Validate `architecture` and realize its nodes. The result has not been
    /// updated yet; see [`Hierarchy::update`].
    pub fn build(&self, architecture: &Architecture, external_parent_id: &str) -> Result<Hierarchy> {
        let name = architecture.name.as_str();
        let descriptors = &architecture.management_groups;

        let mut by_id: BTreeMap<&str, &ManagementGroupDescriptor> = BTreeMap::new();
        for d in descriptors {
            if by_id.insert(d.id.as_str(), d).is_some() {
                return Err(AlzError::DuplicateManagementGroup {
                    architecture: name.to_string(),
                    id: d.id.clone(),
                });
            }
        }

        for d in descriptors.iter().filter(|d| !d.is_root()) {
            let parent_id = d.parent_id.as_deref().unwrap_or_default();
            let Some(parent) = by_id.get(parent_id) else {
                return Err(AlzError::InvalidParent {
                    id: d.id.clone(),
                    parent: parent_id.to_string(),
                });
            };
            if d.exists && !parent.exists {
                return Err(AlzError::ExistenceInconsistency {
                    id: d.id.clone(),
                    parent: parent.id.clone(),
                });
            }
        }

        let levels = self.levels(name, descriptors)?;

        let mut management_groups = BTreeMap::new();
        for (depth, level) in levels.iter().enumerate() {
            for d in level {
                let parent = match (&d.parent_id, d.is_root()) {
                    (Some(parent), true) => ParentRef::External(parent.clone()),
                    (None, _) => ParentRef::External(external_parent_id.to_string()),
                    (Some(parent), false) => ParentRef::Internal(parent.clone()),
                };
                let sets = self.archetype_sets(d)?;
                let mg = ManagementGroup::new(
                    d.id.clone(),
                    d.display_name.clone(),
                    d.exists,
                    parent,
                    &sets,
                    &self.store.artifacts,
                )?;
                debug!("management group '{}' attached at depth {depth}", d.id);
                management_groups.insert(d.id.clone(), mg);
            }
        }

        for d in descriptors.iter().filter(|d| !d.is_root()) {
            if let Some(parent) = d
                .parent_id
                .as_deref()
                .and_then(|p| management_groups.get_mut(p))
            {
                parent.add_child(&d.id);
            }
        }

        info!(
            "built hierarchy '{name}' with {} management groups in {} levels",
            management_groups.len(),
            levels.len()
        );

        Ok(Hierarchy {
            store: self.store.clone(),
            architecture: name.to_string(),
            management_groups,
            unique_role_definitions: self.unique_role_definitions,
            values_applied: false,
        })
    }

    /// Group descriptors by depth, roots at depth 0.
    fn levels<'d>(
        &self,
        architecture: &str,
        descriptors: &'d [ManagementGroupDescriptor],
    ) -> Result<Vec<Vec<&'d ManagementGroupDescriptor>>> {
        let (mut frontier, mut pending): (Vec<_>, Vec<_>) =
            descriptors.iter().partition(|d| d.is_root());

        if frontier.is_empty() {
            return Err(AlzError::NoRootManagementGroups(architecture.to_string()));
        }
        if self.single_root && frontier.len() > 1 {
            return Err(AlzError::MultipleRootsNotSupported {
                architecture: architecture.to_string(),
                count: frontier.len(),
            });
        }

        let mut levels = Vec::new();
        while !frontier.is_empty() {
            if levels.len() > self.max_depth {
                return Err(AlzError::RecursionDepthExceeded {
                    architecture: architecture.to_string(),
                    max_depth: self.max_depth,
                });
            }
            let attached: BTreeSet<&str> = frontier.iter().map(|d| d.id.as_str()).collect();
            let (next, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|d| {
                d.parent_id
                    .as_deref()
                    .is_some_and(|p| attached.contains(p))
            });
            levels.push(frontier);
            frontier = next;
            pending = rest;
        }

        // Whatever is left hangs off a parent cycle.
        if !pending.is_empty() {
            return Err(AlzError::RecursionDepthExceeded {
                architecture: architecture.to_string(),
                max_depth: self.max_depth,
            });
        }
        Ok(levels)
    }

    fn archetype_sets(&self, d: &ManagementGroupDescriptor) -> Result<ArtifactSets> {
        let none = ArtifactSets::default();
        let mut sets = ArtifactSets::default();
        for name in &d.archetypes {
            let archetype = self.store.archetype(name)?;
            sets = sets.compose(archetype.sets(), &none);
        }
        Ok(sets)
    }
}

/// A resolved management group tree.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    store: Arc<ArtifactStore>,
    architecture: String,
    management_groups: BTreeMap<String, ManagementGroup>,
    unique_role_definitions: bool,
    values_applied: bool,
}

impl Hierarchy {
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn management_group(&self, id: &str) -> Option<&ManagementGroup> {
        self.management_groups.get(id)
    }

    /// Ids of all groups, sorted.
    pub fn management_group_ids(&self) -> Vec<String> {
        self.management_groups.keys().cloned().collect()
    }

    pub fn management_groups(&self) -> impl Iterator<Item = &ManagementGroup> {
        self.management_groups.values()
    }

    /// Groups attached to the external parent.
    pub fn roots(&self) -> impl Iterator<Item = &ManagementGroup> {
        self.management_groups
            .values()
            .filter(|mg| matches!(mg.parent(), ParentRef::External(_)))
    }

    /// Every role assignment required across the tree.
    pub fn policy_role_assignments(&self) -> BTreeSet<PolicyRoleAssignment> {
        self.management_groups
            .values()
            .flat_map(|mg| mg.policy_role_assignments().iter().cloned())
            .collect()
    }

    /// Apply `values` (first call only), rewrite resource ids and infer role
    /// assignments. Safe to call again.
    pub fn update(&mut self, values: &WellKnownPolicyValues) -> Result<()> {
        let mut groups = self.management_groups.clone();
        if !self.values_applied {
            for (default_name, value) in values.defaults() {
                if self.store.default_policy_values.contains_key(default_name) {
                    apply_default_value(&self.store, &mut groups, default_name, &Value::from(value))?;
                } else {
                    debug!("no default policy value named '{default_name}', skipping");
                }
            }
            if let Some(location) = values.location.as_deref() {
                for mg in groups.values_mut() {
                    mg.set_assignment_location(location);
                }
            }
        }
        self.rewrite_resource_ids(&mut groups);
        self.infer(&mut groups)?;
        self.management_groups = groups;
        self.values_applied = true;
        Ok(())
    }

    /// Recompute the role assignments of every group. Nothing changes unless
    /// every group succeeds.
    pub fn infer_role_assignments(&mut self) -> Result<()> {
        let mut groups = self.management_groups.clone();
        self.infer(&mut groups)?;
        self.management_groups = groups;
        Ok(())
    }

    /// Set `value` on every parameter the library routes `default_name` to.
    pub fn add_default_policy_assignment_value(
        &mut self,
        default_name: &str,
        value: Value,
    ) -> Result<()> {
        let mut groups = self.management_groups.clone();
        apply_default_value(&self.store, &mut groups, default_name, &value)?;
        self.infer(&mut groups)?;
        self.management_groups = groups;
        Ok(())
    }

    pub fn modify_policy_assignment(
        &mut self,
        management_group: &str,
        assignment: &str,
        modification: PolicyAssignmentModification,
    ) -> Result<()> {
        let Some(mg) = self.management_groups.get(management_group) else {
            return Err(AlzError::ManagementGroupNotFound(
                management_group.to_string(),
            ));
        };
        let mut mg = mg.clone();
        mg.modify_policy_assignment(assignment, modification)?;
        let role_assignments = RoleAssignmentInferencer::new(&self.store.artifacts).infer(&mg)?;
        mg.set_role_assignments(role_assignments);
        self.management_groups
            .insert(management_group.to_string(), mg);
        Ok(())
    }

    fn rewrite_resource_ids(&self, groups: &mut BTreeMap<String, ManagementGroup>) {
        let index = OwnerIndex::new(groups.values());
        let ancestries: BTreeMap<String, Vec<String>> = groups
            .keys()
            .map(|id| (id.clone(), ancestry(groups, id)))
            .collect();
        for (id, mg) in groups.iter_mut() {
            let ancestry = ancestries.get(id).map(Vec::as_slice).unwrap_or_default();
            mg.rewrite_resource_ids(&index, ancestry, self.unique_role_definitions);
        }
    }

    fn infer(&self, groups: &mut BTreeMap<String, ManagementGroup>) -> Result<()> {
        let inferencer = RoleAssignmentInferencer::new(&self.store.artifacts);
        let mut inferred = Vec::with_capacity(groups.len());
        for (id, mg) in groups.iter() {
            inferred.push((id.clone(), inferencer.infer(mg)?));
        }
        let mut total = 0;
        for (id, role_assignments) in inferred {
            total += role_assignments.len();
            if let Some(mg) = groups.get_mut(&id) {
                mg.set_role_assignments(role_assignments);
            }
        }
        info!(
            "inferred {total} role assignments for hierarchy '{}'",
            self.architecture
        );
        Ok(())
    }
}

/// `id` followed by its internal ancestors, nearest first.
fn ancestry(groups: &BTreeMap<String, ManagementGroup>, id: &str) -> Vec<String> {
    let mut chain = vec![id.to_string()];
    let mut current = groups.get(id);
    while let Some(ParentRef::Internal(parent)) = current.map(ManagementGroup::parent) {
        if chain.contains(parent) {
            break;
        }
        chain.push(parent.clone());
        current = groups.get(parent);
    }
    chain
}

fn apply_default_value(
    store: &ArtifactStore,
    groups: &mut BTreeMap<String, ManagementGroup>,
    default_name: &str,
    value: &Value,
) -> Result<()> {
    let default = store.default_policy_value(default_name)?;
    let mut applied = 0;
    for target in &default.policy_assignments {
        for mg in groups.values_mut() {
            if mg.apply_default_value(
                &target.policy_assignment_name,
                &target.parameter_names,
                value,
            ) {
                applied += 1;
            }
        }
    }
    debug!("default value '{default_name}' applied to {applied} assignments");
    Ok(())
}
