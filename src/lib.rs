// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod alzlib;
mod archetype;
mod arm;
mod artifacts;
mod builtin;
mod error;
mod hierarchy;
mod library;
mod management_group;
mod options;
mod registry;
mod role_assignments;
mod store;
mod versioned;

pub use crate::alzlib::AlzLib;
pub use archetype::{Archetype, ArchetypeOverride, ArtifactSets, EMPTY_ARCHETYPE};
pub use artifacts::*;
pub use builtin::{BuiltInDefinitionSource, CancellationToken};
pub use error::{AlzError, ArtifactKind, Result};
pub use hierarchy::{
    Hierarchy, HierarchyBuilder, HierarchyRequest, WellKnownPolicyValues, LOCATION_DEFAULT,
    LOG_ANALYTICS_WORKSPACE_DEFAULT, PRIVATE_DNS_ZONE_RESOURCE_GROUP_DEFAULT,
};
pub use library::{
    dependency_order, ArchetypeDefinition, ArchetypeOverrideDefinition, Architecture,
    DefaultPolicyValue, DefaultPolicyValueTarget, LibraryContents, LibraryMetadata,
    ManagementGroupDescriptor,
};
pub use management_group::{ManagementGroup, ParentRef, PolicyAssignmentModification};
pub use options::{AlzLibOptions, DEFAULT_MAX_DEPTH, DEFAULT_PARALLELISM};
pub use registry::{ArchetypeRegistry, ArchitectureRegistry, Registry, RegistryError};
pub use role_assignments::{PolicyRoleAssignment, RoleAssignmentInferencer};
pub use store::{ArtifactStore, Artifacts};
pub use versioned::{Versioned, VersionedArtifactCollection};

/// Resource id helpers and the `[parameters('name')]` reference parser.
pub mod resource_ids {
    pub use crate::arm::*;
}
