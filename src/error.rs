// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;
use thiserror::Error;

/// The kinds of library artifacts an archetype can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    PolicyDefinition,
    PolicySetDefinition,
    RoleDefinition,
    PolicyAssignment,
}

impl ArtifactKind {
    /// All kinds, in the order archetype references are validated.
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::PolicyDefinition,
        ArtifactKind::PolicySetDefinition,
        ArtifactKind::RoleDefinition,
        ArtifactKind::PolicyAssignment,
    ];
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::PolicyDefinition => "policy definition",
            ArtifactKind::PolicySetDefinition => "policy set definition",
            ArtifactKind::RoleDefinition => "role definition",
            ArtifactKind::PolicyAssignment => "policy assignment",
        };
        f.write_str(s)
    }
}

/// Errors raised while loading a library, building a hierarchy or inferring
/// role assignments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlzError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("{registry} registration failed: the name '{name}' is invalid (empty or whitespace-only names are not allowed)")]
    InvalidName { registry: String, name: String },

    // Artifact store
    #[error("{kind} '{name}' already has version '{version}'")]
    DuplicateVersion {
        kind: ArtifactKind,
        name: String,
        version: String,
    },

    #[error("{kind} '{name}' has no version matching '{constraint}'")]
    VersionNotFound {
        kind: ArtifactKind,
        name: String,
        constraint: String,
    },

    #[error("{kind} '{name}' has an invalid version '{version}': {reason}")]
    InvalidVersion {
        kind: ArtifactKind,
        name: String,
        version: String,
        reason: String,
    },

    #[error("{kind} '{name}' cannot mix versioned and unversioned entries")]
    MixedVersioning { kind: ArtifactKind, name: String },

    #[error("{kind} '{name}' already exists")]
    DuplicateArtifact { kind: ArtifactKind, name: String },

    #[error("{kind} '{name}' not found")]
    ArtifactNotFound { kind: ArtifactKind, name: String },

    // Archetypes and libraries
    #[error("archetype '{archetype}' references unknown {kind} '{name}'")]
    UnresolvedReference {
        kind: ArtifactKind,
        name: String,
        archetype: String,
    },

    #[error("archetype '{0}' already exists")]
    DuplicateArchetype(String),

    #[error("archetype override '{name}' is based on archetype '{base}', which does not exist")]
    BaseNotFound { name: String, base: String },

    #[error("archetype override '{0}' collides with an existing archetype")]
    NameCollision(String),

    #[error("archetype '{0}' not found")]
    ArchetypeNotFound(String),

    #[error("architecture '{0}' already exists")]
    DuplicateArchitecture(String),

    #[error("architecture '{0}' not found")]
    ArchitectureNotFound(String),

    #[error("default policy value '{0}' is declared more than once")]
    DuplicateDefaultValue(String),

    #[error("default policy value '{0}' is not declared by any library")]
    DefaultValueNotFound(String),

    #[error("library '{library}' depends on '{dependency}', which was not supplied")]
    MissingDependency { library: String, dependency: String },

    #[error("library dependencies form a cycle involving '{0}'")]
    DependencyCycle(String),

    // Hierarchy
    #[error("architecture '{0}' has no root management groups")]
    NoRootManagementGroups(String),

    #[error("architecture '{architecture}' has {count} root management groups, only one is supported")]
    MultipleRootsNotSupported { architecture: String, count: usize },

    #[error("management group '{id}' is declared more than once in architecture '{architecture}'")]
    DuplicateManagementGroup { architecture: String, id: String },

    #[error("management group '{id}' has parent '{parent}', which is not declared")]
    InvalidParent { id: String, parent: String },

    #[error("management group '{id}' is marked as existing but its parent '{parent}' is not")]
    ExistenceInconsistency { id: String, parent: String },

    #[error("architecture '{architecture}' exceeds the maximum management group depth of {max_depth}")]
    RecursionDepthExceeded {
        architecture: String,
        max_depth: usize,
    },

    #[error("management group '{0}' not found")]
    ManagementGroupNotFound(String),

    #[error("policy assignment '{assignment}' not found in management group '{management_group}'")]
    PolicyAssignmentNotFound {
        management_group: String,
        assignment: String,
    },

    // Role assignment inference
    #[error("'{0}' is not a valid resource id")]
    InvalidResourceId(String),

    #[error("policy assignment '{assignment}' references '{id}', which is of unsupported type '{definition_type}'")]
    UnsupportedDefinitionType {
        assignment: String,
        id: String,
        definition_type: String,
    },

    #[error("{kind} '{name}' referenced by policy assignment '{assignment}' not found")]
    DefinitionNotFound {
        kind: ArtifactKind,
        name: String,
        assignment: String,
    },

    #[error("policy definition '{definition}' has no roleDefinitionIds but is assigned with a managed identity by '{assignment}'")]
    NoRoleDefinitionIds {
        definition: String,
        assignment: String,
    },

    #[error("policy rule of definition '{definition}' cannot be read: {reason}")]
    InvalidPolicyRule { definition: String, reason: String },

    #[error("value '{value}' of parameter '{parameter}' in policy set definition '{set_definition}' is not a [parameters('name')] reference")]
    NotAParameterReference {
        set_definition: String,
        parameter: String,
        value: String,
    },

    #[error("parameter '{parameter}' needed by policy assignment '{assignment}' has no value")]
    MissingParameter {
        parameter: String,
        assignment: String,
    },

    // Built-in definition source
    #[error("failed to fetch built-in definition '{id}': {message}")]
    BuiltInFetch { id: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = AlzError> = core::result::Result<T, E>;
