// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::archetype::{Archetype, ArchetypeOverride, EMPTY_ARCHETYPE};
use crate::error::{AlzError, ArtifactKind, Result};
use crate::library::Architecture;

use core::fmt;
use std::collections::BTreeMap;

use log::debug;

/// Errors that can occur when interacting with a Registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyExists { name: String, registry: String },
    InvalidName { name: String, registry: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyExists { name, registry } => {
                write!(
                    f,
                    "{registry} registration failed: an item with the name '{name}' is already registered."
                )
            }
            RegistryError::InvalidName { name, registry } => {
                write!(f, "{registry} registration failed: the name '{name}' is invalid (empty or whitespace-only names are not allowed).")
            }
        }
    }
}

impl core::error::Error for RegistryError {}

impl From<RegistryError> for AlzError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::AlreadyExists { name, registry } if registry == ARCHETYPES => {
                AlzError::DuplicateArchetype(name)
            }
            RegistryError::AlreadyExists { name, .. } => AlzError::DuplicateArchitecture(name),
            RegistryError::InvalidName { name, registry } => {
                AlzError::InvalidName { registry, name }
            }
        }
    }
}

/// Validates that a name is not empty or whitespace-only.
pub fn validate_name(name: &str, registry_name: &str) -> Result<(), RegistryError> {
    if name.trim().is_empty() {
        Err(RegistryError::InvalidName {
            name: name.to_string(),
            registry: registry_name.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Named items, iterated in name order.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    inner: BTreeMap<String, T>,
    name: &'static str,
}

impl<T> Registry<T> {
    /// Create a new, empty registry with a given name.
    pub fn new(registry_name: &'static str) -> Self {
        Self {
            inner: BTreeMap::new(),
            name: registry_name,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Register an item with a given name. Returns Err if name already exists.
    pub fn register(&mut self, name: impl Into<String>, item: T) -> Result<(), RegistryError> {
        let name = name.into();
        validate_name(&name, self.name)?;

        use std::collections::btree_map::Entry;
        match self.inner.entry(name) {
            Entry::Occupied(e) => Err(RegistryError::AlreadyExists {
                name: e.key().clone(),
                registry: self.name.to_string(),
            }),
            Entry::Vacant(e) => {
                e.insert(item);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.inner.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.inner.iter()
    }
}

const ARCHETYPES: &str = "archetypes";
const ARCHITECTURES: &str = "architectures";

/// Registry of architectures, keyed by architecture name.
pub type ArchitectureRegistry = Registry<Architecture>;

impl Default for ArchitectureRegistry {
    fn default() -> Self {
        Registry::new(ARCHITECTURES)
    }
}

/// Validated archetypes.
///
/// Archetypes are only registered once every artifact they reference is
/// known, so a registered archetype always resolves.
#[derive(Debug, Clone)]
pub struct ArchetypeRegistry {
    archetypes: Registry<Archetype>,
    empty: Archetype,
}

impl Default for ArchetypeRegistry {
    fn default() -> Self {
        Self {
            archetypes: Registry::new(ARCHETYPES),
            empty: Archetype::new(EMPTY_ARCHETYPE),
        }
    }
}

impl ArchetypeRegistry {
    /// Look up an archetype. The empty archetype is always available.
    pub fn get(&self, name: &str) -> Option<&Archetype> {
        match self.archetypes.get(name) {
            Some(a) => Some(a),
            None if name == EMPTY_ARCHETYPE => Some(&self.empty),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.archetypes.list_names()
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Validate and register library-declared archetypes.
    ///
    /// Each archetype is registered only if all its references resolve;
    /// archetypes earlier in `archetypes` stay registered when a later one
    /// fails.
    pub fn generate<F>(&mut self, archetypes: Vec<Archetype>, exists: F) -> Result<()>
    where
        F: Fn(ArtifactKind, &str) -> bool,
    {
        for archetype in archetypes {
            if self.archetypes.contains(archetype.name()) {
                return Err(AlzError::DuplicateArchetype(archetype.name().to_string()));
            }
            check_references(&archetype, &exists)?;
            debug!("registering archetype '{}'", archetype.name());
            self.archetypes
                .register(archetype.name().to_string(), archetype)?;
        }
        Ok(())
    }

    /// Validate and register archetype overrides. Bases must already be
    /// registered, so this runs after [`Self::generate`].
    pub fn generate_overrides<F>(&mut self, overrides: Vec<ArchetypeOverride>, exists: F) -> Result<()>
    where
        F: Fn(ArtifactKind, &str) -> bool,
    {
        for o in overrides {
            if self.contains(&o.name) {
                return Err(AlzError::NameCollision(o.name));
            }
            let Some(base) = self.get(&o.base_archetype) else {
                return Err(AlzError::BaseNotFound {
                    name: o.name,
                    base: o.base_archetype,
                });
            };
            let composed = base.compose(o.name.as_str(), &o.add, &o.remove);

            check_references(&Archetype::with_sets(o.name.as_str(), o.add), &exists)?;
            check_references(&Archetype::with_sets(o.name.as_str(), o.remove), &exists)?;

            debug!(
                "registering archetype override '{}' based on '{}'",
                composed.name(),
                o.base_archetype
            );
            self.archetypes
                .register(composed.name().to_string(), composed)?;
        }
        Ok(())
    }
}

fn check_references<F>(archetype: &Archetype, exists: &F) -> Result<()>
where
    F: Fn(ArtifactKind, &str) -> bool,
{
    match archetype
        .sets()
        .references()
        .find(|(kind, name)| !exists(*kind, name))
    {
        Some((kind, name)) => Err(AlzError::UnresolvedReference {
            kind,
            name: name.to_string(),
            archetype: archetype.name().to_string(),
        }),
        None => Ok(()),
    }
}
