// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::{AlzError, ArtifactKind, Result};

use core::fmt;
use std::collections::BTreeMap;

use log::warn;
use semver::{Version, VersionReq};

/// An artifact that may exist in several versions under one name.
pub trait Versioned {
    const KIND: ArtifactKind;

    fn name(&self) -> &str;

    fn version(&self) -> Option<&str>;
}

/// Ordering key of one stored version.
///
/// Unversioned entries sort lowest, then entries whose version does not parse
/// as semver, then semver versions by precedence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum VersionKey {
    Unversioned,
    Malformed(String),
    Semver(Version),
}

impl VersionKey {
    fn parse(version: Option<&str>) -> Self {
        match version.map(str::trim) {
            None | Some("") => VersionKey::Unversioned,
            Some(v) => match Version::parse(v) {
                Ok(v) => VersionKey::Semver(v),
                Err(_) => VersionKey::Malformed(v.to_string()),
            },
        }
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionKey::Unversioned => f.write_str("<unversioned>"),
            VersionKey::Malformed(v) => f.write_str(v),
            VersionKey::Semver(v) => write!(f, "{v}"),
        }
    }
}

/// All versions of one policy or policy set definition.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedArtifactCollection<T> {
    name: String,
    versions: BTreeMap<VersionKey, T>,
}

impl<T: Versioned> VersionedArtifactCollection<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    fn is_unversioned(&self) -> bool {
        self.versions.contains_key(&VersionKey::Unversioned)
    }

    /// Insert a version. An existing entry with the same normalized version
    /// is replaced only when `allow_overwrite` is set.
    pub fn add(&mut self, artifact: T, allow_overwrite: bool) -> Result<()> {
        let key = VersionKey::parse(artifact.version());

        if !self.versions.is_empty()
            && (key == VersionKey::Unversioned) != self.is_unversioned()
        {
            return Err(AlzError::MixedVersioning {
                kind: T::KIND,
                name: self.name.clone(),
            });
        }

        if self.versions.contains_key(&key) && !allow_overwrite {
            return Err(AlzError::DuplicateVersion {
                kind: T::KIND,
                name: self.name.clone(),
                version: key.to_string(),
            });
        }

        self.versions.insert(key, artifact);
        Ok(())
    }

    /// Select a version.
    ///
    /// `None` selects the highest version. An exact version string selects
    /// that version; any other constraint is read as a semver requirement
    /// (e.g. `1.*.*`) and the highest satisfying version wins.
    pub fn get_version(&self, constraint: Option<&str>) -> Result<&T> {
        let Some(constraint) = constraint.map(str::trim).filter(|c| !c.is_empty()) else {
            return self.latest().ok_or_else(|| self.not_found("latest"));
        };

        if self.is_unversioned() {
            warn!(
                "{} '{}' is unversioned; ignoring version constraint '{constraint}'",
                T::KIND,
                self.name
            );
            return self.latest().ok_or_else(|| self.not_found(constraint));
        }

        if let Ok(exact) = Version::parse(constraint) {
            return self
                .versions
                .get(&VersionKey::Semver(exact))
                .ok_or_else(|| self.not_found(constraint));
        }

        let req = VersionReq::parse(constraint).map_err(|e| AlzError::InvalidVersion {
            kind: T::KIND,
            name: self.name.clone(),
            version: constraint.to_string(),
            reason: e.to_string(),
        })?;

        self.versions
            .iter()
            .rev()
            .find_map(|(key, artifact)| match key {
                VersionKey::Semver(v) if req.matches(v) => Some(artifact),
                _ => None,
            })
            .ok_or_else(|| self.not_found(constraint))
    }

    /// Like [`Self::get_version`], but fails if any stored version string is
    /// not valid semver.
    pub fn get_version_strict(&self, constraint: Option<&str>) -> Result<&T> {
        if let Some(VersionKey::Malformed(version)) = self
            .versions
            .keys()
            .find(|k| matches!(k, VersionKey::Malformed(_)))
        {
            let reason = Version::parse(version)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default();
            return Err(AlzError::InvalidVersion {
                kind: T::KIND,
                name: self.name.clone(),
                version: version.clone(),
                reason,
            });
        }
        self.get_version(constraint)
    }

    /// Highest stored version.
    pub fn latest(&self) -> Option<&T> {
        self.versions.values().next_back()
    }

    /// All versions, lowest first.
    pub fn versions(&self) -> impl Iterator<Item = &T> {
        self.versions.values()
    }

    fn not_found(&self, constraint: &str) -> AlzError {
        AlzError::VersionNotFound {
            kind: T::KIND,
            name: self.name.clone(),
            constraint: constraint.to_string(),
        }
    }
}
