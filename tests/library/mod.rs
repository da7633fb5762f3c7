// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::common::*;
use alzlib::*;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::BTreeMap;

fn versioned(name: &str, version: &str) -> PolicyDefinition {
    serde_json::from_value(json!({
        "name": name,
        "properties": { "version": version, "policyRule": { "then": { "effect": "audit" } } }
    }))
    .unwrap()
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn libraries_load_in_dependency_order() -> Result<()> {
    let mut custom = LibraryContents::default();
    custom.metadata.name = "custom".to_string();
    custom.metadata.dependencies = names(&["alz"]);
    custom.archetype_overrides = serde_json::from_value(json!([{
        "name": "root_custom",
        "base_archetype": "root",
        "policy_assignments_to_remove": ["Audit-Location"],
        "policy_assignments_to_add": ["Deploy-DNS"]
    }]))?;

    let lib = alzlib_with(vec![custom, library()])?;
    let loaded: Vec<_> = lib.libraries().into_iter().map(|l| l.name).collect();
    assert_eq!(loaded, names(&["alz", "custom"]));

    let root_custom = lib.archetype("root_custom")?;
    let expected: std::collections::BTreeSet<_> =
        ["Deploy-DNS", "Deploy-Diag"].iter().map(|s| s.to_string()).collect();
    assert_eq!(root_custom.policy_assignments(), &expected);
    // The base is untouched.
    assert!(lib
        .archetype("root")?
        .policy_assignments()
        .contains("Audit-Location"));
    assert_eq!(
        lib.archetype_names(),
        names(&["landing_zones", "root", "root_custom"])
    );
    Ok(())
}

#[test]
fn unresolved_archetype_reference_is_rejected() -> Result<()> {
    let mut library = library();
    library.archetypes.push(ArchetypeDefinition {
        name: "broken".to_string(),
        policy_assignments: ["Does-Not-Exist".to_string()].into_iter().collect(),
        ..Default::default()
    });

    let lib = AlzLib::new(AlzLibOptions::default())?;
    let err = lib.init(vec![library]).unwrap_err();
    assert_eq!(
        err,
        AlzError::UnresolvedReference {
            kind: ArtifactKind::PolicyAssignment,
            name: "Does-Not-Exist".to_string(),
            archetype: "broken".to_string(),
        }
    );
    // The failing library was not installed at all.
    assert!(lib.archetype("root").is_err());
    assert!(lib.names(ArtifactKind::PolicyDefinition).is_empty());
    Ok(())
}

#[test]
fn duplicate_names_are_rejected_unless_overwrite() -> Result<()> {
    let lib = alzlib_with(vec![library()])?;
    let err = lib
        .add_role_definitions(vec![custom_role()])
        .unwrap_err();
    assert!(matches!(err, AlzError::DuplicateArtifact { .. }));

    let options = AlzLibOptions {
        allow_overwrite: true,
        ..Default::default()
    };
    let lib = AlzLib::new(options)?;
    lib.init(vec![library()])?;
    lib.add_role_definitions(vec![custom_role()])?;
    Ok(())
}

#[test]
fn policy_definitions_resolve_by_version() -> Result<()> {
    let lib = alzlib_with(vec![])?;
    lib.add_policy_definitions(vec![
        versioned("Enforce-TLS", "1.0.0"),
        versioned("Enforce-TLS", "2.0.0"),
        versioned("Enforce-TLS", "1.1.0"),
    ])?;

    let version = |c: Option<&str>| -> Result<Option<String>> {
        Ok(lib.policy_definition("Enforce-TLS", c)?.properties.version)
    };
    assert_eq!(version(None)?.as_deref(), Some("2.0.0"));
    assert_eq!(version(Some("1.*.*"))?.as_deref(), Some("1.1.0"));
    assert!(matches!(
        lib.policy_definition("Enforce-TLS", Some("3.*.*")),
        Err(AlzError::VersionNotFound { .. })
    ));

    // A batch with a duplicate is not applied at all.
    let err = lib
        .add_policy_definitions(vec![
            versioned("Enforce-TLS", "3.0.0"),
            versioned("Enforce-TLS", "1.0.0"),
        ])
        .unwrap_err();
    assert!(matches!(err, AlzError::DuplicateVersion { .. }));
    assert_eq!(version(None)?.as_deref(), Some("2.0.0"));
    Ok(())
}

#[test]
fn options_from_yaml() -> Result<()> {
    let options = AlzLibOptions::from_yaml_str("parallelism: 2\nunique_role_definitions: false\n")?;
    assert_eq!(options.parallelism, 2);
    assert!(!options.unique_role_definitions);
    assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);

    assert!(AlzLibOptions::from_yaml_str("parallelism: 0\n").is_err());
    assert!(AlzLibOptions::from_yaml_str("paralelism: 2\n").is_err());
    Ok(())
}

/// Serves definitions from memory and records what was asked for.
#[derive(Default)]
struct FakeSource {
    policies: BTreeMap<String, PolicyDefinition>,
    sets: BTreeMap<String, PolicySetDefinition>,
    requested: Mutex<Vec<String>>,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl FakeSource {
    fn record(&self, id: &str) {
        let mut requested = self.requested.lock();
        requested.push(id.to_string());
        if let Some((n, token)) = &self.cancel_after {
            if requested.len() >= *n {
                token.cancel();
            }
        }
    }
}

fn last_segment(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or_default()
}

impl BuiltInDefinitionSource for FakeSource {
    fn policy_definition(&self, id: &str, _version: Option<&str>) -> anyhow::Result<PolicyDefinition> {
        self.record(id);
        self.policies
            .get(last_segment(id))
            .cloned()
            .ok_or_else(|| anyhow!("404: {id}"))
    }

    fn policy_set_definition(
        &self,
        id: &str,
        _version: Option<&str>,
    ) -> anyhow::Result<PolicySetDefinition> {
        self.record(id);
        self.sets
            .get(last_segment(id))
            .cloned()
            .ok_or_else(|| anyhow!("404: {id}"))
    }
}

const BUILTIN_SET: &str = "/providers/Microsoft.Authorization/policySetDefinitions/Enforce-Guardrails";
const BUILTIN_MEMBER: &str = "/providers/Microsoft.Authorization/policyDefinitions/Deny-Public-IP";

fn builtin_library() -> LibraryContents {
    let mut library = LibraryContents::default();
    library.metadata.name = "builtins".to_string();
    library.policy_assignments = vec![serde_json::from_value(json!({
        "name": "Enforce-Guardrails",
        "properties": { "policyDefinitionId": BUILTIN_SET }
    }))
    .unwrap()];
    library
}

fn builtin_source() -> FakeSource {
    let set: PolicySetDefinition = serde_json::from_value(json!({
        "name": "Enforce-Guardrails",
        "properties": {
            "policyDefinitions": [{ "policyDefinitionId": BUILTIN_MEMBER }]
        }
    }))
    .unwrap();
    let member = versioned("Deny-Public-IP", "1.0.0");
    FakeSource {
        policies: [("Deny-Public-IP".to_string(), member)].into_iter().collect(),
        sets: [("Enforce-Guardrails".to_string(), set)].into_iter().collect(),
        ..Default::default()
    }
}

#[test]
fn built_in_definitions_are_fetched_with_set_members() -> Result<()> {
    init_logger();
    let lib = alzlib_with(vec![builtin_library()])?;
    let source = builtin_source();

    let added = lib.fetch_built_in_definitions(&source, &CancellationToken::new())?;
    assert_eq!(added, 2);
    assert_eq!(
        source.requested.lock().clone(),
        names(&[BUILTIN_SET, BUILTIN_MEMBER])
    );
    assert!(lib.contains(ArtifactKind::PolicySetDefinition, "Enforce-Guardrails"));
    assert!(lib.contains(ArtifactKind::PolicyDefinition, "Deny-Public-IP"));

    // Nothing is missing any more.
    assert_eq!(
        lib.fetch_built_in_definitions(&source, &CancellationToken::new())?,
        0
    );
    Ok(())
}

#[test]
fn members_of_pinned_older_set_versions_are_fetched() -> Result<()> {
    let old_member = "/providers/Microsoft.Authorization/policyDefinitions/Builtin-Old";
    let set = |version: &str, members: serde_json::Value| -> PolicySetDefinition {
        serde_json::from_value(json!({
            "name": "Versioned-Set",
            "properties": { "version": version, "policyDefinitions": members }
        }))
        .unwrap()
    };

    let mut library = LibraryContents::default();
    library.metadata.name = "versions".to_string();
    library.policy_set_definitions = vec![
        set("1.0.0", json!([{ "policyDefinitionId": old_member }])),
        set("2.0.0", json!([])),
    ];
    library.policy_assignments = vec![serde_json::from_value(json!({
        "name": "Pinned",
        "properties": {
            "policyDefinitionId": "/providers/Microsoft.Authorization/policySetDefinitions/Versioned-Set",
            "definitionVersion": "1.*.*"
        }
    }))?];
    let lib = alzlib_with(vec![library])?;

    let source = FakeSource {
        policies: [("Builtin-Old".to_string(), versioned("Builtin-Old", "1.0.0"))]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    let added = lib.fetch_built_in_definitions(&source, &CancellationToken::new())?;
    assert_eq!(added, 1);
    assert_eq!(source.requested.lock().clone(), names(&[old_member]));
    assert!(lib.contains(ArtifactKind::PolicyDefinition, "Builtin-Old"));
    Ok(())
}

#[test]
fn failed_fetch_merges_nothing() -> Result<()> {
    let lib = alzlib_with(vec![builtin_library()])?;
    let mut source = builtin_source();
    source.policies.clear();

    let err = lib
        .fetch_built_in_definitions(&source, &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, AlzError::BuiltInFetch { id, .. } if id == BUILTIN_MEMBER));
    assert!(!lib.contains(ArtifactKind::PolicySetDefinition, "Enforce-Guardrails"));
    Ok(())
}

#[test]
fn cancelled_fetch_merges_nothing() -> Result<()> {
    let lib = alzlib_with(vec![builtin_library()])?;
    let token = CancellationToken::new();
    let mut source = builtin_source();
    source.cancel_after = Some((1, token.clone()));

    let err = lib.fetch_built_in_definitions(&source, &token).unwrap_err();
    assert_eq!(err, AlzError::Cancelled);
    assert!(!lib.contains(ArtifactKind::PolicySetDefinition, "Enforce-Guardrails"));
    assert_eq!(source.requested.lock().len(), 1);
    Ok(())
}
