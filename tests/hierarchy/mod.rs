// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::common::*;
use alzlib::*;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use test_generator::test_resources;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    #[serde(default)]
    archetypes: Vec<ArchetypeDefinition>,
    management_groups: Vec<ManagementGroupDescriptor>,
    max_depth: Option<usize>,
    single_root: Option<bool>,
    want_roots: Option<Vec<String>>,
    want_children: Option<BTreeMap<String, Vec<String>>>,
    want_parents: Option<BTreeMap<String, String>>,
    want_error: Option<String>,
    skip: Option<bool>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn build_case(case: &TestCase) -> Result<Hierarchy, AlzError> {
    let mut options = AlzLibOptions::default();
    if let Some(max_depth) = case.max_depth {
        options.max_depth = max_depth;
    }
    if let Some(single_root) = case.single_root {
        options.single_root = single_root;
    }
    let lib = AlzLib::new(options)?;

    let mut library = LibraryContents::default();
    library.metadata.name = "test".to_string();
    library.archetypes = case.archetypes.clone();
    library.architectures = vec![Architecture {
        name: "test".to_string(),
        management_groups: case.management_groups.clone(),
    }];
    lib.init(vec![library])?;

    lib.build_hierarchy(&request("test"))
}

fn check(case: &TestCase, h: &Hierarchy) -> Result<()> {
    if let Some(roots) = &case.want_roots {
        let actual: Vec<String> = h.roots().map(|mg| mg.id().to_string()).collect();
        if &actual != roots {
            bail!("roots: want {roots:?}, got {actual:?}");
        }
    }
    if let Some(children) = &case.want_children {
        for (id, want) in children {
            let Some(mg) = h.management_group(id) else {
                bail!("management group {id} missing");
            };
            let actual: Vec<String> = mg.children().map(str::to_string).collect();
            if &actual != want {
                bail!("children of {id}: want {want:?}, got {actual:?}");
            }
        }
    }
    if let Some(parents) = &case.want_parents {
        for (id, want) in parents {
            let Some(mg) = h.management_group(id) else {
                bail!("management group {id} missing");
            };
            if mg.parent().id() != want {
                bail!("parent of {id}: want {want}, got {:?}", mg.parent());
            }
        }
    }
    Ok(())
}

fn yaml_test_impl(file: &str) -> Result<()> {
    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    std::eprintln!("running {file}");

    for case in test.cases {
        std::print!("case {} ", case.note);
        if case.skip == Some(true) {
            std::println!("skipped");
            continue;
        }

        match (build_case(&case), &case.want_error) {
            (Ok(h), None) => check(&case, &h)?,
            (Err(actual), Some(expected)) => {
                if !actual.to_string().contains(expected.as_str()) {
                    bail!("`{actual}` does not contain `{expected}`");
                }
            }
            (Ok(_), Some(expected)) => bail!("expected error `{expected}`, build succeeded"),
            (Err(actual), None) => bail!("build failed unexpectedly: {actual}"),
        }

        std::println!("passed");
    }

    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{e}");
        }
    }
}

#[test_resources("tests/hierarchy/cases/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}

#[test]
fn resource_ids_follow_owning_groups() -> Result<()> {
    let lib = alzlib_with(vec![library()])?;
    let h = lib.build_hierarchy(&request("alz"))?;

    let alz = h.management_group("alz").unwrap();
    assert_eq!(alz.resource_id(), mg_scope("alz"));
    assert_eq!(
        alz.policy_definition("Deploy-Diagnostics").unwrap().id.as_deref(),
        Some("/providers/Microsoft.Management/managementGroups/alz/providers/Microsoft.Authorization/policyDefinitions/Deploy-Diagnostics")
    );

    let set = alz.policy_set_definition("Deploy-Private-DNS").unwrap();
    for member in set.members() {
        assert!(member
            .policy_definition_id
            .starts_with("/providers/Microsoft.Management/managementGroups/alz/"));
    }

    let lz = h.management_group("landing-zones").unwrap();
    let dns = lz.policy_assignment("Deploy-DNS").unwrap();
    assert_eq!(
        dns.id.as_deref(),
        Some("/providers/Microsoft.Management/managementGroups/landing-zones/providers/Microsoft.Authorization/policyAssignments/Deploy-DNS")
    );
    assert_eq!(dns.properties.scope.as_deref(), Some(mg_scope("landing-zones").as_str()));
    // The set is owned by the parent group.
    assert_eq!(
        dns.properties.policy_definition_id,
        "/providers/Microsoft.Management/managementGroups/alz/providers/Microsoft.Authorization/policySetDefinitions/Deploy-Private-DNS"
    );
    Ok(())
}

#[test]
fn built_in_references_are_left_alone() -> Result<()> {
    let builtin = "/providers/Microsoft.Authorization/policyDefinitions/0a914e76-4921-4c19-b460-a2d36003525a";
    let mut library = library();
    library.policy_assignments[2].properties.policy_definition_id = builtin.to_string();

    let lib = alzlib_with(vec![library])?;
    let h = lib.build_hierarchy(&request("alz"))?;
    let audit = h
        .management_group("alz")
        .unwrap()
        .policy_assignment("Audit-Location")
        .unwrap();
    assert_eq!(audit.properties.policy_definition_id, builtin);
    Ok(())
}

#[test]
fn role_definitions_are_unique_per_group() -> Result<()> {
    let mut library = library();
    library.archetypes[1]
        .role_definitions
        .insert("Network-Subnet-Contributor".to_string());
    let lib = alzlib_with(vec![library.clone()])?;
    let h = lib.build_hierarchy(&request("alz"))?;

    let role = |mg: &str| {
        h.management_group(mg)
            .unwrap()
            .role_definition("Network-Subnet-Contributor")
            .unwrap()
            .clone()
    };
    let (root, lz) = (role("alz"), role("landing-zones"));
    assert_ne!(root.name, lz.name);
    assert_eq!(root.properties.assignable_scopes, vec![mg_scope("alz")]);
    assert_eq!(
        root.id.as_deref(),
        Some(format!("{}/providers/Microsoft.Authorization/roleDefinitions/{}", mg_scope("alz"), root.name).as_str())
    );

    // Rebuilding gives the same names.
    let again = lib.build_hierarchy(&request("alz"))?;
    let root_again = again
        .management_group("alz")
        .unwrap()
        .role_definition("Network-Subnet-Contributor")
        .unwrap();
    assert_eq!(root_again.name, root.name);

    let options = AlzLibOptions {
        unique_role_definitions: false,
        ..Default::default()
    };
    let shared = AlzLib::new(options)?;
    shared.init(vec![library])?;
    let h = shared.build_hierarchy(&request("alz"))?;
    let name = |mg: &str| {
        h.management_group(mg)
            .unwrap()
            .role_definition("Network-Subnet-Contributor")
            .unwrap()
            .name
            .clone()
    };
    assert_eq!(name("alz"), "00000000-0000-0000-0000-000000000001");
    assert_eq!(name("alz"), name("landing-zones"));
    Ok(())
}

#[test]
fn accessors_are_sorted() -> Result<()> {
    let lib = alzlib_with(vec![library()])?;
    let h = lib.build_hierarchy(&request("alz"))?;

    assert_eq!(h.management_group_ids(), vec!["alz", "corp", "landing-zones"]);
    let alz = h.management_group("alz").unwrap();
    let definitions: Vec<&String> = alz.policy_definitions().map(|(n, _)| n).collect();
    assert_eq!(
        definitions,
        vec!["Audit-Only", "Deploy-DNS-Zone", "Deploy-Diagnostics"]
    );
    assert_eq!(
        alz.parent(),
        &ParentRef::External("tenant-root".to_string())
    );
    Ok(())
}
