//! Split-configuration loading, merging and rewrite tests against real directories.

use assert_fs::prelude::*;
use orgsync_core::{AccountPatch, ConfigError, ConfigWorkspace, FileChange};
use predicates::prelude::*;
use rstest::rstest;

const ROOT: &str = r#"global-options:
  ignored-ous: [Sandbox]
  organization-admin-role: OrgAdmin
organizational-units:
  __LOAD:
    - organizational-units/core.yaml
    - organizational-units/Infra_Net.yaml
mandatory-account-configs:
  master:
    account-name: Management
    email: master@example.com
    ou: core
    landing-zone-account-type: primary
workload-account-configs:
  __LOAD:
    - accounts/dev.yaml
    - accounts/shared.yaml
"#;

const DEV: &str = r#"dev:
  account-name: Dev
  email: dev@example.com
  ou: Infra
  ou-path: Infra/Net
  supported-regions: [ca-central-1]
"#;

const SHARED: &str = r#"dev:
  account-name: Dev
  email: dev@example.com
  ou: Infra
  ou-path: Infra/Net
tools:
  account-name: Tools
  email: tools@example.com
  ou: core
"#;

fn repo() -> assert_fs::TempDir {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    repo.child("config.yaml").write_str(ROOT).expect("root");
    repo.child("organizational-units/core.yaml")
        .write_str("core:\n  scps: [Guardrails]\n")
        .expect("core");
    repo.child("organizational-units/Infra_Net.yaml")
        .write_str("Infra/Net: {}\n")
        .expect("infra");
    repo.child("accounts/dev.yaml").write_str(DEV).expect("dev");
    repo.child("accounts/shared.yaml").write_str(SHARED).expect("shared");
    repo
}

fn put_content<'a>(changes: &'a [FileChange], path: &str) -> &'a str {
    changes
        .iter()
        .find_map(|c| match c {
            FileChange::Put { path: p, content, .. } if p == path => Some(content.as_str()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no put for {path}: {changes:?}"))
}

// ---------------------------------------------------------------------------
// 1. Loading
// ---------------------------------------------------------------------------

#[test]
fn split_sections_merge_in_declaration_order() {
    let repo = repo();
    let ws = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").expect("load");
    let config = ws.merged();

    assert_eq!(
        config.organizational_units.keys().collect::<Vec<_>>(),
        vec!["core", "Infra/Net"]
    );
    assert_eq!(
        config.workload_accounts.keys().collect::<Vec<_>>(),
        vec!["dev", "tools"]
    );
    assert_eq!(config.declared_ou_paths(), vec!["core", "Infra/Net"]);
    assert_eq!(config.global_options.ignored_ous, vec!["Sandbox"]);
    assert!(!ws.has_changes());
}

#[test]
fn missing_load_file_names_the_path() {
    let repo = repo();
    std::fs::remove_file(repo.path().join("accounts/shared.yaml")).expect("rm");
    let err = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("shared.yaml"));
}

#[rstest]
#[case("organizational-units/core.yaml", "core: [unclosed")]
#[case("accounts/dev.yaml", "- a list, not a mapping\n")]
#[case("accounts/dev.yaml", "dev: {account-name: A, email: a@x.io, ou: x}\ndev: {account-name: B, email: b@x.io, ou: x}\n")]
fn malformed_file_is_a_parse_error(#[case] path: &str, #[case] contents: &str) {
    let repo = repo();
    repo.child(path).write_str(contents).expect("overwrite");
    let err = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::ParseYaml { .. }), "got: {err}");
    assert!(err.to_string().contains(path), "must contain file path, got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Account rewrites
// ---------------------------------------------------------------------------

#[test]
fn account_rename_reaches_every_declaring_file() {
    let repo = repo();
    let mut ws = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").expect("load");
    assert_eq!(ws.files_declaring_account("dev"), vec!["accounts/dev.yaml", "accounts/shared.yaml"]);

    let patch = AccountPatch {
        name: Some("Dev Renamed".into()),
        ..AccountPatch::default()
    };
    assert!(ws.update_account("dev", &patch));
    assert!(!ws.update_account("dev", &patch), "second application changes nothing");

    let changes = ws.changes().expect("changes");
    let paths: Vec<&str> = changes.iter().map(FileChange::path).collect();
    assert_eq!(paths, vec!["accounts/dev.yaml", "accounts/shared.yaml"]);
    for path in paths {
        assert!(predicate::str::contains("account-name: Dev Renamed").eval(put_content(&changes, path)));
    }
    assert!(put_content(&changes, "accounts/dev.yaml").contains("supported-regions"));
    assert_eq!(ws.merged().workload_accounts.get("dev").map(|a| a.account_name.as_str()), Some("Dev Renamed"));
}

#[test]
fn suspended_patch_marks_the_entry_deleted() {
    let repo = repo();
    let mut ws = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").expect("load");
    let patch = AccountPatch {
        deleted: Some(true),
        ..AccountPatch::default()
    };
    assert!(ws.update_account("master", &patch));
    let changes = ws.changes().expect("changes");
    assert!(put_content(&changes, "config.yaml").contains("deleted: true"));
    assert!(ws.merged().accounts().all(|a| a.key != "master"));
}

// ---------------------------------------------------------------------------
// 3. OU rewrites
// ---------------------------------------------------------------------------

#[test]
fn ou_rename_relocates_its_file_and_repoints_accounts() {
    let repo = repo();
    let mut ws = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").expect("load");
    assert!(ws.rename_ou("Infra/Net", "Infra/Network").expect("rename"));

    let changes = ws.changes().expect("changes");
    let paths: Vec<&str> = changes.iter().map(FileChange::path).collect();
    assert_eq!(
        paths,
        vec![
            "config.yaml",
            "organizational-units/Infra_Network.yaml",
            "accounts/dev.yaml",
            "accounts/shared.yaml",
            "organizational-units/Infra_Net.yaml",
        ]
    );
    assert!(matches!(changes.last(), Some(FileChange::Delete { previous: Some(_), .. })));

    let root = put_content(&changes, "config.yaml");
    assert!(root.contains("organizational-units/Infra_Network.yaml"));
    assert!(!root.contains("Infra_Net.yaml"));
    assert!(root.contains("organization-admin-role"), "unknown options survive");

    let config = ws.merged();
    assert!(config.organizational_units.contains_key("Infra/Network"));
    let dev = config.workload_accounts.get("dev").expect("dev");
    assert_eq!(dev.ou_path.as_deref(), Some("Infra/Network"));
    assert_eq!(dev.ou, "Infra");
}

#[test]
fn ou_rename_onto_a_declared_key_is_rejected() {
    let repo = repo();
    let mut ws = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").expect("load");
    let err = ws.rename_ou("Infra/Net", "core").unwrap_err();
    assert!(matches!(err, ConfigError::RenameConflict { .. }), "got: {err}");
    assert!(!ws.has_changes());
}

#[test]
fn top_level_rename_rebases_nested_paths() {
    let repo = repo();
    let mut ws = ConfigWorkspace::load_dir_at(repo.path(), "config.yaml").expect("load");
    assert!(ws.rename_ou("Infra", "Platform").expect("rename"));
    let config = ws.merged();
    assert!(config.organizational_units.contains_key("Platform/Net"));
    let dev = config.workload_accounts.get("dev").expect("dev");
    assert_eq!(dev.ou, "Platform");
    assert_eq!(dev.ou_path.as_deref(), Some("Platform/Net"));
}

// ---------------------------------------------------------------------------
// 4. JSON root
// ---------------------------------------------------------------------------

#[test]
fn json_root_is_rewritten_as_json() {
    let repo = assert_fs::TempDir::new().expect("tempdir");
    repo.child("config.json")
        .write_str(
            r#"{
  "organizational-units": { "core": {} },
  "mandatory-account-configs": {
    "sec": { "account-name": "Security", "email": "sec@example.com", "ou": "core" }
  }
}"#,
        )
        .expect("root");
    let mut ws = ConfigWorkspace::load_dir_at(repo.path(), "config.json").expect("load");
    let patch = AccountPatch {
        email: Some("security@example.com".into()),
        ..AccountPatch::default()
    };
    assert!(ws.update_account("sec", &patch));
    let changes = ws.changes().expect("changes");
    let content = put_content(&changes, "config.json");
    assert!(content.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(content).expect("valid json");
    assert_eq!(
        value["mandatory-account-configs"]["sec"]["email"],
        "security@example.com"
    );
}
