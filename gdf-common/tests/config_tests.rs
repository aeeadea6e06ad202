//! Configuration loading and root folder resolution tests
//!
//! Tests that manipulate GDF_ROOT_FOLDER or GDF_ROOT are marked #[serial]
//! so they never race on process environment.

use gdf_common::config::{
    load_or_default, load_toml_config, write_toml_config, AdminEntry, CompiledDefaults,
    QuotaConfig, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_root_env() {
    env::remove_var("GDF_ROOT_FOLDER");
    env::remove_var("GDF_ROOT");
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    clear_root_env();

    let root_folder = RootFolderResolver::new("test-module").resolve();

    assert!(!root_folder.as_os_str().is_empty());
    assert_eq!(root_folder, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_env_var_takes_precedence_over_toml() {
    clear_root_env();
    env::set_var("GDF_ROOT_FOLDER", "/tmp/gdf-env-root");

    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/tmp/gdf-toml-root")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/gdf-env-root"));
    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_primary_env_var_beats_alternate() {
    clear_root_env();
    env::set_var("GDF_ROOT_FOLDER", "/tmp/gdf-priority-1");
    env::set_var("GDF_ROOT", "/tmp/gdf-priority-2");

    let root_folder = RootFolderResolver::new("test-module").resolve();

    assert_eq!(root_folder, PathBuf::from("/tmp/gdf-priority-1"));
    clear_root_env();
}

#[test]
#[serial]
fn test_resolver_uses_toml_root_without_env() {
    clear_root_env();

    let root_folder = RootFolderResolver::new("test-module")
        .with_toml_root(Some(PathBuf::from("/srv/gdf")))
        .resolve();

    assert_eq!(root_folder, PathBuf::from("/srv/gdf"));
}

#[test]
fn test_initializer_creates_missing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("gdf");

    let initializer = RootFolderInitializer::new(root.clone());
    initializer.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(initializer.database_path(), root.join("gdf.db"));
}

#[test]
fn test_write_then_load_preserves_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("gdf-profile.toml");

    let config = TomlConfig {
        port: Some(6001),
        quota: QuotaConfig {
            standard_limit: 20,
            ..QuotaConfig::default()
        },
        admins: vec![AdminEntry {
            email: "owner@example.com".to_string(),
            viht_id: "VIHT-ADMIN-0001".to_string(),
        }],
        ..TomlConfig::default()
    };

    write_toml_config(&config, &path).unwrap();
    let loaded = load_toml_config(&path).unwrap();

    assert_eq!(loaded, config);
}

#[test]
fn test_malformed_toml_degrades_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number").unwrap();

    assert!(load_toml_config(&path).is_err());
    assert_eq!(load_or_default(Some(&path)), TomlConfig::default());
}
