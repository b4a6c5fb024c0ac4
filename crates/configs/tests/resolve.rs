use std::io::Write;

use configs::{ConfigHandle, ConfigTree};
use serde_json::json;
use tempfile::NamedTempFile;

fn write_toml(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn env_object_is_deep_merged_into_file_section() {
    let file = write_toml("[redis]\nhost = \"localhost\"\nport = 6379\n");
    let tree = ConfigTree::load_with_env(file.path(), vars(&[("REDIS", r#"{"host":"cache.internal"}"#)]))
        .expect("resolve");
    assert_eq!(tree.lookup("redis.host"), Some(&json!("cache.internal")));
    assert_eq!(tree.lookup("redis.port"), Some(&json!(6379)));
}

#[test]
fn missing_file_yields_empty_tree() {
    let tree = ConfigTree::load_with_env("/definitely/not/here/env.toml", vars(&[("REDIS", "{}")]))
        .expect("missing file is not an error");
    assert!(tree.is_empty());
}

#[test]
fn mixed_case_file_keys_resolve_under_any_casing() {
    let file = write_toml("Token = \"s3cret\"\n[Postgres]\nHost = \"db\"\n");
    let tree = ConfigTree::load_with_env(file.path(), Vec::new()).expect("resolve");
    for key in ["Token", "TOKEN", "token"] {
        assert_eq!(tree.find_str(key), Some("s3cret"));
    }
    assert_eq!(tree.lookup("POSTGRES.HOST"), Some(&json!("db")));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let file = write_toml("this is = = not toml");
    assert!(matches!(
        ConfigTree::load_with_env(file.path(), Vec::new()),
        Err(configs::ConfigError::Parse { .. })
    ));
}

#[test]
fn same_inputs_resolve_identically() {
    let file = write_toml("token = \"a\"\n[aws]\nregion = \"us-east-1\"\n");
    let env = vars(&[("AWS", r#"{"profile":"ops"}"#), ("TOKEN", "b")]);
    let first = ConfigTree::load_with_env(file.path(), env.clone()).unwrap();
    let second = ConfigTree::load_with_env(file.path(), env).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.lookup("aws.region"), Some(&json!("us-east-1")));
    assert_eq!(first.lookup("aws.profile"), Some(&json!("ops")));
}

#[test]
fn handle_reload_replaces_tree_from_disk() {
    let file = write_toml("token = \"before\"\n");
    let handle = ConfigHandle::load(file.path()).expect("load");
    std::fs::write(file.path(), "token = \"after\"\n").expect("rewrite");
    handle.reload(file.path()).expect("reload");
    assert_eq!(handle.current().find_str("token"), Some("after"));
}
