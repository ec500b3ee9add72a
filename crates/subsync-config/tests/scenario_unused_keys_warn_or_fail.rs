use subsync_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigConsumer, UnusedKeyPolicy,
};

const YAML: &str = r#"
vendor:
  base_url: "http://vendor.local"
  timeout_ms: 200
refresh:
  max_concurrent: 4
daemon:
  addr: "0.0.0.0:8899"
legacy:
  approach: 5
"#;

#[test]
fn warn_reports_but_does_not_fail() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert_eq!(report.unused_leaf_pointers, vec!["/legacy/approach".to_string()]);
}

#[test]
fn cli_does_not_consume_daemon_sections() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/daemon/addr".to_string(),
            "/legacy/approach".to_string(),
            "/refresh/max_concurrent".to_string(),
        ]
    );
}

#[test]
fn fail_policy_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err =
        report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail)
            .unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"));
}
