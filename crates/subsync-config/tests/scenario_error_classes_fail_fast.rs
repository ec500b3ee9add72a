use subsync_config::load_layered_yaml_from_strings;

#[test]
fn two_kinds_on_one_status_fail_at_load() {
    let yaml = r#"
errors:
  status_classes:
    forbidden: 404
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = loaded.sync_config().unwrap_err();
    let chain = format!("{err:#}");
    assert!(chain.contains("duplicate handler for vendor status 404"), "{chain}");
}

#[test]
fn message_override_for_unknown_kind_fails_at_load() {
    let yaml = r#"
errors:
  messages:
    teapot: "I am a teapot"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    assert!(loaded.sync_config().is_err());
}

#[test]
fn message_override_is_used() {
    let yaml = r#"
errors:
  messages:
    not-found: "Nobody called {customerId}"
"#;
    let cfg = load_layered_yaml_from_strings(&[yaml])
        .unwrap()
        .sync_config()
        .unwrap();
    let catalog = cfg.catalog().unwrap();
    let params = [("customerId".to_string(), "U1".to_string())].into_iter().collect();
    assert_eq!(
        catalog.render(subsync_errors::ErrorKind::NotFound, &params),
        "Nobody called U1"
    );
}
