use super::*;

#[test]
fn partial_json_keeps_defaults_for_missing_fields() -> Result<()> {
    let config = TrackerConfig::from_json(
        r#"{ "marker_prefix": "data-medieval", "content_ceiling": 10, "sweep": { "class_keywords": ["medieval"] } }"#,
    )?;

    assert_eq!(config.marker_prefix, "data-medieval");
    assert_eq!(config.content_ceiling, 10);
    assert_eq!(config.id_prefix, "theme");
    assert_eq!(config.recheck_delay_ms, 50);
    assert_eq!(config.sweep.class_keywords, vec!["medieval".to_string()]);
    assert_eq!(
        config.sweep.fallback_containers,
        SweepConfig::default().fallback_containers
    );
    assert_eq!(config.modified_attr(), "data-medieval-modified");
    Ok(())
}

#[test]
fn bookkeeping_attributes_need_the_dash_after_the_prefix() {
    let config = TrackerConfig::default();

    assert!(config.is_bookkeeping_attr("data-theme-id"));
    assert!(config.is_bookkeeping_attr(&config.placeholder_attr()));
    assert!(!config.is_bookkeeping_attr("data-theme"));
    assert!(!config.is_bookkeeping_attr("data-themes"));
    assert_eq!(config.bookkeeping_prefix(), "data-theme-");
}

#[test]
fn invalid_inputs_are_config_errors() {
    assert!(matches!(
        TrackerConfig::from_json("{ not json"),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        TrackerConfig::from_json(r#"{ "sweep": { "style_rules": ["(unclosed"] } }"#),
        Err(Error::Config(msg)) if msg.contains("(unclosed")
    ));
    assert!(matches!(
        TrackerConfig::from_json(r#"{ "marker_prefix": "bad prefix" }"#),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        TrackerConfig::from_json(r#"{ "recheck_delay_ms": -1 }"#),
        Err(Error::Config(_))
    ));
}

#[test]
fn config_survives_a_json_round_trip() -> Result<()> {
    let mut config = TrackerConfig::default();
    config.stylesheet_href = "assets/medieval.css".to_string();

    let restored = TrackerConfig::from_json(&config.to_json()?)?;
    assert_eq!(restored, config);
    Ok(())
}

#[test]
fn default_style_rules_compile() -> Result<()> {
    let rules = TrackerConfig::default().compile_style_rules()?;
    assert_eq!(rules.len(), TrackerConfig::default().sweep.style_rules.len());
    Ok(())
}
