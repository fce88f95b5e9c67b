//! Tests for configuration validation

use session_agenda::config::{AgendaConfig, CompositionDescription, Scheduling, UseCaseConfig};
use session_agenda::core::{CardinalityProfile, RunDepth};
use std::time::Duration;

#[test]
fn test_agenda_config_validation() {
    assert!(AgendaConfig::default().validate().is_ok());
    let invalid = AgendaConfig {
        poll_interval: Duration::ZERO,
        ..AgendaConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_agenda_config_json() {
    let cfg = AgendaConfig::from_json_str(
        r#"{ "poll_interval": "1s", "constraint_tolerance": "250ms", "root_profile": "all" }"#,
    )
    .unwrap();
    assert_eq!(cfg.poll_interval, Duration::from_secs(1));
    assert_eq!(cfg.constraint_tolerance, Duration::from_millis(250));
    assert_eq!(cfg.root_profile, CardinalityProfile::All);
    assert!(AgendaConfig::from_json_str(r#"{ "root_profile": "some" }"#).is_err());
}

#[test]
fn test_use_case_config_json() {
    let cfg: UseCaseConfig = serde_json::from_str(
        r#"{
            "name": "batch",
            "type_id": "composite",
            "run_depth": "auto",
            "distributable": { "limited": ["hv=2"] },
            "composition": {
                "scheduling": { "repeat": 2 },
                "daughters": [
                    { "name": "a", "type_id": "lock", "config": { "duration": "5s" } }
                ]
            }
        }"#,
    )
    .unwrap();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.depth(), RunDepth::Auto);
    let composition = cfg.composition.as_ref().unwrap();
    assert_eq!(composition.scheduling, Scheduling::Repeat(2));
    assert_eq!(composition.daughter_names(), vec!["a"]);
    assert_eq!(cfg.distributable.limited, vec!["hv=2".to_string()]);
}

#[test]
fn test_composition_rejects_duplicate_daughters() {
    let composition = CompositionDescription {
        scheduling: Scheduling::Serial,
        daughters: vec![
            UseCaseConfig::new("a", "lock"),
            UseCaseConfig::new("a", "lock"),
        ],
    };
    assert!(composition.validate().is_err());
    assert!(CompositionDescription::default().validate().is_err());
}
