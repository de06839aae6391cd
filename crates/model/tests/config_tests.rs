use std::fs;

use anyhow::Result;
use model::{AggregationKind, ClassifierConfig, GateKind, ModelError};
use tempfile::tempdir;

#[test]
fn defaults_follow_the_ct_sequence_setup() {
    let config = ClassifierConfig::default();
    assert_eq!(config.num_classes, 3);
    assert_eq!(config.sequence.seq_len, 16);
    assert_eq!(config.sequence.hidden_size, 128);
    assert_eq!(config.sequence.aggregation, AggregationKind::Attention);
    assert_eq!(config.sequence.gate, GateKind::FinalHidden);
    assert!(config.validate().is_ok());
}

#[test]
fn toml_sections_override_defaults() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("model.toml");
    fs::write(
        &path,
        r#"
num_classes = 2

[backbone]
stage_channels = [8, 16]

[sequence]
seq_len = 8
hidden_size = 32
aggregation = "flatten"

[init]
weights = "xavier_uniform"
"#,
    )?;

    let config = ClassifierConfig::from_path(&path)?;
    assert_eq!(config.num_classes, 2);
    assert_eq!(config.backbone.stage_channels, vec![8, 16]);
    assert_eq!(config.backbone.input_channels, 3);
    assert_eq!(config.sequence.seq_len, 8);
    assert_eq!(config.sequence.aggregation, AggregationKind::Flatten);
    assert_eq!(config.init.recurrent, "fan_in_uniform");
    Ok(())
}

#[test]
fn json_configs_are_supported() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("model.json");
    fs::write(
        &path,
        r#"{ "sequence": { "gate": "learned", "attention_dim": 64 } }"#,
    )?;
    let config = ClassifierConfig::from_path(&path)?;
    assert_eq!(config.sequence.gate, GateKind::Learned);
    assert_eq!(config.sequence.attention_dim(), 64);
    Ok(())
}

#[test]
fn validation_reports_every_problem() {
    let mut config = ClassifierConfig::default();
    config.num_classes = 1;
    config.backbone.kernel_size = 4;
    config.sequence.attention_dim = Some(32);
    config.init.weights = "orthogonal".into();

    match config.validate() {
        Err(ModelError::Validation(messages)) => {
            assert_eq!(messages.len(), 4, "{messages:?}");
            assert!(messages.iter().any(|m| m.contains("num_classes")));
            assert!(messages.iter().any(|m| m.contains("kernel_size")));
            assert!(messages.iter().any(|m| m.contains("attention_dim")));
            assert!(messages.iter().any(|m| m.contains("orthogonal")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn unknown_extensions_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("model.yaml");
    fs::write(&path, "num_classes: 2")?;
    assert!(matches!(
        ClassifierConfig::from_path(&path),
        Err(ModelError::ConfigFormat(_))
    ));
    Ok(())
}
