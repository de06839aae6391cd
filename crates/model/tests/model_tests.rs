use std::sync::Arc;

use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};
use model::{
    predict, AggregationKind, BackboneConfig, ClassifierConfig, EmbeddingExtractor, GateKind,
    ModelError, SequenceClassifier, SequenceConfig, SliceClassifier, SliceConfig,
};

fn build_config(aggregation: AggregationKind, gate: GateKind) -> ClassifierConfig {
    ClassifierConfig {
        num_classes: 3,
        backbone: BackboneConfig {
            input_channels: 3,
            stage_channels: vec![4, 8],
            kernel_size: 3,
        },
        sequence: SequenceConfig {
            seq_len: 4,
            hidden_size: 6,
            aggregation,
            gate,
            attention_dim: None,
        },
        ..ClassifierConfig::default()
    }
}

fn slices(batch: usize, len: usize) -> Result<Tensor> {
    Ok(Tensor::randn(0f32, 1.0, (batch, len, 16, 16), &Device::Cpu)?)
}

#[test]
fn flatten_model_produces_logits() -> Result<()> {
    let model = SequenceClassifier::new(
        build_config(AggregationKind::Flatten, GateKind::FinalHidden),
        &Device::Cpu,
    )?;
    let output = model.forward_with_attention(&slices(2, 4)?)?;

    assert_eq!(output.logits.dims(), &[2, 3]);
    assert_eq!(output.logits.dtype(), DType::F32);
    assert!(output.slice_weights.is_none());
    Ok(())
}

#[test]
fn flatten_model_rejects_a_different_sequence_length() -> Result<()> {
    let model = SequenceClassifier::new(
        build_config(AggregationKind::Flatten, GateKind::FinalHidden),
        &Device::Cpu,
    )?;
    for len in [3, 5] {
        let err = model.forward(&slices(2, len)?).unwrap_err();
        assert!(
            matches!(err, ModelError::SequenceLength { expected: 4, actual } if actual == len),
            "unexpected error {err}"
        );
    }
    Ok(())
}

#[test]
fn attention_model_accepts_any_length_and_reports_slice_weights() -> Result<()> {
    for gate in [GateKind::FinalHidden, GateKind::Learned] {
        let model =
            SequenceClassifier::new(build_config(AggregationKind::Attention, gate), &Device::Cpu)?;
        for len in [1, 4, 7] {
            let output = model.forward_with_attention(&slices(2, len)?)?;
            assert_eq!(output.logits.dims(), &[2, 3]);

            let weights = output.slice_weights.expect("attention weights");
            assert_eq!(weights.dims(), &[2, len]);
            for row in weights.to_vec2::<f32>()? {
                let total: f32 = row.iter().sum();
                assert!((total - 1.0).abs() < 1e-5);
                assert!(row.iter().all(|w| *w >= 0.0));
            }
        }
    }
    Ok(())
}

#[test]
fn malformed_slice_batches_fail_fast() -> Result<()> {
    let model = SequenceClassifier::new(
        build_config(AggregationKind::Attention, GateKind::FinalHidden),
        &Device::Cpu,
    )?;
    let missing_sequence_axis = Tensor::zeros((2, 16, 16), DType::F32, &Device::Cpu)?;
    assert!(matches!(
        model.forward(&missing_sequence_axis),
        Err(ModelError::Shape(_))
    ));
    Ok(())
}

#[test]
fn flatten_model_reports_a_missing_sequence_axis_as_a_shape_error() -> Result<()> {
    let model = SequenceClassifier::new(
        build_config(AggregationKind::Flatten, GateKind::FinalHidden),
        &Device::Cpu,
    )?;
    let images = Tensor::zeros((2, 16, 16), DType::F32, &Device::Cpu)?;
    let err = model.forward(&images).unwrap_err();
    assert!(matches!(err, ModelError::Shape(_)), "unexpected error {err}");
    Ok(())
}

#[test]
fn predictions_have_one_class_per_scan() -> Result<()> {
    let model = SequenceClassifier::new(
        build_config(AggregationKind::Attention, GateKind::Learned),
        &Device::Cpu,
    )?;
    let classes = predict(&model.forward(&slices(3, 4)?)?)?;
    assert_eq!(classes.len(), 3);
    assert!(classes.iter().all(|c| *c < 3));
    Ok(())
}

#[test]
fn every_parameter_receives_a_gradient() -> Result<()> {
    let model = SequenceClassifier::new(
        build_config(AggregationKind::Attention, GateKind::Learned),
        &Device::Cpu,
    )?;
    let logits = model.forward(&slices(2, 4)?)?;
    let grads = logits.sum_all()?.backward()?;

    let params = model.named_parameters();
    assert!(!params.is_empty());
    for (name, var) in &params {
        assert!(grads.get(var.as_tensor()).is_some(), "no gradient for {name}");
    }
    assert_eq!(
        model.parameter_count(),
        params
            .iter()
            .map(|(_, var)| var.as_tensor().elem_count())
            .sum::<usize>()
    );
    Ok(())
}

/// Embeds each image as its mean intensity repeated twice.
struct MeanIntensity;

impl EmbeddingExtractor for MeanIntensity {
    fn input_channels(&self) -> usize {
        1
    }

    fn embedding_dim(&self) -> usize {
        2
    }

    fn forward(&self, images: &Tensor) -> Result<Tensor, ModelError> {
        let (n, _, _, _) = images.dims4()?;
        let mean = images.flatten_from(1)?.mean_keepdim(1)?;
        Ok(mean.broadcast_as((n, 2))?.contiguous()?)
    }

    fn named_parameters(&self, _scope: &str) -> Vec<(String, Var)> {
        Vec::new()
    }
}

#[test]
fn custom_extractors_plug_into_the_sequence_model() -> Result<()> {
    let model = SequenceClassifier::with_extractor(
        build_config(AggregationKind::Attention, GateKind::FinalHidden),
        Arc::new(MeanIntensity),
        &Device::Cpu,
    )?;
    let output = model.forward_with_attention(&slices(2, 5)?)?;
    assert_eq!(output.logits.dims(), &[2, 3]);
    assert!(model
        .named_parameters()
        .iter()
        .all(|(name, _)| !name.starts_with("backbone")));
    Ok(())
}

#[test]
fn custom_extractors_ignore_the_backbone_section() -> Result<()> {
    let mut config = build_config(AggregationKind::Flatten, GateKind::FinalHidden);
    config.backbone.stage_channels.clear();
    config.backbone.kernel_size = 4;
    assert!(config.validate().is_err());

    let model = SequenceClassifier::with_extractor(config, Arc::new(MeanIntensity), &Device::Cpu)?;
    assert_eq!(model.forward(&slices(1, 4)?)?.dims(), &[1, 3]);
    Ok(())
}

#[test]
fn custom_extractors_still_validate_the_sequence_section() {
    let mut config = build_config(AggregationKind::Attention, GateKind::FinalHidden);
    config.sequence.hidden_size = 0;
    assert!(matches!(
        SequenceClassifier::with_extractor(config, Arc::new(MeanIntensity), &Device::Cpu),
        Err(ModelError::Validation(_))
    ));
}

#[test]
fn slice_classifier_attends_over_the_intermediate_grid() -> Result<()> {
    let mut config = build_config(AggregationKind::Attention, GateKind::FinalHidden);
    config.num_classes = 2;
    let model = SliceClassifier::new(config, &Device::Cpu)?;
    assert_eq!(model.attention_stage(), 0);

    let images = Tensor::randn(0f32, 1.0, (3, 16, 16), &Device::Cpu)?;
    let output = model.forward(&images)?;
    assert_eq!(output.logits.dims(), &[3, 2]);
    // Stage 0 halves 16x16 once.
    assert_eq!(output.attention_map.dims(), &[3, 1, 8, 8]);

    let totals = output.attention_map.flatten_from(1)?.sum(1)?.to_vec1::<f32>()?;
    assert!(totals.iter().all(|t| (t - 1.0).abs() < 1e-5));

    let names: Vec<_> = model.named_parameters().into_iter().map(|(n, _)| n).collect();
    assert!(names.contains(&"attention.proj.weight".to_string()));
    Ok(())
}

#[test]
fn slice_classifier_on_the_last_stage_skips_projection() -> Result<()> {
    let mut config = build_config(AggregationKind::Attention, GateKind::FinalHidden);
    config.slice = SliceConfig {
        attention_stage: Some(1),
    };
    let model = SliceClassifier::new(config, &Device::Cpu)?;
    let output = model.forward(&Tensor::randn(0f32, 1.0, (1, 16, 16), &Device::Cpu)?)?;
    assert_eq!(output.attention_map.dims(), &[1, 1, 4, 4]);
    assert!(model
        .named_parameters()
        .iter()
        .all(|(name, _)| !name.contains("proj")));
    Ok(())
}
