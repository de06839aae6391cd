//! Turning logits into class decisions.

use candle_core::{Tensor, D};
use candle_nn::ops::{log_softmax, softmax};

use crate::error::ModelError;

/// Label sets used by the CT/CXR COVID-19 datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassScheme {
    /// `0`: non-COVID, `1`: COVID-19.
    Binary,
    /// `0`: normal, `1`: pneumonia, `2`: COVID-19.
    ThreeClass,
}

impl ClassScheme {
    pub fn from_num_classes(num_classes: usize) -> Option<Self> {
        match num_classes {
            2 => Some(Self::Binary),
            3 => Some(Self::ThreeClass),
            _ => None,
        }
    }

    pub fn num_classes(self) -> usize {
        self.labels().len()
    }

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Self::Binary => &["non-covid", "covid-19"],
            Self::ThreeClass => &["normal", "pneumonia", "covid-19"],
        }
    }

    pub fn label(self, class: u32) -> Option<&'static str> {
        self.labels().get(class as usize).copied()
    }

    /// Maps a three-class label onto this scheme.
    ///
    /// For [`ClassScheme::Binary`] only COVID-19 stays positive; normal and
    /// pneumonia both become non-COVID.
    pub fn from_three_class(self, label: u32) -> Option<u32> {
        match (self, label) {
            (_, label) if label > 2 => None,
            (Self::ThreeClass, label) => Some(label),
            (Self::Binary, 2) => Some(1),
            (Self::Binary, _) => Some(0),
        }
    }
}

/// Log-probabilities over the last axis.
pub fn log_probabilities(logits: &Tensor) -> Result<Tensor, ModelError> {
    Ok(log_softmax(logits, D::Minus1)?)
}

/// Probabilities over the last axis.
pub fn probabilities(logits: &Tensor) -> Result<Tensor, ModelError> {
    Ok(softmax(logits, D::Minus1)?)
}

/// Most likely class per row of `(batch, num_classes)` logits.
pub fn predict(logits: &Tensor) -> Result<Vec<u32>, ModelError> {
    if logits.rank() != 2 {
        return Err(ModelError::shape(format!(
            "predictions expect (batch, num_classes) logits, got {:?}",
            logits.dims()
        )));
    }
    Ok(log_probabilities(logits)?
        .argmax(D::Minus1)?
        .to_vec1::<u32>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn predictions_pick_the_largest_logit() -> Result<(), ModelError> {
        let logits = Tensor::from_slice(
            &[0.1f32, 2.0, -1.0, 5.0, 4.0, 4.5],
            (2, 3),
            &Device::Cpu,
        )?;
        assert_eq!(predict(&logits)?, vec![1, 0]);

        let probs = probabilities(&logits)?.sum(1)?.to_vec1::<f32>()?;
        assert!(probs.iter().all(|p| (p - 1.0).abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn binary_scheme_keeps_only_covid_positive() {
        let scheme = ClassScheme::Binary;
        assert_eq!(scheme.from_three_class(0), Some(0));
        assert_eq!(scheme.from_three_class(1), Some(0));
        assert_eq!(scheme.from_three_class(2), Some(1));
        assert_eq!(scheme.from_three_class(3), None);
        assert_eq!(scheme.label(1), Some("covid-19"));
        assert_eq!(ClassScheme::from_num_classes(3), Some(ClassScheme::ThreeClass));
        assert_eq!(ClassScheme::from_num_classes(4), None);
    }
}
