//! Inference gateway
//!
//! Wraps the externally-trained classifier behind a narrow trait so the
//! session loop (and tests) never depend on the artifact format. The gateway
//! does no retry or fallback of its own: an inference error propagates to the
//! per-frame boundary, which drops the frame.

use crate::error::{Error, Result};
use crate::features::FEATURE_LEN;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The classifier contract: a 7-wide vector in, a binary label out.
pub trait AkiModel {
    /// Predict the AKI label (1 = positive) for one feature vector.
    fn predict(&self, features: &[f64; FEATURE_LEN]) -> Result<u8>;
}

/// Logistic-regression artifact trained offline and shipped as JSON.
///
/// ```json
/// { "weights": [...7 floats...], "bias": -1.2, "threshold": 0.5 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticModel {
    weights: [f64; FEATURE_LEN],
    bias: f64,
    threshold: f64,
}

impl LogisticModel {
    /// Load the model artifact from the configured path. Done once at
    /// startup; the process keeps a single model for its lifetime.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Model(format!(
                "cannot open model artifact {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let model: LogisticModel = serde_json::from_reader(BufReader::new(file))?;
        model.validate()?;
        Ok(model)
    }

    /// Construct directly (tests).
    #[cfg(test)]
    pub fn new(weights: [f64; FEATURE_LEN], bias: f64, threshold: f64) -> Self {
        Self {
            weights,
            bias,
            threshold,
        }
    }

    fn validate(&self) -> Result<()> {
        let finite = self.weights.iter().all(|w| w.is_finite())
            && self.bias.is_finite()
            && self.threshold.is_finite();
        if !finite {
            return Err(Error::Model("non-finite model parameters".to_string()));
        }
        Ok(())
    }
}

impl AkiModel for LogisticModel {
    fn predict(&self, features: &[f64; FEATURE_LEN]) -> Result<u8> {
        let z: f64 = self
            .weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        let probability = 1.0 / (1.0 + (-z).exp());
        if !probability.is_finite() {
            return Err(Error::Model(format!(
                "non-finite probability for input {:?}",
                features
            )));
        }
        Ok(u8::from(probability > self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_predict_positive_and_negative() {
        // Weight only the newest result; threshold at the 0.5 midpoint means
        // the sign of (r1 - 100) decides the label.
        let model = LogisticModel::new([0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0], -100.0, 0.5);
        let high = [36.0, 0.0, 70.0, 70.0, 70.0, 70.0, 180.0];
        let low = [36.0, 0.0, 70.0, 70.0, 70.0, 70.0, 70.0];
        assert_eq!(model.predict(&high).unwrap(), 1);
        assert_eq!(model.predict(&low).unwrap(), 0);
    }

    #[test]
    fn test_extreme_inputs_stay_finite() {
        let model = LogisticModel::new([1.0; FEATURE_LEN], 0.0, 0.5);
        let huge = [1e300, 1e300, 1e300, 1e300, 1e300, 1e300, 1e300];
        // Sigmoid saturates rather than overflowing
        assert_eq!(model.predict(&huge).unwrap(), 1);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(
            br#"{"weights":[0.0,0.0,0.0,0.0,0.0,0.0,0.05],"bias":-5.0,"threshold":0.5}"#,
        )
        .unwrap();

        let model = LogisticModel::from_file(&path).unwrap();
        assert_eq!(
            model
                .predict(&[36.0, 0.0, 70.0, 70.0, 70.0, 70.0, 200.0])
                .unwrap(),
            1
        );
        assert_eq!(
            model
                .predict(&[36.0, 0.0, 70.0, 70.0, 70.0, 70.0, 70.0])
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_missing_artifact_is_model_error() {
        assert!(matches!(
            LogisticModel::from_file("/nonexistent/model.json"),
            Err(Error::Model(_))
        ));
    }

    #[test]
    fn test_non_finite_parameters_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let mut f = std::fs::File::create(&path).unwrap();
        // JSON has no inf literal; serde_json maps very large exponents to inf
        f.write_all(
            br#"{"weights":[1e999,0.0,0.0,0.0,0.0,0.0,0.0],"bias":0.0,"threshold":0.5}"#,
        )
        .unwrap();
        assert!(LogisticModel::from_file(&path).is_err());
    }
}
