use crate::domain::features::FeatureVector;
use crate::domain::ports::{AnomalyDetector, AnomalyModel, MatchScorer};
use crate::error::ScoringError;
use async_trait::async_trait;

/// Deterministic logistic scorer over the pair features.
///
/// Stands in for a trained classifier: same input, same probability.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicMatchScorer {
    bias: f64,
    weights: [f64; 7],
}

impl Default for HeuristicMatchScorer {
    fn default() -> Self {
        Self {
            bias: -7.0,
            // amount_log_delta, date_delta_days, id ratio, token sort, partial,
            // exact amount, same weekday
            weights: [-1.5, -0.8, 0.06, 0.02, 0.01, 2.5, 0.3],
        }
    }
}

impl HeuristicMatchScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probability(&self, features: &FeatureVector) -> f64 {
        let z = features
            .as_slice()
            .iter()
            .zip(self.weights.iter())
            .fold(self.bias, |acc, (x, w)| acc + x * w);
        1.0 / (1.0 + (-z).exp())
    }
}

#[async_trait]
impl MatchScorer for HeuristicMatchScorer {
    async fn predict_probability(&self, features: &FeatureVector) -> Result<f64, ScoringError> {
        if features.as_slice().iter().any(|x| !x.is_finite()) {
            return Err(ScoringError::InvalidInput(format!(
                "non-finite feature in {:?}",
                features.0
            )));
        }
        Ok(self.probability(features))
    }
}

/// Per-dimension z-score detector. Fitting needs at least one sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZScoreAnomalyDetector;

struct ZScoreModel {
    means: Vec<f64>,
    std_devs: Vec<f64>,
}

const MIN_STD_DEV: f64 = 1e-6;
/// A deviation of this many standard deviations maps to the most anomalous score.
const SATURATION_Z: f64 = 4.0;

impl AnomalyDetector for ZScoreAnomalyDetector {
    fn train(&self, samples: &[Vec<f64>]) -> Option<Box<dyn AnomalyModel>> {
        let dims = samples.first()?.len();
        if dims == 0 || samples.iter().any(|s| s.len() != dims) {
            return None;
        }

        let n = samples.len() as f64;
        let means: Vec<f64> = (0..dims)
            .map(|d| samples.iter().map(|s| s[d]).sum::<f64>() / n)
            .collect();
        let std_devs = (0..dims)
            .map(|d| {
                let variance = samples.iter().map(|s| (s[d] - means[d]).powi(2)).sum::<f64>() / n;
                variance.sqrt().max(MIN_STD_DEV)
            })
            .collect();

        tracing::debug!(samples = samples.len(), dims, "anomaly detector trained");
        Some(Box::new(ZScoreModel { means, std_devs }))
    }
}

impl AnomalyModel for ZScoreModel {
    fn decision_function(&self, sample: &[f64]) -> f64 {
        let z = sample
            .iter()
            .zip(self.means.iter().zip(self.std_devs.iter()))
            .map(|(x, (mean, std))| ((x - mean) / std).abs())
            .fold(0.0, f64::max);
        0.5 - (z / SATURATION_Z).min(1.0)
    }
}
