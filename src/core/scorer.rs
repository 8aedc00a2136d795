//! Risk scoring for aggregated flows.
//!
//! Two strategies sit behind [`RiskScorer`]: a model-based scorer that asks a
//! probabilistic classifier for the attack-class probability, and a packet-count
//! heuristic. The model scorer degrades to the heuristic for any window in
//! which the model fails, so callers always get a score per flow.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::aggregator::FlowStat;

/// Errors raised by a probabilistic model
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model artifact could not be read: {0}")]
    Load(#[from] std::io::Error),
    #[error("Model artifact is invalid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Prediction failed: {0}")]
    Prediction(String),
    #[error("Model returned {got} rows for {expected} flows")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Model inputs derived from one flow
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowFeatures {
    pub packet_count: f64,
    /// Always the window length
    pub flow_duration: f64,
    pub mean_packet_length: f64,
}

impl FlowFeatures {
    pub fn from_stat(stat: &FlowStat, window: Duration) -> Self {
        let mean_packet_length = if stat.packet_count == 0 {
            0.0
        } else {
            stat.total_bytes as f64 / stat.packet_count as f64
        };
        Self {
            packet_count: stat.packet_count as f64,
            flow_duration: window.as_secs_f64(),
            mean_packet_length,
        }
    }
}

/// External classifier returning `[p(benign), p(attack)]` per input row.
#[cfg_attr(test, mockall::automock)]
pub trait ProbabilisticModel: Send + Sync {
    fn predict_proba(&self, features: &[FlowFeatures]) -> Result<Vec<[f64; 2]>, ModelError>;
}

/// Scoring strategy: one risk percentage in `[0, 100]` per flow, in input order.
pub trait RiskScorer: Send + Sync {
    fn score(&self, flows: &[FlowStat]) -> Vec<u8>;
}

/// `min(100, round(packet_count * 1.5))`
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn score_one(packet_count: u64) -> u8 {
        (packet_count as f64 * 1.5).round().min(100.0) as u8
    }
}

impl RiskScorer for HeuristicScorer {
    fn score(&self, flows: &[FlowStat]) -> Vec<u8> {
        flows.iter().map(|f| Self::score_one(f.packet_count)).collect()
    }
}

/// Model-preferred scorer with per-call heuristic fallback
pub struct ModelScorer {
    model: Box<dyn ProbabilisticModel>,
    window: Duration,
    fallback: HeuristicScorer,
}

impl ModelScorer {
    pub fn new(model: Box<dyn ProbabilisticModel>, window: Duration) -> Self {
        Self {
            model,
            window,
            fallback: HeuristicScorer,
        }
    }

    fn try_score(&self, flows: &[FlowStat]) -> Result<Vec<u8>, ModelError> {
        let features: Vec<FlowFeatures> = flows
            .iter()
            .map(|f| FlowFeatures::from_stat(f, self.window))
            .collect();
        let probabilities = panic::catch_unwind(AssertUnwindSafe(|| {
            self.model.predict_proba(&features)
        }))
        .map_err(|_| ModelError::Prediction("model panicked during prediction".to_string()))??;

        if probabilities.len() != flows.len() {
            return Err(ModelError::ShapeMismatch {
                expected: flows.len(),
                got: probabilities.len(),
            });
        }

        probabilities
            .iter()
            .map(|row| {
                let attack = row[1];
                if !attack.is_finite() {
                    return Err(ModelError::Prediction(format!("non-finite probability {}", attack)));
                }
                Ok((attack * 100.0).trunc().clamp(0.0, 100.0) as u8)
            })
            .collect()
    }
}

impl RiskScorer for ModelScorer {
    fn score(&self, flows: &[FlowStat]) -> Vec<u8> {
        match self.try_score(flows) {
            Ok(scores) => scores,
            Err(e) => {
                warn!("Model prediction error: {}. Falling back to threshold scoring.", e);
                metrics::increment_counter!("scorer_fallback_total");
                self.fallback.score(flows)
            }
        }
    }
}

/// Logistic regression over the three flow features, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    /// Weights for packet count, flow duration and mean packet length
    pub weights: [f64; 3],
    pub bias: f64,
}

impl LogisticModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl ProbabilisticModel for LogisticModel {
    fn predict_proba(&self, features: &[FlowFeatures]) -> Result<Vec<[f64; 2]>, ModelError> {
        Ok(features
            .iter()
            .map(|x| {
                let z = self.weights[0] * x.packet_count
                    + self.weights[1] * x.flow_duration
                    + self.weights[2] * x.mean_packet_length
                    + self.bias;
                let attack = 1.0 / (1.0 + (-z).exp());
                [1.0 - attack, attack]
            })
            .collect())
    }
}

/// Pick the scoring strategy once at startup.
pub fn select_scorer(model_path: Option<&str>, window: Duration) -> Box<dyn RiskScorer> {
    let Some(path) = model_path else {
        warn!("No model artifact configured. Using simple threshold logic.");
        return Box::new(HeuristicScorer);
    };

    match LogisticModel::load(path) {
        Ok(model) => {
            info!("Model '{}' loaded successfully.", path);
            Box::new(ModelScorer::new(Box::new(model), window))
        }
        Err(e) => {
            warn!("Model '{}' unavailable ({}). Using simple threshold logic.", path, e);
            Box::new(HeuristicScorer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(packets: u64, bytes: u64) -> FlowStat {
        FlowStat {
            source_ip: "10.0.0.1".to_string(),
            packet_count: packets,
            total_bytes: bytes,
            tcp_count: packets,
            udp_count: 0,
            icmp_count: 0,
            other_count: 0,
        }
    }

    #[test]
    fn test_heuristic_formula() {
        assert_eq!(HeuristicScorer::score_one(0), 0);
        assert_eq!(HeuristicScorer::score_one(1), 2);
        assert_eq!(HeuristicScorer::score_one(33), 50);
        assert_eq!(HeuristicScorer::score_one(60), 90);
        assert_eq!(HeuristicScorer::score_one(67), 100);
        assert_eq!(HeuristicScorer::score_one(130), 100);
        assert_eq!(HeuristicScorer::score_one(u64::MAX), 100);
    }

    #[test]
    fn test_heuristic_monotonic() {
        let mut previous = 0;
        for count in 0..500 {
            let score = HeuristicScorer::score_one(count);
            assert!(score >= previous);
            assert!(score <= 100);
            previous = score;
        }
    }

    #[test]
    fn test_model_scores_truncate_attack_probability() {
        let mut model = MockProbabilisticModel::new();
        model
            .expect_predict_proba()
            .withf(|features| features.len() == 2 && features[0].flow_duration == 5.0)
            .returning(|_| Ok(vec![[0.121, 0.879], [0.995, 0.005]]));

        let scorer = ModelScorer::new(Box::new(model), Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(10, 1000), flow(1, 60)]), vec![87, 0]);
    }

    #[test]
    fn test_model_failure_falls_back_to_heuristic() {
        let mut model = MockProbabilisticModel::new();
        model
            .expect_predict_proba()
            .returning(|_| Err(ModelError::Prediction("boom".to_string())));

        let scorer = ModelScorer::new(Box::new(model), Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(130, 120_000), flow(10, 600)]), vec![100, 15]);
    }

    #[test]
    fn test_model_shape_mismatch_falls_back() {
        let mut model = MockProbabilisticModel::new();
        model.expect_predict_proba().returning(|_| Ok(vec![[0.0, 1.0]]));

        let scorer = ModelScorer::new(Box::new(model), Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(2, 100), flow(4, 100)]), vec![3, 6]);
    }

    #[test]
    fn test_model_non_finite_falls_back() {
        let mut model = MockProbabilisticModel::new();
        model.expect_predict_proba().returning(|_| Ok(vec![[0.0, f64::NAN]]));

        let scorer = ModelScorer::new(Box::new(model), Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(20, 100)]), vec![30]);
    }

    struct PanickingModel;

    impl ProbabilisticModel for PanickingModel {
        fn predict_proba(&self, _features: &[FlowFeatures]) -> Result<Vec<[f64; 2]>, ModelError> {
            panic!("corrupt model state");
        }
    }

    #[test]
    fn test_model_panic_falls_back_to_heuristic() {
        let scorer = ModelScorer::new(Box::new(PanickingModel), Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(130, 120_000), flow(10, 600)]), vec![100, 15]);
        // Still usable on the next window
        assert_eq!(scorer.score(&[flow(2, 100)]), vec![3]);
    }

    #[test]
    fn test_fallback_is_per_call() {
        let mut seq = mockall::Sequence::new();
        let mut model = MockProbabilisticModel::new();
        model
            .expect_predict_proba()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ModelError::Prediction("transient".to_string())));
        model
            .expect_predict_proba()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![[0.25, 0.75]]));

        let scorer = ModelScorer::new(Box::new(model), Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(10, 600)]), vec![15]);
        assert_eq!(scorer.score(&[flow(10, 600)]), vec![75]);
    }

    #[test]
    fn test_features_mean_length() {
        let features = FlowFeatures::from_stat(&flow(4, 1000), Duration::from_secs(5));
        assert_eq!(features.mean_packet_length, 250.0);
        assert_eq!(features.packet_count, 4.0);

        let features = FlowFeatures::from_stat(&flow(0, 0), Duration::from_secs(5));
        assert_eq!(features.mean_packet_length, 0.0);
    }

    #[test]
    fn test_logistic_model_from_artifact() {
        let path = std::env::temp_dir().join(format!("model-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{"weights": [0.1, 0.0, 0.0], "bias": -5.0}"#).unwrap();

        let scorer = select_scorer(path.to_str(), Duration::from_secs(5));
        let scores = scorer.score(&[flow(0, 0), flow(100, 6000)]);
        fs::remove_file(&path).unwrap();

        // sigmoid(-5) ~ 0.0067, sigmoid(5) ~ 0.9933
        assert_eq!(scores, vec![0, 99]);
    }

    #[test]
    fn test_missing_artifact_uses_heuristic() {
        let scorer = select_scorer(Some("/nonexistent/model.json"), Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(10, 100)]), vec![15]);

        let scorer = select_scorer(None, Duration::from_secs(5));
        assert_eq!(scorer.score(&[flow(10, 100)]), vec![15]);
    }
}
