use super::features::FeatureVector;
use super::governance::FeedbackSample;
use crate::error::{DeliveryError, ScoringError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Probability-of-match classifier. May fail or hang; callers go through
/// the circuit breaker.
#[async_trait]
pub trait MatchScorer: Send + Sync {
    /// Probability in `[0, 1]` that the pair is the same transaction.
    async fn predict_probability(&self, features: &FeatureVector) -> Result<f64, ScoringError>;
}

/// Unsupervised anomaly detector, fitted per batch run.
pub trait AnomalyDetector: Send + Sync {
    /// Returns `None` when there is nothing to learn from.
    fn train(&self, samples: &[Vec<f64>]) -> Option<Box<dyn AnomalyModel>>;
}

pub trait AnomalyModel: Send + Sync {
    /// Decision-function style score: lower is more anomalous, roughly `[-0.5, 0.5]`.
    fn decision_function(&self, sample: &[f64]) -> f64;
}

/// Structured audit entry.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub component: String,
    pub action: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

/// Fire-and-forget audit destination.
pub trait AuditSink: Send + Sync {
    fn log_event(&self, entry: &AuditEntry) -> Result<(), DeliveryError>;
}

/// Downstream retraining pipeline fed by the active learner.
#[async_trait]
pub trait RetrainingHook: Send + Sync {
    async fn trigger(&self, batch: &[FeedbackSample]) -> Result<(), DeliveryError>;
}

pub type MatchScorerRef = Arc<dyn MatchScorer>;
pub type AnomalyDetectorRef = Arc<dyn AnomalyDetector>;
pub type AuditSinkRef = Arc<dyn AuditSink>;
pub type RetrainingHookRef = Arc<dyn RetrainingHook>;
