use super::breaker::{CallOutcome, CircuitBreaker, Unavailability};
use crate::config::EngineConfig;
use crate::domain::features::FeatureVector;
use crate::domain::ports::MatchScorerRef;
use crate::error::ScoringError;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bounded, breaker-protected access to the match scorer.
///
/// Cloning shares the breaker and the worker slots, so every clone counts
/// against the same failure budget.
#[derive(Clone)]
pub struct ScoringGateway {
    scorer: MatchScorerRef,
    breaker: Arc<CircuitBreaker>,
    slots: Arc<Semaphore>,
}

impl ScoringGateway {
    pub fn new(scorer: MatchScorerRef, breaker: Arc<CircuitBreaker>, max_concurrent: usize) -> Self {
        Self {
            scorer,
            breaker,
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// A gateway with its own breaker, configured from `config`.
    pub fn from_config(scorer: MatchScorerRef, config: &EngineConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::from_config("match-scorer", &config.breaker));
        Self::new(scorer, breaker, config.scoring.max_concurrent_calls)
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Probability of match, or why none is available.
    pub async fn score(&self, features: &FeatureVector) -> CallOutcome<f64> {
        let permit =
            match tokio::time::timeout(self.breaker.call_timeout(), self.slots.acquire()).await {
                Ok(Ok(permit)) => permit,
                _ => return CallOutcome::Unavailable(Unavailability::Saturated),
            };

        let scorer = Arc::clone(&self.scorer);
        let outcome = self
            .breaker
            .call(move || async move {
                let probability = scorer.predict_probability(features).await?;
                if probability.is_finite() && (0.0..=1.0).contains(&probability) {
                    Ok(probability)
                } else {
                    Err(ScoringError::Unavailable(format!(
                        "probability {probability} outside [0, 1]"
                    )))
                }
            })
            .await;
        drop(permit);
        outcome
    }
}
