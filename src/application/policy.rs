//! Hybrid rule/ML decision policy.
//!
//! Rules are evaluated in a fixed order for every candidate pair:
//!
//! 1. Hard safety rule: exact amount and near-identical reference.
//! 2. ML auto-match at the cost-derived threshold, unless the pair shares a
//!    reference but breaks the amount/date tolerance.
//! 3. ML review band, which also queues the pair for active learning.
//! 4. Otherwise an exception, including every non-hard-rule pair while the
//!    scorer is unavailable.
//!
//! Only the hard rule ignores the scorer's availability. Tolerance can veto an
//! auto-match but never promotes a pair past the ML bands.

use super::breaker::CallOutcome;
use super::feedback::ActiveLearner;
use super::gateway::ScoringGateway;
use crate::config::{CostConfig, EngineConfig, ThresholdConfig, ToleranceConfig};
use crate::domain::event::TransactionEvent;
use crate::domain::features::{self, FeatureVector};
use crate::domain::governance::{FeedbackLabel, FeedbackSample};
use crate::domain::record::{DecisionStatus, MatchType};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Derives the auto-match threshold from the cost asymmetry between a wrong
/// auto-match and an unnecessary review.
#[derive(Debug, Clone, PartialEq)]
pub struct CostOptimizer {
    false_positive: f64,
    false_negative: f64,
}

impl CostOptimizer {
    pub fn new(cost: &CostConfig) -> Self {
        Self {
            false_positive: cost.false_positive,
            false_negative: cost.false_negative,
        }
    }

    /// Auto-match once `(1 - p) * fp_cost < fn_cost`.
    pub fn optimal_threshold(&self) -> f64 {
        let threshold = 1.0 - self.false_negative / self.false_positive;
        tracing::debug!(threshold, "cost optimizer: auto-match threshold derived");
        threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionMode {
    Ml,
    FallbackRulesOnly,
}

impl fmt::Display for DecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionMode::Ml => write!(f, "ML"),
            DecisionMode::FallbackRulesOnly => write!(f, "FALLBACK_RULES_ONLY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribution {
    pub factor: &'static str,
    pub weight: f64,
}

/// Heuristic per-feature attribution, ordered by absolute weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub rationale: Vec<Attribution>,
    pub decision_score: f64,
    pub mode: DecisionMode,
}

pub fn explain(features: &FeatureVector, score: f64, mode: DecisionMode) -> Explanation {
    let mut rationale = Vec::with_capacity(3);

    if features.exact_amount() {
        rationale.push(Attribution {
            factor: "Amount Exact",
            weight: 0.50,
        });
    } else {
        rationale.push(Attribution {
            factor: "Amount Delta",
            weight: -features.amount_log_delta(),
        });
    }

    if features.date_delta_days() == 0.0 {
        rationale.push(Attribution {
            factor: "Date Exact",
            weight: 0.20,
        });
    } else {
        rationale.push(Attribution {
            factor: "Date Mismatch",
            weight: -0.10 * features.date_delta_days(),
        });
    }

    let id = features.id_similarity_ratio();
    rationale.push(if id > 90.0 {
        Attribution {
            factor: "ID Similarity (High)",
            weight: 0.40,
        }
    } else if id > 70.0 {
        Attribution {
            factor: "ID Similarity (Med)",
            weight: 0.10,
        }
    } else {
        Attribution {
            factor: "ID Similarity (Low)",
            weight: -0.30,
        }
    });

    // Stable sort keeps the fixed factor order on ties.
    rationale.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));

    Explanation {
        rationale,
        decision_score: score,
        mode,
    }
}

/// Outcome of evaluating one candidate pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub status: DecisionStatus,
    pub score: f64,
    pub reason: String,
    pub match_type: MatchType,
    pub features: FeatureVector,
    pub explanation: Explanation,
    /// The scorer was unavailable and the probability was taken as 0.
    pub fallback: bool,
}

pub struct HybridDecisionPolicy {
    gateway: ScoringGateway,
    learner: Arc<ActiveLearner>,
    tolerance: ToleranceConfig,
    thresholds: ThresholdConfig,
    auto_match_threshold: f64,
}

impl HybridDecisionPolicy {
    pub fn new(config: &EngineConfig, gateway: ScoringGateway, learner: Arc<ActiveLearner>) -> Self {
        Self {
            gateway,
            learner,
            tolerance: config.tolerance.clone(),
            thresholds: config.thresholds.clone(),
            auto_match_threshold: CostOptimizer::new(&config.cost).optimal_threshold(),
        }
    }

    pub fn auto_match_threshold(&self) -> f64 {
        self.auto_match_threshold
    }

    pub fn gateway(&self) -> &ScoringGateway {
        &self.gateway
    }

    pub fn learner(&self) -> &Arc<ActiveLearner> {
        &self.learner
    }

    pub async fn evaluate_pair(&self, a: &TransactionEvent, b: &TransactionEvent) -> Decision {
        let features = features::extract(a, b);

        let (probability, fallback) = match self.gateway.score(&features).await {
            CallOutcome::Available(p) => (p, false),
            CallOutcome::Unavailable(why) => {
                tracing::warn!(
                    event = %a.id,
                    candidate = %b.id,
                    reason = %why,
                    "hybrid policy: scorer unavailable, using rules-only fallback"
                );
                (0.0, true)
            }
        };

        let vetoed = self.breaks_tolerance(a, b);
        let (status, score, match_type, reason) = if features.exact_amount()
            && features.id_similarity_ratio() >= self.thresholds.hard_rule_id_similarity
        {
            let mut reason = format!(
                "Hard Rule: Exact Amount + ID >= {}%",
                self.thresholds.hard_rule_id_similarity
            );
            if fallback {
                reason.push_str(" (Fallback Mode)");
            }
            (
                DecisionStatus::AutoReconciled,
                probability.max(0.99),
                MatchType::HybridMl,
                reason,
            )
        } else if !fallback && probability >= self.auto_match_threshold && !vetoed {
            (
                DecisionStatus::AutoReconciled,
                probability,
                MatchType::HybridMl,
                format!(
                    "ML Confidence >= {:.2} (Cost Optimized)",
                    self.auto_match_threshold
                ),
            )
        } else if !fallback && probability >= self.thresholds.review {
            self.learner
                .submit_feedback(FeedbackSample {
                    event_id: a.id.clone(),
                    counterpart_id: Some(b.id.clone()),
                    features: Some(features),
                    label: FeedbackLabel::Pending,
                })
                .await;
            let reason = if vetoed && probability >= self.auto_match_threshold {
                format!(
                    "ML Confidence >= {:.2}, reference outside amount/date tolerance",
                    self.auto_match_threshold
                )
            } else {
                format!("ML Confidence >= {:.2}", self.thresholds.review)
            };
            (DecisionStatus::OpsReview, probability, MatchType::HybridMl, reason)
        } else if fallback {
            (
                DecisionStatus::Exception,
                probability,
                MatchType::HybridMl,
                "ML Unavailable - Rules Failed".to_string(),
            )
        } else {
            (
                DecisionStatus::Exception,
                probability,
                MatchType::HybridMl,
                "Low Confidence".to_string(),
            )
        };

        let mode = if fallback {
            DecisionMode::FallbackRulesOnly
        } else {
            DecisionMode::Ml
        };

        Decision {
            status,
            score,
            reason,
            match_type,
            features,
            explanation: explain(&features, score, mode),
            fallback,
        }
    }

    /// Same reference, but the amount or date drifted past tolerance.
    fn breaks_tolerance(&self, a: &TransactionEvent, b: &TransactionEvent) -> bool {
        a.id == b.id
            && ((a.amount - b.amount).abs() > self.tolerance.amount
                || (a.value_date - b.value_date).num_days().unsigned_abs()
                    > u64::from(self.tolerance.date_days))
    }
}
