//! Engine configuration.
//!
//! Every field defaults to the documented policy, so an empty TOML document
//! (or no file at all) yields a working engine. Scenario variants for stress
//! runs are full copies of this struct with one or more fields perturbed.

use crate::error::{ReconError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Never pair events in different currencies.
    pub currency_strict: bool,
    pub tolerance: ToleranceConfig,
    pub thresholds: ThresholdConfig,
    pub cost: CostConfig,
    pub breaker: BreakerConfig,
    pub scoring: ScoringConfig,
    pub batch: BatchConfig,
    pub drift: DriftConfig,
    pub active_learning: ActiveLearningConfig,
    pub sla: SlaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency_strict: true,
            tolerance: ToleranceConfig::default(),
            thresholds: ThresholdConfig::default(),
            cost: CostConfig::default(),
            breaker: BreakerConfig::default(),
            scoring: ScoringConfig::default(),
            batch: BatchConfig::default(),
            drift: DriftConfig::default(),
            active_learning: ActiveLearningConfig::default(),
            sla: SlaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Largest absolute amount difference still accepted as a match.
    pub amount: Decimal,
    pub date_days: u32,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            amount: dec!(0.05),
            date_days: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub review: f64,
    /// Best candidate probability below this is never committed.
    pub min_consideration: f64,
    pub hard_rule_id_similarity: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            review: 0.70,
            min_consideration: 0.70,
            hard_rule_id_similarity: 95.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Cost of auto-matching two distinct transactions.
    pub false_positive: f64,
    /// Cost of routing a true match to manual review.
    pub false_negative: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            false_positive: 1000.0,
            false_negative: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub call_timeout_ms: u64,
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_ms: 60_000,
            call_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub max_concurrent_calls: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 8,
        }
    }
}

/// Columns usable in the exact-match key tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyColumn {
    TxnRefId,
    Amount,
    ValueDate,
    Currency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub exact_match_columns: Vec<KeyColumn>,
    pub fuzzy_id_threshold: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            exact_match_columns: vec![
                KeyColumn::TxnRefId,
                KeyColumn::Amount,
                KeyColumn::ValueDate,
                KeyColumn::Currency,
            ],
            fuzzy_id_threshold: 85.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub window_size: usize,
    pub baseline_cap: usize,
    /// Relative mean shift that counts as drift.
    pub relative_shift: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            baseline_cap: 1000,
            relative_shift: 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveLearningConfig {
    pub buffer_size: usize,
}

impl Default for ActiveLearningConfig {
    fn default() -> Self {
        Self { buffer_size: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlaConfig {
    /// Local hour of the daily settlement cutoff.
    pub cutoff_hour: u32,
    pub critical_hours: f64,
    pub high_hours: f64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            cutoff_hour: 17,
            critical_hours: 2.0,
            high_hours: 4.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    pub fn validate(&self) -> Result<()> {
        let probability = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ReconError::ConfigError(format!(
                    "{name} must be within [0, 1], got {value}"
                )))
            }
        };
        probability("thresholds.review", self.thresholds.review)?;
        probability("thresholds.min_consideration", self.thresholds.min_consideration)?;
        probability("drift.relative_shift", self.drift.relative_shift)?;

        if !(0.0..=100.0).contains(&self.thresholds.hard_rule_id_similarity)
            || !(0.0..=100.0).contains(&self.batch.fuzzy_id_threshold)
        {
            return Err(ReconError::ConfigError(
                "similarity thresholds must be within [0, 100]".to_string(),
            ));
        }
        if self.tolerance.amount.is_sign_negative() {
            return Err(ReconError::ConfigError(
                "tolerance.amount must not be negative".to_string(),
            ));
        }
        if self.cost.false_positive <= 0.0
            || self.cost.false_negative < 0.0
            || self.cost.false_negative > self.cost.false_positive
        {
            return Err(ReconError::ConfigError(
                "cost requires 0 <= false_negative <= false_positive and false_positive > 0"
                    .to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 || self.breaker.call_timeout_ms == 0 {
            return Err(ReconError::ConfigError(
                "breaker.failure_threshold and breaker.call_timeout_ms must be positive"
                    .to_string(),
            ));
        }
        if self.scoring.max_concurrent_calls == 0 {
            return Err(ReconError::ConfigError(
                "scoring.max_concurrent_calls must be positive".to_string(),
            ));
        }
        if self.batch.exact_match_columns.is_empty() {
            return Err(ReconError::ConfigError(
                "batch.exact_match_columns must name at least one column".to_string(),
            ));
        }
        if self.drift.window_size == 0 || self.active_learning.buffer_size == 0 {
            return Err(ReconError::ConfigError(
                "drift.window_size and active_learning.buffer_size must be positive".to_string(),
            ));
        }
        if self.sla.cutoff_hour > 23 {
            return Err(ReconError::ConfigError(format!(
                "sla.cutoff_hour must be 0-23, got {}",
                self.sla.cutoff_hour
            )));
        }
        Ok(())
    }
}
