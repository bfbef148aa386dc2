//! Counterfactual stress testing.
//!
//! The same ordered event sequence is replayed through a fresh engine for the
//! baseline and for every scenario, and each scenario's committed decisions
//! are compared with the baseline's per transaction id.

use super::audit::AuditTrail;
use super::realtime::RealTimeEngine;
use crate::config::EngineConfig;
use crate::domain::event::EventRecord;
use crate::domain::ports::{AuditSinkRef, MatchScorerRef};
use crate::domain::record::DecisionStatus;
use crate::error::{ReconError, Result};
use rust_decimal_macros::dec;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

pub const BASELINE: &str = "BASELINE";

/// A named full configuration variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    pub config: EngineConfig,
}

impl ScenarioConfig {
    pub fn new(name: &str, config: EngineConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
        }
    }

    /// Tightened amount tolerance and a stricter review band.
    pub fn builtin(baseline: &EngineConfig) -> Vec<Self> {
        let mut tight = baseline.clone();
        tight.tolerance.amount = dec!(0.01);

        let mut strict = baseline.clone();
        strict.thresholds.review = 0.85;

        vec![
            Self::new("HIGH_VOLATILITY_TIGHT_TOLERANCE", tight),
            Self::new("OPS_OVERLOAD_STRICT_REVIEW", strict),
        ]
    }
}

/// A transaction's committed status in one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplayStatus {
    AutoReconciled,
    OpsReview,
    Unmatched,
}

impl From<DecisionStatus> for ReplayStatus {
    fn from(status: DecisionStatus) -> Self {
        match status {
            DecisionStatus::AutoReconciled => ReplayStatus::AutoReconciled,
            DecisionStatus::OpsReview => ReplayStatus::OpsReview,
            DecisionStatus::Exception => ReplayStatus::Unmatched,
        }
    }
}

impl fmt::Display for ReplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayStatus::AutoReconciled => write!(f, "AUTO_RECONCILED"),
            ReplayStatus::OpsReview => write!(f, "OPS_REVIEW"),
            ReplayStatus::Unmatched => write!(f, "UNMATCHED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stability {
    Stable,
    Flipped,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::Stable => write!(f, "STABLE"),
            Stability::Flipped => write!(f, "FLIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilityResult {
    pub scenario: String,
    pub txn_ref_id: String,
    pub baseline_status: ReplayStatus,
    pub scenario_status: ReplayStatus,
    pub stability: Stability,
    /// Score under the scenario; 0 when the scenario left it unmatched.
    pub scenario_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioSummary {
    pub scenario: String,
    pub stable: usize,
    pub flipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StabilityReport {
    pub results: Vec<StabilityResult>,
}

impl StabilityReport {
    /// STABLE/FLIPPED counts per scenario, in first-seen order.
    pub fn summary(&self) -> Vec<ScenarioSummary> {
        let mut summaries: Vec<ScenarioSummary> = Vec::new();
        for result in &self.results {
            let index = match summaries.iter().position(|s| s.scenario == result.scenario) {
                Some(index) => index,
                None => {
                    summaries.push(ScenarioSummary {
                        scenario: result.scenario.clone(),
                        stable: 0,
                        flipped: 0,
                    });
                    summaries.len() - 1
                }
            };
            match result.stability {
                Stability::Stable => summaries[index].stable += 1,
                Stability::Flipped => summaries[index].flipped += 1,
            }
        }
        summaries
    }

    pub fn flipped(&self) -> impl Iterator<Item = &StabilityResult> {
        self.results
            .iter()
            .filter(|r| r.stability == Stability::Flipped)
    }
}

type Decisions = BTreeMap<String, (ReplayStatus, f64)>;

pub struct CounterfactualHarness {
    baseline: EngineConfig,
    scorer: MatchScorerRef,
    sink: AuditSinkRef,
}

impl CounterfactualHarness {
    /// The scorer is shared read-only by every replay; each replay gets its
    /// own engine and circuit breaker.
    pub fn new(baseline: EngineConfig, scorer: MatchScorerRef, sink: AuditSinkRef) -> Self {
        Self {
            baseline,
            scorer,
            sink,
        }
    }

    pub async fn run_simulation(
        &self,
        events: &[EventRecord],
        scenarios: &[ScenarioConfig],
    ) -> Result<StabilityReport> {
        let events = Arc::new(events.to_vec());
        let run_id = uuid::Uuid::new_v4();
        let mut replays = JoinSet::new();

        let runs = std::iter::once((BASELINE.to_string(), self.baseline.clone())).chain(
            scenarios
                .iter()
                .map(|s| (s.name.clone(), s.config.clone())),
        );
        for (index, (name, config)) in runs.enumerate() {
            let trail = AuditTrail::with_run_id(Arc::clone(&self.sink), format!("{run_id}-{name}"));
            let engine = RealTimeEngine::new(&config, Arc::clone(&self.scorer), trail).map_err(
                |e| ReconError::ScenarioError {
                    scenario: name.clone(),
                    reason: e.to_string(),
                },
            )?;
            let events = Arc::clone(&events);
            replays.spawn(async move {
                tracing::info!(scenario = %name, events = events.len(), "replay started");
                let decisions = replay(engine, &events).await;
                (index, name, decisions)
            });
        }

        let mut finished = Vec::with_capacity(scenarios.len() + 1);
        while let Some(joined) = replays.join_next().await {
            let replayed = joined.map_err(|e| ReconError::ScenarioError {
                scenario: "unknown".to_string(),
                reason: e.to_string(),
            })?;
            finished.push(replayed);
        }
        finished.sort_by_key(|(index, _, _)| *index);

        let mut finished = finished.into_iter();
        let Some((_, _, baseline)) = finished.next() else {
            return Ok(StabilityReport::default());
        };
        let results = finished
            .flat_map(|(_, name, decisions)| compare(&name, &baseline, &decisions))
            .collect();
        Ok(StabilityReport { results })
    }
}

async fn replay(mut engine: RealTimeEngine, events: &[EventRecord]) -> Decisions {
    for event in events {
        engine.process_event(event.clone()).await;
    }
    engine
        .matches()
        .iter()
        .map(|m| (m.txn_ref_id.clone(), (m.status.into(), m.score)))
        .collect()
}

fn compare(scenario: &str, baseline: &Decisions, decisions: &Decisions) -> Vec<StabilityResult> {
    let result = |txn_ref_id: &str,
                  baseline_status: ReplayStatus,
                  scenario_status: ReplayStatus,
                  scenario_score: f64| {
        StabilityResult {
            scenario: scenario.to_string(),
            txn_ref_id: txn_ref_id.to_string(),
            baseline_status,
            scenario_status,
            stability: if baseline_status == scenario_status {
                Stability::Stable
            } else {
                Stability::Flipped
            },
            scenario_score,
        }
    };

    let mut results: Vec<StabilityResult> = decisions
        .iter()
        .map(|(id, (status, score))| {
            let base = baseline.get(id).map_or(ReplayStatus::Unmatched, |(s, _)| *s);
            result(id, base, *status, *score)
        })
        .collect();

    results.extend(
        baseline
            .iter()
            .filter(|(id, _)| !decisions.contains_key(*id))
            .map(|(id, (status, _))| result(id, *status, ReplayStatus::Unmatched, 0.0)),
    );
    results
}
