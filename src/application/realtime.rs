//! Streaming reconciliation.
//!
//! The engine owns one pending window per source system. Each incoming event
//! is scored against every compatible candidate in the opposite window; the
//! best candidate is consumed if its decision commits a match, otherwise the
//! event waits in its own window. Processing takes `&mut self`, so a window
//! can never be read and mutated by two events at once.

use super::audit::AuditTrail;
use super::feedback::{ActiveLearner, DriftMonitor};
use super::gateway::ScoringGateway;
use super::policy::{Decision, HybridDecisionPolicy};
use super::security::mask_pii;
use super::sla::{SlaPriority, SlaWatchdog};
use crate::config::EngineConfig;
use crate::domain::event::{EventRecord, SourceSystem, TransactionEvent};
use crate::domain::ports::MatchScorerRef;
use crate::domain::record::{ExceptionCode, ExceptionRecord, MatchRecord};
use crate::domain::risk::RiskScorer;
use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Insertion-ordered events from one source awaiting a counterpart.
#[derive(Debug, Default)]
pub struct PendingWindow {
    events: Vec<TransactionEvent>,
}

impl PendingWindow {
    pub fn push(&mut self, event: TransactionEvent) {
        self.events.push(event);
    }

    pub fn take(&mut self, index: usize) -> TransactionEvent {
        self.events.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn drain(&mut self) -> impl Iterator<Item = TransactionEvent> + '_ {
        self.events.drain(..)
    }
}

/// What became of one processed event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Matched(MatchRecord),
    Pending,
    /// Failed boundary validation; recorded as an UNKNOWN exception.
    Rejected(ExceptionRecord),
    Duplicate(ExceptionRecord),
}

/// Event accounting. Once drained, `pending` is zero and
/// `ingested == 2 * matches + exceptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub ingested: usize,
    pub matches: usize,
    pub exceptions: usize,
    pub pending_a: usize,
    pub pending_b: usize,
}

impl EngineSnapshot {
    pub fn pending(&self) -> usize {
        self.pending_a + self.pending_b
    }

    /// Counts are consistent with every ingested event being in exactly one
    /// place. Identity-level accounting needs the records themselves.
    pub fn is_partitioned(&self) -> bool {
        self.ingested == 2 * self.matches + self.exceptions + self.pending()
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub struct RealTimeEngine {
    policy: HybridDecisionPolicy,
    audit: AuditTrail,
    risk: RiskScorer,
    sla: SlaWatchdog,
    clock: fn() -> NaiveDateTime,
    drift: DriftMonitor,
    currency_strict: bool,
    min_consideration: f64,
    pending_a: PendingWindow,
    pending_b: PendingWindow,
    /// Every accepted `(source, id)` for the life of the stream, so memory
    /// grows with stream length like the O(N*M) window scan does. Long-lived
    /// streams should be partitioned (per currency or per day) and each
    /// partition drained and dropped when it closes.
    seen: HashSet<(SourceSystem, String)>,
    matches: Vec<MatchRecord>,
    exceptions: Vec<ExceptionRecord>,
    ingested: usize,
}

impl RealTimeEngine {
    /// Engine with its own circuit breaker and no retraining hook.
    pub fn new(
        config: &EngineConfig,
        scorer: MatchScorerRef,
        audit: AuditTrail,
    ) -> crate::error::Result<Self> {
        let gateway = ScoringGateway::from_config(scorer, config);
        let learner = Arc::new(ActiveLearner::new(
            &config.active_learning,
            None,
            config.breaker.call_timeout(),
        ));
        Self::with_policy(config, HybridDecisionPolicy::new(config, gateway, learner), audit)
    }

    /// Engine around an existing policy, e.g. one sharing a breaker.
    pub fn with_policy(
        config: &EngineConfig,
        policy: HybridDecisionPolicy,
        audit: AuditTrail,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            policy,
            audit,
            risk: RiskScorer::new(),
            sla: SlaWatchdog::new(&config.sla),
            clock: local_now,
            drift: DriftMonitor::new(&config.drift),
            currency_strict: config.currency_strict,
            min_consideration: config.thresholds.min_consideration,
            pending_a: PendingWindow::default(),
            pending_b: PendingWindow::default(),
            seen: HashSet::new(),
            matches: Vec::new(),
            exceptions: Vec::new(),
            ingested: 0,
        })
    }

    /// Replaces the wall clock used for SLA checks.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &HybridDecisionPolicy {
        &self.policy
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn drift_alerts(&self) -> u64 {
        self.drift.alerts()
    }

    pub async fn process_event(&mut self, mut record: EventRecord) -> EventOutcome {
        self.ingested += 1;
        let trace_id = *record.trace_id.get_or_insert_with(Uuid::new_v4);

        if self.sla.check_priority((self.clock)()) == SlaPriority::Critical {
            self.audit.record(
                "SLA_WATCHDOG",
                "ESCALATE",
                &format!("SLA deadline near for {}", record.txn_ref_id),
                json!({ "trace_id": trace_id, "priority": SlaPriority::Critical }),
            );
        }

        let event = match TransactionEvent::try_from(record) {
            Ok(event) => event,
            Err(rejected) => {
                let description = mask_pii(&format!(
                    "rejected event {}: {}",
                    rejected.record.txn_ref_id,
                    rejected.reason()
                ))
                .into_owned();
                tracing::warn!(%trace_id, "{description}");
                self.audit.record(
                    "INGESTION",
                    "REJECT",
                    &description,
                    json!({ "trace_id": trace_id, "missing": rejected.missing }),
                );
                let mut exception = self.risk.classify(
                    &rejected.record.txn_ref_id,
                    rejected.record.source_system,
                    rejected.record.amount.unwrap_or_default(),
                    ExceptionCode::Unknown,
                    description,
                );
                exception.trace_id = Some(trace_id);
                self.exceptions.push(exception.clone());
                return EventOutcome::Rejected(exception);
            }
        };

        if !self.seen.insert((event.source, event.id.clone())) {
            let mut exception = self.risk.classify(
                &event.id,
                Some(event.source),
                event.amount,
                ExceptionCode::Duplicate,
                format!("duplicate event {} from {}", event.id, event.source),
            );
            exception.trace_id = event.trace_id;
            self.audit.record(
                "INGESTION",
                "DUPLICATE",
                &exception.description,
                json!({ "trace_id": trace_id }),
            );
            self.exceptions.push(exception.clone());
            return EventOutcome::Duplicate(exception);
        }

        if let Some(amount) = event.amount.to_f64() {
            self.drift.observe(amount);
        }

        let candidates = match event.source {
            SourceSystem::SourceA => &self.pending_b,
            SourceSystem::SourceB => &self.pending_a,
        };
        let mut best: Option<(usize, Decision)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            if self.currency_strict && candidate.currency != event.currency {
                continue;
            }
            let decision = self.policy.evaluate_pair(&event, candidate).await;
            if best
                .as_ref()
                .is_none_or(|(_, current)| decision.score > current.score)
            {
                best = Some((index, decision));
            }
        }

        if let Some((index, decision)) = best
            && decision.score >= self.min_consideration
            && decision.status.is_match()
        {
            let window = match event.source {
                SourceSystem::SourceA => &mut self.pending_b,
                SourceSystem::SourceB => &mut self.pending_a,
            };
            let counterpart = window.take(index);
            let record = MatchRecord {
                txn_ref_id: event.id.clone(),
                match_ref_id: counterpart.id,
                source: event.source,
                match_source: counterpart.source,
                match_type: decision.match_type,
                score: decision.score,
                status: decision.status,
                reason: decision.reason,
                amount: event.amount,
                value_date: event.value_date,
                features: decision.features,
            };
            tracing::debug!(
                event = %record.txn_ref_id,
                counterpart = %record.match_ref_id,
                status = %record.status,
                score = record.score,
                "real-time engine: match committed"
            );
            self.audit.record(
                "HYBRID_ENGINE",
                "MATCH",
                &format!("Matched {} ({})", record.txn_ref_id, record.reason),
                json!({
                    "trace_id": trace_id,
                    "status": record.status,
                    "prob": record.score,
                    "xai": decision.explanation,
                }),
            );
            self.matches.push(record.clone());
            return EventOutcome::Matched(record);
        }

        match event.source {
            SourceSystem::SourceA => self.pending_a.push(event),
            SourceSystem::SourceB => self.pending_b.push(event),
        }
        EventOutcome::Pending
    }

    /// Empties both windows into HIGH missing-counterpart exceptions.
    /// The new exceptions are also appended to `exceptions()`.
    pub fn drain_pending_as_exceptions(&mut self) -> Vec<ExceptionRecord> {
        let pending: Vec<TransactionEvent> = self
            .pending_a
            .drain()
            .chain(self.pending_b.drain())
            .collect();

        let drained: Vec<ExceptionRecord> = pending
            .into_iter()
            .map(|event| {
                let mut exception = self.risk.classify(
                    &event.id,
                    Some(event.source),
                    event.amount,
                    ExceptionCode::missing_counterpart_of(event.source),
                    "Pending event never matched (time-out)".to_string(),
                );
                exception.trace_id = event.trace_id;
                exception
            })
            .collect();

        if !drained.is_empty() {
            self.audit.record(
                "HYBRID_ENGINE",
                "DRAIN",
                &format!("{} pending event(s) drained as exceptions", drained.len()),
                json!({ "count": drained.len() }),
            );
        }
        self.exceptions.extend(drained.iter().cloned());
        drained
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn exceptions(&self) -> &[ExceptionRecord] {
        &self.exceptions
    }

    pub fn pending(&self, source: SourceSystem) -> &PendingWindow {
        match source {
            SourceSystem::SourceA => &self.pending_a,
            SourceSystem::SourceB => &self.pending_b,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            ingested: self.ingested,
            matches: self.matches.len(),
            exceptions: self.exceptions.len(),
            pending_a: self.pending_a.len(),
            pending_b: self.pending_b.len(),
        }
    }

    pub fn into_results(self) -> (Vec<MatchRecord>, Vec<ExceptionRecord>) {
        (self.matches, self.exceptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::FeatureVector;
    use crate::domain::ports::MatchScorer;
    use crate::domain::record::{DecisionStatus, MatchType, Severity};
    use crate::error::{ReconError, ScoringError};
    use crate::infrastructure::audit::InMemoryAuditSink;
    use crate::infrastructure::scoring::HeuristicMatchScorer;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Fixed(f64);

    #[async_trait]
    impl MatchScorer for Fixed {
        async fn predict_probability(&self, _: &FeatureVector) -> Result<f64, ScoringError> {
            Ok(self.0)
        }
    }

    fn morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn afternoon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn engine(probability: f64) -> (RealTimeEngine, Arc<InMemoryAuditSink>) {
        let sink = Arc::new(InMemoryAuditSink::default());
        let engine = RealTimeEngine::new(
            &EngineConfig::default(),
            Arc::new(Fixed(probability)),
            AuditTrail::new(sink.clone()),
        )
        .unwrap()
        .with_clock(morning);
        (engine, sink)
    }

    fn record(id: &str, source: SourceSystem, amount: Decimal, day: u32) -> EventRecord {
        EventRecord {
            txn_ref_id: id.to_string(),
            source_system: Some(source),
            amount: Some(amount),
            currency: Some("USD".to_string()),
            value_date: NaiveDate::from_ymd_opt(2024, 3, day),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_matching_pair_consumes_candidate() {
        let (mut engine, sink) = engine(0.1);
        let first = engine
            .process_event(record("TXN-1", SourceSystem::SourceA, dec!(50), 4))
            .await;
        assert_eq!(first, EventOutcome::Pending);

        let second = engine
            .process_event(record("TXN-1", SourceSystem::SourceB, dec!(50), 4))
            .await;
        let EventOutcome::Matched(matched) = second else {
            panic!("expected a match, got {second:?}");
        };
        assert_eq!(matched.match_ref_id, "TXN-1");
        assert_eq!(matched.source, SourceSystem::SourceB);
        assert_eq!(matched.status, DecisionStatus::AutoReconciled);
        assert!(engine.pending(SourceSystem::SourceA).is_empty());
        assert!(engine.pending(SourceSystem::SourceB).is_empty());
        assert!(sink.entries().iter().any(|e| e.action == "MATCH"));
    }

    #[tokio::test]
    async fn test_best_candidate_wins() {
        let mut engine = RealTimeEngine::new(
            &EngineConfig::default(),
            Arc::new(HeuristicMatchScorer::new()),
            AuditTrail::new(Arc::new(InMemoryAuditSink::default())),
        )
        .unwrap()
        .with_clock(morning);
        engine
            .process_event(record("REF-A", SourceSystem::SourceA, dec!(40.00), 4))
            .await;
        engine
            .process_event(record("REF-B", SourceSystem::SourceA, dec!(10.02), 4))
            .await;
        let outcome = engine
            .process_event(record("REF-B", SourceSystem::SourceB, dec!(10.00), 5))
            .await;
        let EventOutcome::Matched(matched) = outcome else {
            panic!("expected a match");
        };
        assert_eq!(matched.match_ref_id, "REF-B");
        assert_eq!(matched.match_type, MatchType::HybridMl);
        assert_eq!(matched.status, DecisionStatus::OpsReview);
        assert_eq!(engine.pending(SourceSystem::SourceA).len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.thresholds.review = 1.5;
        let result = RealTimeEngine::new(
            &config,
            Arc::new(Fixed(0.5)),
            AuditTrail::new(Arc::new(InMemoryAuditSink::default())),
        );
        assert!(matches!(result, Err(ReconError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_currency_mismatch_is_never_paired() {
        let (mut engine, _) = engine(1.0);
        let mut eur = record("TXN-2", SourceSystem::SourceA, dec!(75), 4);
        eur.currency = Some("EUR".to_string());
        engine.process_event(eur).await;
        let outcome = engine
            .process_event(record("TXN-2", SourceSystem::SourceB, dec!(75), 4))
            .await;
        assert_eq!(outcome, EventOutcome::Pending);
    }

    #[tokio::test]
    async fn test_malformed_event_becomes_unknown_exception() {
        let (mut engine, sink) = engine(0.5);
        let mut raw = record("ACCT 1234567890", SourceSystem::SourceA, dec!(5), 4);
        raw.amount = None;

        let outcome = engine.process_event(raw).await;
        let EventOutcome::Rejected(exception) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(exception.code, ExceptionCode::Unknown);
        assert!(exception.description.contains("***PII***"));
        assert!(!exception.description.contains("1234567890"));
        assert!(exception.trace_id.is_some());
        assert!(sink.entries().iter().any(|e| e.action == "REJECT"));
        assert!(engine.snapshot().is_partitioned());
    }

    #[tokio::test]
    async fn test_duplicate_event_is_flagged() {
        let (mut engine, _) = engine(0.5);
        engine
            .process_event(record("TXN-3", SourceSystem::SourceA, dec!(5), 4))
            .await;
        let outcome = engine
            .process_event(record("TXN-3", SourceSystem::SourceA, dec!(5), 4))
            .await;
        assert!(matches!(
            outcome,
            EventOutcome::Duplicate(ExceptionRecord { code: ExceptionCode::Duplicate, .. })
        ));
        assert_eq!(engine.pending(SourceSystem::SourceA).len(), 1);
    }

    #[tokio::test]
    async fn test_drain_emits_high_missing_exceptions() {
        let (mut engine, _) = engine(0.1);
        engine
            .process_event(record("ONLY-A", SourceSystem::SourceA, dec!(1000), 4))
            .await;
        engine
            .process_event(record("ONLY-B", SourceSystem::SourceB, dec!(20), 9))
            .await;

        let drained = engine.drain_pending_as_exceptions();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].code, ExceptionCode::MissingInSourceB);
        assert_eq!(drained[0].risk_score, 51.0);
        assert_eq!(drained[1].code, ExceptionCode::MissingInSourceA);
        assert!(drained.iter().all(|e| e.severity == Severity::High));
        assert_eq!(engine.exceptions().len(), 2);

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.pending(), 0);
        assert!(snapshot.is_partitioned());
        assert!(engine.drain_pending_as_exceptions().is_empty());
    }

    #[tokio::test]
    async fn test_sla_escalation_is_audited() {
        let (engine, sink) = engine(0.1);
        let mut engine = engine.with_clock(afternoon);
        engine
            .process_event(record("TXN-4", SourceSystem::SourceA, dec!(5), 4))
            .await;
        let escalations: Vec<_> = sink
            .entries()
            .into_iter()
            .filter(|e| e.action == "ESCALATE")
            .collect();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].component, "SLA_WATCHDOG");
    }
}
