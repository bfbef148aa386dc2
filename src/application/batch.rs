//! Multi-stage batch reconciliation of two complete datasets.
//!
//! 1. Exact one-to-one join on the configured key columns.
//! 2. Best fuzzy-ID candidate among unconsumed records, accepted within the
//!    amount/date tolerance.
//! 3. Everything left becomes an exception; a same-ID counterpart that failed
//!    tolerance turns MISSING into an AMOUNT_MISMATCH break.
//! 4. An anomaly model fitted on the accepted matches scores every exception.

use crate::config::{EngineConfig, KeyColumn};
use crate::domain::event::{SourceSystem, TransactionEvent};
use crate::domain::features::{self, ratio};
use crate::domain::ports::{AnomalyDetectorRef, AnomalyModel};
use crate::domain::record::{
    DecisionStatus, ExceptionCode, ExceptionRecord, MatchRecord, MatchType,
};
use crate::domain::risk::RiskScorer;
use crate::error::{ReconError, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub matches: Vec<MatchRecord>,
    pub exceptions: Vec<ExceptionRecord>,
}

impl BatchOutcome {
    /// Exceptions ordered for triage: severity, then risk, then anomaly score.
    pub fn ranked_exceptions(&self) -> Vec<ExceptionRecord> {
        let mut ranked = self.exceptions.clone();
        ranked.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| b.risk_score.total_cmp(&a.risk_score))
                .then_with(|| {
                    b.anomaly_score
                        .unwrap_or(0.0)
                        .total_cmp(&a.anomaly_score.unwrap_or(0.0))
                })
        });
        ranked
    }
}

pub struct BatchEngine {
    config: EngineConfig,
    risk: RiskScorer,
    detector: AnomalyDetectorRef,
}

impl BatchEngine {
    pub fn new(config: &EngineConfig, detector: AnomalyDetectorRef) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            risk: RiskScorer::new(),
            detector,
        })
    }

    pub fn run(&self, a: &[TransactionEvent], b: &[TransactionEvent]) -> Result<BatchOutcome> {
        check_source(a, SourceSystem::SourceA)?;
        check_source(b, SourceSystem::SourceB)?;
        tracing::info!(source_a = a.len(), source_b = b.len(), "batch run started");

        let mut a_used = vec![false; a.len()];
        let mut b_used = vec![false; b.len()];
        let mut matches = Vec::new();

        self.match_exact(a, b, &mut a_used, &mut b_used, &mut matches);
        tracing::info!(matches = matches.len(), "stage 1 (exact) complete");

        let exact = matches.len();
        self.match_fuzzy(a, b, &mut a_used, &mut b_used, &mut matches);
        tracing::info!(matches = matches.len() - exact, "stage 2 (fuzzy/tolerance) complete");

        let mut exceptions = self.classify_remaining(a, b, &a_used, &mut b_used);
        tracing::info!(exceptions = exceptions.len(), "stage 3 (classification) complete");

        let model = self.train_anomaly_model(&matches);
        for exception in &mut exceptions {
            exception.anomaly_score = Some(match &model {
                Some(model) => normalise_anomaly(
                    model.decision_function(&anomaly_features(exception.amount)),
                ),
                None => 0.0,
            });
        }
        tracing::info!(
            matches = matches.len(),
            exceptions = exceptions.len(),
            "batch run complete"
        );

        Ok(BatchOutcome {
            matches,
            exceptions,
        })
    }

    fn match_key(&self, event: &TransactionEvent) -> Vec<String> {
        self.config
            .batch
            .exact_match_columns
            .iter()
            .map(|column| match column {
                KeyColumn::TxnRefId => event.id.clone(),
                KeyColumn::Amount => event.amount.normalize().to_string(),
                KeyColumn::ValueDate => event.value_date.to_string(),
                KeyColumn::Currency => event.currency.clone(),
            })
            .collect()
    }

    fn match_exact(
        &self,
        a: &[TransactionEvent],
        b: &[TransactionEvent],
        a_used: &mut [bool],
        b_used: &mut [bool],
        matches: &mut Vec<MatchRecord>,
    ) {
        let mut right: HashMap<Vec<String>, VecDeque<usize>> = HashMap::new();
        for (index, event) in b.iter().enumerate() {
            right.entry(self.match_key(event)).or_default().push_back(index);
        }

        for (ai, left) in a.iter().enumerate() {
            let Some(bi) = right
                .get_mut(&self.match_key(left))
                .and_then(VecDeque::pop_front)
            else {
                continue;
            };
            a_used[ai] = true;
            b_used[bi] = true;
            matches.push(pair(
                left,
                &b[bi],
                MatchType::Exact,
                DecisionStatus::AutoReconciled,
                100.0,
                "Exact key match".to_string(),
            ));
        }
    }

    fn match_fuzzy(
        &self,
        a: &[TransactionEvent],
        b: &[TransactionEvent],
        a_used: &mut [bool],
        b_used: &mut [bool],
        matches: &mut Vec<MatchRecord>,
    ) {
        let tolerance = &self.config.tolerance;
        for (ai, left) in a.iter().enumerate() {
            if a_used[ai] {
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for (bi, right) in b.iter().enumerate() {
                if b_used[bi] || (self.config.currency_strict && left.currency != right.currency)
                {
                    continue;
                }
                let score = ratio(&left.id, &right.id);
                if best.is_none_or(|(_, current)| score > current) {
                    best = Some((bi, score));
                }
            }

            let Some((bi, score)) = best else {
                continue;
            };
            if score < self.config.batch.fuzzy_id_threshold {
                continue;
            }
            let right = &b[bi];
            let amount_delta = (left.amount - right.amount).abs();
            let days = (left.value_date - right.value_date).num_days().unsigned_abs();
            if amount_delta > tolerance.amount || days > u64::from(tolerance.date_days) {
                continue;
            }

            let (match_type, reason) = if left.id == right.id {
                (
                    MatchType::Tolerance,
                    format!("ID exact; amount delta {amount_delta}, {days} day(s) apart"),
                )
            } else {
                (
                    MatchType::FuzzyId,
                    format!("ID similarity {score:.1} >= {}", self.config.batch.fuzzy_id_threshold),
                )
            };
            a_used[ai] = true;
            b_used[bi] = true;
            matches.push(pair(left, right, match_type, DecisionStatus::OpsReview, score, reason));
        }
    }

    fn classify_remaining(
        &self,
        a: &[TransactionEvent],
        b: &[TransactionEvent],
        a_used: &[bool],
        b_used: &mut [bool],
    ) -> Vec<ExceptionRecord> {
        // Only a surplus copy of a reference that already matched is a duplicate.
        let a_matched = matched_ids(a, a_used);
        let b_matched = matched_ids(b, b_used);
        let mut exceptions = Vec::new();

        for (ai, left) in a.iter().enumerate() {
            if a_used[ai] {
                continue;
            }
            let counterpart = b
                .iter()
                .enumerate()
                .position(|(bi, right)| !b_used[bi] && right.id == left.id);

            let (code, description) = if let Some(bi) = counterpart {
                b_used[bi] = true;
                (
                    ExceptionCode::AmountMismatch,
                    format!("Break: amount A {} vs B {}", left.amount, b[bi].amount),
                )
            } else if a_matched.contains(left.id.as_str()) {
                (
                    ExceptionCode::Duplicate,
                    format!("Reference {} appears more than once in {}", left.id, left.source),
                )
            } else {
                (
                    ExceptionCode::MissingInSourceB,
                    format!("Transaction missing in {}", SourceSystem::SourceB),
                )
            };
            exceptions.push(self.exception(left, code, description));
        }

        for (bi, right) in b.iter().enumerate() {
            if b_used[bi] {
                continue;
            }
            let (code, description) = if b_matched.contains(right.id.as_str()) {
                (
                    ExceptionCode::Duplicate,
                    format!("Reference {} appears more than once in {}", right.id, right.source),
                )
            } else {
                (
                    ExceptionCode::MissingInSourceA,
                    format!("Transaction missing in {}", SourceSystem::SourceA),
                )
            };
            exceptions.push(self.exception(right, code, description));
        }
        exceptions
    }

    fn exception(
        &self,
        event: &TransactionEvent,
        code: ExceptionCode,
        description: String,
    ) -> ExceptionRecord {
        let mut record =
            self.risk
                .classify(&event.id, Some(event.source), event.amount, code, description);
        record.trace_id = event.trace_id;
        record
    }

    fn train_anomaly_model(&self, matches: &[MatchRecord]) -> Option<Box<dyn AnomalyModel>> {
        let samples: Vec<Vec<f64>> = matches
            .iter()
            .map(|m| anomaly_features(m.amount))
            .collect();
        let model = self.detector.train(&samples);
        if model.is_none() {
            tracing::warn!("no accepted matches to train the anomaly model on");
        }
        model
    }
}

fn check_source(events: &[TransactionEvent], expected: SourceSystem) -> Result<()> {
    match events.iter().find(|e| e.source != expected) {
        Some(event) => Err(ReconError::ValidationError(format!(
            "event {} is tagged {} but was supplied as {expected}",
            event.id, event.source
        ))),
        None => Ok(()),
    }
}

fn matched_ids<'a>(events: &'a [TransactionEvent], used: &[bool]) -> HashSet<&'a str> {
    events
        .iter()
        .zip(used)
        .filter(|(_, used)| **used)
        .map(|(event, _)| event.id.as_str())
        .collect()
}

fn pair(
    left: &TransactionEvent,
    right: &TransactionEvent,
    match_type: MatchType,
    status: DecisionStatus,
    score: f64,
    reason: String,
) -> MatchRecord {
    MatchRecord {
        txn_ref_id: left.id.clone(),
        match_ref_id: right.id.clone(),
        source: left.source,
        match_source: right.source,
        match_type,
        score,
        status,
        reason,
        amount: left.amount,
        value_date: left.value_date,
        features: features::extract(left, right),
    }
}

fn anomaly_features(amount: Decimal) -> Vec<f64> {
    vec![amount.abs().to_f64().unwrap_or(f64::MAX).ln_1p()]
}

/// Maps a decision-function score (lower is more anomalous) onto 0-100.
fn normalise_anomaly(raw: f64) -> f64 {
    ((0.5 - raw).clamp(0.0, 1.0) * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::Severity;
    use crate::infrastructure::scoring::ZScoreAnomalyDetector;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn event(id: &str, source: SourceSystem, amount: Decimal, day: u32) -> TransactionEvent {
        TransactionEvent {
            id: id.to_string(),
            source,
            amount,
            currency: "USD".to_string(),
            value_date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            counterparty: None,
            trace_id: None,
        }
    }

    fn a(id: &str, amount: Decimal, day: u32) -> TransactionEvent {
        event(id, SourceSystem::SourceA, amount, day)
    }

    fn b(id: &str, amount: Decimal, day: u32) -> TransactionEvent {
        event(id, SourceSystem::SourceB, amount, day)
    }

    fn engine() -> BatchEngine {
        BatchEngine::new(&EngineConfig::default(), Arc::new(ZScoreAnomalyDetector)).unwrap()
    }

    #[test]
    fn test_exact_join_is_one_to_one() {
        let left = vec![a("TXN-1", dec!(10.00), 3), a("TXN-1", dec!(10.00), 3)];
        let right = vec![b("TXN-1", dec!(10.0), 3)];
        let outcome = engine().run(&left, &right).unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].match_type, MatchType::Exact);
        assert_eq!(outcome.matches[0].score, 100.0);
        assert_eq!(outcome.exceptions.len(), 1);
        assert_eq!(outcome.exceptions[0].code, ExceptionCode::Duplicate);
    }

    #[test]
    fn test_repeated_reference_without_counterpart_is_missing() {
        let left = vec![a("TXN-1", dec!(500), 3), a("TXN-1", dec!(700), 3)];
        let outcome = engine().run(&left, &[]).unwrap();

        assert_eq!(outcome.exceptions.len(), 2);
        for exception in &outcome.exceptions {
            assert_eq!(exception.code, ExceptionCode::MissingInSourceB);
            assert_eq!(exception.severity, Severity::High);
        }
    }

    #[test]
    fn test_surplus_copy_on_source_b_is_duplicate() {
        let left = vec![a("TXN-2", dec!(20), 3)];
        let right = vec![b("TXN-2", dec!(20), 3), b("TXN-2", dec!(20), 3), b("TXN-5", dec!(9), 3)];
        let outcome = engine().run(&left, &right).unwrap();

        let codes: Vec<_> = outcome
            .exceptions
            .iter()
            .map(|e| (e.txn_ref_id.as_str(), e.code))
            .collect();
        assert_eq!(
            codes,
            vec![("TXN-2", ExceptionCode::Duplicate), ("TXN-5", ExceptionCode::MissingInSourceA)]
        );
    }

    #[test]
    fn test_tolerance_and_fuzzy_stages() {
        let left = vec![a("INV-20240601", dec!(100.00), 3), a("PAY-77", dec!(40.00), 3)];
        let right = vec![b("INV-2024060I", dec!(100.00), 3), b("PAY-77", dec!(40.04), 4)];
        let outcome = engine().run(&left, &right).unwrap();

        assert_eq!(outcome.exceptions, vec![]);
        let fuzzy = &outcome.matches[0];
        assert_eq!(fuzzy.match_type, MatchType::FuzzyId);
        assert_eq!(fuzzy.status, DecisionStatus::OpsReview);
        assert!(fuzzy.score >= 85.0);
        let tolerance = &outcome.matches[1];
        assert_eq!(tolerance.match_type, MatchType::Tolerance);
        assert_eq!(tolerance.score, 100.0);
    }

    #[test]
    fn test_same_id_outside_tolerance_is_a_break() {
        let left = vec![a("TXN-9", dec!(100000), 3)];
        let right = vec![b("TXN-9", dec!(95000), 3)];
        let outcome = engine().run(&left, &right).unwrap();

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.exceptions.len(), 1);
        let exception = &outcome.exceptions[0];
        assert_eq!(exception.code, ExceptionCode::AmountMismatch);
        assert_eq!(exception.risk_score, 120.0);
        assert_eq!(exception.severity, Severity::High);
        assert_eq!(exception.suggested_resolution, "Investigate GL/sub-ledger posting.");
        // Nothing matched, so there is no model to score against.
        assert_eq!(exception.anomaly_score, Some(0.0));
    }

    #[test]
    fn test_missing_on_both_sides() {
        let left = vec![a("ONLY-A", dec!(10), 3)];
        let right = vec![b("OTHER-B", dec!(12), 3)];
        let outcome = engine().run(&left, &right).unwrap();
        let codes: Vec<_> = outcome.exceptions.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![ExceptionCode::MissingInSourceB, ExceptionCode::MissingInSourceA]
        );
    }

    #[test]
    fn test_anomaly_scores_rank_outliers() {
        let left = vec![
            a("M-1", dec!(100), 3),
            a("M-2", dec!(110), 3),
            a("M-3", dec!(90), 3),
            a("SMALL", dec!(101), 3),
            a("HUGE", dec!(2500000), 3),
        ];
        let right = vec![b("M-1", dec!(100), 3), b("M-2", dec!(110), 3), b("M-3", dec!(90), 3)];
        let outcome = engine().run(&left, &right).unwrap();

        let ranked = outcome.ranked_exceptions();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].txn_ref_id, "HUGE");
        assert_eq!(ranked[0].anomaly_score, Some(100.0));
        assert!(ranked[1].anomaly_score.unwrap() < 50.0);
    }

    #[test]
    fn test_wrongly_tagged_dataset_is_rejected() {
        let left = vec![b("TXN-1", dec!(1), 3)];
        assert!(matches!(
            engine().run(&left, &[]),
            Err(ReconError::ValidationError(_))
        ));
    }
}
