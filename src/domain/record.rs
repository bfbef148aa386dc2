use super::event::SourceSystem;
use super::features::FeatureVector;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Exact,
    FuzzyId,
    Tolerance,
    HybridMl,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Exact => write!(f, "EXACT"),
            MatchType::FuzzyId => write!(f, "FUZZY_ID"),
            MatchType::Tolerance => write!(f, "TOLERANCE"),
            MatchType::HybridMl => write!(f, "HYBRID_ML"),
        }
    }
}

/// Outcome of a decision for one candidate pair.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    AutoReconciled,
    OpsReview,
    Exception,
}

impl DecisionStatus {
    /// Whether this status commits a pairing.
    pub fn is_match(self) -> bool {
        matches!(self, DecisionStatus::AutoReconciled | DecisionStatus::OpsReview)
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionStatus::AutoReconciled => write!(f, "AUTO_RECONCILED"),
            DecisionStatus::OpsReview => write!(f, "OPS_REVIEW"),
            DecisionStatus::Exception => write!(f, "EXCEPTION"),
        }
    }
}

/// A committed pairing of two events. Append-only.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct MatchRecord {
    pub txn_ref_id: String,
    pub match_ref_id: String,
    pub source: SourceSystem,
    pub match_source: SourceSystem,
    pub match_type: MatchType,
    pub score: f64,
    pub status: DecisionStatus,
    pub reason: String,
    pub amount: Decimal,
    pub value_date: NaiveDate,
    pub features: FeatureVector,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionCode {
    MissingInSourceA,
    MissingInSourceB,
    AmountMismatch,
    DateMismatch,
    Duplicate,
    Unknown,
}

impl ExceptionCode {
    /// The code for an event of `source` whose counterpart never showed up.
    pub fn missing_counterpart_of(source: SourceSystem) -> Self {
        match source.opposite() {
            SourceSystem::SourceA => ExceptionCode::MissingInSourceA,
            SourceSystem::SourceB => ExceptionCode::MissingInSourceB,
        }
    }

    pub fn is_missing(self) -> bool {
        matches!(
            self,
            ExceptionCode::MissingInSourceA | ExceptionCode::MissingInSourceB
        )
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            ExceptionCode::MissingInSourceA => "MISSING_IN_SOURCE_A",
            ExceptionCode::MissingInSourceB => "MISSING_IN_SOURCE_B",
            ExceptionCode::AmountMismatch => "AMOUNT_MISMATCH",
            ExceptionCode::DateMismatch => "DATE_MISMATCH",
            ExceptionCode::Duplicate => "DUPLICATE",
            ExceptionCode::Unknown => "UNKNOWN",
        };
        write!(f, "{code}")
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

/// An event that failed to match, prioritised for operations.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ExceptionRecord {
    pub txn_ref_id: String,
    pub source: Option<SourceSystem>,
    pub amount: Decimal,
    pub code: ExceptionCode,
    pub severity: Severity,
    pub risk_score: f64,
    pub description: String,
    pub suggested_resolution: String,
    /// 0-100, higher is more anomalous. Only set by batch runs.
    pub anomaly_score: Option<f64>,
    pub trace_id: Option<Uuid>,
}
