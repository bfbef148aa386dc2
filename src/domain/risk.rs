use super::event::SourceSystem;
use super::record::{ExceptionCode, ExceptionRecord, Severity};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Prioritises exceptions: `|amount| * amount_weight + type_weight(code)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskScorer {
    amount_weight: f64,
}

impl Default for RiskScorer {
    fn default() -> Self {
        Self {
            amount_weight: 0.001,
        }
    }
}

impl RiskScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_weight(code: ExceptionCode) -> f64 {
        match code {
            ExceptionCode::MissingInSourceA | ExceptionCode::MissingInSourceB => 50.0,
            ExceptionCode::AmountMismatch => 20.0,
            ExceptionCode::Duplicate => 10.0,
            ExceptionCode::DateMismatch => 5.0,
            ExceptionCode::Unknown => 10.0,
        }
    }

    /// Risk score rounded to two decimals.
    pub fn calculate_score(&self, amount: Decimal, code: ExceptionCode) -> f64 {
        let amount = amount.abs().to_f64().unwrap_or(f64::MAX);
        let score = amount * self.amount_weight + Self::type_weight(code);
        (score * 100.0).round() / 100.0
    }

    /// A scored exception with severity and resolution filled in.
    pub fn classify(
        &self,
        txn_ref_id: &str,
        source: Option<SourceSystem>,
        amount: Decimal,
        code: ExceptionCode,
        description: String,
    ) -> ExceptionRecord {
        let risk_score = self.calculate_score(amount, code);
        ExceptionRecord {
            txn_ref_id: txn_ref_id.to_string(),
            source,
            amount,
            code,
            severity: evaluate_severity(risk_score, code),
            risk_score,
            description,
            suggested_resolution: suggested_resolution(code).to_string(),
            anomaly_score: None,
            trace_id: None,
        }
    }
}

/// Missing counterparts are always HIGH.
pub fn evaluate_severity(risk_score: f64, code: ExceptionCode) -> Severity {
    if risk_score > 80.0 || code.is_missing() {
        Severity::High
    } else if risk_score > 30.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn suggested_resolution(code: ExceptionCode) -> &'static str {
    match code {
        ExceptionCode::AmountMismatch => "Investigate GL/sub-ledger posting.",
        ExceptionCode::DateMismatch => "Check timezone settings or cut-off times.",
        ExceptionCode::MissingInSourceA | ExceptionCode::MissingInSourceB => {
            "Trace payment gateway logs."
        }
        ExceptionCode::Duplicate | ExceptionCode::Unknown => "Manual review required.",
    }
}
