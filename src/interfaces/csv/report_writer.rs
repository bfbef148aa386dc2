use crate::application::stress::StabilityResult;
use crate::domain::event::SourceSystem;
use crate::domain::record::{
    DecisionStatus, ExceptionCode, ExceptionRecord, MatchRecord, MatchType, Severity,
};
use crate::error::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct MatchRow<'a> {
    txn_ref_id: &'a str,
    match_ref_id: &'a str,
    source_system: SourceSystem,
    match_system: SourceSystem,
    match_type: MatchType,
    status: DecisionStatus,
    score: f64,
    amount: Decimal,
    value_date: NaiveDate,
    reason: &'a str,
}

impl<'a> From<&'a MatchRecord> for MatchRow<'a> {
    fn from(m: &'a MatchRecord) -> Self {
        Self {
            txn_ref_id: &m.txn_ref_id,
            match_ref_id: &m.match_ref_id,
            source_system: m.source,
            match_system: m.match_source,
            match_type: m.match_type,
            status: m.status,
            score: m.score,
            amount: m.amount,
            value_date: m.value_date,
            reason: &m.reason,
        }
    }
}

#[derive(Serialize)]
struct ExceptionRow<'a> {
    txn_ref_id: &'a str,
    source_system: Option<SourceSystem>,
    amount: Decimal,
    exception_code: ExceptionCode,
    severity: Severity,
    risk_score: f64,
    anomaly_score: Option<f64>,
    description: &'a str,
    suggested_resolution: &'a str,
    trace_id: Option<Uuid>,
}

impl<'a> From<&'a ExceptionRecord> for ExceptionRow<'a> {
    fn from(e: &'a ExceptionRecord) -> Self {
        Self {
            txn_ref_id: &e.txn_ref_id,
            source_system: e.source,
            amount: e.amount,
            exception_code: e.code,
            severity: e.severity,
            risk_score: e.risk_score,
            anomaly_score: e.anomaly_score,
            description: &e.description,
            suggested_resolution: &e.suggested_resolution,
            trace_id: e.trace_id,
        }
    }
}

/// Writes reconciliation results as flat CSV.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_matches(&mut self, matches: &[MatchRecord]) -> Result<()> {
        for m in matches {
            self.writer.serialize(MatchRow::from(m))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_exceptions(&mut self, exceptions: &[ExceptionRecord]) -> Result<()> {
        for e in exceptions {
            self.writer.serialize(ExceptionRow::from(e))?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_stability(&mut self, results: &[StabilityResult]) -> Result<()> {
        for r in results {
            self.writer.serialize(r)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
