use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The independent source system an event was observed in.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSystem {
    SourceA,
    SourceB,
}

impl SourceSystem {
    /// The system whose window holds this system's counterparts.
    pub fn opposite(self) -> Self {
        match self {
            SourceSystem::SourceA => SourceSystem::SourceB,
            SourceSystem::SourceB => SourceSystem::SourceA,
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSystem::SourceA => write!(f, "SOURCE_A"),
            SourceSystem::SourceB => write!(f, "SOURCE_B"),
        }
    }
}

/// A record as handed over by ingestion, before the required fields are checked.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
pub struct EventRecord {
    pub txn_ref_id: String,
    #[serde(default)]
    pub source_system: Option<SourceSystem>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub value_date: Option<NaiveDate>,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default)]
    pub trace_id: Option<Uuid>,
}

/// One observed transaction from one source system. Immutable once ingested.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct TransactionEvent {
    pub id: String,
    pub source: SourceSystem,
    pub amount: Decimal,
    pub currency: String,
    pub value_date: NaiveDate,
    pub counterparty: Option<String>,
    pub trace_id: Option<Uuid>,
}

/// A record that failed boundary validation, with the fields it lacked.
#[derive(Debug, PartialEq, Clone)]
pub struct RejectedEvent {
    pub record: EventRecord,
    pub missing: Vec<&'static str>,
}

impl RejectedEvent {
    pub fn reason(&self) -> String {
        format!("missing required field(s): {}", self.missing.join(", "))
    }
}

impl TryFrom<EventRecord> for TransactionEvent {
    type Error = RejectedEvent;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let mut missing = Vec::new();
        if record.txn_ref_id.trim().is_empty() {
            missing.push("txn_ref_id");
        }
        if record.source_system.is_none() {
            missing.push("source_system");
        }
        if record.amount.is_none() {
            missing.push("amount");
        }
        if record.value_date.is_none() {
            missing.push("value_date");
        }
        if record.currency.as_deref().is_none_or(|c| c.trim().is_empty()) {
            missing.push("currency");
        }

        match (
            record.source_system,
            record.amount,
            record.value_date,
            record.currency.clone(),
        ) {
            (Some(source), Some(amount), Some(value_date), Some(currency)) if missing.is_empty() => {
                Ok(Self {
                    id: record.txn_ref_id,
                    source,
                    amount,
                    currency: currency.trim().to_uppercase(),
                    value_date,
                    counterparty: record.counterparty,
                    trace_id: record.trace_id,
                })
            }
            _ => Err(RejectedEvent { record, missing }),
        }
    }
}

impl From<&TransactionEvent> for EventRecord {
    fn from(event: &TransactionEvent) -> Self {
        Self {
            txn_ref_id: event.id.clone(),
            source_system: Some(event.source),
            amount: Some(event.amount),
            currency: Some(event.currency.clone()),
            value_date: Some(event.value_date),
            counterparty: event.counterparty.clone(),
            trace_id: event.trace_id,
        }
    }
}
