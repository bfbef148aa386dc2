use super::features::FeatureVector;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    PendingApproval,
    Approved,
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::PendingApproval => write!(f, "PENDING_APPROVAL"),
            TicketStatus::Approved => write!(f, "APPROVED"),
        }
    }
}

/// Operator seniority. Junior overrides need a second pair of eyes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatorRole {
    JuniorOps,
    SeniorOps,
}

/// Maker-checker unit of work.
///
/// `checker_id` is only ever set on approval and never equals `maker_id`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct GovernanceTicket {
    pub ticket_id: Uuid,
    pub event_id: String,
    pub action: String,
    pub maker_id: String,
    pub status: TicketStatus,
    pub checker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl GovernanceTicket {
    pub fn new(event_id: &str, action: &str, maker_id: &str) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            event_id: event_id.to_string(),
            action: action.to_string(),
            maker_id: maker_id.to_string(),
            status: TicketStatus::PendingApproval,
            checker_id: None,
            created_at: Utc::now(),
            approved_at: None,
        }
    }
}

/// Human verdict on a reviewed pair.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackLabel {
    /// Queued for review, no verdict yet.
    Pending,
    Match,
    NoMatch,
}

impl FeedbackLabel {
    /// Training label: 1 for a confirmed match, 0 otherwise.
    pub fn as_target(self) -> u8 {
        match self {
            FeedbackLabel::Match => 1,
            FeedbackLabel::Pending | FeedbackLabel::NoMatch => 0,
        }
    }
}

/// One buffered (event pair, label) observation for retraining.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct FeedbackSample {
    pub event_id: String,
    pub counterpart_id: Option<String>,
    pub features: Option<FeatureVector>,
    pub label: FeedbackLabel,
}
