//! Maker-checker workflow and the operator review console.

use super::audit::AuditTrail;
use super::feedback::ActiveLearner;
use crate::domain::governance::{
    FeedbackLabel, FeedbackSample, GovernanceTicket, OperatorRole, TicketStatus,
};
use crate::domain::record::DecisionStatus;
use crate::error::GovernanceError;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

/// Segregation of duties: PENDING_APPROVAL → APPROVED, approved by someone
/// other than the maker. There is no rejection transition.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    audit: AuditTrail,
}

impl ApprovalWorkflow {
    pub fn new(audit: AuditTrail) -> Self {
        Self { audit }
    }

    pub fn submit_for_approval(&self, event_id: &str, action: &str, maker_id: &str) -> GovernanceTicket {
        let ticket = GovernanceTicket::new(event_id, action, maker_id);
        tracing::info!(
            ticket_id = %ticket.ticket_id,
            maker_id,
            event_id,
            "workflow: ticket created, pending approval"
        );
        self.audit.record(
            "GOVERNANCE",
            "SUBMIT",
            &format!("Ticket {} created by maker {maker_id}", ticket.ticket_id),
            json!({ "ticket_id": ticket.ticket_id, "event_id": event_id, "action": action }),
        );
        ticket
    }

    /// Returns the approved ticket. The input is left untouched on failure.
    pub fn approve_ticket(
        &self,
        ticket: &GovernanceTicket,
        checker_id: &str,
    ) -> Result<GovernanceTicket, GovernanceError> {
        if ticket.maker_id == checker_id {
            let violation = GovernanceError::SelfApproval {
                ticket_id: ticket.ticket_id,
                maker_id: ticket.maker_id.clone(),
            };
            tracing::error!(ticket_id = %ticket.ticket_id, "security violation: {violation}");
            self.audit.record(
                "GOVERNANCE",
                "BLOCK",
                &format!("SELF_APPROVAL_ATTEMPT: {violation}"),
                json!({ "ticket_id": ticket.ticket_id, "maker_id": ticket.maker_id }),
            );
            return Err(violation);
        }
        if ticket.status == TicketStatus::Approved {
            return Err(GovernanceError::AlreadyApproved(ticket.ticket_id));
        }

        let mut approved = ticket.clone();
        approved.status = TicketStatus::Approved;
        approved.checker_id = Some(checker_id.to_string());
        approved.approved_at = Some(Utc::now());

        tracing::info!(ticket_id = %approved.ticket_id, checker_id, "workflow: ticket approved");
        self.audit.record(
            "GOVERNANCE",
            "APPROVE",
            &format!("Ticket {} approved by {checker_id}", approved.ticket_id),
            json!({ "ticket_id": approved.ticket_id, "maker_id": approved.maker_id }),
        );
        Ok(approved)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverrideOutcome {
    /// Junior override parked for a second operator.
    PendingApproval(GovernanceTicket),
    Completed { final_decision: DecisionStatus },
}

/// Operator console for overriding machine decisions.
pub struct ReviewConsole {
    workflow: ApprovalWorkflow,
    learner: Arc<ActiveLearner>,
    audit: AuditTrail,
}

impl ReviewConsole {
    pub fn new(audit: AuditTrail, learner: Arc<ActiveLearner>) -> Self {
        Self {
            workflow: ApprovalWorkflow::new(audit.clone()),
            learner,
            audit,
        }
    }

    pub fn workflow(&self) -> &ApprovalWorkflow {
        &self.workflow
    }

    pub async fn override_decision(
        &self,
        event_id: &str,
        original: DecisionStatus,
        new: DecisionStatus,
        reason_code: &str,
        user_id: &str,
        role: OperatorRole,
    ) -> OverrideOutcome {
        tracing::info!(user_id, ?role, %original, %new, "review console: decision override");

        if role == OperatorRole::JuniorOps {
            let ticket = self
                .workflow
                .submit_for_approval(event_id, &new.to_string(), user_id);
            return OverrideOutcome::PendingApproval(ticket);
        }

        self.audit.record(
            "GOVERNANCE",
            "OVERRIDE",
            &format!("Decision override by {user_id}: {original} -> {new}"),
            json!({
                "event_id": event_id,
                "original": original,
                "new": new,
                "reason": reason_code,
                "user": user_id,
                "role": role,
            }),
        );

        let label = if new.is_match() {
            FeedbackLabel::Match
        } else {
            FeedbackLabel::NoMatch
        };
        self.learner
            .submit_feedback(FeedbackSample {
                event_id: event_id.to_string(),
                counterpart_id: None,
                features: None,
                label,
            })
            .await;

        OverrideOutcome::Completed {
            final_decision: new,
        }
    }
}
