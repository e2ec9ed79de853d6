// ticket.rs — ApprovalTicket: one pending human sign-off.
//
// The state machine is deliberately tiny:
//
//   Pending → Approved   (approver call)
//   Pending → Rejected   (approver call)
//   Pending → Expired    (TTL elapsed)
//
// Terminal states never transition again. Everything else is an
// InvalidTicketState error and changes nothing.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_policy::{ActionRequest, ArgValue};

use crate::error::ApprovalError;

/// Where a ticket is in its lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting for an approver.
    Pending,
    /// An approver signed off.
    Approved,
    /// An approver declined.
    Rejected,
    /// The TTL elapsed with no approver action.
    Expired,
}

impl TicketStatus {
    /// Whether this status admits a transition to `next`.
    /// Only `Pending` admits any transition at all.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Pending, TicketStatus::Approved)
                | (TicketStatus::Pending, TicketStatus::Rejected)
                | (TicketStatus::Pending, TicketStatus::Expired)
        )
    }

    /// Whether the ticket can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketStatus::Pending)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketStatus::Pending => write!(f, "pending"),
            TicketStatus::Approved => write!(f, "approved"),
            TicketStatus::Rejected => write!(f, "rejected"),
            TicketStatus::Expired => write!(f, "expired"),
        }
    }
}

/// The verdict an approver hands down.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approve,
    Reject,
}

impl ApprovalOutcome {
    pub fn target_status(&self) -> TicketStatus {
        match self {
            ApprovalOutcome::Approve => TicketStatus::Approved,
            ApprovalOutcome::Reject => TicketStatus::Rejected,
        }
    }
}

/// A durable record of one approval request.
///
/// Owned exclusively by the [`TicketTable`](crate::TicketTable); callers
/// hold only the `ticket_id` and receive cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTicket {
    /// Unique id handed back to the requester for polling.
    pub ticket_id: Uuid,

    /// The action awaiting sign-off.
    pub action_name: String,

    /// The original request arguments, preserved for the approver.
    pub arguments: BTreeMap<String, ArgValue>,

    /// Who asked for the action.
    pub requester: String,

    /// Current lifecycle status.
    pub status: TicketStatus,

    /// When the ticket was opened (wall clock, for the audit trail;
    /// expiry itself runs on a monotonic deadline in the table).
    pub created_at: DateTime<Utc>,

    /// When the ticket reached a terminal state, if it has.
    pub decided_at: Option<DateTime<Utc>>,

    /// The approver who settled it. None for expiry.
    pub decided_by: Option<String>,
}

impl ApprovalTicket {
    /// Open a fresh pending ticket for a request.
    pub fn for_request(request: &ActionRequest) -> Self {
        Self {
            ticket_id: Uuid::new_v4(),
            action_name: request.action_name.clone(),
            arguments: request.arguments.clone(),
            requester: request.requester.clone(),
            status: TicketStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            decided_by: None,
        }
    }

    /// Apply a status transition, enforcing the state machine.
    pub(crate) fn transition(
        &mut self,
        next: TicketStatus,
        decided_by: Option<String>,
    ) -> Result<(), ApprovalError> {
        if !self.status.can_transition_to(next) {
            return Err(ApprovalError::InvalidTicketState {
                ticket_id: self.ticket_id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.decided_at = Some(Utc::now());
        self.decided_by = decided_by;
        Ok(())
    }
}
