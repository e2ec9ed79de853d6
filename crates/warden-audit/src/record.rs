// record.rs — The audit record data model.
//
// One record per auditable event: a gateway decision, or an approval
// ticket reaching a terminal state. Records are immutable once written;
// the sink fills `sequence` and `previous_hash` at append time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_approval::{ApprovalTicket, TicketStatus};
use warden_policy::{Decision, DecisionKind};

/// What kind of event a record captures.
///
/// Internally tagged so a JSONL line reads naturally:
/// `{"event":"decision","decision":"denied_global",...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The gateway evaluated a request and produced a decision.
    Decision { decision: DecisionKind },

    /// An approval ticket reached a terminal state.
    TicketDecided {
        status: TicketStatus,
        decided_by: Option<String>,
    },
}

/// One line in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonic, gap-free position in the log. Assigned by the sink,
    /// atomically with the write.
    pub sequence: u64,

    /// Unique identifier for this record.
    pub record_id: Uuid,

    /// When the record was created (UTC).
    pub timestamp: DateTime<Utc>,

    /// The action the event concerns.
    pub action_name: String,

    /// The mode active when the event occurred.
    pub mode: String,

    /// Who requested the action (or, for ticket events, who originally
    /// requested the ticketed action).
    pub requester: String,

    /// The event itself.
    #[serde(flatten)]
    pub outcome: AuditOutcome,

    /// Human-readable explanation, copied from the decision or ticket.
    pub reason: String,

    /// The approval ticket involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<Uuid>,

    /// SHA-256 of the previous record's JSON line. None only for the
    /// first record of a log file.
    pub previous_hash: Option<String>,
}

impl AuditRecord {
    /// Build a record for a gateway decision. `sequence` and
    /// `previous_hash` are placeholders until the sink appends it.
    pub fn for_decision(
        decision: &Decision,
        requester: impl Into<String>,
        ticket_id: Option<Uuid>,
    ) -> Self {
        Self {
            sequence: 0,
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action_name: decision.action_name.clone(),
            mode: decision.mode.clone(),
            requester: requester.into(),
            outcome: AuditOutcome::Decision {
                decision: decision.kind,
            },
            reason: decision.reason.clone(),
            ticket_id,
            previous_hash: None,
        }
    }

    /// Build a record for a ticket reaching a terminal state.
    pub fn for_ticket(ticket: &ApprovalTicket, mode: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            record_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action_name: ticket.action_name.clone(),
            mode: mode.into(),
            requester: ticket.requester.clone(),
            outcome: AuditOutcome::TicketDecided {
                status: ticket.status,
                decided_by: ticket.decided_by.clone(),
            },
            reason: format!(
                "approval ticket {} for action '{}' is {}",
                ticket.ticket_id, ticket.action_name, ticket.status
            ),
            ticket_id: Some(ticket.ticket_id),
            previous_hash: None,
        }
    }
}
