// gateway.rs — DecisionGateway: the single entry point for decisions.
//
// Per request: snapshot (document, mode) → pure engine evaluation →
// open an approval ticket on PendingApproval → append exactly one audit
// record → return. The audit write happens before the decision leaves
// this module; if it fails, the caller gets an error, not a decision.
//
// The document pointer lives behind a RwLock<Arc<...>>: a reload builds
// and validates a whole new document, then swaps the Arc. Evaluations
// that already cloned the old Arc finish against that snapshot.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use warden_approval::{ApprovalOutcome, ApprovalTicket, TicketStatus, TicketTable};
use warden_audit::{AuditRecord, AuditSink};
use warden_policy::{evaluate, ActionRequest, Decision, DecisionKind, PolicyDocument};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::mode::{ModeController, ModeStatus};

/// What the gateway hands back for one request: the decision, plus the
/// approval ticket id when one was opened.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayDecision {
    pub decision: Decision,
    pub ticket_id: Option<Uuid>,
}

/// Snapshot of the gateway for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub policy_name: String,
    pub policy_version: String,
    pub mode: ModeStatus,
    /// Actions allowed in the current mode.
    pub allowed_actions: Vec<String>,
    /// Actions denied in the current mode.
    pub denied_actions: Vec<String>,
    pub pending_tickets: usize,
}

/// The policy decision core, assembled.
pub struct DecisionGateway {
    document: RwLock<Arc<PolicyDocument>>,
    modes: ModeController,
    tickets: TicketTable,
    audit: AuditSink,
}

impl DecisionGateway {
    /// Assemble a gateway around an already-validated document.
    pub fn new(
        document: PolicyDocument,
        audit_log: impl AsRef<Path>,
        approval_ttl: Duration,
    ) -> Result<Self, GatewayError> {
        let audit = AuditSink::open(audit_log)?;
        let modes = ModeController::new(document.default_mode.clone());
        info!(
            policy = %document.name,
            mode = %document.default_mode,
            "decision gateway ready"
        );
        Ok(Self {
            document: RwLock::new(Arc::new(document)),
            modes,
            tickets: TicketTable::new(approval_ttl),
            audit,
        })
    }

    /// Load the policy document named by the config and assemble a
    /// gateway. A document that fails validation halts startup here.
    pub fn open(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let document = PolicyDocument::from_file(&config.policy_path)?;
        Self::new(document, &config.audit_log, config.approval_ttl())
    }

    /// Decide one action request.
    ///
    /// Exactly one audit record is written before this returns. On
    /// `Err` — including an audit write failure — no decision has been
    /// durably recorded and the caller must treat the action as denied.
    pub fn decide(&self, request: &ActionRequest) -> Result<GatewayDecision, GatewayError> {
        let document = self.snapshot();
        let mode = self.modes.current();
        let decision = evaluate(&document, &mode, request);

        let ticket_id = (decision.kind == DecisionKind::PendingApproval)
            .then(|| self.tickets.create(request));

        let mut record = AuditRecord::for_decision(&decision, &request.requester, ticket_id);
        self.audit.record(&mut record)?;

        if decision.kind.is_allowed() {
            info!(action = %decision.action_name, mode = %decision.mode, "action allowed");
        } else {
            warn!(
                action = %decision.action_name,
                mode = %decision.mode,
                kind = %decision.kind,
                reason = %decision.reason,
                "action not allowed"
            );
        }

        Ok(GatewayDecision {
            decision,
            ticket_id,
        })
    }

    /// Settle an approval ticket. The transition is itself an auditable
    /// event and gets its own record.
    pub fn decide_approval(
        &self,
        ticket_id: Uuid,
        approver: &str,
        outcome: ApprovalOutcome,
    ) -> Result<ApprovalTicket, GatewayError> {
        let ticket = self.tickets.decide(ticket_id, approver, outcome)?;
        let mut record = AuditRecord::for_ticket(&ticket, self.modes.current());
        self.audit.record(&mut record)?;
        Ok(ticket)
    }

    /// Resolve a ticket into a decision the caller can act on.
    ///
    /// Approved → `Allowed`; Rejected/Expired → `DeniedApproval` with the
    /// terminal state in the reason; still Pending → `PendingApproval`
    /// again (poll later). Each resolution is a distinct auditable event,
    /// not a silent continuation of the original request.
    pub fn resolve(&self, ticket_id: Uuid) -> Result<GatewayDecision, GatewayError> {
        let ticket = self.tickets.get(ticket_id)?;
        let mode = self.modes.current();

        let decision = match ticket.status {
            TicketStatus::Pending => Decision::new(
                DecisionKind::PendingApproval,
                &ticket.action_name,
                &mode,
                format!("approval ticket {} is still pending", ticket_id),
            ),
            TicketStatus::Approved => Decision::new(
                DecisionKind::Allowed,
                &ticket.action_name,
                &mode,
                format!(
                    "action '{}' approved by {}",
                    ticket.action_name,
                    ticket.decided_by.as_deref().unwrap_or("unknown")
                ),
            ),
            TicketStatus::Rejected => Decision::new(
                DecisionKind::DeniedApproval,
                &ticket.action_name,
                &mode,
                format!(
                    "approval ticket {} was rejected by {}",
                    ticket_id,
                    ticket.decided_by.as_deref().unwrap_or("unknown")
                ),
            ),
            TicketStatus::Expired => Decision::new(
                DecisionKind::DeniedApproval,
                &ticket.action_name,
                &mode,
                format!("approval ticket {} expired before a decision", ticket_id),
            ),
        };

        let mut record =
            AuditRecord::for_decision(&decision, &ticket.requester, Some(ticket_id));
        self.audit.record(&mut record)?;

        Ok(GatewayDecision {
            decision,
            ticket_id: Some(ticket_id),
        })
    }

    /// Permanently switch the operational mode. Returns the displaced mode.
    pub fn set_mode(&self, mode: &str) -> Result<String, GatewayError> {
        let document = self.snapshot();
        self.modes.transition(mode, &document)
    }

    /// Temporarily elevate to `mode` for `duration` (reverts on its own).
    pub fn grant_temporary(&self, mode: &str, duration: Duration) -> Result<(), GatewayError> {
        let document = self.snapshot();
        self.modes.grant_temporary(mode, duration, &document)
    }

    /// Extend an active temporary grant; returns the new remaining time.
    pub fn extend_temporary(&self, additional: Duration) -> Result<Duration, GatewayError> {
        self.modes.extend_temporary(additional)
    }

    /// Revoke an active temporary grant; returns whether one existed.
    pub fn revoke_temporary(&self) -> bool {
        self.modes.revoke_temporary()
    }

    /// Hot-swap the policy document. The new document is fully validated
    /// before the swap; on any error the old document stays active. If
    /// the new document no longer defines the active mode, the controller
    /// falls back to the new default mode.
    pub fn reload(&self, document: PolicyDocument) -> Result<(), GatewayError> {
        document.validate()?;
        let name = document.name.clone();
        {
            let mut slot = self
                .document
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *slot = Arc::new(document);
        }
        let document = self.snapshot();
        let current = self.modes.current();
        if !document.contains_mode(&current) {
            warn!(
                mode = %current,
                fallback = %document.default_mode,
                "reloaded policy dropped the active mode, falling back to default"
            );
            self.modes.force_reset(&document.default_mode);
        }
        info!(policy = %name, "policy document reloaded");
        Ok(())
    }

    /// Load, validate, and hot-swap a document from disk.
    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<(), GatewayError> {
        let document = PolicyDocument::from_file(path)?;
        self.reload(document)
    }

    /// Current mode, policy identity, per-mode action lists, and the
    /// pending-ticket count.
    pub fn status(&self) -> StatusReport {
        let document = self.snapshot();
        let mode = self.modes.status();
        let (allowed, denied) = match document.mode_rule(&mode.current) {
            Some(rule) => (
                rule.allowed.iter().cloned().collect(),
                rule.denied.iter().cloned().collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        StatusReport {
            policy_name: document.name.clone(),
            policy_version: document.version.clone(),
            mode,
            allowed_actions: allowed,
            denied_actions: denied,
            pending_tickets: self.tickets.pending().len(),
        }
    }

    /// Pending tickets, oldest first, for the approver surface.
    pub fn pending_tickets(&self) -> Vec<ApprovalTicket> {
        self.tickets.pending()
    }

    /// The path of the audit log this gateway writes.
    pub fn audit_path(&self) -> &Path {
        self.audit.path()
    }

    /// Clone the active document pointer. Evaluations against this
    /// snapshot stay consistent even if a reload swaps the slot.
    fn snapshot(&self) -> Arc<PolicyDocument> {
        self.document
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
