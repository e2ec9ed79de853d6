// error.rs — Error types for the gateway subsystem.
//
// Decision outcomes are never errors. These cover admin misuse (unknown
// mode, bad ticket calls), document load failures, and the one failure
// that denies an otherwise fine action: an audit write that didn't land.

use thiserror::Error;

use warden_approval::ApprovalError;
use warden_audit::AuditError;
use warden_policy::PolicyError;

/// Errors surfaced by the decision gateway and mode controller.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Loading or validating a policy document failed. At startup this is
    /// fatal; on reload the previous document stays active.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A mode transition or temporary grant named a mode the active
    /// document does not define. The current mode is unchanged.
    #[error("unknown mode '{mode}'")]
    UnknownMode { mode: String },

    /// An extend call arrived with no temporary grant active.
    #[error("no active temporary grant")]
    NoActiveGrant,

    /// An approval API call was rejected (unknown ticket, or the ticket
    /// is already terminal).
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// The audit write for an in-flight action failed. Fail closed: the
    /// caller must treat this as a denial — the decision was produced
    /// but is not durably recorded, so it must not be acted on.
    #[error("audit write failed, action must be denied: {0}")]
    Audit(#[from] AuditError),
}
