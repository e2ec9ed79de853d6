// error.rs — Error types for the approval subsystem.

use thiserror::Error;
use uuid::Uuid;

/// Errors from approval ticket operations. These reject the call and
/// change no ticket state.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No ticket with the given id exists.
    #[error("approval ticket not found: {0}")]
    TicketNotFound(Uuid),

    /// The ticket is already in a terminal state.
    #[error("invalid ticket transition from {from} to {to} for ticket {ticket_id}")]
    InvalidTicketState {
        ticket_id: Uuid,
        from: String,
        to: String,
    },
}
