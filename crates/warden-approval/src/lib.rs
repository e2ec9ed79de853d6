//! # warden-approval
//!
//! Approval tickets for actions flagged as requiring human sign-off.
//!
//! When the decision engine reports `PendingApproval`, the gateway opens an
//! [`ApprovalTicket`] here and hands the caller its id. A human approver
//! later settles the ticket exactly once (`Pending → Approved` or
//! `Pending → Rejected`), or it expires on its own once the configured TTL
//! elapses. Terminal states never transition again.
//!
//! Expiry is enforced lazily against a monotonic deadline on every read —
//! a ticket observed past its TTL is already `Expired`, whether or not any
//! background sweep has run.

pub mod error;
pub mod table;
pub mod ticket;

pub use error::ApprovalError;
pub use table::TicketTable;
pub use ticket::{ApprovalOutcome, ApprovalTicket, TicketStatus};
