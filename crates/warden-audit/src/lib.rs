//! # warden-audit
//!
//! Append-only audit log for policy decisions and approval transitions.
//!
//! Every decision the gateway produces — allowed, denied, or pending —
//! becomes exactly one [`AuditRecord`] in a JSONL file, written *before*
//! the decision is returned to the caller. Records carry a gap-free,
//! monotonic sequence number assigned atomically with the write, plus a
//! SHA-256 hash chain link to the previous record for tamper evidence.
//!
//! Sequence numbers survive restarts: on open the sink re-reads the last
//! record and continues from there, so a replayed log is a total order
//! over the process's entire decision history.

pub mod error;
pub mod record;
pub mod sink;

pub use error::AuditError;
pub use record::{AuditOutcome, AuditRecord};
pub use sink::AuditSink;
