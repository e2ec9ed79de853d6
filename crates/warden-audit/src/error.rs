// error.rs — Error types for the audit subsystem.
//
// An audit failure is load-bearing: the gateway turns any error from
// `record()` into a denial of the in-flight action. Better an
// over-cautious denial than an unaudited allow.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during audit operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the audit log file.
    #[error("failed to open audit log at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a record to the log.
    #[error("failed to append audit record: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize a record (malformed JSON).
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Sequence numbers are not contiguous — records were lost or forged.
    #[error("sequence gap at line {line}: expected {expected}, got {actual}")]
    SequenceGap {
        line: usize,
        expected: u64,
        actual: u64,
    },

    /// The hash chain is broken — a record was altered, inserted, or removed.
    #[error("hash chain broken at line {line}")]
    ChainBroken { line: usize },
}
