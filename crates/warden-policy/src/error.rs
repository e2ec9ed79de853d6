// error.rs — Error types for the policy subsystem.
//
// These cover document loading and validation only. Decision outcomes
// (denied-by-mode, not-whitelisted, ...) are ordinary `Decision` values
// returned by the engine, never errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating a policy document.
///
/// Any of these rejects the whole document — a partially valid policy
/// never becomes active.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Failed to read the policy document from disk.
    #[error("failed to read policy document at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The document is not valid JSON.
    #[error("malformed policy JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// The document is not valid YAML.
    #[error("malformed policy YAML: {0}")]
    MalformedYaml(#[from] serde_yaml::Error),

    /// The document defines no modes at all.
    #[error("policy document defines no modes")]
    NoModes,

    /// The designated default mode is not a key of `modes`.
    #[error("default mode '{mode}' is not defined in the document")]
    UnknownDefaultMode { mode: String },

    /// A mode lists the same action as both allowed and denied.
    #[error("mode '{mode}' lists action '{action}' as both allowed and denied")]
    AllowDenyOverlap { mode: String, action: String },

    /// An action name somewhere in the document is the empty string.
    #[error("empty action name in {context}")]
    EmptyActionName { context: String },

    /// A predicate, time window, or approval flag references an action
    /// the document does not otherwise know about.
    #[error("{context} references unknown action '{action}'")]
    UnknownAction { context: String, action: String },

    /// A predicate's exempting mode is not defined in the document.
    #[error("predicate for action '{action}' exempts unknown mode '{mode}'")]
    UnknownPredicateMode { action: String, mode: String },

    /// A predicate protected-set entry is not a valid glob pattern.
    #[error("predicate for action '{action}' has invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        action: String,
        pattern: String,
        reason: String,
    },

    /// A time window references an hour outside 0..=23, or is zero-width.
    #[error("invalid time window for action '{action}': {reason}")]
    InvalidTimeWindow { action: String, reason: String },
}
