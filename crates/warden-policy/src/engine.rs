// engine.rs — The tiered decision engine.
//
// `evaluate()` is a pure function over an immutable document snapshot:
// no shared state, no I/O, no clock reads (the request carries its own
// timestamp). Every action request in the system flows through here.
//
// The precedence is strict and short-circuiting:
//
// 1. Action unknown to the document entirely? → DeniedUnknownAction
// 2. In the global deny list? → DeniedGlobal (no mode can override)
// 3. In the mode's denied list? → DeniedByMode
// 4. Absent from the mode's allowed list? → DeniedNotWhitelisted
// 5. Outside the action's time window? → DeniedTimeWindow
// 6. Argument predicate fires? → DeniedByPredicate
// 7. Flagged requires-approval? → PendingApproval
// 8. Otherwise → Allowed
//
// Steps 3 and 4 are independently denying on purpose: a mode's denied
// list and its allowed list may disagree about actions defined elsewhere
// in the document, and either one alone must be enough to deny.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::document::PolicyDocument;

/// A request argument value — a small closed set of kinds.
///
/// `#[serde(untagged)]` makes these read naturally from JSON:
/// `"prod-db"`, `3`, `true`, `["a", "b"]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ArgValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// The string forms this value exposes to predicate matching.
    /// A list exposes each of its elements.
    fn match_strings(&self) -> Vec<String> {
        match self {
            ArgValue::String(s) => vec![s.clone()],
            ArgValue::Number(n) => vec![n.to_string()],
            ArgValue::Bool(b) => vec![b.to_string()],
            ArgValue::List(items) => items.iter().flat_map(|v| v.match_strings()).collect(),
        }
    }
}

impl From<&str> for ArgValue {
    fn from(s: &str) -> Self {
        ArgValue::String(s.to_string())
    }
}

/// One request to perform an action, as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// The action being requested (e.g., "restart_service").
    pub action_name: String,

    /// Request arguments. Opaque to the engine except where a predicate
    /// names a specific key.
    #[serde(default)]
    pub arguments: BTreeMap<String, ArgValue>,

    /// Opaque identity of the requester.
    pub requester: String,

    /// When the request was made (UTC). Time-window checks read this,
    /// never the wall clock.
    pub timestamp: DateTime<Utc>,
}

impl ActionRequest {
    /// Create a request stamped with the current time.
    pub fn new(action_name: impl Into<String>, requester: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            arguments: BTreeMap::new(),
            requester: requester.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach an argument and return self (builder pattern).
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Which tier produced the decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// The action may proceed.
    Allowed,
    /// The action is in the global deny list.
    DeniedGlobal,
    /// The action is in the active mode's denied list.
    DeniedByMode,
    /// The action is absent from the active mode's allowed list.
    DeniedNotWhitelisted,
    /// An argument predicate fired.
    DeniedByPredicate,
    /// The request falls outside the action's time window.
    DeniedTimeWindow,
    /// The action needs a human approval ticket; one has been (or will
    /// be) opened.
    PendingApproval,
    /// The action name is unknown to the policy document.
    DeniedUnknownAction,
    /// An approval ticket for the action was rejected or expired.
    /// Produced by ticket resolution, never by `evaluate()` itself.
    DeniedApproval,
}

impl DecisionKind {
    /// Whether this kind permits execution. Everything except `Allowed`
    /// — including `PendingApproval` — does not.
    pub fn is_allowed(&self) -> bool {
        matches!(self, DecisionKind::Allowed)
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecisionKind::Allowed => "allowed",
            DecisionKind::DeniedGlobal => "denied_global",
            DecisionKind::DeniedByMode => "denied_by_mode",
            DecisionKind::DeniedNotWhitelisted => "denied_not_whitelisted",
            DecisionKind::DeniedByPredicate => "denied_by_predicate",
            DecisionKind::DeniedTimeWindow => "denied_time_window",
            DecisionKind::PendingApproval => "pending_approval",
            DecisionKind::DeniedUnknownAction => "denied_unknown_action",
            DecisionKind::DeniedApproval => "denied_approval",
        };
        write!(f, "{}", s)
    }
}

/// The outcome of evaluating one request. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub kind: DecisionKind,

    /// The action the decision is about.
    pub action_name: String,

    /// The mode that was active when the decision was made. Under a
    /// concurrent transition this names exactly the mode the evaluation
    /// used, so the audit trail is unambiguous.
    pub mode: String,

    /// Specific, tier-identifying explanation for the operator.
    pub reason: String,
}

impl Decision {
    pub fn new(
        kind: DecisionKind,
        action_name: impl Into<String>,
        mode: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            action_name: action_name.into(),
            mode: mode.into(),
            reason: reason.into(),
        }
    }
}

/// Evaluate a request against a document snapshot and an active mode.
///
/// Pure: the same `(document, mode, request)` triple always yields the
/// same decision. The caller owns snapshot consistency — this function
/// never reads shared state.
pub fn evaluate(document: &PolicyDocument, mode: &str, request: &ActionRequest) -> Decision {
    let action = request.action_name.as_str();

    // Step 1: fail closed on action names the document has never heard
    // of. Membership counts the global deny list, so an action that is
    // *only* globally denied is still known and reports DeniedGlobal.
    if !document.known_actions().contains(action) {
        return Decision::new(
            DecisionKind::DeniedUnknownAction,
            action,
            mode,
            format!("unknown action '{}'", action),
        );
    }

    // Step 2: the global deny list ignores mode entirely.
    if document.global_deny.contains(action) {
        return Decision::new(
            DecisionKind::DeniedGlobal,
            action,
            mode,
            format!("action '{}' is globally denied", action),
        );
    }

    // Steps 3–4: mode-scoped deny list, then whitelist. A mode name with
    // no rule (possible only through a hot-swap race) fails closed.
    let rule = match document.mode_rule(mode) {
        Some(rule) => rule,
        None => {
            return Decision::new(
                DecisionKind::DeniedNotWhitelisted,
                action,
                mode,
                format!("mode '{}' is not defined in the active policy", mode),
            );
        }
    };

    if rule.denied.contains(action) {
        return Decision::new(
            DecisionKind::DeniedByMode,
            action,
            mode,
            format!("action '{}' is blocked in {} mode", action, mode),
        );
    }

    if !rule.allowed.contains(action) {
        return Decision::new(
            DecisionKind::DeniedNotWhitelisted,
            action,
            mode,
            format!("action '{}' is not whitelisted for {} mode", action, mode),
        );
    }

    // Step 5: time-of-day window, read from the request timestamp.
    if let Some(window) = document.time_windows.get(action) {
        let hour = request.timestamp.hour();
        if !window.contains(hour) {
            return Decision::new(
                DecisionKind::DeniedTimeWindow,
                action,
                mode,
                format!(
                    "action '{}' is outside its allowed window (hour {} UTC, window {}..{})",
                    action, hour, window.start_hour, window.end_hour
                ),
            );
        }
    }

    // Step 6: narrowing argument predicate.
    if let Some(predicate) = document.predicates.get(action) {
        let exempt = predicate.unless_mode.as_deref() == Some(mode);
        if !exempt {
            if let Some(value) = request.arguments.get(&predicate.key) {
                if let Some(hit) = protected_match(&predicate.protected, value) {
                    return Decision::new(
                        DecisionKind::DeniedByPredicate,
                        action,
                        mode,
                        format!(
                            "argument '{}' value '{}' is protected for action '{}'",
                            predicate.key, hit, action
                        ),
                    );
                }
            }
        }
    }

    // Step 7: approval gate — the action is permitted, but only behind
    // a human sign-off.
    if document.requires_approval.contains(action) {
        return Decision::new(
            DecisionKind::PendingApproval,
            action,
            mode,
            format!("action '{}' requires human approval", action),
        );
    }

    // Step 8: nothing denied it.
    Decision::new(
        DecisionKind::Allowed,
        action,
        mode,
        format!("action '{}' allowed in {} mode", action, mode),
    )
}

/// Return the first string form of `value` that matches a protected
/// pattern, if any. Invalid patterns never match — load-time validation
/// rejects them, but the engine stays fail-closed regardless.
fn protected_match(patterns: &[String], value: &ArgValue) -> Option<String> {
    let candidates = value.match_strings();
    for pattern in patterns {
        if let Ok(p) = glob::Pattern::new(pattern) {
            if let Some(hit) = candidates.iter().find(|c| p.matches(c)) {
                return Some(hit.clone());
            }
        }
    }
    None
}
