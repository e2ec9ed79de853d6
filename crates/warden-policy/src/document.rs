// document.rs — The policy document model.
//
// A PolicyDocument is loaded once, validated as a whole, and treated as
// immutable from then on. Hot reload builds a *new* document and swaps the
// pointer; an in-flight evaluation keeps using the snapshot it started with.
//
// Validation is all-or-nothing: any inconsistency (overlapping allow/deny
// lists, unknown default mode, a predicate naming an action the document
// has never heard of) rejects the whole document. A half-valid policy must
// never become the active one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// The allow/deny lists for a single operational mode.
///
/// Invariant (enforced at load): `allowed` and `denied` are disjoint.
/// Both lists deny independently — an action absent from `allowed` is
/// denied even if it is also absent from `denied`. The two checks are
/// deliberately separate (belt and suspenders), not redundant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeRule {
    /// Human-readable description of the mode's posture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Actions explicitly permitted in this mode (whitelist).
    #[serde(default)]
    pub allowed: BTreeSet<String>,

    /// Actions explicitly blocked in this mode.
    #[serde(default)]
    pub denied: BTreeSet<String>,
}

/// A narrowing predicate on one request argument.
///
/// Fires (denies) when the named argument's value matches any of the
/// protected glob patterns — unless the active mode is `unless_mode`.
/// Predicates can only narrow: they never allow anything that the tier
/// checks would have denied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttributePredicate {
    /// Which argument key this predicate reads. Declared here so a
    /// predicate referencing a bogus key is caught at load, not at
    /// evaluation.
    pub key: String,

    /// Glob patterns describing protected values (e.g., "prod-*").
    pub protected: Vec<String>,

    /// Mode in which this predicate is suspended, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless_mode: Option<String>,
}

/// An allowed hour-of-day range for an action, UTC, half-open.
///
/// `start_hour == 22, end_hour == 6` is a valid window wrapping midnight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl TimeWindow {
    /// Whether the given UTC hour falls inside the window.
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour < self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            // Wraps midnight: [start, 24) ∪ [0, end).
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// The root policy entity.
///
/// Serialized as JSON or YAML:
///
/// ```yaml
/// name: ops-policy
/// version: "2.0"
/// default_mode: NORMAL
/// global_deny: [delete_database]
/// modes:
///   NORMAL:
///     allowed: [get_service_status, read_logs]
///     denied: [restart_service, scale_fleet]
///   EMERGENCY:
///     allowed: [get_service_status, read_logs, restart_service, scale_fleet]
///     denied: []
/// requires_approval: [scale_fleet]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDocument {
    /// Display name for operator-facing output.
    pub name: String,

    /// Document revision string (opaque, for audit context).
    #[serde(default)]
    pub version: String,

    /// The fail-safe mode the controller starts in.
    pub default_mode: String,

    /// Actions unconditionally denied in every mode. No mode rule can
    /// override membership here.
    #[serde(default)]
    pub global_deny: BTreeSet<String>,

    /// Mode name → rule. At least one mode must exist.
    pub modes: BTreeMap<String, ModeRule>,

    /// Actions that require a human approval ticket before execution.
    #[serde(default)]
    pub requires_approval: BTreeSet<String>,

    /// Action name → narrowing argument predicate.
    #[serde(default)]
    pub predicates: BTreeMap<String, AttributePredicate>,

    /// Action name → allowed hour-of-day window.
    #[serde(default)]
    pub time_windows: BTreeMap<String, TimeWindow>,
}

impl PolicyDocument {
    /// Parse and validate a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = serde_json::from_str(s)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(s: &str) -> Result<Self, PolicyError> {
        let doc: PolicyDocument = serde_yaml::from_str(s)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Load and validate a document from disk.
    ///
    /// Format is chosen by extension: `.yaml`/`.yml` parse as YAML,
    /// everything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml {
            Self::from_yaml_str(&data)
        } else {
            Self::from_json_str(&data)
        }
    }

    /// The union of every action name the document knows about: all
    /// modes' allowed and denied lists plus the global deny list.
    ///
    /// This is the membership test behind the unknown-action check —
    /// an action only in `global_deny` is still a *known* action.
    pub fn known_actions(&self) -> BTreeSet<String> {
        let mut actions = self.global_deny.clone();
        for rule in self.modes.values() {
            actions.extend(rule.allowed.iter().cloned());
            actions.extend(rule.denied.iter().cloned());
        }
        actions
    }

    /// Whether the document defines the given mode.
    pub fn contains_mode(&self, mode: &str) -> bool {
        self.modes.contains_key(mode)
    }

    /// Look up the rule for a mode.
    pub fn mode_rule(&self, mode: &str) -> Option<&ModeRule> {
        self.modes.get(mode)
    }

    /// Check every document invariant. Called by all `from_*` loaders.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.modes.is_empty() {
            return Err(PolicyError::NoModes);
        }
        if !self.modes.contains_key(&self.default_mode) {
            return Err(PolicyError::UnknownDefaultMode {
                mode: self.default_mode.clone(),
            });
        }

        for action in &self.global_deny {
            if action.is_empty() {
                return Err(PolicyError::EmptyActionName {
                    context: "global_deny".to_string(),
                });
            }
        }

        for (mode, rule) in &self.modes {
            for action in rule.allowed.iter().chain(rule.denied.iter()) {
                if action.is_empty() {
                    return Err(PolicyError::EmptyActionName {
                        context: format!("mode '{}'", mode),
                    });
                }
            }
            if let Some(action) = rule.allowed.intersection(&rule.denied).next() {
                return Err(PolicyError::AllowDenyOverlap {
                    mode: mode.clone(),
                    action: action.clone(),
                });
            }
        }

        let known = self.known_actions();

        for action in &self.requires_approval {
            if !known.contains(action) {
                return Err(PolicyError::UnknownAction {
                    context: "requires_approval".to_string(),
                    action: action.clone(),
                });
            }
        }

        for (action, predicate) in &self.predicates {
            if !known.contains(action) {
                return Err(PolicyError::UnknownAction {
                    context: "predicates".to_string(),
                    action: action.clone(),
                });
            }
            if predicate.key.is_empty() {
                return Err(PolicyError::EmptyActionName {
                    context: format!("predicate key for action '{}'", action),
                });
            }
            if let Some(mode) = &predicate.unless_mode {
                if !self.modes.contains_key(mode) {
                    return Err(PolicyError::UnknownPredicateMode {
                        action: action.clone(),
                        mode: mode.clone(),
                    });
                }
            }
            for pattern in &predicate.protected {
                if let Err(e) = glob::Pattern::new(pattern) {
                    return Err(PolicyError::InvalidPattern {
                        action: action.clone(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for (action, window) in &self.time_windows {
            if !known.contains(action) {
                return Err(PolicyError::UnknownAction {
                    context: "time_windows".to_string(),
                    action: action.clone(),
                });
            }
            if window.start_hour > 23 || window.end_hour > 23 {
                return Err(PolicyError::InvalidTimeWindow {
                    action: action.clone(),
                    reason: format!(
                        "hours must be 0..=23, got {}..{}",
                        window.start_hour, window.end_hour
                    ),
                });
            }
            if window.start_hour == window.end_hour {
                return Err(PolicyError::InvalidTimeWindow {
                    action: action.clone(),
                    reason: "window is zero-width".to_string(),
                });
            }
        }

        Ok(())
    }
}
