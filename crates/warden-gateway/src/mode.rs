// mode.rs — ModeController: the single source of truth for current mode.
//
// One RwLock over one small struct. Nothing else in the process may hold
// the current mode; everyone reads through `current()` and mutates
// through `transition()` / the temporary-grant calls, so every observed
// value is one some completed transition actually installed.
//
// Temporary elevation uses a monotonic deadline (Instant), checked
// lazily on every read. There is no timer thread: a grant observed past
// its deadline has already reverted, whether or not anything else ran.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use warden_policy::PolicyDocument;

use crate::error::GatewayError;

struct TemporaryGrant {
    deadline: Instant,
}

struct ModeState {
    /// The mode decisions evaluate against right now.
    current: String,
    /// The mode to revert to when a temporary grant ends.
    base: String,
    grant: Option<TemporaryGrant>,
}

/// Snapshot of the controller for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct ModeStatus {
    pub current: String,
    pub base: String,
    /// Seconds left on an active temporary grant, if any.
    pub temporary_remaining_secs: Option<u64>,
}

/// Owns and serializes all mutation of the process-wide current mode.
pub struct ModeController {
    state: RwLock<ModeState>,
}

impl ModeController {
    /// Start in the document's fail-safe default mode. Called before any
    /// decision can be evaluated, so `current()` never sees an
    /// uninitialized value.
    pub fn new(default_mode: impl Into<String>) -> Self {
        let mode = default_mode.into();
        Self {
            state: RwLock::new(ModeState {
                current: mode.clone(),
                base: mode,
                grant: None,
            }),
        }
    }

    /// The mode currently in force. Always a defined mode; an expired
    /// temporary grant reverts on this read if nothing saw it earlier.
    pub fn current(&self) -> String {
        {
            let state = self.read();
            match &state.grant {
                Some(grant) if Instant::now() >= grant.deadline => {} // revert below
                _ => return state.current.clone(),
            }
        }
        let mut state = self.write();
        expire_grant(&mut state);
        state.current.clone()
    }

    /// Permanently switch modes. Returns the mode that was previously in
    /// force, so each caller learns exactly what it displaced. Revokes
    /// any active temporary grant first.
    pub fn transition(
        &self,
        new_mode: &str,
        document: &PolicyDocument,
    ) -> Result<String, GatewayError> {
        if !document.contains_mode(new_mode) {
            return Err(GatewayError::UnknownMode {
                mode: new_mode.to_string(),
            });
        }
        let mut state = self.write();
        expire_grant(&mut state);
        let previous = state.current.clone();
        state.current = new_mode.to_string();
        state.base = new_mode.to_string();
        state.grant = None;
        info!(from = %previous, to = %new_mode, "mode transition");
        Ok(previous)
    }

    /// Temporarily elevate to `mode` for `duration`. The pre-grant mode
    /// is remembered as the base and restored when the grant ends.
    /// Granting over an active grant replaces its deadline and target
    /// but keeps the original base.
    pub fn grant_temporary(
        &self,
        mode: &str,
        duration: Duration,
        document: &PolicyDocument,
    ) -> Result<(), GatewayError> {
        if !document.contains_mode(mode) {
            return Err(GatewayError::UnknownMode {
                mode: mode.to_string(),
            });
        }
        let mut state = self.write();
        expire_grant(&mut state);
        if state.grant.is_none() {
            state.base = state.current.clone();
        }
        state.current = mode.to_string();
        state.grant = Some(TemporaryGrant {
            deadline: Instant::now() + duration,
        });
        info!(mode = %mode, base = %state.base, secs = duration.as_secs(), "temporary grant");
        Ok(())
    }

    /// Push an active grant's deadline out by `additional`. Returns the
    /// new remaining time. Fails if no grant is active (including one
    /// that just lapsed — a lapsed grant cannot be resurrected).
    pub fn extend_temporary(&self, additional: Duration) -> Result<Duration, GatewayError> {
        let mut state = self.write();
        expire_grant(&mut state);
        let grant = state.grant.as_mut().ok_or(GatewayError::NoActiveGrant)?;
        grant.deadline += additional;
        let remaining = grant.deadline.saturating_duration_since(Instant::now());
        info!(secs = remaining.as_secs(), "temporary grant extended");
        Ok(remaining)
    }

    /// Cut an active grant short, reverting to the base mode now.
    /// Returns whether there was a grant to revoke.
    pub fn revoke_temporary(&self) -> bool {
        let mut state = self.write();
        if state.grant.take().is_some() {
            state.current = state.base.clone();
            info!(mode = %state.current, "temporary grant revoked");
            true
        } else {
            false
        }
    }

    /// Current/base mode and grant remaining time, for status reporting.
    pub fn status(&self) -> ModeStatus {
        let mut state = self.write();
        expire_grant(&mut state);
        ModeStatus {
            current: state.current.clone(),
            base: state.base.clone(),
            temporary_remaining_secs: state
                .grant
                .as_ref()
                .map(|g| g.deadline.saturating_duration_since(Instant::now()).as_secs()),
        }
    }

    /// Force the controller onto a mode without document validation.
    /// Used only when a reloaded document no longer defines the active
    /// mode and the controller must fall back to the new default.
    pub(crate) fn force_reset(&self, mode: &str) {
        let mut state = self.write();
        state.current = mode.to_string();
        state.base = mode.to_string();
        state.grant = None;
    }

    fn read(&self) -> RwLockReadGuard<'_, ModeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ModeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Revert an expired grant in place. Caller holds the write lock.
fn expire_grant(state: &mut ModeState) {
    if let Some(grant) = &state.grant {
        if Instant::now() >= grant.deadline {
            state.grant = None;
            state.current = state.base.clone();
            info!(mode = %state.current, "temporary grant expired");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Arc;
    use std::thread;
    use warden_policy::ModeRule;

    fn document_with_modes(modes: &[&str]) -> PolicyDocument {
        let mut map = BTreeMap::new();
        for mode in modes {
            map.insert(
                mode.to_string(),
                ModeRule {
                    description: None,
                    allowed: ["read_logs".to_string()].into_iter().collect(),
                    denied: BTreeSet::new(),
                },
            );
        }
        let doc = PolicyDocument {
            name: "test".to_string(),
            version: String::new(),
            default_mode: modes[0].to_string(),
            global_deny: BTreeSet::new(),
            modes: map,
            requires_approval: BTreeSet::new(),
            predicates: BTreeMap::new(),
            time_windows: BTreeMap::new(),
        };
        doc.validate().unwrap();
        doc
    }

    #[test]
    fn starts_in_default_mode() {
        let controller = ModeController::new("NORMAL");
        assert_eq!(controller.current(), "NORMAL");
    }

    #[test]
    fn transition_returns_previous_mode() {
        let doc = document_with_modes(&["NORMAL", "EMERGENCY"]);
        let controller = ModeController::new("NORMAL");
        let previous = controller.transition("EMERGENCY", &doc).unwrap();
        assert_eq!(previous, "NORMAL");
        assert_eq!(controller.current(), "EMERGENCY");
    }

    #[test]
    fn unknown_mode_rejected_and_state_unchanged() {
        let doc = document_with_modes(&["NORMAL"]);
        let controller = ModeController::new("NORMAL");
        let err = controller.transition("PANIC", &doc).unwrap_err();
        assert!(matches!(err, GatewayError::UnknownMode { .. }));
        assert_eq!(controller.current(), "NORMAL");
    }

    #[test]
    fn temporary_grant_elevates_then_lapses() {
        let doc = document_with_modes(&["NORMAL", "EMERGENCY"]);
        let controller = ModeController::new("NORMAL");

        controller
            .grant_temporary("EMERGENCY", Duration::from_millis(30), &doc)
            .unwrap();
        assert_eq!(controller.current(), "EMERGENCY");

        thread::sleep(Duration::from_millis(80));
        // No sweep, no timer — the read alone reverts.
        assert_eq!(controller.current(), "NORMAL");
    }

    #[test]
    fn extend_pushes_deadline_out() {
        let doc = document_with_modes(&["NORMAL", "EMERGENCY"]);
        let controller = ModeController::new("NORMAL");
        controller
            .grant_temporary("EMERGENCY", Duration::from_millis(40), &doc)
            .unwrap();
        controller.extend_temporary(Duration::from_secs(60)).unwrap();

        thread::sleep(Duration::from_millis(80));
        // Would have lapsed without the extension.
        assert_eq!(controller.current(), "EMERGENCY");
    }

    #[test]
    fn extend_without_grant_fails() {
        let controller = ModeController::new("NORMAL");
        assert!(matches!(
            controller.extend_temporary(Duration::from_secs(10)),
            Err(GatewayError::NoActiveGrant)
        ));
    }

    #[test]
    fn lapsed_grant_cannot_be_extended() {
        let doc = document_with_modes(&["NORMAL", "EMERGENCY"]);
        let controller = ModeController::new("NORMAL");
        controller
            .grant_temporary("EMERGENCY", Duration::from_millis(10), &doc)
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(matches!(
            controller.extend_temporary(Duration::from_secs(10)),
            Err(GatewayError::NoActiveGrant)
        ));
        assert_eq!(controller.current(), "NORMAL");
    }

    #[test]
    fn revoke_returns_to_base() {
        let doc = document_with_modes(&["NORMAL", "EMERGENCY"]);
        let controller = ModeController::new("NORMAL");
        controller
            .grant_temporary("EMERGENCY", Duration::from_secs(60), &doc)
            .unwrap();
        assert!(controller.revoke_temporary());
        assert_eq!(controller.current(), "NORMAL");
        assert!(!controller.revoke_temporary()); // nothing left to revoke
    }

    #[test]
    fn permanent_transition_revokes_grant() {
        let doc = document_with_modes(&["NORMAL", "EMERGENCY", "MAINTENANCE"]);
        let controller = ModeController::new("NORMAL");
        controller
            .grant_temporary("EMERGENCY", Duration::from_secs(60), &doc)
            .unwrap();
        controller.transition("MAINTENANCE", &doc).unwrap();

        let status = controller.status();
        assert_eq!(status.current, "MAINTENANCE");
        assert_eq!(status.base, "MAINTENANCE");
        assert!(status.temporary_remaining_secs.is_none());
    }

    #[test]
    fn status_reports_remaining_time() {
        let doc = document_with_modes(&["NORMAL", "EMERGENCY"]);
        let controller = ModeController::new("NORMAL");
        controller
            .grant_temporary("EMERGENCY", Duration::from_secs(120), &doc)
            .unwrap();
        let status = controller.status();
        assert_eq!(status.current, "EMERGENCY");
        assert_eq!(status.base, "NORMAL");
        assert!(status.temporary_remaining_secs.is_some_and(|s| s > 100));
    }

    #[test]
    fn concurrent_transitions_are_linearizable() {
        let modes: Vec<String> = (0..8).map(|i| format!("MODE_{}", i)).collect();
        let mode_refs: Vec<&str> = modes.iter().map(|s| s.as_str()).collect();
        let doc = Arc::new(document_with_modes(&mode_refs));
        let controller = Arc::new(ModeController::new("MODE_0"));

        let mut handles = Vec::new();
        for mode in &modes {
            let controller = Arc::clone(&controller);
            let doc = Arc::clone(&doc);
            let mode = mode.clone();
            handles.push(thread::spawn(move || {
                controller.transition(&mode, &doc).unwrap();
            }));
        }
        // Concurrent readers must only ever see one of the defined modes.
        let reader = {
            let controller = Arc::clone(&controller);
            let valid: Vec<String> = modes.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    let seen = controller.current();
                    assert!(valid.contains(&seen), "undefined mode observed: {}", seen);
                }
            })
        };
        for h in handles {
            h.join().unwrap();
        }
        reader.join().unwrap();

        // After all transitions complete, the winner is one of the targets.
        assert!(modes.contains(&controller.current()));
    }
}
