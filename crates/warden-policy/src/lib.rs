//! # warden-policy
//!
//! Policy document model and decision engine for Warden.
//!
//! A [`PolicyDocument`] declares which actions are permitted in which
//! operational mode: a global deny list that no mode can override, per-mode
//! allow/deny lists, optional narrowing predicates on request arguments,
//! optional time-of-day windows, and a set of actions gated on human
//! approval. [`evaluate`] is the single pure chokepoint that turns a
//! `(document, mode, request)` triple into a [`Decision`].
//!
//! ## Key invariants
//!
//! - **Fail closed**: an action name not present anywhere in the document
//!   is denied, never silently allowed.
//! - **Global deny is absolute**: no mode rule can resurrect an action in
//!   the global deny list.
//! - **Whitelist semantics**: absence from a mode's allowed list is itself
//!   a denial, independent of the mode's denied list.
//! - **Predicates only narrow**: they can deny something otherwise allowed,
//!   never the reverse.

pub mod document;
pub mod engine;
pub mod error;

pub use document::{AttributePredicate, ModeRule, PolicyDocument, TimeWindow};
pub use engine::{evaluate, ActionRequest, ArgValue, Decision, DecisionKind};
pub use error::PolicyError;
