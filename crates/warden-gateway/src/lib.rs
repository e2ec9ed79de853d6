//! # warden-gateway
//!
//! The façade external callers use to get a policy decision.
//!
//! [`DecisionGateway`] orchestrates one request end to end: take a
//! consistent (document, mode) snapshot, run the pure decision engine,
//! open an approval ticket when the action is approval-gated, write
//! exactly one audit record, and only then return the decision. A
//! decision that cannot be audited is an error, never an unaudited allow.
//!
//! The gateway never executes actions. Callers invoke their executor only
//! when the returned decision kind is `Allowed`.
//!
//! [`ModeController`] owns the single source of truth for the current
//! operational mode: permanent transitions, plus time-limited temporary
//! elevation with monotonic lazy expiry.

pub mod config;
pub mod error;
pub mod gateway;
pub mod mode;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{DecisionGateway, GatewayDecision, StatusReport};
pub use mode::{ModeController, ModeStatus};
