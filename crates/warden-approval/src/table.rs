// table.rs — TicketTable: the exclusively-owned ticket store.
//
// One mutex over one HashMap. Every public method takes &self and locks
// for the duration of its own lookup/update only — ticket operations for
// different requests never block on anything but this narrow section.
//
// Expiry discipline: each entry carries a monotonic deadline
// (Instant-based, immune to wall-clock adjustment). Every read path calls
// `expire_if_due` first, so a ticket past its TTL is Expired the moment
// anyone looks at it. `sweep_expired` exists for housekeeping but nothing
// depends on it having run.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;
use uuid::Uuid;

use warden_policy::ActionRequest;

use crate::error::ApprovalError;
use crate::ticket::{ApprovalOutcome, ApprovalTicket, TicketStatus};

struct Entry {
    ticket: ApprovalTicket,
    /// Monotonic expiry deadline: created-at + TTL.
    deadline: Instant,
}

/// Concurrent table of approval tickets with TTL-based expiry.
pub struct TicketTable {
    ttl: Duration,
    inner: Mutex<HashMap<Uuid, Entry>>,
}

impl TicketTable {
    /// Create an empty table; tickets expire `ttl` after creation.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// The configured time-to-live for new tickets.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Open a ticket for a request and return its id.
    ///
    /// Does not consult policy — the decision engine has already
    /// established that this action needs approval.
    pub fn create(&self, request: &ActionRequest) -> Uuid {
        let ticket = ApprovalTicket::for_request(request);
        let id = ticket.ticket_id;
        info!(ticket_id = %id, action = %ticket.action_name, "approval ticket opened");
        self.lock().insert(
            id,
            Entry {
                ticket,
                deadline: Instant::now() + self.ttl,
            },
        );
        id
    }

    /// Fetch a snapshot of a ticket, applying lazy expiry first.
    pub fn get(&self, ticket_id: Uuid) -> Result<ApprovalTicket, ApprovalError> {
        let mut table = self.lock();
        let entry = table
            .get_mut(&ticket_id)
            .ok_or(ApprovalError::TicketNotFound(ticket_id))?;
        expire_if_due(entry);
        Ok(entry.ticket.clone())
    }

    /// Settle a pending ticket. Fails without state change if the ticket
    /// is unknown or already terminal (including already expired —
    /// expiry wins a race against a late approver).
    pub fn decide(
        &self,
        ticket_id: Uuid,
        approver: &str,
        outcome: ApprovalOutcome,
    ) -> Result<ApprovalTicket, ApprovalError> {
        let mut table = self.lock();
        let entry = table
            .get_mut(&ticket_id)
            .ok_or(ApprovalError::TicketNotFound(ticket_id))?;
        expire_if_due(entry);
        entry
            .ticket
            .transition(outcome.target_status(), Some(approver.to_string()))?;
        info!(
            ticket_id = %ticket_id,
            status = %entry.ticket.status,
            approver = approver,
            "approval ticket settled"
        );
        Ok(entry.ticket.clone())
    }

    /// Expire every pending ticket past its deadline; returns the ids
    /// that flipped. Purely housekeeping — `get`/`decide` already treat
    /// overdue tickets as expired.
    pub fn sweep_expired(&self) -> Vec<Uuid> {
        let mut expired = Vec::new();
        let mut table = self.lock();
        for (id, entry) in table.iter_mut() {
            if entry.ticket.status == TicketStatus::Pending && expire_if_due(entry) {
                expired.push(*id);
            }
        }
        expired
    }

    /// Snapshot of all still-pending tickets (after lazy expiry).
    pub fn pending(&self) -> Vec<ApprovalTicket> {
        let mut table = self.lock();
        let mut pending: Vec<ApprovalTicket> = table
            .values_mut()
            .filter_map(|entry| {
                expire_if_due(entry);
                (entry.ticket.status == TicketStatus::Pending).then(|| entry.ticket.clone())
            })
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        // A poisoned lock means some thread panicked mid-update; the map
        // itself is still structurally sound, and refusing all further
        // approvals would turn one panic into a total outage.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Flip a pending entry to Expired if its deadline has passed.
/// Returns true if it flipped on this call.
fn expire_if_due(entry: &mut Entry) -> bool {
    if entry.ticket.status == TicketStatus::Pending && Instant::now() >= entry.deadline {
        // Pending → Expired is always a legal transition.
        let _ = entry.ticket.transition(TicketStatus::Expired, None);
        info!(ticket_id = %entry.ticket.ticket_id, "approval ticket expired");
        true
    } else {
        false
    }
}
