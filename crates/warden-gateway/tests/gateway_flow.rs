// gateway_flow.rs — End-to-end integration tests for the decision gateway.
//
// The main test walks one operational policy through the whole surface:
//
//   1. Load a document with NORMAL and EMERGENCY modes
//   2. NORMAL: read-only actions allowed, restart_service denied by mode
//   3. delete_database denied globally, even in EMERGENCY
//   4. Unknown actions denied before anything else
//   5. EMERGENCY: restart_service allowed, unless it targets prod-*
//   6. scale_fleet opens an approval ticket; approve → Allowed
//   7. Every step lands in the audit log with an intact hash chain
//
// Supporting tests cover rejection, ticket expiry, time windows, hot
// reload, temporary elevation, restart continuity, and the two race
// properties: gap-free audit sequences under concurrency, and decisions
// that are always consistent with the mode they were evaluated in.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use warden_approval::ApprovalOutcome;
use warden_audit::AuditSink;
use warden_gateway::{DecisionGateway, GatewayError};
use warden_policy::{ActionRequest, DecisionKind, PolicyDocument};

fn ops_document() -> PolicyDocument {
    PolicyDocument::from_json_str(
        r#"{
            "name": "ops-policy",
            "version": "2.0",
            "default_mode": "NORMAL",
            "global_deny": ["delete_database"],
            "modes": {
                "NORMAL": {
                    "allowed": ["get_service_status", "read_logs"],
                    "denied": ["restart_service", "scale_fleet"]
                },
                "EMERGENCY": {
                    "allowed": ["get_service_status", "read_logs", "restart_service", "scale_fleet"],
                    "denied": []
                }
            },
            "requires_approval": ["scale_fleet"],
            "predicates": {
                "restart_service": { "key": "target", "protected": ["prod-*"] }
            },
            "time_windows": {
                "read_logs": { "start_hour": 9, "end_hour": 17 }
            }
        }"#,
    )
    .unwrap()
}

fn gateway_in(dir: &std::path::Path) -> DecisionGateway {
    DecisionGateway::new(
        ops_document(),
        dir.join("audit.jsonl"),
        Duration::from_secs(900),
    )
    .unwrap()
}

/// A request stamped inside the read_logs time window (12:00 UTC).
fn daytime(request: ActionRequest) -> ActionRequest {
    ActionRequest {
        timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap(),
        ..request
    }
}

#[test]
fn full_decision_flow_normal_to_emergency() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());

    // NORMAL: read-only work is fine.
    let out = gateway
        .decide(&ActionRequest::new("get_service_status", "op-1"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::Allowed);
    assert!(out.ticket_id.is_none());

    // NORMAL: restart_service is on the mode's denied list.
    let out = gateway
        .decide(&ActionRequest::new("restart_service", "op-1"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedByMode);

    // delete_database is globally denied. Mode does not matter.
    let out = gateway
        .decide(&ActionRequest::new("delete_database", "op-1"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedGlobal);

    // An action the document has never heard of.
    let out = gateway
        .decide(&ActionRequest::new("launch_missiles", "op-1"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedUnknownAction);

    // Escalate.
    let previous = gateway.set_mode("EMERGENCY").unwrap();
    assert_eq!(previous, "NORMAL");

    // EMERGENCY: restart_service is allowed now...
    let out = gateway
        .decide(&ActionRequest::new("restart_service", "op-1").with_arg("target", "staging-7"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::Allowed);
    assert_eq!(out.decision.mode, "EMERGENCY");

    // ...but still not against a protected target.
    let out = gateway
        .decide(&ActionRequest::new("restart_service", "op-1").with_arg("target", "prod-db"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedByPredicate);

    // delete_database stays denied even here.
    let out = gateway
        .decide(&ActionRequest::new("delete_database", "op-1"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedGlobal);

    // scale_fleet is approval-gated: a ticket opens, nothing runs yet.
    let out = gateway
        .decide(&ActionRequest::new("scale_fleet", "op-1"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::PendingApproval);
    assert!(!out.decision.kind.is_allowed());
    let ticket_id = out.ticket_id.expect("approval ticket should be open");

    // Polling before anyone decides just says "still pending".
    let polled = gateway.resolve(ticket_id).unwrap();
    assert_eq!(polled.decision.kind, DecisionKind::PendingApproval);

    // A human approves; resolution becomes Allowed.
    let ticket = gateway
        .decide_approval(ticket_id, "sre-lead", ApprovalOutcome::Approve)
        .unwrap();
    assert_eq!(ticket.decided_by.as_deref(), Some("sre-lead"));

    let resolved = gateway.resolve(ticket_id).unwrap();
    assert_eq!(resolved.decision.kind, DecisionKind::Allowed);
    assert!(resolved.decision.reason.contains("sre-lead"));

    // Every call above wrote exactly one record, in order, chained.
    let records = AuditSink::read_all(gateway.audit_path()).unwrap();
    // 8 decides + 1 pending poll + 1 ticket settlement + 1 resolution.
    assert_eq!(records.len(), 11);
    assert_eq!(records[0].sequence, 1);
    assert!(AuditSink::sequences_are_contiguous(&records));
    assert_eq!(
        AuditSink::verify(gateway.audit_path()).unwrap(),
        records.len() as u64
    );

    // The approval thread is visible end to end via the ticket id.
    let with_ticket: Vec<_> = records
        .iter()
        .filter(|r| r.ticket_id == Some(ticket_id))
        .collect();
    assert_eq!(with_ticket.len(), 4);
}

#[test]
fn rejected_approval_resolves_to_denial() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());
    gateway.set_mode("EMERGENCY").unwrap();

    let out = gateway
        .decide(&ActionRequest::new("scale_fleet", "op-2"))
        .unwrap();
    let ticket_id = out.ticket_id.unwrap();

    gateway
        .decide_approval(ticket_id, "sre-lead", ApprovalOutcome::Reject)
        .unwrap();

    let resolved = gateway.resolve(ticket_id).unwrap();
    assert_eq!(resolved.decision.kind, DecisionKind::DeniedApproval);
    assert!(resolved.decision.reason.contains("rejected"));

    // A terminal ticket cannot be decided again.
    let err = gateway
        .decide_approval(ticket_id, "someone-else", ApprovalOutcome::Approve)
        .unwrap_err();
    assert!(matches!(err, GatewayError::Approval(_)));
}

#[test]
fn expired_ticket_beats_a_late_approver() {
    let dir = tempdir().unwrap();
    let gateway = DecisionGateway::new(
        ops_document(),
        dir.path().join("audit.jsonl"),
        Duration::from_millis(20),
    )
    .unwrap();
    gateway.set_mode("EMERGENCY").unwrap();

    let out = gateway
        .decide(&ActionRequest::new("scale_fleet", "op-3"))
        .unwrap();
    let ticket_id = out.ticket_id.unwrap();

    thread::sleep(Duration::from_millis(60));

    // The approval arrives too late.
    let err = gateway
        .decide_approval(ticket_id, "sre-lead", ApprovalOutcome::Approve)
        .unwrap_err();
    assert!(matches!(err, GatewayError::Approval(_)));

    let resolved = gateway.resolve(ticket_id).unwrap();
    assert_eq!(resolved.decision.kind, DecisionKind::DeniedApproval);
    assert!(resolved.decision.reason.contains("expired"));
}

#[test]
fn time_window_applies_to_the_request_timestamp() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());

    // Inside the 09:00–17:00 window.
    let out = gateway
        .decide(&daytime(ActionRequest::new("read_logs", "op-4")))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::Allowed);

    // 03:00 UTC is outside it.
    let night = ActionRequest {
        timestamp: Utc.with_ymd_and_hms(2026, 3, 4, 3, 0, 0).unwrap(),
        ..ActionRequest::new("read_logs", "op-4")
    };
    let out = gateway.decide(&night).unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedTimeWindow);
}

#[test]
fn audit_log_is_gap_free_under_concurrent_decisions() {
    let dir = tempdir().unwrap();
    let gateway = Arc::new(gateway_in(dir.path()));

    let mut handles = Vec::new();
    for t in 0..8 {
        let gateway = Arc::clone(&gateway);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                let requester = format!("op-{}-{}", t, i);
                gateway
                    .decide(&ActionRequest::new("get_service_status", requester))
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let records = AuditSink::read_all(gateway.audit_path()).unwrap();
    assert_eq!(records.len(), 200);
    assert!(AuditSink::sequences_are_contiguous(&records));
    assert_eq!(AuditSink::verify(gateway.audit_path()).unwrap(), 200);
}

#[test]
fn decisions_stay_consistent_while_modes_toggle() {
    let dir = tempdir().unwrap();
    let gateway = Arc::new(gateway_in(dir.path()));

    // One thread flips NORMAL ↔ EMERGENCY as fast as it can.
    let toggler = {
        let gateway = Arc::clone(&gateway);
        thread::spawn(move || {
            for i in 0..1000 {
                let mode = if i % 2 == 0 { "EMERGENCY" } else { "NORMAL" };
                gateway.set_mode(mode).unwrap();
            }
        })
    };

    // Another evaluates restart_service throughout. Whatever mode each
    // evaluation snapshots, the outcome must match that mode exactly:
    // denied-by-mode in NORMAL, allowed in EMERGENCY. Never a hybrid.
    let evaluator = {
        let gateway = Arc::clone(&gateway);
        thread::spawn(move || {
            for i in 0..1000 {
                let out = gateway
                    .decide(&ActionRequest::new("restart_service", format!("op-{}", i)))
                    .unwrap();
                match out.decision.mode.as_str() {
                    "NORMAL" => assert_eq!(out.decision.kind, DecisionKind::DeniedByMode),
                    "EMERGENCY" => assert_eq!(out.decision.kind, DecisionKind::Allowed),
                    other => panic!("decision evaluated in undefined mode: {}", other),
                }
            }
        })
    };

    toggler.join().unwrap();
    evaluator.join().unwrap();

    let records = AuditSink::read_all(gateway.audit_path()).unwrap();
    assert_eq!(records.len(), 1000);
    assert!(AuditSink::sequences_are_contiguous(&records));
}

#[test]
fn reload_swaps_documents_atomically() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());

    // Old document: deploy_release does not exist.
    let out = gateway
        .decide(&ActionRequest::new("deploy_release", "op-5"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedUnknownAction);

    let updated = PolicyDocument::from_json_str(
        r#"{
            "name": "ops-policy",
            "version": "2.1",
            "default_mode": "NORMAL",
            "modes": {
                "NORMAL": { "allowed": ["get_service_status", "deploy_release"] },
                "EMERGENCY": { "allowed": ["get_service_status", "deploy_release"] }
            }
        }"#,
    )
    .unwrap();
    gateway.reload(updated).unwrap();

    let out = gateway
        .decide(&ActionRequest::new("deploy_release", "op-5"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::Allowed);
    assert_eq!(gateway.status().policy_version, "2.1");
}

#[test]
fn reload_falls_back_when_active_mode_vanishes() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());
    gateway.set_mode("EMERGENCY").unwrap();

    // The new document drops EMERGENCY entirely.
    let narrowed = PolicyDocument::from_json_str(
        r#"{
            "name": "ops-policy",
            "version": "3.0",
            "default_mode": "NORMAL",
            "modes": { "NORMAL": { "allowed": ["get_service_status"] } }
        }"#,
    )
    .unwrap();
    gateway.reload(narrowed).unwrap();

    let status = gateway.status();
    assert_eq!(status.mode.current, "NORMAL");
    assert_eq!(status.mode.base, "NORMAL");
}

#[test]
fn invalid_reload_keeps_the_old_document() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());

    let policy_path = dir.path().join("broken.json");
    std::fs::write(&policy_path, b"{ not json").unwrap();
    assert!(gateway.reload_from_file(&policy_path).is_err());

    // Still on version 2.0, still deciding.
    assert_eq!(gateway.status().policy_version, "2.0");
    let out = gateway
        .decide(&ActionRequest::new("get_service_status", "op-6"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::Allowed);
}

#[test]
fn temporary_grant_elevates_and_reverts() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());

    gateway
        .grant_temporary("EMERGENCY", Duration::from_millis(40))
        .unwrap();
    let out = gateway
        .decide(&ActionRequest::new("restart_service", "op-7").with_arg("target", "staging-3"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::Allowed);
    assert_eq!(out.decision.mode, "EMERGENCY");

    thread::sleep(Duration::from_millis(90));

    // The grant lapsed on its own; no revoke call was made.
    let out = gateway
        .decide(&ActionRequest::new("restart_service", "op-7").with_arg("target", "staging-3"))
        .unwrap();
    assert_eq!(out.decision.kind, DecisionKind::DeniedByMode);
    assert_eq!(out.decision.mode, "NORMAL");
}

#[test]
fn status_reports_the_whole_picture() {
    let dir = tempdir().unwrap();
    let gateway = gateway_in(dir.path());
    gateway.set_mode("EMERGENCY").unwrap();
    gateway
        .decide(&ActionRequest::new("scale_fleet", "op-8"))
        .unwrap();

    let status = gateway.status();
    assert_eq!(status.policy_name, "ops-policy");
    assert_eq!(status.mode.current, "EMERGENCY");
    assert!(status
        .allowed_actions
        .contains(&"restart_service".to_string()));
    assert!(status.denied_actions.is_empty());
    assert_eq!(status.pending_tickets, 1);
    assert_eq!(gateway.pending_tickets().len(), 1);
}

#[test]
fn audit_sequences_continue_across_restart() {
    let dir = tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");

    {
        let gateway =
            DecisionGateway::new(ops_document(), &audit_path, Duration::from_secs(900)).unwrap();
        for i in 0..5 {
            gateway
                .decide(&ActionRequest::new("get_service_status", format!("op-{}", i)))
                .unwrap();
        }
    }

    // A new process opens the same log and keeps counting.
    let gateway =
        DecisionGateway::new(ops_document(), &audit_path, Duration::from_secs(900)).unwrap();
    gateway
        .decide(&ActionRequest::new("get_service_status", "op-next"))
        .unwrap();

    let records = AuditSink::read_all(&audit_path).unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(records.last().unwrap().sequence, 6);
    assert_eq!(AuditSink::verify(&audit_path).unwrap(), 6);
}
