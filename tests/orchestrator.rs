mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{gated, linear_playbook, policy, scripted_registry, Behavior, Harness, Scripted};
use playbook_engine::error::EngineError;
use playbook_engine::incident::{Incident, IncidentGateway};
use playbook_engine::orchestrator::Orchestrator;
use playbook_engine::runtime::executor::ActionRegistry;
use playbook_engine::runtime::timeline::TimelineEventType;
use playbook_engine::store::ExecutionStore;
use playbook_engine::workflow::types::{
    ActionOutcome, ActionResult, ActionType, ExecutionStatus, FailureKind, WorkflowDefinition, WorkflowExecution,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn linear_playbook_runs_every_action_in_order() {
    let h = Harness::new().await;
    h.scripted.on("isolate", Behavior::Succeed(json!({ "isolated_host": "web-01" })));
    let id = h.publish(linear_playbook()).await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Completed);
    assert_eq!(snapshot.workflow_version, 1);
    let order: Vec<&str> = snapshot.action_results.iter().map(|r| r.action_id.as_str()).collect();
    assert_eq!(order, ["isolate", "collect", "notify"]);
    assert!(snapshot.action_results.iter().all(|r| r.outcome == ActionOutcome::Success));
    assert_eq!(snapshot.context["isolated_host"], json!("web-01"));
    assert_eq!(snapshot.context["isolate"], json!({ "isolated_host": "web-01" }));
    assert_eq!(h.scripted.calls(), ["isolate", "collect", "notify"]);

    let events = h.events(snapshot.id).await;
    assert_eq!(events.first().unwrap().event_type, TimelineEventType::ExecutionCreated);
    assert_eq!(events.last().unwrap().event_type, TimelineEventType::ExecutionCompleted);
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (1..=events.len() as u64).collect();
    assert_eq!(sequences, expected);

    // Mirrored onto the incident in the same order
    let mirrored: Vec<u64> = h.incidents.timeline("inc-1").await.iter().map(|e| e.sequence).collect();
    assert_eq!(mirrored, expected);
}

#[tokio::test(start_paused = true)]
async fn hung_action_times_out_then_fails_after_one_retry() {
    let h = Harness::new().await;
    h.scripted.on("collect", Behavior::Hang);
    let mut playbook = linear_playbook();
    playbook["actions"][1]["timeout_seconds"] = json!(10);
    playbook["actions"][1]["retry_on_failure"] = json!(true);
    playbook["actions"][1]["max_retries"] = json!(1);
    let id = h.publish(playbook).await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    let collect: Vec<&ActionResult> = snapshot.action_results.iter().filter(|r| r.action_id == "collect").collect();
    assert_eq!(collect.len(), 2);
    assert!(collect.iter().all(|r| r.outcome == ActionOutcome::Timeout));
    assert_eq!(collect[1].attempt, 2);
    assert_eq!(h.scripted.count("notify"), 0);

    let failure = snapshot.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::ActionTimedOut);
    assert_eq!(failure.action_id.as_deref(), Some("collect"));

    let types = h.event_types(snapshot.id).await;
    assert_eq!(types.iter().filter(|t| **t == TimelineEventType::ActionTimedOut).count(), 2);
    assert_eq!(types.last(), Some(&TimelineEventType::ExecutionFailed));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_succeed() {
    let h = Harness::new().await;
    h.scripted.on("collect", Behavior::FailTimes(2, json!({ "log_bundle": "s3://bundle" })));
    let mut playbook = linear_playbook();
    playbook["actions"][1]["retry_on_failure"] = json!(true);
    playbook["actions"][1]["max_retries"] = json!(3);
    let id = h.publish(playbook).await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Completed);
    let outcomes: Vec<ActionOutcome> = snapshot.action_results.iter()
        .filter(|r| r.action_id == "collect")
        .map(|r| r.outcome)
        .collect();
    assert_eq!(outcomes, [ActionOutcome::Failure, ActionOutcome::Failure, ActionOutcome::Success]);
    assert_eq!(snapshot.context["log_bundle"], json!("s3://bundle"));

    let backoffs: Vec<u64> = h.events(snapshot.id).await.iter()
        .filter(|e| e.event_type == TimelineEventType::ActionRetryScheduled)
        .map(|e| e.metadata["backoff_ms"].as_u64().unwrap())
        .collect();
    assert_eq!(backoffs, [100, 200]);
}

#[tokio::test]
async fn disabled_retry_records_a_single_attempt() {
    let h = Harness::new().await;
    h.scripted.on("collect", Behavior::FailTimes(5, json!({})));
    let mut playbook = linear_playbook();
    playbook["actions"][1]["max_retries"] = json!(3);
    let id = h.publish(playbook).await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(h.scripted.count("collect"), 1);
    assert_eq!(snapshot.failure.unwrap().kind, FailureKind::ActionFailed);
}

#[tokio::test]
async fn permanent_errors_are_never_retried() {
    let h = Harness::new().await;
    h.scripted.on("isolate", Behavior::Permanent("EDR rejected host id".into()));
    let mut playbook = linear_playbook();
    playbook["actions"][0]["retry_on_failure"] = json!(true);
    playbook["actions"][0]["max_retries"] = json!(4);
    let id = h.publish(playbook).await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(h.scripted.count("isolate"), 1);
    assert!(snapshot.failure.unwrap().message.contains("EDR rejected host id"));
}

#[tokio::test]
async fn approval_gate_parks_until_resumed() {
    let h = Harness::new().await;
    let id = h.publish(gated()).await;

    let waiting = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();
    assert_eq!(waiting.status, ExecutionStatus::WaitingApproval);
    assert_eq!(waiting.current_action_id.as_deref(), Some("isolate"));
    assert!(waiting.action_results.is_empty());
    assert!(h.scripted.calls().is_empty());

    let requested = h.events(waiting.id).await.into_iter()
        .find(|e| e.event_type == TimelineEventType::ApprovalRequested)
        .unwrap();
    assert_eq!(requested.metadata["approval_role"], json!("incident_commander"));

    let done = h.orchestrator.resume(waiting.id, true, "alice").await.unwrap();
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(h.scripted.calls(), ["isolate", "notify"]);

    let types = h.event_types(done.id).await;
    let granted = types.iter().position(|t| *t == TimelineEventType::ApprovalGranted).unwrap();
    let started = types.iter().position(|t| *t == TimelineEventType::ActionStarted).unwrap();
    assert!(granted < started);
}

#[tokio::test]
async fn denied_approval_fails_without_running_the_action() {
    let h = Harness::new().await;
    let id = h.publish(gated()).await;
    let waiting = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    let denied = h.orchestrator.resume(waiting.id, false, "bob").await.unwrap();

    assert_eq!(denied.status, ExecutionStatus::Failed);
    let failure = denied.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::ApprovalDenied);
    assert_eq!(failure.action_id.as_deref(), Some("isolate"));
    assert!(h.scripted.calls().is_empty());
    assert!(h.event_types(denied.id).await.contains(&TimelineEventType::ApprovalDenied));
}

#[tokio::test]
async fn resume_on_a_running_playbook_is_rejected() {
    let h = Harness::new().await;
    let id = h.publish(linear_playbook()).await;
    let done = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    let err = h.orchestrator.resume(done.id, true, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::StaleExecution { status: ExecutionStatus::Completed, .. }));
}

fn branching_playbook() -> serde_json::Value {
    json!({
        "id": "pb-branch",
        "name": "Severity routing",
        "actions": [
            { "action_id": "triage", "order": 1, "action_type": "collect_logs",
              "conditional_logic": { "condition": "severity == 'critical'", "on_true": "isolate", "on_false": "notify" } },
            { "action_id": "isolate", "order": 2, "action_type": "isolate_asset" },
            { "action_id": "notify", "order": 3, "action_type": "send_notification" }
        ]
    })
}

#[tokio::test]
async fn condition_routes_on_incident_severity() {
    let h = Harness::new().await;
    h.incidents.upsert(Incident::new("inc-crit").with_severity("critical")).await;
    h.incidents.upsert(Incident::new("inc-bare")).await;
    let id = h.publish(branching_playbook()).await;

    let critical = h.orchestrator.start(&id, "inc-crit", "analyst").await.unwrap();
    let ran: Vec<&str> = critical.action_results.iter().map(|r| r.action_id.as_str()).collect();
    assert_eq!(ran, ["triage", "isolate", "notify"]);
    assert_eq!(critical.action_results[0].branch, Some(true));

    let high = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();
    let ran: Vec<&str> = high.action_results.iter().map(|r| r.action_id.as_str()).collect();
    assert_eq!(ran, ["triage", "notify"]);

    // Missing severity compares false and takes the on_false edge
    let bare = h.orchestrator.start(&id, "inc-bare", "analyst").await.unwrap();
    assert_eq!(bare.status, ExecutionStatus::Completed);
    assert_eq!(bare.action_results[0].branch, Some(false));
    assert_eq!(bare.action_results.len(), 2);

    let branch = h.events(bare.id).await.into_iter()
        .find(|e| e.event_type == TimelineEventType::BranchTaken)
        .unwrap();
    assert_eq!(branch.metadata["result"], json!(false));
    assert_eq!(branch.metadata["target"], json!("notify"));
}

#[tokio::test]
async fn outputs_feed_later_parameters() {
    let h = Harness::new().await;
    h.scripted.on("isolate", Behavior::Succeed(json!({ "asset": { "host": "web-01" } })));
    h.scripted.on("collect", Behavior::Echo);
    let mut playbook = linear_playbook();
    playbook["actions"][1]["parameters"] = json!({ "host": "{{asset.host}}", "incident": "{{incident.id}}" });
    let id = h.publish(playbook).await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.context["collect"]["host"], json!("web-01"));
    assert_eq!(snapshot.context["collect"]["incident"], json!("inc-1"));
}

#[tokio::test]
async fn cancelling_a_parked_execution_makes_resume_stale() {
    let h = Harness::new().await;
    let id = h.publish(gated()).await;
    let waiting = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    let cancelled = h.orchestrator.cancel(waiting.id, "false positive").await.unwrap();
    assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("false positive"));

    let err = h.orchestrator.resume(waiting.id, true, "alice").await.unwrap_err();
    assert!(matches!(err, EngineError::StaleExecution { status: ExecutionStatus::Cancelled, .. }));
    let err = h.orchestrator.cancel(waiting.id, "again").await.unwrap_err();
    assert!(matches!(err, EngineError::StaleExecution { .. }));

    assert_eq!(h.orchestrator.status(waiting.id).await.unwrap().status, ExecutionStatus::Cancelled);
    assert!(h.scripted.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn late_result_after_cancel_is_discarded() {
    let h = Harness::new().await;
    h.scripted.on("collect", Behavior::Slow(Duration::from_secs(5), json!({ "late": true })));
    let id = h.publish(linear_playbook()).await;

    let orchestrator = Arc::clone(&h.orchestrator);
    let running = tokio::spawn(async move { orchestrator.start(&id, "inc-1", "analyst").await });

    // Wait for the slow action to be in flight
    let execution_id = loop {
        if h.scripted.count("collect") == 1 {
            let listed = h.orchestrator.list_executions("inc-1").await.unwrap();
            break listed[0].id;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    };

    let cancelled = h.orchestrator.cancel(execution_id, "analyst stop").await.unwrap();
    assert_eq!(cancelled.status, ExecutionStatus::Cancelled);

    let finished = running.await.unwrap().unwrap();
    assert_eq!(finished.status, ExecutionStatus::Cancelled);
    assert!(finished.action_results.iter().all(|r| r.action_id != "collect"));
    assert!(!finished.context.contains_key("late"));
    assert_eq!(h.scripted.count("notify"), 0);

    let types = h.event_types(execution_id).await;
    assert!(types.contains(&TimelineEventType::ActionResultDiscarded));
    assert_eq!(types.iter().filter(|t| **t == TimelineEventType::ExecutionCancelled).count(), 1);
}

#[tokio::test]
async fn status_is_repeatable_and_matches_start() {
    let h = Harness::new().await;
    let id = h.publish(gated()).await;
    let started = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    let first = h.orchestrator.status(started.id).await.unwrap();
    let second = h.orchestrator.status(started.id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, started);

    let missing = h.orchestrator.status(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(missing, EngineError::ExecutionNotFound(_)));
}

#[tokio::test]
async fn parallel_branches_join_and_report_conflicts() {
    let h = Harness::new().await;
    h.scripted.on("block_ip", Behavior::Succeed(json!({ "blocked": "ip", "firewall_rule": 4410 })));
    h.scripted.on("block_domain", Behavior::Succeed(json!({ "blocked": "domain", "dns_rule": 7 })));
    let id = h.publish(json!({
        "id": "pb-diamond",
        "name": "Block indicators",
        "parallel_execution": true,
        "actions": [
            { "action_id": "triage", "order": 1, "action_type": "collect_logs" },
            { "action_id": "block_ip", "order": 2, "action_type": "block_ip" },
            { "action_id": "block_domain", "order": 2, "action_type": "block_domain" },
            { "action_id": "notify", "order": 3, "action_type": "send_notification" }
        ]
    }))
    .await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Completed);
    assert_eq!(snapshot.action_results.len(), 4);
    assert_eq!(snapshot.action_results[0].action_id, "triage");
    assert_eq!(snapshot.action_results[3].action_id, "notify");
    assert_eq!(snapshot.context["firewall_rule"], json!(4410));
    assert_eq!(snapshot.context["dns_rule"], json!(7));
    assert!(["ip", "domain"].contains(&snapshot.context["blocked"].as_str().unwrap()));

    let conflict = h.events(snapshot.id).await.into_iter()
        .find(|e| e.event_type == TimelineEventType::ContextConflict)
        .unwrap();
    assert_eq!(conflict.metadata["key"], json!("blocked"));
    assert_eq!(conflict.action_id.as_deref(), Some("triage"));
}

#[tokio::test]
async fn resume_after_fork_keeps_the_merged_join() {
    let h = Harness::new().await;
    h.scripted.on("block_ip", Behavior::Succeed(json!({ "blocked": "ip", "firewall_rule": 4410 })));
    h.scripted.on("block_domain", Behavior::Succeed(json!({ "blocked": "domain", "dns_rule": 7 })));
    let id = h.publish(json!({
        "id": "pb-diamond-gated",
        "name": "Block indicators, then notify on approval",
        "parallel_execution": true,
        "actions": [
            { "action_id": "triage", "order": 1, "action_type": "collect_logs" },
            { "action_id": "block_ip", "order": 2, "action_type": "block_ip" },
            { "action_id": "block_domain", "order": 2, "action_type": "block_domain" },
            { "action_id": "notify", "order": 3, "action_type": "send_notification",
              "approval_required": true }
        ]
    }))
    .await;

    let waiting = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();
    assert_eq!(waiting.status, ExecutionStatus::WaitingApproval);
    let merged = waiting.context["blocked"].clone();

    let done = h.orchestrator.resume(waiting.id, true, "alice").await.unwrap();

    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(done.context["blocked"], merged);
    assert_eq!(done.context["firewall_rule"], json!(4410));
    assert_eq!(done.context["dns_rule"], json!(7));
    assert_eq!(h.scripted.count("block_ip"), 1);
    assert_eq!(h.scripted.count("block_domain"), 1);
    assert_eq!(h.scripted.count("notify"), 1);

    let conflicts = h.event_types(done.id).await.into_iter()
        .filter(|t| *t == TimelineEventType::ContextConflict)
        .count();
    assert_eq!(conflicts, 1);
}

#[tokio::test]
async fn failing_branch_fails_the_whole_fork() {
    let h = Harness::new().await;
    h.scripted.on("block_domain", Behavior::Permanent("registrar unavailable".into()));
    let id = h.publish(json!({
        "id": "pb-diamond",
        "name": "Block indicators",
        "parallel_execution": true,
        "actions": [
            { "action_id": "triage", "order": 1, "action_type": "collect_logs" },
            { "action_id": "block_ip", "order": 2, "action_type": "block_ip" },
            { "action_id": "block_domain", "order": 2, "action_type": "block_domain" },
            { "action_id": "notify", "order": 3, "action_type": "send_notification" }
        ]
    }))
    .await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.failure.unwrap().action_id.as_deref(), Some("block_domain"));
    assert_eq!(h.scripted.count("notify"), 0);
}

#[tokio::test]
async fn missing_executor_fails_the_action() {
    let scripted = Arc::new(Scripted::default());
    let actions = ActionRegistry::new().with(ActionType::IsolateAsset, scripted.clone());
    let h = Harness::with_actions(scripted, actions).await;
    let id = h.publish(linear_playbook()).await;

    let snapshot = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    assert_eq!(snapshot.status, ExecutionStatus::Failed);
    assert_eq!(snapshot.action_results.len(), 2);
    let error = snapshot.action_results[1].error.clone().unwrap();
    assert!(error.contains("no executor registered"));
}

#[tokio::test]
async fn start_rejects_unknown_inactive_and_invalid_playbooks() {
    let h = Harness::new().await;

    let err = h.orchestrator.start("pb-ghost", "inc-1", "analyst").await.unwrap_err();
    assert!(matches!(err, EngineError::WorkflowNotFound { .. }));

    let id = h.publish(linear_playbook()).await;
    let err = h.orchestrator.start(&id, "inc-404", "analyst").await.unwrap_err();
    assert!(matches!(err, EngineError::IncidentNotFound(_)));

    h.registry.set_active(&id, false).await.unwrap();
    let err = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap_err();
    assert!(matches!(err, EngineError::InactiveWorkflow(_)));

    let dangling: WorkflowDefinition = serde_json::from_value(json!({
        "id": "pb-adhoc",
        "name": "Ad hoc",
        "actions": [
            { "action_id": "a1", "order": 1, "action_type": "escalate",
              "conditional_logic": { "condition": "severity == 'high'", "on_true": "nowhere" } }
        ]
    }))
    .unwrap();
    let err = h.orchestrator.start_definition(dangling, "inc-1", "analyst").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidDefinition(_)));

    assert_eq!(h.stored_count("inc-1").await, 0);
}

#[tokio::test]
async fn executions_pin_the_version_they_started_with() {
    let h = Harness::new().await;
    let id = h.publish(gated()).await;
    let waiting = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    let mut v2 = gated();
    v2["actions"][1]["action_type"] = json!("create_ticket");
    v2["actions"][1]["action_id"] = json!("ticket");
    h.publish(v2).await;

    let done = h.orchestrator.resume(waiting.id, true, "alice").await.unwrap();
    assert_eq!(done.workflow_version, 1);
    assert_eq!(h.scripted.calls(), ["isolate", "notify"]);
}

#[tokio::test]
async fn auto_trigger_starts_matching_playbooks_only() {
    let h = Harness::new().await;
    h.incidents.upsert(Incident::new("inc-rw").with_severity("critical").with_category("ransomware")).await;

    let mut matching = linear_playbook();
    matching["id"] = json!("pb-auto");
    matching["trigger_conditions"] = json!({ "severity": ["critical"], "auto_trigger": true });
    h.publish(matching).await;

    let mut manual = linear_playbook();
    manual["id"] = json!("pb-manual");
    manual["trigger_conditions"] = json!({ "severity": ["critical"], "auto_trigger": false });
    h.publish(manual).await;

    let mut other = linear_playbook();
    other["id"] = json!("pb-phish");
    other["trigger_conditions"] = json!({ "category": ["phishing"], "auto_trigger": true });
    h.publish(other).await;

    let started = h.orchestrator.trigger_for_incident("inc-rw", "auto").await.unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].workflow_id, "pb-auto");
    assert_eq!(h.orchestrator.list_executions("inc-rw").await.unwrap().len(), 1);
}

#[tokio::test]
async fn sla_breach_is_recorded_once_per_execution() {
    let h = Harness::new().await;
    let mut incident = Incident::new("inc-sla").with_severity("high");
    incident.sla.response_deadline = Some(Utc::now() - ChronoDuration::minutes(5));
    h.incidents.upsert(incident).await;
    let id = h.publish(gated()).await;
    let waiting = h.orchestrator.start(&id, "inc-sla", "analyst").await.unwrap();

    assert_eq!(h.orchestrator.check_sla(Utc::now()).await.unwrap(), 1);
    assert_eq!(h.orchestrator.check_sla(Utc::now()).await.unwrap(), 0);

    let incident = h.incidents.get_incident_snapshot("inc-sla").await.unwrap().unwrap();
    assert!(incident.sla.breached);
    let types = h.event_types(waiting.id).await;
    assert_eq!(types.iter().filter(|t| **t == TimelineEventType::SlaBreached).count(), 1);
}

#[tokio::test]
async fn stats_count_terminal_outcomes() {
    let h = Harness::new().await;
    let id = h.publish(linear_playbook()).await;
    h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();
    h.scripted.on("notify", Behavior::Permanent("smtp down".into()));
    h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    let stats = h.orchestrator.stats(&id).await.unwrap().unwrap();
    assert_eq!(stats.execution_count, 2);
    assert_eq!(stats.success_count, 1);
    assert_eq!(stats.failure_count, 1);
}

fn second_process(h: &Harness) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(&h.registry),
        Arc::new(scripted_registry(&h.scripted)),
        h.incidents.clone(),
        h.store.clone(),
        policy(),
    )
}

#[tokio::test]
async fn recovery_replays_recorded_actions_and_finishes_the_rest() {
    let h = Harness::new().await;
    let id = h.publish(linear_playbook()).await;
    let workflow = h.registry.get(&id).unwrap();

    let mut exec = WorkflowExecution::new(&workflow.definition, "inc-1", "analyst");
    exec.transition(ExecutionStatus::Running);
    exec.action_results.push(ActionResult {
        action_id: "isolate".into(),
        attempt: 1,
        started_at: Utc::now(),
        finished_at: Utc::now(),
        outcome: ActionOutcome::Success,
        error: None,
        branch: None,
        output: json!({ "isolated_host": "web-01" }).as_object().cloned(),
    });
    exec.current_action_id = Some("collect".into());
    h.store.save(&exec).await.unwrap();

    let restarted = second_process(&h);
    assert_eq!(restarted.recover().await.unwrap(), 1);

    let mut snapshot = restarted.status(exec.id).await.unwrap();
    for _ in 0..200 {
        if snapshot.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        snapshot = restarted.status(exec.id).await.unwrap();
    }

    assert_eq!(snapshot.status, ExecutionStatus::Completed);
    assert_eq!(h.scripted.count("isolate"), 0);
    assert_eq!(h.scripted.calls(), ["collect", "notify"]);
    assert_eq!(snapshot.context["isolated_host"], json!("web-01"));
}

#[tokio::test]
async fn recovered_approval_waits_for_resume() {
    let h = Harness::new().await;
    let id = h.publish(gated()).await;
    let waiting = h.orchestrator.start(&id, "inc-1", "analyst").await.unwrap();

    let restarted = second_process(&h);
    assert_eq!(restarted.recover().await.unwrap(), 1);
    assert_eq!(restarted.status(waiting.id).await.unwrap().status, ExecutionStatus::WaitingApproval);
    assert!(h.scripted.calls().is_empty());

    let done = restarted.resume(waiting.id, true, "alice").await.unwrap();
    assert_eq!(done.status, ExecutionStatus::Completed);

    // Sequence numbers continue where the first process stopped
    let events = restarted.timeline(waiting.id).await.unwrap();
    let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
    let expected: Vec<u64> = (1..=events.len() as u64).collect();
    assert_eq!(sequences, expected);
}
