//! Decider Integration Tests
//!
//! Tests for decision batches, workflow completion, failure notification,
//! and the client hand-off.

use std::sync::Arc;

use serde_json::{json, Value};
use swf_decider::config::DeciderConfig;
use swf_decider::core::{Decider, Decision, DecisionTask, Notification, Pipeline, RecordingObserver, Task};
use swf_decider::domain::{EventList, RetryStrategy, WorkflowExecution};
use swf_decider::MemoryClient;

fn history(events: Value) -> EventList {
    EventList::from_value(events)
        .unwrap()
        .with_execution(Some(WorkflowExecution::new("wf-1", "run-1")))
}

fn decider(root: Pipeline) -> Decider {
    Decider::new(root, Arc::new(MemoryClient::new()))
}

fn wire(decisions: &[Decision]) -> Value {
    serde_json::to_value(decisions).unwrap()
}

fn finished_fetch() -> Value {
    json!([
        { "eventId": 1, "eventType": "WorkflowExecutionStarted",
          "workflowExecutionStartedEventAttributes": { "input": "{}" } },
        { "eventId": 2, "eventType": "ActivityTaskScheduled",
          "activityTaskScheduledEventAttributes": { "activityId": "fetch" } },
        { "eventId": 3, "eventType": "ActivityTaskCompleted",
          "activityTaskCompletedEventAttributes": { "scheduledEventId": 2 } },
    ])
}

#[test]
fn test_first_cycle_schedules_activity() {
    let decider = decider(Pipeline::series(vec![Task::activity("fetch").with_version("1").into()]));
    let decisions = decider
        .decisions(&history(json!([
            { "eventId": 1, "eventType": "WorkflowExecutionStarted",
              "workflowExecutionStartedEventAttributes": { "input": "{}" } },
        ])))
        .unwrap();

    assert_eq!(
        wire(&decisions),
        json!([{
            "decisionType": "ScheduleActivityTask",
            "scheduleActivityTaskDecisionAttributes": {
                "activityId": "fetch",
                "activityType": { "name": "fetch", "version": "1" }
            }
        }])
    );
}

#[test]
fn test_nothing_left_completes_workflow() {
    let decider = decider(Pipeline::series(vec![Task::activity("fetch").into()]));
    let decisions = decider.decisions(&history(finished_fetch())).unwrap();

    assert_eq!(
        wire(&decisions),
        json!([{
            "decisionType": "CompleteWorkflowExecution",
            "completeWorkflowExecutionDecisionAttributes": {
                "result": "All tasks completed successfully."
            }
        }])
    );
}

#[test]
fn test_configured_completion_result() {
    let config = DeciderConfig {
        completion_result: "done".into(),
        ..DeciderConfig::default()
    };
    let decider = decider(Pipeline::series(vec![Task::activity("fetch").into()])).with_config(config);
    let decisions = decider.decisions(&history(finished_fetch())).unwrap();

    assert_eq!(
        wire(&decisions)[0]["completeWorkflowExecutionDecisionAttributes"]["result"],
        "done"
    );
}

#[test]
fn test_in_flight_work_emits_nothing() {
    let decider = decider(Pipeline::series(vec![Task::activity("fetch").into()]));
    let decisions = decider
        .decisions(&history(json!([
            { "eventId": 1, "eventType": "ActivityTaskScheduled",
              "activityTaskScheduledEventAttributes": { "activityId": "fetch" } },
        ])))
        .unwrap();
    assert!(decisions.is_empty());
}

#[test]
fn test_marker_only_batch_completes() {
    let decider = decider(Pipeline::series(vec![Task::marker("marker", json!({ "a": 1 })).into()]));
    let decisions = decider
        .decisions(&history(json!([
            { "eventId": 1, "eventType": "WorkflowExecutionStarted",
              "workflowExecutionStartedEventAttributes": { "input": "{}" } },
        ])))
        .unwrap();

    assert_eq!(
        wire(&decisions),
        json!([
            {
                "decisionType": "RecordMarker",
                "recordMarkerDecisionAttributes": { "markerName": "marker", "details": "{\"a\":1}" }
            },
            {
                "decisionType": "CompleteWorkflowExecution",
                "completeWorkflowExecutionDecisionAttributes": {
                    "result": "All tasks completed successfully."
                }
            }
        ])
    );
}

#[test]
fn test_trailing_marker_completes_series() {
    let decider = decider(Pipeline::series(vec![
        Task::activity("fetch").into(),
        Task::marker("done", json!({ "ok": true })).into(),
    ]));
    let decisions = decider.decisions(&history(finished_fetch())).unwrap();

    let types: Vec<Value> = wire(&decisions)
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["decisionType"].clone())
        .collect();
    assert_eq!(types, vec![json!("RecordMarker"), json!("CompleteWorkflowExecution")]);
}

#[test]
fn test_marker_beside_running_work_does_not_complete() {
    let decider = decider(Pipeline::parallel(vec![
        Task::marker("note", json!({ "ok": true })).into(),
        Task::activity("fetch").into(),
    ]));
    let decisions = decider
        .decisions(&history(json!([
            { "eventId": 1, "eventType": "ActivityTaskScheduled",
              "activityTaskScheduledEventAttributes": { "activityId": "fetch" } },
        ])))
        .unwrap();

    assert_eq!(
        wire(&decisions),
        json!([{
            "decisionType": "RecordMarker",
            "recordMarkerDecisionAttributes": { "markerName": "note", "details": "{\"ok\":true}" }
        }])
    );
}

#[test]
fn test_retry_exhaustion_fails_and_notifies() {
    let observer = Arc::new(RecordingObserver::new());
    let decider = decider(Pipeline::series(vec![Task::activity("fetch")
        .with_retry(RetryStrategy::Immediate { limit: 1 })
        .into()]))
    .with_observer(observer.clone());

    let decisions = decider
        .decisions(&history(json!([
            { "eventId": 1, "eventType": "ActivityTaskScheduled",
              "activityTaskScheduledEventAttributes": { "activityId": "fetch" } },
            { "eventId": 2, "eventType": "ActivityTaskFailed",
              "activityTaskFailedEventAttributes": { "scheduledEventId": 1 } },
            { "eventId": 3, "eventType": "ActivityTaskScheduled",
              "activityTaskScheduledEventAttributes": { "activityId": "fetch" } },
            { "eventId": 4, "eventType": "ActivityTaskFailed",
              "activityTaskFailedEventAttributes": { "scheduledEventId": 3 } },
        ])))
        .unwrap();

    assert_eq!(
        wire(&decisions),
        json!([{
            "decisionType": "FailWorkflowExecution",
            "failWorkflowExecutionDecisionAttributes": { "reason": "Retry limit reached." }
        }])
    );

    let notifications = observer.notifications();
    assert_eq!(notifications.len(), 1);
    match &notifications[0] {
        Notification::Failure(notice) => {
            assert_eq!(notice.reason, json!("Retry limit reached."));
            assert_eq!(notice.workflow, Some(WorkflowExecution::new("wf-1", "run-1")));
        }
        other => panic!("unexpected notification: {:?}", other),
    }
}

#[test]
fn test_timer_id_uses_last_event_id() {
    let decider = decider(Pipeline::series(vec![
        Task::activity("fetch").into(),
        Task::timer("cooldown", 15).into(),
    ]));
    let decisions = decider.decisions(&history(finished_fetch())).unwrap();

    assert_eq!(
        wire(&decisions),
        json!([{
            "decisionType": "StartTimer",
            "startTimerDecisionAttributes": {
                "timerId": "cooldown:3", "control": "cooldown", "startToFireTimeout": "15"
            }
        }])
    );
}

#[test]
fn test_same_history_same_batch() {
    let decider = decider(Pipeline::parallel(vec![
        Task::activity("a").into(),
        Task::timer("b", 5).into(),
        Task::lambda("c", "fn-c").with_input(json!({ "x": "$$Workflow" })).into(),
    ]));
    let events = history(finished_fetch());
    assert_eq!(
        decider.decisions(&events).unwrap(),
        decider.decisions(&events).unwrap()
    );
}

#[test]
fn test_unknown_event_type_is_rejected() {
    let result = EventList::from_value(json!([
        { "eventId": 1, "eventType": "WorkflowExecutionTeleported" },
    ]));
    assert!(result.is_err());
}

#[tokio::test]
async fn test_handle_sends_batch_to_client() {
    let client = Arc::new(MemoryClient::new());
    let decider = Decider::new(
        Pipeline::series(vec![Task::activity("fetch").into()]),
        client.clone(),
    );

    let task: DecisionTask = serde_json::from_value(json!({
        "taskToken": "token-7",
        "workflowExecution": { "workflowId": "wf-1", "runId": "run-1" },
        "events": finished_fetch(),
    }))
    .unwrap();

    let decisions = decider.handle(task).await.unwrap();
    assert_eq!(decisions.len(), 1);

    let responses = client.responses().await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "token-7");
    assert_eq!(responses[0].1, decisions);
}

#[tokio::test]
async fn test_handle_surfaces_unknown_events() {
    let client = Arc::new(MemoryClient::new());
    let decider = Decider::new(Pipeline::series(vec![Task::activity("fetch").into()]), client.clone());

    let task: DecisionTask = serde_json::from_value(json!({
        "taskToken": "token-8",
        "events": [{ "eventId": 1, "eventType": "Mystery" }],
    }))
    .unwrap();

    assert!(decider.handle(task).await.is_err());
    assert!(client.responses().await.is_empty());
}
