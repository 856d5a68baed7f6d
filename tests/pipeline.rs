//! Pipeline Integration Tests
//!
//! Tests for series ordering, parallel fan-out, continuous restarts, and
//! signal subscriptions.

use serde_json::{json, Value};
use swf_decider::core::{Notification, Pipeline, RecordingObserver, Task, TracingObserver};
use swf_decider::domain::{Action, EventList};

fn history(events: Value) -> EventList {
    EventList::from_value(events).unwrap()
}

fn scheduled(id: i64, name: &str) -> Value {
    json!({ "eventId": id, "eventType": "ActivityTaskScheduled",
            "activityTaskScheduledEventAttributes": { "activityId": name } })
}

fn completed(id: i64, scheduled_id: i64) -> Value {
    json!({ "eventId": id, "eventType": "ActivityTaskCompleted",
            "activityTaskCompletedEventAttributes": { "scheduledEventId": scheduled_id } })
}

fn signaled(id: i64, signal: &str) -> Value {
    json!({ "eventId": id, "eventType": "WorkflowExecutionSignaled",
            "workflowExecutionSignaledEventAttributes": { "signalName": signal } })
}

#[test]
fn test_series_advances_after_completion() {
    let pipeline = Pipeline::series(vec![Task::activity("a").into(), Task::activity("b").into()]);
    let events = history(json!([scheduled(1, "a"), completed(2, 1)]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        vec![Action::schedule("b", Value::Null, None)]
    );
}

#[test]
fn test_series_lower_bound_hides_earlier_events() {
    // "b" already ran once before "a" finished; that run must not count
    let pipeline = Pipeline::series(vec![Task::activity("a").into(), Task::activity("b").into()]);
    let events = history(json!([
        scheduled(1, "b"),
        completed(2, 1),
        scheduled(3, "a"),
        completed(4, 3),
    ]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        vec![Action::schedule("b", Value::Null, None)]
    );
}

#[test]
fn test_series_finishes_with_last_child_id() {
    let pipeline = Pipeline::series(vec![Task::activity("a").into(), Task::activity("b").into()]);
    let events = history(json!([
        scheduled(1, "a"),
        completed(2, 1),
        scheduled(3, "b"),
        completed(4, 3),
    ]));
    let outcome = pipeline.evaluate(&events, None, &TracingObserver).unwrap();
    assert!(outcome.actions.is_empty());
    assert_eq!(outcome.last_event_id, Some(4));
}

#[test]
fn test_parallel_waits_for_every_child() {
    let pipeline = Pipeline::parallel(vec![Task::activity("a").into(), Task::activity("b").into()]);
    let events = history(json!([scheduled(1, "a"), scheduled(2, "b"), completed(3, 1)]));
    assert_eq!(pipeline.next_actions(&events).unwrap(), vec![Action::Noop]);
}

#[test]
fn test_nested_parallel_bounds_next_series_child() {
    let pipeline = Pipeline::series(vec![
        Pipeline::parallel(vec![Task::activity("a").into(), Task::activity("b").into()]).into(),
        Task::activity("c").into(),
    ]);
    let events = history(json!([
        scheduled(1, "a"),
        scheduled(2, "b"),
        completed(3, 2),
        completed(4, 1),
    ]));
    let outcome = pipeline.evaluate(&events, None, &TracingObserver).unwrap();
    assert_eq!(outcome.actions, vec![Action::schedule("c", Value::Null, None)]);
}

#[test]
fn test_continuous_restarts_when_exhausted() {
    let pipeline = Pipeline::continuous(vec![Task::activity("poll").into()]);
    let events = history(json!([scheduled(1, "poll"), completed(2, 1)]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        vec![Action::schedule("poll", Value::Null, None)]
    );
}

#[test]
fn test_continuous_waits_on_running_child() {
    let pipeline = Pipeline::continuous(vec![Task::activity("poll").into()]);
    let events = history(json!([scheduled(1, "poll"), completed(2, 1), scheduled(3, "poll")]));
    assert_eq!(pipeline.next_actions(&events).unwrap(), vec![Action::Noop]);
}

#[test]
fn test_continuous_break_stops_for_good() {
    let pipeline = Pipeline::continuous(vec![Task::activity("poll").into()]).on_break("shutdown");
    let events = history(json!([scheduled(1, "poll"), signaled(2, "shutdown")]));
    let observer = RecordingObserver::new();

    assert!(pipeline.next_actions_observed(&events, &observer).unwrap().is_empty());
    assert_eq!(observer.notifications(), vec![Notification::Break("shutdown".into())]);
}

#[test]
fn test_signal_subscriber_preempts_children() {
    let pipeline = Pipeline::series(vec![Task::timer("wait", 60).into()])
        .on_signal("refresh", Task::activity("refresh"));
    let events = history(json!([signaled(1, "refresh")]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        vec![Action::schedule("refresh", Value::Null, None)]
    );
}

#[test]
fn test_signal_subscriber_reruns_on_new_signal() {
    let pipeline = Pipeline::series(vec![Task::timer("wait", 60).into()])
        .on_signal("refresh", Task::activity("refresh"));

    // Handled signal: the subscriber finished after it fired
    let handled = json!([signaled(1, "refresh"), scheduled(2, "refresh"), completed(3, 2)]);
    assert_eq!(
        pipeline.next_actions(&history(handled.clone())).unwrap(),
        vec![Action::timer("wait", 60)]
    );

    // A later signal runs the subscriber again from scratch
    let mut again = handled;
    if let Value::Array(events) = &mut again {
        events.push(signaled(4, "refresh"));
    }
    assert_eq!(
        pipeline.next_actions(&history(again)).unwrap(),
        vec![Action::schedule("refresh", Value::Null, None)]
    );
}

#[test]
fn test_signal_reaction_sees_signal_input() {
    let pipeline = Pipeline::series(vec![Task::timer("wait", 60).into()]).on_signal_reaction(
        "note",
        |events: &EventList| {
            let input = events
                .most_recent_signal("note")
                .map(|e| e.output().clone())
                .unwrap_or(Value::Null);
            Ok(vec![Action::record_marker("note", input).into()])
        },
    );
    let events = history(json!([
        { "eventId": 1, "eventType": "WorkflowExecutionSignaled",
          "workflowExecutionSignaledEventAttributes": { "signalName": "note", "input": "{\"text\":\"hi\"}" } },
    ]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        vec![Action::record_marker("note", json!({ "text": "hi" }))]
    );
}

#[test]
fn test_generated_pipeline_runs_as_series() {
    let pipeline = Pipeline::generated(|events: &EventList| {
        let count = events.events_for_task_name("seed").len();
        Ok(vec![
            Task::activity("seed").into(),
            Task::activity(format!("after-{}", count)).into(),
        ])
    });
    let events = history(json!([scheduled(1, "seed"), completed(2, 1)]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        vec![Action::schedule("after-2", Value::Null, None)]
    );
}

#[test]
fn test_workflow_start_expands_tasks_after_first_event() {
    let pipeline = Pipeline::workflow_start(|start| {
        let name = start.output()["first"].as_str().unwrap_or("missing").to_string();
        Ok(vec![Action::Noop.into(), Task::activity(name).into()])
    });
    let events = history(json!([
        { "eventId": 1, "eventType": "WorkflowExecutionStarted",
          "workflowExecutionStartedEventAttributes": { "input": "{\"first\":\"ingest\"}" } },
        { "eventId": 2, "eventType": "DecisionTaskScheduled" },
    ]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        vec![Action::schedule("ingest", Value::Null, None)]
    );
}

#[test]
fn test_replay_matches_fresh_evaluation() {
    let pipeline = Pipeline::series(vec![Task::activity("a").into(), Task::activity("b").into()]);
    let events = history(json!([scheduled(1, "a"), completed(2, 1), scheduled(3, "b")]));
    assert_eq!(
        pipeline.next_actions(&events).unwrap(),
        pipeline.next_actions(&events).unwrap()
    );
}
