//! Async Pipeline Integration Tests
//!
//! Tests for the dispatcher lambda, callback signals, and the
//! schedule-to-start and start-to-close deadlines.

use serde_json::{json, Value};
use swf_decider::core::{AsyncConfig, AsyncPipeline, AsyncState, Outcome, Pipeline, Task, TracingObserver};
use swf_decider::domain::{Action, EventList, WorkflowExecution};
use swf_decider::Error;

const SCHEDULE_TIMER: &str = "job__scheduleToStartTimeout";
const START_TIMER: &str = "job__startToCloseTimeout";

fn job() -> AsyncPipeline {
    AsyncPipeline::new(AsyncConfig::new("job", "dispatch", json!({ "video": "a.mp4" })))
}

fn history(events: Vec<Value>) -> EventList {
    EventList::from_value(Value::Array(events))
        .unwrap()
        .with_execution(Some(WorkflowExecution::new("wf-1", "run-1")))
}

fn marker(id: i64, state: &str) -> Value {
    json!({ "eventId": id, "eventType": "MarkerRecorded",
            "markerRecordedEventAttributes": {
                "markerName": "job",
                "details": json!({ "state": state }).to_string() } })
}

fn signal(id: i64, name: &str, input: Value) -> Value {
    json!({ "eventId": id, "eventType": "WorkflowExecutionSignaled",
            "workflowExecutionSignaledEventAttributes": {
                "signalName": name, "input": input.to_string() } })
}

fn timer_started(id: i64, name: &str, after: i64) -> Value {
    json!({ "eventId": id, "eventType": "TimerStarted",
            "timerStartedEventAttributes": {
                "control": name, "timerId": format!("{}:{}", name, after),
                "startToFireTimeout": "300" } })
}

fn timer_fired(id: i64, name: &str, after: i64, started: i64) -> Value {
    json!({ "eventId": id, "eventType": "TimerFired",
            "timerFiredEventAttributes": {
                "timerId": format!("{}:{}", name, after), "startedEventId": started } })
}

fn timer_canceled(id: i64, name: &str, after: i64, started: i64) -> Value {
    json!({ "eventId": id, "eventType": "TimerCanceled",
            "timerCanceledEventAttributes": {
                "timerId": format!("{}:{}", name, after), "startedEventId": started } })
}

/// Dispatcher initiated, scheduled, and started
fn dispatched() -> Vec<Value> {
    vec![
        marker(1, "Initiated"),
        json!({ "eventId": 2, "eventType": "LambdaFunctionScheduled",
                "lambdaFunctionScheduledEventAttributes": { "id": "job__lambda", "name": "dispatch" } }),
        json!({ "eventId": 3, "eventType": "LambdaFunctionStarted",
                "lambdaFunctionStartedEventAttributes": { "scheduledEventId": 2 } }),
    ]
}

/// Dispatcher completed, marker at Scheduled, schedule-to-start timer running
fn awaiting_start() -> Vec<Value> {
    let mut events = dispatched();
    events.extend([
        json!({ "eventId": 4, "eventType": "LambdaFunctionCompleted",
                "lambdaFunctionCompletedEventAttributes": { "scheduledEventId": 2 } }),
        marker(5, "Scheduled"),
        timer_started(6, SCHEDULE_TIMER, 5),
    ]);
    events
}

/// Worker reported in; start-to-close timer running
fn running() -> Vec<Value> {
    let mut events = awaiting_start();
    events.extend([
        signal(7, "job__started", Value::Null),
        marker(8, "Started"),
        timer_canceled(9, SCHEDULE_TIMER, 5, 6),
        timer_started(10, START_TIMER, 9),
    ]);
    events
}

#[test]
fn test_empty_history_initiates_and_dispatches() {
    let pipeline = Pipeline::from(job());
    let actions = pipeline.next_actions(&history(Vec::new())).unwrap();

    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Initiated" })),
            Action::lambda(
                "job__lambda",
                "dispatch",
                json!({
                    "video": "a.mp4",
                    "async": {
                        "workflowExecution": { "workflowId": "wf-1", "runId": "run-1" },
                        "signals": {
                            "started": "job__started",
                            "completed": "job__completed",
                            "failed": "job__failed",
                            "heartbeat": "job__heartbeat",
                        }
                    }
                }),
                Some(300),
            ),
        ]
    );
}

#[test]
fn test_dispatcher_in_flight_waits() {
    let actions = Pipeline::from(job()).next_actions(&history(dispatched())).unwrap();
    assert_eq!(actions, vec![Action::Noop]);
}

#[test]
fn test_dispatcher_completion_arms_schedule_timer() {
    let mut events = dispatched();
    events.push(json!({ "eventId": 4, "eventType": "LambdaFunctionCompleted",
                        "lambdaFunctionCompletedEventAttributes": { "scheduledEventId": 2 } }));

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Scheduled" })),
            Action::timer(SCHEDULE_TIMER, 300),
        ]
    );
}

#[test]
fn test_schedule_timer_running_waits() {
    let actions = Pipeline::from(job()).next_actions(&history(awaiting_start())).unwrap();
    assert_eq!(actions, vec![Action::Noop]);
}

#[test]
fn test_schedule_timeout_fails_workflow() {
    let mut events = awaiting_start();
    events.push(timer_fired(7, SCHEDULE_TIMER, 5, 6));

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Timed Out", "details": "SCHEDULE_TIMEOUT" })),
            Action::fatal_with_details("TimedOut", "SCHEDULE_TIMEOUT"),
        ]
    );
}

#[test]
fn test_started_signal_cancels_schedule_timer() {
    let mut events = awaiting_start();
    events.push(signal(7, "job__started", Value::Null));

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Started" })),
            Action::cancel_timer(SCHEDULE_TIMER, "job__scheduleToStartTimeout:5"),
            Action::timer(START_TIMER, 300),
        ]
    );
}

#[test]
fn test_started_signal_before_dispatcher_completion() {
    let mut events = dispatched();
    events.push(signal(4, "job__started", Value::Null));

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Started" })),
            Action::timer(START_TIMER, 300),
            Action::Noop,
        ]
    );
}

#[test]
fn test_completed_signal_while_dispatcher_runs_stays_pending() {
    let mut events = dispatched();
    events.push(signal(4, "job__completed", json!({ "ok": true })));

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Completed", "result": { "ok": true } })),
            Action::Noop,
        ]
    );
}

#[test]
fn test_dispatcher_completion_after_start_skips_schedule_timer() {
    let mut events = dispatched();
    events.extend([
        signal(4, "job__started", Value::Null),
        marker(5, "Started"),
        timer_started(6, START_TIMER, 5),
        json!({ "eventId": 7, "eventType": "LambdaFunctionCompleted",
                "lambdaFunctionCompletedEventAttributes": { "scheduledEventId": 2 } }),
    ]);

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(actions, vec![Action::Noop]);
}

#[test]
fn test_start_to_close_timeout_fails_workflow() {
    let mut events = running();
    events.push(timer_fired(11, START_TIMER, 9, 10));

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Timed Out", "details": "STARTED_TIMEOUT" })),
            Action::fatal_with_details("TimedOut", "STARTED_TIMEOUT"),
        ]
    );
}

#[test]
fn test_completed_signal_records_result() {
    let mut events = running();
    events.push(signal(11, "job__completed", json!({ "ok": true })));

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker("job", json!({ "state": "Completed", "result": { "ok": true } })),
            Action::cancel_timer(START_TIMER, "job__startToCloseTimeout:9"),
        ]
    );
}

#[test]
fn test_completed_marker_finishes_pipeline() {
    let mut events = running();
    events.extend([
        signal(11, "job__completed", json!({ "ok": true })),
        json!({ "eventId": 12, "eventType": "MarkerRecorded",
                "markerRecordedEventAttributes": {
                    "markerName": "job",
                    "details": "{\"state\":\"Completed\",\"result\":{\"ok\":true}}" } }),
        timer_canceled(13, START_TIMER, 9, 10),
    ]);
    let events = history(events);
    let job = job();

    assert_eq!(job.state(&events).unwrap(), AsyncState::Completed);
    assert_eq!(job.evaluate(&events, &TracingObserver).unwrap(), Outcome::finished(12));

    let series = Pipeline::series(vec![job.into(), Task::activity("publish").into()]);
    assert_eq!(
        series.next_actions(&events).unwrap(),
        vec![Action::schedule("publish", Value::Null, None)]
    );
}

#[test]
fn test_completed_marker_cancels_leftover_timer() {
    let mut events = running();
    events.extend([
        signal(11, "job__completed", Value::Null),
        marker(12, "Completed"),
    ]);

    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(
        actions,
        vec![Action::cancel_timer(START_TIMER, "job__startToCloseTimeout:9")]
    );
}

#[test]
fn test_failed_signal_then_failed_marker() {
    let payload = json!({ "reason": "codec", "message": "unsupported" });
    let mut events = running();
    events.push(signal(11, "job__failed", payload.clone()));

    let actions = Pipeline::from(job()).next_actions(&history(events.clone())).unwrap();
    assert_eq!(
        actions,
        vec![
            Action::record_marker(
                "job",
                json!({ "state": "Failed", "reason": "codec", "message": "unsupported", "all": payload }),
            ),
            Action::cancel_timer(START_TIMER, "job__startToCloseTimeout:9"),
        ]
    );

    events.extend([
        json!({ "eventId": 12, "eventType": "MarkerRecorded",
                "markerRecordedEventAttributes": {
                    "markerName": "job",
                    "details": json!({ "state": "Failed", "reason": "codec", "all": payload }).to_string() } }),
        timer_canceled(13, START_TIMER, 9, 10),
    ]);
    let actions = Pipeline::from(job()).next_actions(&history(events)).unwrap();
    assert_eq!(actions, vec![Action::fatal_with_details("Failed", "codec")]);
}

#[test]
fn test_missing_execution_is_an_error() {
    let events = EventList::from_value(json!([])).unwrap();
    let result = Pipeline::from(job()).next_actions(&events);
    assert!(matches!(result, Err(Error::MissingExecution)));
}
