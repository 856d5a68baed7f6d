//! AsyncPipeline: out-of-band work coordinated through a marker, two
//! timers, and three signals.
//!
//! A short-lived dispatcher lambda starts the real work and returns. The
//! worker then reports back only through signals sent to the workflow
//! (`<name>__started`, `<name>__completed`, `<name>__failed`). Progress is
//! persisted in a marker named after the pipeline:
//!
//! ```text
//! Not Started -> Initiated -> Scheduled -> Started -> Completed
//!                                  |           |---> Failed
//!                                  |           '---> Timed Out (STARTED_TIMEOUT)
//!                                  '---------------> Timed Out (SCHEDULE_TIMEOUT)
//! ```
//!
//! A signal can be replayed before the dispatcher's completion event. The
//! marker transition driven by the signal always wins, and the completion
//! then continues without arming the schedule-to-start timer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::domain::{Action, EventList, EventType, RetryStrategy, Timeouts, WorkflowExecution};
use crate::error::{Error, Result};

use super::node::{Node, Outcome};
use super::observer::Observer;
use super::pipeline::Pipeline;
use super::task::{HandlerContext, Task};

/// Timeout applied when none is configured, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const SCHEDULE_TIMEOUT: &str = "SCHEDULE_TIMEOUT";
const STARTED_TIMEOUT: &str = "STARTED_TIMEOUT";

/// Configuration of one async pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsyncConfig {
    /// Pipeline name; also the marker name
    pub name: String,

    /// Dispatcher lambda function
    pub function_name: String,

    /// Dispatcher input. Must be an object, JSON object text, or null.
    #[serde(default)]
    pub input: Value,

    /// Bound on the dispatcher lambda itself
    #[serde(default)]
    pub lambda_start_to_close_timeout: Option<u64>,

    /// Bound between dispatcher completion and the `started` signal
    #[serde(default)]
    pub schedule_to_start_timeout: Option<u64>,

    /// Bound between the `started` signal and a finishing signal
    #[serde(default)]
    pub start_to_close_timeout: Option<u64>,

    /// Retry strategy for the dispatcher
    #[serde(default)]
    pub retry: RetryStrategy,
}

impl AsyncConfig {
    pub fn new(name: impl Into<String>, function_name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            function_name: function_name.into(),
            input,
            ..Self::default()
        }
    }
}

/// Persisted pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncState {
    NotStarted,
    Initiated,
    Scheduled,
    Started,
    TimedOut,
    Completed,
    Failed,
}

impl AsyncState {
    const ALL: [AsyncState; 7] = [
        AsyncState::NotStarted,
        AsyncState::Initiated,
        AsyncState::Scheduled,
        AsyncState::Started,
        AsyncState::TimedOut,
        AsyncState::Completed,
        AsyncState::Failed,
    ];

    /// Marker wire string
    pub fn as_str(self) -> &'static str {
        match self {
            AsyncState::NotStarted => "Not Started",
            AsyncState::Initiated => "Initiated",
            AsyncState::Scheduled => "Scheduled",
            AsyncState::Started => "Started",
            AsyncState::TimedOut => "Timed Out",
            AsyncState::Completed => "Completed",
            AsyncState::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            AsyncState::TimedOut | AsyncState::Completed | AsyncState::Failed
        )
    }

    pub fn is_failed(self) -> bool {
        matches!(self, AsyncState::TimedOut | AsyncState::Failed)
    }
}

/// Marker details for a state, plus extra fields
fn marker_details(state: AsyncState, extra: Map<String, Value>) -> Value {
    let mut details = Map::new();
    details.insert("state".into(), Value::from(state.as_str()));
    details.extend(extra);
    Value::Object(details)
}

/// Current state and raw marker data. No marker means `Not Started`.
fn read_marker(marker: &str, history: &EventList) -> Result<(AsyncState, Value)> {
    let Some(event) = history.most_recent_marker(marker) else {
        return Ok((AsyncState::NotStarted, Value::Null));
    };
    let data = event.output().clone();
    let state = match data.get("state") {
        None | Some(Value::Null) => AsyncState::NotStarted,
        Some(Value::String(text)) => {
            AsyncState::parse(text).ok_or_else(|| Error::InvalidMarker {
                marker: marker.to_string(),
                state: text.clone(),
            })?
        }
        Some(other) => {
            return Err(Error::InvalidMarker {
                marker: marker.to_string(),
                state: other.to_string(),
            })
        }
    };
    Ok((state, data))
}

/// CancelTimer for `timer` if it is still running
fn cancel_live_timer(timer: &str, history: &EventList) -> Result<Option<Action>> {
    let Some(started) = history.live_timer(timer) else {
        return Ok(None);
    };
    let timer_id = started
        .attribute_str("timerId")
        .ok_or_else(|| Error::MissingAttribute {
            event_id: started.id(),
            event_type: started.event_type().to_string(),
            attribute: "timerId",
        })?;
    Ok(Some(Action::cancel_timer(timer, timer_id)))
}

/// Names derived from the pipeline name
#[derive(Debug, Clone)]
struct Names {
    marker: String,
    dispatcher: String,
    schedule_to_start: String,
    start_to_close: String,
    started: String,
    completed: String,
    failed: String,
    heartbeat: String,
}

impl Names {
    fn new(name: &str) -> Self {
        Self {
            marker: name.to_string(),
            dispatcher: format!("{name}__lambda"),
            schedule_to_start: format!("{name}__scheduleToStartTimeout"),
            start_to_close: format!("{name}__startToCloseTimeout"),
            started: format!("{name}__started"),
            completed: format!("{name}__completed"),
            failed: format!("{name}__failed"),
            heartbeat: format!("{name}__heartbeat"),
        }
    }
}

/// Timer task that times the pipeline out if it fires while the marker
/// still reads `expected`
fn deadline_timer(
    names: &Names,
    timer: &str,
    delay: u64,
    expected: AsyncState,
    code: &'static str,
) -> Task {
    let marker = names.marker.clone();
    Task::timer(timer, delay).on_completed(move |ctx: &HandlerContext<'_>| {
        let (state, _) = read_marker(&marker, ctx.history)?;
        if state != expected || ctx.event.event_type() != EventType::TimerFired {
            return Ok(Vec::new());
        }
        debug!(pipeline = %marker, code, "Async pipeline timed out");
        let mut extra = Map::new();
        extra.insert("details".into(), Value::from(code));
        Ok(vec![
            Action::record_marker(&marker, marker_details(AsyncState::TimedOut, extra)).into(),
            Action::fatal_with_details("TimedOut", code).into(),
        ])
    })
}

/// Out-of-band unit of work driven by signals
pub struct AsyncPipeline {
    names: Names,
    pipeline: Pipeline,
}

impl fmt::Debug for AsyncPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncPipeline")
            .field("name", &self.names.marker)
            .finish()
    }
}

impl AsyncPipeline {
    pub fn new(config: AsyncConfig) -> Self {
        let names = Names::new(&config.name);
        let schedule_to_start = config.schedule_to_start_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let start_to_close = config.start_to_close_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);

        let dispatcher = {
            let names = names.clone();
            Task::lambda(&names.dispatcher, &config.function_name)
                .with_input(config.input.clone())
                .with_timeouts(Timeouts {
                    start_to_close: Some(
                        config.lambda_start_to_close_timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
                    ),
                    ..Timeouts::default()
                })
                .with_retry(config.retry)
                .with_schedule_actions(vec![Action::record_marker(
                    &names.marker,
                    marker_details(AsyncState::Initiated, Map::new()),
                )])
                .on_completed(move |ctx| {
                    let (mut state, _) = read_marker(&names.marker, ctx.history)?;
                    let mut nodes: Vec<Node> = Vec::new();
                    if state == AsyncState::Initiated {
                        state = AsyncState::Scheduled;
                        nodes.push(
                            Action::record_marker(
                                &names.marker,
                                marker_details(AsyncState::Scheduled, Map::new()),
                            )
                            .into(),
                        );
                    }
                    if state == AsyncState::Scheduled {
                        nodes.push(
                            deadline_timer(
                                &names,
                                &names.schedule_to_start,
                                schedule_to_start,
                                AsyncState::Scheduled,
                                SCHEDULE_TIMEOUT,
                            )
                            .into(),
                        );
                    }
                    Ok(nodes)
                })
        };

        let on_started = {
            let names = names.clone();
            move |history: &EventList| -> Result<Vec<Node>> {
                if history.most_recent_signal(&names.completed).is_some()
                    || history.most_recent_signal(&names.failed).is_some()
                {
                    return Ok(Vec::new());
                }
                let (state, _) = read_marker(&names.marker, history)?;
                let mut nodes: Vec<Node> = Vec::new();
                if !state.is_finished() && state != AsyncState::Started {
                    nodes.push(
                        Action::record_marker(
                            &names.marker,
                            marker_details(AsyncState::Started, Map::new()),
                        )
                        .into(),
                    );
                }
                if let Some(cancel) = cancel_live_timer(&names.schedule_to_start, history)? {
                    nodes.push(cancel.into());
                }
                if !state.is_finished() {
                    nodes.push(
                        deadline_timer(
                            &names,
                            &names.start_to_close,
                            start_to_close,
                            AsyncState::Started,
                            STARTED_TIMEOUT,
                        )
                        .into(),
                    );
                }
                Ok(nodes)
            }
        };

        let on_completed = {
            let names = names.clone();
            move |history: &EventList| -> Result<Vec<Node>> {
                let mut nodes: Vec<Node> = Vec::new();
                let (state, _) = read_marker(&names.marker, history)?;
                if !state.is_finished() {
                    let mut extra = Map::new();
                    if let Some(signal) = history.most_recent_signal(&names.completed) {
                        if !signal.output().is_null() {
                            extra.insert("result".into(), signal.output().clone());
                        }
                    }
                    nodes.push(
                        Action::record_marker(&names.marker, marker_details(AsyncState::Completed, extra))
                            .into(),
                    );
                }
                nodes.extend(cancel_both(&names, history)?);
                Ok(nodes)
            }
        };

        let on_failed = {
            let names = names.clone();
            move |history: &EventList| -> Result<Vec<Node>> {
                let mut nodes: Vec<Node> = Vec::new();
                let (state, _) = read_marker(&names.marker, history)?;
                if !state.is_finished() {
                    let output = history
                        .most_recent_signal(&names.failed)
                        .map(|signal| signal.output().clone())
                        .filter(|output| !output.is_null())
                        .unwrap_or_else(|| json!({}));
                    let mut extra = Map::new();
                    for key in ["result", "message", "details", "reason", "cause"] {
                        if let Some(value) = output.get(key).filter(|v| !v.is_null()) {
                            extra.insert(key.into(), value.clone());
                        }
                    }
                    extra.insert("all".into(), output);
                    nodes.push(
                        Action::record_marker(&names.marker, marker_details(AsyncState::Failed, extra))
                            .into(),
                    );
                }
                nodes.extend(cancel_both(&names, history)?);
                Ok(nodes)
            }
        };

        let pipeline = Pipeline::series(vec![dispatcher.into()])
            .on_signal_reaction(names.started.clone(), on_started)
            .on_signal_reaction(names.completed.clone(), on_completed)
            .on_signal_reaction(names.failed.clone(), on_failed);

        Self { names, pipeline }
    }

    pub fn name(&self) -> &str {
        &self.names.marker
    }

    /// Name of the dispatcher lambda task
    pub fn dispatcher_name(&self) -> &str {
        &self.names.dispatcher
    }

    /// Signal names as `(started, completed, failed, heartbeat)`
    pub fn signal_names(&self) -> (&str, &str, &str, &str) {
        (
            &self.names.started,
            &self.names.completed,
            &self.names.failed,
            &self.names.heartbeat,
        )
    }

    /// The underlying series of the dispatcher and signal reactions
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Current marker state in `history`
    pub fn state(&self, history: &EventList) -> Result<AsyncState> {
        read_marker(&self.names.marker, history).map(|(state, _)| state)
    }

    #[instrument(level = "debug", skip_all, fields(pipeline = %self.names.marker))]
    pub fn evaluate(&self, history: &EventList, observer: &dyn Observer) -> Result<Outcome> {
        let execution = history.execution().ok_or(Error::MissingExecution)?;
        let (state, data) = read_marker(&self.names.marker, history)?;

        if state.is_failed() {
            let detail = ["reason", "details", "cause", "timeoutType"]
                .iter()
                .find_map(|key| data.get(*key).filter(|v| !v.is_null()).cloned())
                .unwrap_or(Value::Null);
            let actions = vec![Action::fatal_with_details(state.as_str(), detail)];
            return self.finish(state, actions, history);
        }

        if state == AsyncState::Completed {
            let mut outcome = self.finish(state, Vec::new(), history)?;
            if outcome.is_empty() {
                outcome.last_event_id = history
                    .events_for_task_name(&self.names.marker)
                    .last_event_id();
            }
            return Ok(outcome);
        }

        let mut outcome = self.pipeline.evaluate(history, None, observer)?;
        // Signal reactions preempt the dispatcher; keep a running one pending
        if !outcome.actions.is_empty()
            && !outcome.actions.contains(&Action::Noop)
            && self.dispatcher_in_flight(history)
        {
            outcome.actions.push(Action::Noop);
        }
        for action in &mut outcome.actions {
            if let Action::ScheduleLambda(lambda) = action {
                if lambda.name == self.names.dispatcher {
                    let input = std::mem::take(&mut lambda.input);
                    lambda.input = self.with_async_block(input, execution)?;
                }
            }
        }
        Ok(outcome)
    }

    fn dispatcher_in_flight(&self, history: &EventList) -> bool {
        history
            .most_recent_by_name(&self.names.dispatcher, None)
            .map_or(false, |event| event.is_scheduled() || event.is_started())
    }

    /// Append cancels for timers that outlived a finished pipeline
    fn finish(&self, state: AsyncState, mut actions: Vec<Action>, history: &EventList) -> Result<Outcome> {
        if state.is_finished() && !actions.iter().any(Action::is_actionable) {
            for timer in [&self.names.schedule_to_start, &self.names.start_to_close] {
                if let Some(cancel) = cancel_live_timer(timer, history)? {
                    actions.push(cancel);
                }
            }
        }
        Ok(Outcome::from_actions(actions))
    }

    /// Add the coordination block the remote worker signals back through
    fn with_async_block(&self, input: Value, execution: &WorkflowExecution) -> Result<Value> {
        let mut object = match input {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => map,
                _ => {
                    return Err(Error::InvalidAsyncInput {
                        task: self.names.dispatcher.clone(),
                        input: text,
                    })
                }
            },
            other => {
                return Err(Error::InvalidAsyncInput {
                    task: self.names.dispatcher.clone(),
                    input: other.to_string(),
                })
            }
        };

        object.insert(
            "async".into(),
            json!({
                "workflowExecution": execution,
                "signals": {
                    "started": self.names.started,
                    "completed": self.names.completed,
                    "failed": self.names.failed,
                    "heartbeat": self.names.heartbeat,
                }
            }),
        );
        Ok(Value::Object(object))
    }
}

fn cancel_both(names: &Names, history: &EventList) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for timer in [&names.schedule_to_start, &names.start_to_close] {
        if let Some(cancel) = cancel_live_timer(timer, history)? {
            nodes.push(cancel.into());
        }
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_strings_round_trip() {
        for state in AsyncState::ALL {
            assert_eq!(AsyncState::parse(state.as_str()), Some(state));
        }
        assert_eq!(AsyncState::parse("Running"), None);
        assert!(AsyncState::TimedOut.is_failed());
        assert!(AsyncState::Completed.is_finished());
        assert!(!AsyncState::Completed.is_failed());
    }

    #[test]
    fn test_marker_details_shape() {
        let mut extra = Map::new();
        extra.insert("details".into(), Value::from(SCHEDULE_TIMEOUT));
        assert_eq!(
            marker_details(AsyncState::TimedOut, extra),
            json!({ "state": "Timed Out", "details": "SCHEDULE_TIMEOUT" })
        );
    }

    #[test]
    fn test_unknown_marker_state_is_an_error() {
        let history = EventList::from_value(json!([
            { "eventId": 1, "eventType": "MarkerRecorded",
              "markerRecordedEventAttributes": { "markerName": "job", "details": "{\"state\":\"Running\"}" } },
        ]))
        .unwrap();
        assert!(matches!(
            read_marker("job", &history),
            Err(Error::InvalidMarker { state, .. }) if state == "Running"
        ));
    }

    #[test]
    fn test_failed_marker_record_keeps_last_state() {
        let history = EventList::from_value(json!([
            { "eventId": 1, "eventType": "MarkerRecorded",
              "markerRecordedEventAttributes": { "markerName": "job", "details": "{\"state\":\"Scheduled\"}" } },
            { "eventId": 2, "eventType": "RecordMarkerFailed",
              "recordMarkerFailedEventAttributes": { "markerName": "job", "cause": "OPERATION_NOT_PERMITTED" } },
        ]))
        .unwrap();
        let (state, data) = read_marker("job", &history).unwrap();
        assert_eq!(state, AsyncState::Scheduled);
        assert_eq!(data, json!({ "state": "Scheduled" }));
    }

    #[test]
    fn test_non_object_input_is_rejected() {
        let pipeline = AsyncPipeline::new(AsyncConfig::new("job", "dispatch", json!([1, 2])));
        let result = pipeline.with_async_block(json!([1, 2]), &WorkflowExecution::new("wf", "run"));
        assert!(matches!(result, Err(Error::InvalidAsyncInput { .. })));
    }
}
