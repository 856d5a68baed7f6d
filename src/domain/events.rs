//! History events and the queryable event list.
//!
//! The orchestration service hands the decider the complete, append-only
//! history of one workflow execution. Every raw record is normalised into an
//! immutable [`Event`] carrying a derived task name and a decoded output, and
//! the whole history becomes an [`EventList`] that can be sliced by task
//! name, type, or event id without ever changing the original order.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Monotonic, unique id of a history event. Also the causal-order key.
pub type EventId = i64;

/// Suffix of the private timer a task uses to delay a retry.
pub const BACKOFF_SUFFIX: &str = "__backoff";

/// Every history event type the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    ActivityTaskScheduled,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCanceled,
    ActivityTaskCancelRequested,
    RequestCancelActivityTaskFailed,
    ScheduleActivityTaskFailed,
    TimerStarted,
    TimerFired,
    TimerCanceled,
    StartTimerFailed,
    CancelTimerFailed,
    LambdaFunctionScheduled,
    LambdaFunctionStarted,
    LambdaFunctionCompleted,
    LambdaFunctionFailed,
    LambdaFunctionTimedOut,
    ScheduleLambdaFunctionFailed,
    StartLambdaFunctionFailed,
    StartChildWorkflowExecutionInitiated,
    ChildWorkflowExecutionStarted,
    ChildWorkflowExecutionCompleted,
    ChildWorkflowExecutionFailed,
    ChildWorkflowExecutionTimedOut,
    ChildWorkflowExecutionCanceled,
    ChildWorkflowExecutionTerminated,
    StartChildWorkflowExecutionFailed,
    MarkerRecorded,
    RecordMarkerFailed,
    WorkflowExecutionStarted,
    WorkflowExecutionSignaled,
    WorkflowExecutionCancelRequested,
    CompleteWorkflowExecutionFailed,
    FailWorkflowExecutionFailed,
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    DecisionTaskTimedOut,
}

impl EventType {
    const ALL: [EventType; 40] = [
        EventType::ActivityTaskScheduled,
        EventType::ActivityTaskStarted,
        EventType::ActivityTaskCompleted,
        EventType::ActivityTaskFailed,
        EventType::ActivityTaskTimedOut,
        EventType::ActivityTaskCanceled,
        EventType::ActivityTaskCancelRequested,
        EventType::RequestCancelActivityTaskFailed,
        EventType::ScheduleActivityTaskFailed,
        EventType::TimerStarted,
        EventType::TimerFired,
        EventType::TimerCanceled,
        EventType::StartTimerFailed,
        EventType::CancelTimerFailed,
        EventType::LambdaFunctionScheduled,
        EventType::LambdaFunctionStarted,
        EventType::LambdaFunctionCompleted,
        EventType::LambdaFunctionFailed,
        EventType::LambdaFunctionTimedOut,
        EventType::ScheduleLambdaFunctionFailed,
        EventType::StartLambdaFunctionFailed,
        EventType::StartChildWorkflowExecutionInitiated,
        EventType::ChildWorkflowExecutionStarted,
        EventType::ChildWorkflowExecutionCompleted,
        EventType::ChildWorkflowExecutionFailed,
        EventType::ChildWorkflowExecutionTimedOut,
        EventType::ChildWorkflowExecutionCanceled,
        EventType::ChildWorkflowExecutionTerminated,
        EventType::StartChildWorkflowExecutionFailed,
        EventType::MarkerRecorded,
        EventType::RecordMarkerFailed,
        EventType::WorkflowExecutionStarted,
        EventType::WorkflowExecutionSignaled,
        EventType::WorkflowExecutionCancelRequested,
        EventType::CompleteWorkflowExecutionFailed,
        EventType::FailWorkflowExecutionFailed,
        EventType::DecisionTaskScheduled,
        EventType::DecisionTaskStarted,
        EventType::DecisionTaskCompleted,
        EventType::DecisionTaskTimedOut,
    ];

    /// Parse the service's `eventType` string.
    ///
    /// An unrecognised type is an error: a history the engine cannot
    /// classify means the pipeline definition and the history diverged.
    pub fn parse(value: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| Error::UnknownEventType(value.to_string()))
    }

    /// The wire name of this event type
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ActivityTaskScheduled => "ActivityTaskScheduled",
            EventType::ActivityTaskStarted => "ActivityTaskStarted",
            EventType::ActivityTaskCompleted => "ActivityTaskCompleted",
            EventType::ActivityTaskFailed => "ActivityTaskFailed",
            EventType::ActivityTaskTimedOut => "ActivityTaskTimedOut",
            EventType::ActivityTaskCanceled => "ActivityTaskCanceled",
            EventType::ActivityTaskCancelRequested => "ActivityTaskCancelRequested",
            EventType::RequestCancelActivityTaskFailed => "RequestCancelActivityTaskFailed",
            EventType::ScheduleActivityTaskFailed => "ScheduleActivityTaskFailed",
            EventType::TimerStarted => "TimerStarted",
            EventType::TimerFired => "TimerFired",
            EventType::TimerCanceled => "TimerCanceled",
            EventType::StartTimerFailed => "StartTimerFailed",
            EventType::CancelTimerFailed => "CancelTimerFailed",
            EventType::LambdaFunctionScheduled => "LambdaFunctionScheduled",
            EventType::LambdaFunctionStarted => "LambdaFunctionStarted",
            EventType::LambdaFunctionCompleted => "LambdaFunctionCompleted",
            EventType::LambdaFunctionFailed => "LambdaFunctionFailed",
            EventType::LambdaFunctionTimedOut => "LambdaFunctionTimedOut",
            EventType::ScheduleLambdaFunctionFailed => "ScheduleLambdaFunctionFailed",
            EventType::StartLambdaFunctionFailed => "StartLambdaFunctionFailed",
            EventType::StartChildWorkflowExecutionInitiated => {
                "StartChildWorkflowExecutionInitiated"
            }
            EventType::ChildWorkflowExecutionStarted => "ChildWorkflowExecutionStarted",
            EventType::ChildWorkflowExecutionCompleted => "ChildWorkflowExecutionCompleted",
            EventType::ChildWorkflowExecutionFailed => "ChildWorkflowExecutionFailed",
            EventType::ChildWorkflowExecutionTimedOut => "ChildWorkflowExecutionTimedOut",
            EventType::ChildWorkflowExecutionCanceled => "ChildWorkflowExecutionCanceled",
            EventType::ChildWorkflowExecutionTerminated => "ChildWorkflowExecutionTerminated",
            EventType::StartChildWorkflowExecutionFailed => "StartChildWorkflowExecutionFailed",
            EventType::MarkerRecorded => "MarkerRecorded",
            EventType::RecordMarkerFailed => "RecordMarkerFailed",
            EventType::WorkflowExecutionStarted => "WorkflowExecutionStarted",
            EventType::WorkflowExecutionSignaled => "WorkflowExecutionSignaled",
            EventType::WorkflowExecutionCancelRequested => "WorkflowExecutionCancelRequested",
            EventType::CompleteWorkflowExecutionFailed => "CompleteWorkflowExecutionFailed",
            EventType::FailWorkflowExecutionFailed => "FailWorkflowExecutionFailed",
            EventType::DecisionTaskScheduled => "DecisionTaskScheduled",
            EventType::DecisionTaskStarted => "DecisionTaskStarted",
            EventType::DecisionTaskCompleted => "DecisionTaskCompleted",
            EventType::DecisionTaskTimedOut => "DecisionTaskTimedOut",
        }
    }

    /// Key of the type-specific attribute object (`timerFiredEventAttributes`, ...)
    pub fn attributes_key(self) -> String {
        let name = self.as_str();
        let mut key = String::with_capacity(name.len() + 15);
        let mut chars = name.chars();
        if let Some(first) = chars.next() {
            key.push(first.to_ascii_lowercase());
        }
        key.extend(chars);
        key.push_str("EventAttributes");
        key
    }

    /// Lifecycle classification of this event type
    pub fn phase(self) -> EventPhase {
        use EventType::*;
        match self {
            ActivityTaskScheduled | LambdaFunctionScheduled | StartChildWorkflowExecutionInitiated => {
                EventPhase::Scheduled
            }
            ActivityTaskStarted | LambdaFunctionStarted | ChildWorkflowExecutionStarted
            | TimerStarted => EventPhase::Started,
            ActivityTaskCompleted | LambdaFunctionCompleted | ChildWorkflowExecutionCompleted
            | TimerFired | MarkerRecorded => EventPhase::Completed,
            ActivityTaskCanceled | TimerCanceled | ChildWorkflowExecutionCanceled => {
                EventPhase::Canceled
            }
            ActivityTaskFailed | LambdaFunctionFailed | ChildWorkflowExecutionFailed
            | ChildWorkflowExecutionTerminated => EventPhase::Failed,
            ActivityTaskTimedOut | LambdaFunctionTimedOut | ChildWorkflowExecutionTimedOut => {
                EventPhase::TimedOut
            }
            ScheduleActivityTaskFailed | ScheduleLambdaFunctionFailed | StartLambdaFunctionFailed
            | StartChildWorkflowExecutionFailed | StartTimerFailed | RecordMarkerFailed => {
                EventPhase::Fatal
            }
            WorkflowExecutionSignaled => EventPhase::Signaled,
            ActivityTaskCancelRequested
            | RequestCancelActivityTaskFailed
            | CancelTimerFailed
            | WorkflowExecutionStarted
            | WorkflowExecutionCancelRequested
            | CompleteWorkflowExecutionFailed
            | FailWorkflowExecutionFailed
            | DecisionTaskScheduled
            | DecisionTaskStarted
            | DecisionTaskCompleted
            | DecisionTaskTimedOut => EventPhase::Bookkeeping,
        }
    }

    fn family(self) -> Family {
        use EventType::*;
        match self {
            ActivityTaskScheduled
            | ActivityTaskStarted
            | ActivityTaskCompleted
            | ActivityTaskFailed
            | ActivityTaskTimedOut
            | ActivityTaskCanceled
            | ActivityTaskCancelRequested
            | RequestCancelActivityTaskFailed
            | ScheduleActivityTaskFailed => Family::Activity,
            TimerStarted | TimerFired | TimerCanceled | StartTimerFailed | CancelTimerFailed => {
                Family::Timer
            }
            LambdaFunctionScheduled
            | LambdaFunctionStarted
            | LambdaFunctionCompleted
            | LambdaFunctionFailed
            | LambdaFunctionTimedOut
            | ScheduleLambdaFunctionFailed
            | StartLambdaFunctionFailed => Family::Lambda,
            StartChildWorkflowExecutionInitiated
            | ChildWorkflowExecutionStarted
            | ChildWorkflowExecutionCompleted
            | ChildWorkflowExecutionFailed
            | ChildWorkflowExecutionTimedOut
            | ChildWorkflowExecutionCanceled
            | ChildWorkflowExecutionTerminated
            | StartChildWorkflowExecutionFailed => Family::ChildWorkflow,
            MarkerRecorded | RecordMarkerFailed => Family::Marker,
            WorkflowExecutionSignaled => Family::Signal,
            _ => Family::Execution,
        }
    }

    /// Attribute that names the task directly, when the event carries one
    fn name_keys(self) -> &'static [&'static str] {
        match self.family() {
            Family::Activity => &["activityId"],
            Family::Lambda => &["id"],
            Family::Timer => &["control"],
            Family::ChildWorkflow => &["control", "workflowId"],
            Family::Marker => &["markerName"],
            Family::Signal => &["signalName"],
            Family::Execution => &[],
        }
    }

    /// Attribute pointing at the earlier event that carries the task name
    fn reference_key(self) -> Option<&'static str> {
        match self.family() {
            Family::Activity | Family::Lambda => Some("scheduledEventId"),
            Family::Timer => Some("startedEventId"),
            Family::ChildWorkflow => Some("initiatedEventId"),
            _ => None,
        }
    }

    /// Attributes holding the event's textual payload, in lookup order
    fn payload_keys(self) -> &'static [&'static str] {
        match self {
            EventType::MarkerRecorded => &["details"],
            EventType::WorkflowExecutionSignaled | EventType::WorkflowExecutionStarted => {
                &["input"]
            }
            _ => match self.phase() {
                EventPhase::Completed => &["result"],
                EventPhase::Failed | EventPhase::TimedOut => &["details", "reason"],
                EventPhase::Fatal => &["cause"],
                _ => &[],
            },
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Activity,
    Timer,
    Lambda,
    ChildWorkflow,
    Marker,
    Signal,
    Execution,
}

/// Lifecycle classification shared by every unit-of-work kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    Scheduled,
    Started,
    Completed,
    Canceled,
    Failed,
    TimedOut,

    /// The service rejected the scheduling request itself
    Fatal,

    Signaled,

    /// Execution-level records that belong to no task
    Bookkeeping,
}

/// Milestone filter for [`EventList::most_recent_by_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    /// Scheduled or started: the task was activated
    Activated,
    Completed,
    Canceled,
}

impl Milestone {
    fn matches(self, event: &Event) -> bool {
        match self {
            Milestone::Activated => event.is_scheduled() || event.is_started(),
            Milestone::Completed => event.is_completed(),
            Milestone::Canceled => event.is_canceled(),
        }
    }
}

/// Identity of the workflow execution a history belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub workflow_id: String,
    pub run_id: String,
}

impl WorkflowExecution {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

/// One history record exactly as the service delivers it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default)]
    pub event_id: EventId,

    pub event_type: String,

    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub event_timestamp: Option<DateTime<Utc>>,

    /// Type-specific attribute objects
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Accept RFC 3339 text or epoch seconds, the two forms the service emits.
fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(serde::de::Error::custom),
        Some(Value::Number(number)) => {
            let seconds = number
                .as_f64()
                .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))?;
            let whole = seconds.trunc() as i64;
            let nanos = ((seconds - seconds.trunc()) * 1e9).round() as u32;
            Ok(Utc.timestamp_opt(whole, nanos.min(999_999_999)).single())
        }
        Some(other) => Err(serde::de::Error::custom(format!(
            "unsupported timestamp: {}",
            other
        ))),
    }
}

/// An immutable, classified history event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: EventId,
    event_type: EventType,
    timestamp: Option<DateTime<Utc>>,
    task_name: Option<String>,
    attributes: Value,
    output: Value,
}

impl Event {
    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Logical task name derived from control/activityId/markerName/id
    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    /// Raw type-specific attributes
    pub fn attributes(&self) -> &Value {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key).filter(|v| !v.is_null())
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Decoded payload. JSON text is parsed, anything else is kept verbatim.
    pub fn output(&self) -> &Value {
        &self.output
    }

    pub fn phase(&self) -> EventPhase {
        self.event_type.phase()
    }

    pub fn is_scheduled(&self) -> bool {
        self.phase() == EventPhase::Scheduled
    }

    pub fn is_started(&self) -> bool {
        self.phase() == EventPhase::Started
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == EventPhase::Completed
    }

    pub fn is_canceled(&self) -> bool {
        self.phase() == EventPhase::Canceled
    }

    pub fn is_failure(&self) -> bool {
        self.phase() == EventPhase::Failed
    }

    pub fn is_timeout(&self) -> bool {
        self.phase() == EventPhase::TimedOut
    }

    pub fn is_fatal(&self) -> bool {
        self.phase() == EventPhase::Fatal
    }

    pub fn is_signal(&self) -> bool {
        self.phase() == EventPhase::Signaled
    }

    /// Event of a task's private retry-delay timer
    pub fn is_backoff(&self) -> bool {
        self.event_type.family() == Family::Timer
            && self
                .task_name
                .as_deref()
                .map_or(false, |name| name.ends_with(BACKOFF_SUFFIX))
    }

    /// Whether this event happened after `other`.
    ///
    /// Timestamps decide; the event id breaks the tie when either is missing.
    pub fn occurred_after(&self, other: &Event) -> bool {
        match (self.timestamp, other.timestamp) {
            (Some(mine), Some(theirs)) => mine > theirs,
            _ => self.id > other.id,
        }
    }
}

/// Decode a textual payload as JSON, falling back to the raw string.
pub fn decode_payload(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        other => other.clone(),
    }
}

/// The ordered history of one workflow execution (or a window of it).
///
/// Order is always the service's order, which is also event-id order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventList {
    events: Vec<Event>,
    execution: Option<WorkflowExecution>,
}

impl EventList {
    /// Classify raw history records, resolving task names through the
    /// events they reference.
    pub fn from_raw(raw: Vec<RawEvent>) -> Result<Self> {
        let mut names: HashMap<EventId, String> = HashMap::new();
        let mut timer_names: HashMap<String, String> = HashMap::new();
        let mut events = Vec::with_capacity(raw.len());

        for record in raw {
            let event_type = EventType::parse(&record.event_type)?;
            let attributes = record
                .rest
                .get(&event_type.attributes_key())
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new()));

            let task_name = if event_type.phase() == EventPhase::Bookkeeping {
                None
            } else {
                derive_task_name(event_type, &attributes, &names, &timer_names)
            };

            if let Some(ref name) = task_name {
                names.insert(record.event_id, name.clone());
                if event_type == EventType::TimerStarted {
                    if let Some(timer_id) = attributes.get("timerId").and_then(Value::as_str) {
                        timer_names.insert(timer_id.to_string(), name.clone());
                    }
                }
            }

            let output = event_type
                .payload_keys()
                .iter()
                .find_map(|key| attributes.get(*key).filter(|v| !v.is_null()))
                .map(decode_payload)
                .unwrap_or(Value::Null);

            events.push(Event {
                id: record.event_id,
                event_type,
                timestamp: record.event_timestamp,
                task_name,
                attributes,
                output,
            });
        }

        Ok(Self {
            events,
            execution: None,
        })
    }

    /// Parse a JSON array of raw history records
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: Vec<RawEvent> = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    /// Attach the execution identity used for interpolation and signalling
    pub fn with_execution(mut self, execution: Option<WorkflowExecution>) -> Self {
        self.execution = execution;
        self
    }

    /// An empty list that keeps this list's execution identity
    pub fn empty_like(&self) -> Self {
        Self {
            events: Vec::new(),
            execution: self.execution.clone(),
        }
    }

    pub fn execution(&self) -> Option<&WorkflowExecution> {
        self.execution.as_ref()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.iter()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.last()
    }

    pub fn last_event_id(&self) -> Option<EventId> {
        self.events.last().map(Event::id)
    }

    fn filtered(&self, predicate: impl Fn(&Event) -> bool) -> Self {
        Self {
            events: self.events.iter().filter(|e| predicate(e)).cloned().collect(),
            execution: self.execution.clone(),
        }
    }

    /// All events attributed to the named task, in order
    pub fn events_for_task_name(&self, name: &str) -> Self {
        self.filtered(|e| e.task_name() == Some(name))
    }

    /// All events of one type, in order
    pub fn events_for_type(&self, event_type: EventType) -> Self {
        self.filtered(|e| e.event_type() == event_type)
    }

    /// The same list with signal deliveries dropped
    pub fn without_signals(&self) -> Self {
        self.filtered(|e| !e.is_signal())
    }

    /// Events strictly after the given id
    pub fn after(&self, event_id: EventId) -> Self {
        self.filtered(|e| e.id() > event_id)
    }

    /// Most recent event for the task, optionally restricted to a milestone
    pub fn most_recent_by_name(&self, name: &str, milestone: Option<Milestone>) -> Option<&Event> {
        self.events.iter().rev().find(|e| {
            e.task_name() == Some(name) && milestone.map_or(true, |m| m.matches(e))
        })
    }

    /// Most recent `MarkerRecorded` for the named marker
    pub fn most_recent_marker(&self, name: &str) -> Option<&Event> {
        self.events
            .iter()
            .rev()
            .find(|e| e.event_type() == EventType::MarkerRecorded && e.task_name() == Some(name))
    }

    /// Most recent delivery of the named signal
    pub fn most_recent_signal(&self, signal: &str) -> Option<&Event> {
        self.events
            .iter()
            .rev()
            .find(|e| e.is_signal() && e.task_name() == Some(signal))
    }

    pub fn first_of_type(&self, event_type: EventType) -> Option<&Event> {
        self.events.iter().find(|e| e.event_type() == event_type)
    }

    /// Number of failed or timed-out attempts in this list
    pub fn failures_or_timeouts(&self) -> u32 {
        self.events
            .iter()
            .filter(|e| e.is_failure() || e.is_timeout())
            .count() as u32
    }

    /// The `TimerStarted` event of the named timer, if that timer has not
    /// fired or been canceled since.
    pub fn live_timer(&self, name: &str) -> Option<&Event> {
        let position = self
            .events
            .iter()
            .rposition(|e| e.event_type() == EventType::TimerStarted && e.task_name() == Some(name))?;
        let closed = self.events[position + 1..]
            .iter()
            .any(|e| {
                e.task_name() == Some(name) && (e.is_completed() || e.is_canceled() || e.is_fatal())
            });
        if closed {
            None
        } else {
            Some(&self.events[position])
        }
    }
}

fn derive_task_name(
    event_type: EventType,
    attributes: &Value,
    names: &HashMap<EventId, String>,
    timer_names: &HashMap<String, String>,
) -> Option<String> {
    let direct = event_type
        .name_keys()
        .iter()
        .find_map(|key| attributes.get(*key).and_then(Value::as_str));
    if let Some(name) = direct {
        return Some(name.to_string());
    }

    if let Some(key) = event_type.reference_key() {
        if let Some(name) = attributes
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|id| names.get(&id))
        {
            return Some(name.clone());
        }
    }

    if event_type.family() == Family::Timer {
        if let Some(name) = attributes
            .get("timerId")
            .and_then(Value::as_str)
            .and_then(|id| timer_names.get(id))
        {
            return Some(name.clone());
        }
        // Timers this engine starts carry `<name>:<event id>` ids
        if let Some((name, _)) = attributes
            .get("timerId")
            .and_then(Value::as_str)
            .and_then(|id| id.rsplit_once(':'))
        {
            return Some(name.to_string());
        }
    }

    None
}
