//! Leaf actions: the closed vocabulary a pipeline evaluates to.
//!
//! Each action carries exactly what the decider needs to render one
//! protocol decision. `Noop` renders nothing; it marks "in flight, waiting"
//! and is distinct from an empty action list, which means "nothing to do".

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timeout settings, in seconds, for scheduled work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub schedule_to_start: Option<u64>,
    pub schedule_to_close: Option<u64>,
    pub start_to_close: Option<u64>,
    pub heartbeat: Option<u64>,

    /// Child workflow: whole execution bound
    pub execution_start_to_close: Option<u64>,

    /// Child workflow: decision task bound
    pub task_start_to_close: Option<u64>,
}

/// Schedule one activity attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleActivity {
    pub name: String,
    pub input: Value,

    /// Registered activity type; the task name when absent
    pub activity_type: Option<String>,
    pub version: Option<String>,
    pub task_list: Option<String>,
    pub timeouts: Timeouts,
}

/// Start a named timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartTimer {
    pub name: String,
    pub delay_seconds: u64,
}

/// Invoke a lambda function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleLambda {
    pub name: String,
    pub function_name: String,
    pub input: Value,
    pub start_to_close_timeout: Option<u64>,
}

/// Start a child workflow execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartChildWorkflow {
    pub name: String,
    pub workflow_type: String,
    pub workflow_version: Option<String>,
    pub input: Value,
    pub child_policy: Option<String>,
    pub lambda_role: Option<String>,
    pub tag_list: Vec<String>,
    pub task_list: Option<String>,
    pub task_priority: Option<String>,
    pub execution_start_to_close_timeout: Option<u64>,
    pub task_start_to_close_timeout: Option<u64>,
}

/// A terminal, non-expandable decision value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Schedule(ScheduleActivity),
    Timer(StartTimer),
    CancelTimer { name: String, timer_id: String },
    ScheduleLambda(ScheduleLambda),
    ChildWorkflow(StartChildWorkflow),
    RecordMarker { name: String, details: Value },
    FatalError { reason: Value, details: Value },
    Noop,
}

impl Action {
    /// Schedule an activity with no explicit type, list, or timeouts
    pub fn schedule(name: impl Into<String>, input: Value, version: Option<String>) -> Self {
        Action::Schedule(ScheduleActivity {
            name: name.into(),
            input,
            activity_type: None,
            version,
            task_list: None,
            timeouts: Timeouts::default(),
        })
    }

    pub fn timer(name: impl Into<String>, delay_seconds: u64) -> Self {
        Action::Timer(StartTimer {
            name: name.into(),
            delay_seconds,
        })
    }

    pub fn cancel_timer(name: impl Into<String>, timer_id: impl Into<String>) -> Self {
        Action::CancelTimer {
            name: name.into(),
            timer_id: timer_id.into(),
        }
    }

    pub fn lambda(
        name: impl Into<String>,
        function_name: impl Into<String>,
        input: Value,
        start_to_close_timeout: Option<u64>,
    ) -> Self {
        Action::ScheduleLambda(ScheduleLambda {
            name: name.into(),
            function_name: function_name.into(),
            input,
            start_to_close_timeout,
        })
    }

    pub fn record_marker(name: impl Into<String>, details: Value) -> Self {
        Action::RecordMarker {
            name: name.into(),
            details,
        }
    }

    /// Terminal failure with a reason and no details
    pub fn fatal(reason: impl Into<Value>) -> Self {
        Action::FatalError {
            reason: reason.into(),
            details: Value::Null,
        }
    }

    pub fn fatal_with_details(reason: impl Into<Value>, details: impl Into<Value>) -> Self {
        Action::FatalError {
            reason: reason.into(),
            details: details.into(),
        }
    }

    /// Anything but `Noop` renders a decision
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Action::Noop)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Action::FatalError { .. })
    }
}
