//! Task: the state machine for one named unit of work.
//!
//! A task never keeps state between calls. Every evaluation re-reads the
//! task's own events from history and decides, from the most recent one,
//! whether to schedule, wait, retry, fail, or report that it is finished.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::domain::action::{ScheduleActivity, StartChildWorkflow};
use crate::domain::events::BACKOFF_SUFFIX;
use crate::domain::{Action, Event, EventId, EventList, Milestone, RetryStrategy, Timeouts};
use crate::error::{Error, Result};

use super::interpolate::interpolate;
use super::node::{expand_nodes, Node, Outcome};
use super::observer::Observer;

/// Reason attached to the failure once retries are exhausted
pub const RETRY_LIMIT_REACHED: &str = "Retry limit reached.";

/// Kind of work a task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Activity,
    Timer,
    Lambda,
    ChildWorkflow,
    Marker,
    Fail,
    CancelTimer,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Activity => "activity",
            TaskKind::Timer => "timer",
            TaskKind::Lambda => "lambda",
            TaskKind::ChildWorkflow => "child_workflow",
            TaskKind::Marker => "marker",
            TaskKind::Fail => "fail",
            TaskKind::CancelTimer => "cancel_timer",
        }
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "activity" => Ok(TaskKind::Activity),
            "timer" => Ok(TaskKind::Timer),
            "lambda" => Ok(TaskKind::Lambda),
            "child_workflow" | "childWorkflow" => Ok(TaskKind::ChildWorkflow),
            "marker" => Ok(TaskKind::Marker),
            "fail" => Ok(TaskKind::Fail),
            "cancel_timer" | "cancelTimer" => Ok(TaskKind::CancelTimer),
            other => Err(Error::UnknownTaskKind(other.to_string())),
        }
    }
}

/// Lifecycle phase a handler can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerPhase {
    Completed,

    /// Failures and timeouts
    Failed,

    Canceled,
}

impl HandlerPhase {
    fn of(event: &Event) -> Option<Self> {
        if event.is_completed() {
            Some(HandlerPhase::Completed)
        } else if event.is_failure() || event.is_timeout() {
            Some(HandlerPhase::Failed)
        } else if event.is_canceled() {
            Some(HandlerPhase::Canceled)
        } else {
            None
        }
    }
}

/// What a phase handler gets to look at
pub struct HandlerContext<'a> {
    /// The event that triggered the handler
    pub event: &'a Event,

    /// The task's own (possibly windowed) events
    pub task_events: &'a EventList,

    /// The full history
    pub history: &'a EventList,
}

impl HandlerContext<'_> {
    /// Resolve a `$` reference against the full history
    pub fn resolve(&self, reference: &str) -> Result<Value> {
        interpolate(&Value::String(reference.to_string()), self.history)
    }
}

/// Phase handler. An empty result falls through to the default behavior.
pub type Handler = Arc<dyn Fn(&HandlerContext<'_>) -> Result<Vec<Node>> + Send + Sync>;

/// Static task configuration. String values may hold `$` references.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub input: Value,
    pub timeouts: Timeouts,
    pub retry: RetryStrategy,

    /// Activity type name; the task name when absent
    pub activity_type: Option<String>,
    pub activity_version: Option<String>,
    pub task_list: Option<String>,

    /// Lambda function to invoke
    pub function_name: Option<String>,

    /// Timer delay in seconds (number or numeric string)
    pub delay: Value,

    pub workflow_type: Option<String>,
    pub workflow_version: Option<String>,
    pub child_policy: Option<String>,
    pub lambda_role: Option<String>,
    pub tag_list: Vec<String>,
    pub task_priority: Option<String>,

    /// Marker details, or fail details
    pub details: Value,

    /// Fail reason
    pub reason: Value,
}

/// One named unit of work
#[derive(Clone)]
pub struct Task {
    name: String,
    kind: TaskKind,
    config: TaskConfig,
    schedule_actions: Vec<Action>,
    handlers: HashMap<HandlerPhase, Handler>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut phases: Vec<_> = self.handlers.keys().collect();
        phases.sort_by_key(|p| format!("{:?}", p));
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("schedule_actions", &self.schedule_actions)
            .field("handlers", &phases)
            .finish()
    }
}

impl Task {
    /// Create a task of any kind
    pub fn new(kind: TaskKind, name: impl Into<String>, config: TaskConfig) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
            schedule_actions: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn activity(name: impl Into<String>) -> Self {
        Self::new(TaskKind::Activity, name, TaskConfig::default())
    }

    pub fn timer(name: impl Into<String>, delay_seconds: u64) -> Self {
        Self::new(
            TaskKind::Timer,
            name,
            TaskConfig {
                delay: Value::from(delay_seconds),
                ..TaskConfig::default()
            },
        )
    }

    pub fn lambda(name: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self::new(
            TaskKind::Lambda,
            name,
            TaskConfig {
                function_name: Some(function_name.into()),
                ..TaskConfig::default()
            },
        )
    }

    pub fn child_workflow(
        name: impl Into<String>,
        workflow_type: impl Into<String>,
        workflow_version: impl Into<String>,
    ) -> Self {
        Self::new(
            TaskKind::ChildWorkflow,
            name,
            TaskConfig {
                workflow_type: Some(workflow_type.into()),
                workflow_version: Some(workflow_version.into()),
                ..TaskConfig::default()
            },
        )
    }

    pub fn marker(name: impl Into<String>, details: Value) -> Self {
        Self::new(
            TaskKind::Marker,
            name,
            TaskConfig {
                details,
                ..TaskConfig::default()
            },
        )
    }

    /// A task that fails the workflow as soon as it is reached
    pub fn fail(name: impl Into<String>, reason: impl Into<Value>, details: impl Into<Value>) -> Self {
        Self::new(
            TaskKind::Fail,
            name,
            TaskConfig {
                reason: reason.into(),
                details: details.into(),
                ..TaskConfig::default()
            },
        )
    }

    /// Cancels the timer of the same name if it is still running
    pub fn cancel_timer(name: impl Into<String>) -> Self {
        Self::new(TaskKind::CancelTimer, name, TaskConfig::default())
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.config.input = input;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn with_activity_type(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.activity_type = Some(name.into());
        self.config.activity_version = Some(version.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.config.activity_version = Some(version.into());
        self
    }

    pub fn with_task_list(mut self, task_list: impl Into<String>) -> Self {
        self.config.task_list = Some(task_list.into());
        self
    }

    /// Replace the timer delay, e.g. with a `$` reference
    pub fn with_delay(mut self, delay: Value) -> Self {
        self.config.delay = delay;
        self
    }

    /// Actions emitted just before the first schedule action
    pub fn with_schedule_actions(mut self, actions: Vec<Action>) -> Self {
        self.schedule_actions = actions;
        self
    }

    pub fn on_completed<F>(self, handler: F) -> Self
    where
        F: Fn(&HandlerContext<'_>) -> Result<Vec<Node>> + Send + Sync + 'static,
    {
        self.on(HandlerPhase::Completed, handler)
    }

    pub fn on_failed<F>(self, handler: F) -> Self
    where
        F: Fn(&HandlerContext<'_>) -> Result<Vec<Node>> + Send + Sync + 'static,
    {
        self.on(HandlerPhase::Failed, handler)
    }

    pub fn on_canceled<F>(self, handler: F) -> Self
    where
        F: Fn(&HandlerContext<'_>) -> Result<Vec<Node>> + Send + Sync + 'static,
    {
        self.on(HandlerPhase::Canceled, handler)
    }

    fn on<F>(mut self, phase: HandlerPhase, handler: F) -> Self
    where
        F: Fn(&HandlerContext<'_>) -> Result<Vec<Node>> + Send + Sync + 'static,
    {
        self.handlers.insert(phase, Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn backoff_name(&self) -> String {
        format!("{}{}", self.name, BACKOFF_SUFFIX)
    }

    /// Leaf actions for this cycle against the full history
    pub fn next_actions(&self, history: &EventList, observer: &dyn Observer) -> Result<Vec<Action>> {
        Ok(self.evaluate(history, None, observer)?.actions)
    }

    /// Evaluate this task, ignoring its own events at or before `after`
    pub fn evaluate(
        &self,
        history: &EventList,
        after: Option<EventId>,
        observer: &dyn Observer,
    ) -> Result<Outcome> {
        match self.kind {
            TaskKind::Fail => {
                return Ok(Outcome::from_actions(vec![Action::FatalError {
                    reason: interpolate(&self.config.reason, history)?,
                    details: interpolate(&self.config.details, history)?,
                }]));
            }
            TaskKind::CancelTimer => return self.cancel_actions(history).map(Outcome::from_actions),
            _ => {}
        }

        // A signal sharing the task's name is not part of its lifecycle
        let mut events = history.events_for_task_name(&self.name).without_signals();
        if let Some(after) = after {
            events = events.after(after);
        }

        let Some(last) = events.last() else {
            debug!(task = %self.name, "No events yet; scheduling");
            return self.schedule_actions(history).map(Outcome::from_actions);
        };

        let backoff_name = self.backoff_name();
        let trigger = match history.most_recent_by_name(&backoff_name, None) {
            Some(backoff) if backoff.occurred_after(last) => backoff,
            _ => last,
        };
        trace!(task = %self.name, event = %trigger.event_type(), id = trigger.id(), "Reacting to event");

        if !trigger.is_backoff() {
            if let Some(handler) = HandlerPhase::of(trigger).and_then(|p| self.handlers.get(&p)) {
                let context = HandlerContext {
                    event: trigger,
                    task_events: &events,
                    history,
                };
                let nodes = handler(&context)?;
                if !nodes.is_empty() {
                    return expand_nodes(nodes, history, observer);
                }
            }
        }

        self.react(trigger, &events, history)
    }

    fn react(&self, trigger: &Event, events: &EventList, history: &EventList) -> Result<Outcome> {
        if trigger.is_fatal() {
            let cause = trigger.attribute("cause").cloned().unwrap_or(Value::Null);
            return Ok(Outcome::from_actions(vec![Action::fatal(cause)]));
        }
        if trigger.is_scheduled() || trigger.is_started() {
            return Ok(Outcome::from_actions(vec![Action::Noop]));
        }
        if trigger.is_completed() {
            if trigger.is_backoff() {
                return self.retry_actions(trigger, events, history);
            }
            return Ok(Outcome::finished(trigger.id()));
        }
        if trigger.is_canceled() {
            return Ok(Outcome::finished(trigger.id()));
        }
        if trigger.is_failure() || trigger.is_timeout() {
            return self.retry_actions(trigger, events, history);
        }

        Err(Error::UnhandledEvent {
            task: self.name.clone(),
            event_type: trigger.event_type().to_string(),
        })
    }

    fn retry_actions(&self, trigger: &Event, events: &EventList, history: &EventList) -> Result<Outcome> {
        let attempts = events.failures_or_timeouts();
        let strategy = &self.config.retry;

        if !strategy.should_retry(attempts) {
            debug!(task = %self.name, attempts, "Retry limit reached");
            return Ok(Outcome::from_actions(vec![Action::fatal(RETRY_LIMIT_REACHED)]));
        }

        let wait = if trigger.is_backoff() {
            0
        } else {
            strategy.backoff_seconds(attempts)
        };
        debug!(task = %self.name, attempts, wait, "Retrying");

        let action = if wait > 0 {
            Action::timer(self.backoff_name(), wait)
        } else {
            self.schedule_action(history)?
        };
        Ok(Outcome::from_actions(vec![action]))
    }

    fn cancel_actions(&self, history: &EventList) -> Result<Vec<Action>> {
        let Some(started) = history.live_timer(&self.name) else {
            return Ok(Vec::new());
        };
        let timer_id = started
            .attribute_str("timerId")
            .ok_or_else(|| Error::MissingAttribute {
                event_id: started.id(),
                event_type: started.event_type().to_string(),
                attribute: "timerId",
            })?;
        Ok(vec![Action::cancel_timer(&self.name, timer_id)])
    }

    fn schedule_actions(&self, history: &EventList) -> Result<Vec<Action>> {
        let mut actions = self.schedule_actions.clone();
        actions.push(self.schedule_action(history)?);
        Ok(actions)
    }

    /// Build the kind's schedule action with every field interpolated
    pub fn schedule_action(&self, history: &EventList) -> Result<Action> {
        let config = &self.config;
        match self.kind {
            TaskKind::Activity => Ok(Action::Schedule(ScheduleActivity {
                name: self.name.clone(),
                input: interpolate(&config.input, history)?,
                activity_type: config.activity_type.clone(),
                version: config.activity_version.clone(),
                task_list: config.task_list.clone(),
                timeouts: config.timeouts.clone(),
            })),
            TaskKind::Timer => {
                let delay = interpolate(&config.delay, history)?;
                Ok(Action::timer(&self.name, self.delay_seconds(&delay)?))
            }
            TaskKind::Lambda => {
                let function_name = config.function_name.clone().ok_or_else(|| Error::MissingConfig {
                    task: self.name.clone(),
                    field: "function_name",
                })?;
                Ok(Action::lambda(
                    &self.name,
                    function_name,
                    interpolate(&config.input, history)?,
                    config.timeouts.start_to_close,
                ))
            }
            TaskKind::ChildWorkflow => {
                let workflow_type = config.workflow_type.clone().ok_or_else(|| Error::MissingConfig {
                    task: self.name.clone(),
                    field: "workflow_type",
                })?;
                Ok(Action::ChildWorkflow(StartChildWorkflow {
                    name: self.name.clone(),
                    workflow_type,
                    workflow_version: config.workflow_version.clone(),
                    input: interpolate(&config.input, history)?,
                    child_policy: config.child_policy.clone(),
                    lambda_role: config.lambda_role.clone(),
                    tag_list: config.tag_list.clone(),
                    task_list: config.task_list.clone(),
                    task_priority: config.task_priority.clone(),
                    execution_start_to_close_timeout: config.timeouts.execution_start_to_close,
                    task_start_to_close_timeout: config.timeouts.task_start_to_close,
                }))
            }
            TaskKind::Marker => Ok(Action::record_marker(
                &self.name,
                interpolate(&config.details, history)?,
            )),
            TaskKind::Fail | TaskKind::CancelTimer => Err(Error::NotSchedulable {
                task: self.name.clone(),
                kind: self.kind,
            }),
        }
    }

    fn delay_seconds(&self, delay: &Value) -> Result<u64> {
        let seconds = match delay {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        seconds.ok_or_else(|| Error::InvalidDelay {
            task: self.name.clone(),
            value: delay.to_string(),
        })
    }

    /// Most recent scheduled or started event
    pub fn most_recent_first_event<'a>(&self, history: &'a EventList) -> Option<&'a Event> {
        history.most_recent_by_name(&self.name, Some(Milestone::Activated))
    }

    /// Most recent completion event
    pub fn most_recent_last_event<'a>(&self, history: &'a EventList) -> Option<&'a Event> {
        history.most_recent_by_name(&self.name, Some(Milestone::Completed))
    }
}
