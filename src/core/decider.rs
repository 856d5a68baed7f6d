//! Decider: one decision cycle from history to a protocol decision batch.

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::adapters::DecisionClient;
use crate::config::DeciderConfig;
use crate::domain::events::RawEvent;
use crate::domain::{Action, EventId, EventList, WorkflowExecution};
use crate::error::Result;

use super::observer::{FailureNotice, Observer, TracingObserver};
use super::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleActivityTaskAttributes {
    pub activity_id: String,
    pub activity_type: NamedType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_list: Option<TaskList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_to_start_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerAttributes {
    pub timer_id: String,
    pub control: String,
    pub start_to_fire_timeout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTimerAttributes {
    pub timer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleLambdaFunctionAttributes {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_to_close_timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChildWorkflowExecutionAttributes {
    pub workflow_id: String,
    pub control: String,
    pub workflow_type: NamedType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lambda_role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_list: Option<TaskList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_start_to_close_timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMarkerAttributes {
    pub marker_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailWorkflowExecutionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteWorkflowExecutionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// One protocol decision, in the service's wire shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decisionType")]
pub enum Decision {
    ScheduleActivityTask {
        #[serde(rename = "scheduleActivityTaskDecisionAttributes")]
        attributes: ScheduleActivityTaskAttributes,
    },
    StartTimer {
        #[serde(rename = "startTimerDecisionAttributes")]
        attributes: StartTimerAttributes,
    },
    CancelTimer {
        #[serde(rename = "cancelTimerDecisionAttributes")]
        attributes: CancelTimerAttributes,
    },
    ScheduleLambdaFunction {
        #[serde(rename = "scheduleLambdaFunctionDecisionAttributes")]
        attributes: ScheduleLambdaFunctionAttributes,
    },
    StartChildWorkflowExecution {
        #[serde(rename = "startChildWorkflowExecutionDecisionAttributes")]
        attributes: StartChildWorkflowExecutionAttributes,
    },
    RecordMarker {
        #[serde(rename = "recordMarkerDecisionAttributes")]
        attributes: RecordMarkerAttributes,
    },
    FailWorkflowExecution {
        #[serde(rename = "failWorkflowExecutionDecisionAttributes")]
        attributes: FailWorkflowExecutionAttributes,
    },
    CompleteWorkflowExecution {
        #[serde(rename = "completeWorkflowExecutionDecisionAttributes")]
        attributes: CompleteWorkflowExecutionAttributes,
    },
}

impl Decision {
    pub fn is_fail(&self) -> bool {
        matches!(self, Decision::FailWorkflowExecution { .. })
    }
}

/// A decision task as polled from the service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTask {
    pub task_token: String,
    #[serde(default)]
    pub workflow_execution: Option<WorkflowExecution>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// Text payload: strings as-is, other values JSON-encoded, null omitted
fn text(value: &Value) -> Result<Option<String>> {
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(serde_json::to_string(other)?),
    })
}

fn seconds(value: Option<u64>) -> Option<String> {
    value.map(|s| s.to_string())
}

/// Render one leaf action. `Noop` renders nothing.
pub fn to_decision(action: &Action, last_event_id: EventId) -> Result<Option<Decision>> {
    let decision = match action {
        Action::Noop => return Ok(None),
        Action::Schedule(schedule) => Decision::ScheduleActivityTask {
            attributes: ScheduleActivityTaskAttributes {
                activity_id: schedule.name.clone(),
                activity_type: NamedType {
                    name: schedule
                        .activity_type
                        .clone()
                        .unwrap_or_else(|| schedule.name.clone()),
                    version: schedule.version.clone(),
                },
                input: text(&schedule.input)?,
                task_list: schedule.task_list.clone().map(|name| TaskList { name }),
                schedule_to_start_timeout: seconds(schedule.timeouts.schedule_to_start),
                schedule_to_close_timeout: seconds(schedule.timeouts.schedule_to_close),
                start_to_close_timeout: seconds(schedule.timeouts.start_to_close),
                heartbeat_timeout: seconds(schedule.timeouts.heartbeat),
            },
        },
        Action::Timer(timer) => Decision::StartTimer {
            attributes: StartTimerAttributes {
                timer_id: format!("{}:{}", timer.name, last_event_id),
                control: timer.name.clone(),
                start_to_fire_timeout: timer.delay_seconds.to_string(),
            },
        },
        Action::CancelTimer { timer_id, .. } => Decision::CancelTimer {
            attributes: CancelTimerAttributes {
                timer_id: timer_id.clone(),
            },
        },
        Action::ScheduleLambda(lambda) => Decision::ScheduleLambdaFunction {
            attributes: ScheduleLambdaFunctionAttributes {
                id: lambda.name.clone(),
                name: lambda.function_name.clone(),
                input: text(&lambda.input)?,
                start_to_close_timeout: seconds(lambda.start_to_close_timeout),
            },
        },
        Action::ChildWorkflow(child) => Decision::StartChildWorkflowExecution {
            attributes: StartChildWorkflowExecutionAttributes {
                workflow_id: child.name.clone(),
                control: child.name.clone(),
                workflow_type: NamedType {
                    name: child.workflow_type.clone(),
                    version: child.workflow_version.clone(),
                },
                input: text(&child.input)?,
                child_policy: child.child_policy.clone(),
                lambda_role: child.lambda_role.clone(),
                tag_list: child.tag_list.clone(),
                task_list: child.task_list.clone().map(|name| TaskList { name }),
                task_priority: child.task_priority.clone(),
                execution_start_to_close_timeout: seconds(child.execution_start_to_close_timeout),
                task_start_to_close_timeout: seconds(child.task_start_to_close_timeout),
            },
        },
        Action::RecordMarker { name, details } => Decision::RecordMarker {
            attributes: RecordMarkerAttributes {
                marker_name: name.clone(),
                details: Some(serde_json::to_string(details)?),
            },
        },
        Action::FatalError { reason, details } => Decision::FailWorkflowExecution {
            attributes: FailWorkflowExecutionAttributes {
                reason: text(reason)?,
                details: text(details)?,
            },
        },
    };
    Ok(Some(decision))
}

/// Binds a root pipeline to a protocol client
pub struct Decider {
    root: Pipeline,
    client: Arc<dyn DecisionClient>,
    observer: Arc<dyn Observer>,
    config: DeciderConfig,
}

impl Decider {
    pub fn new(root: Pipeline, client: Arc<dyn DecisionClient>) -> Self {
        Self {
            root,
            client,
            observer: Arc::new(TracingObserver),
            config: DeciderConfig::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: DeciderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn root(&self) -> &Pipeline {
        &self.root
    }

    /// Compute the decision batch for one history
    #[instrument(level = "debug", skip_all, fields(events = history.len()))]
    pub fn decisions(&self, history: &EventList) -> Result<Vec<Decision>> {
        let actions = self.root.next_actions_observed(history, self.observer.as_ref())?;
        let last_event_id = history.last_event_id().unwrap_or(0);

        let mut decisions = Vec::with_capacity(actions.len() + 1);
        for action in &actions {
            if let Action::FatalError { reason, details } = action {
                self.observer.on_failure(&FailureNotice {
                    reason: reason.clone(),
                    details: details.clone(),
                    workflow: history.execution().cloned(),
                });
            }
            if let Some(decision) = to_decision(action, last_event_id)? {
                decisions.push(decision);
            }
        }

        // Markers alone never bring another decision task, so they do not hold completion
        let pending = actions
            .iter()
            .any(|action| !matches!(action, Action::RecordMarker { .. }));
        if !pending && !decisions.iter().any(Decision::is_fail) {
            decisions.push(Decision::CompleteWorkflowExecution {
                attributes: CompleteWorkflowExecutionAttributes {
                    result: Some(self.config.completion_result.clone()),
                },
            });
        }

        Ok(decisions)
    }

    /// Run one cycle and hand the batch to the client
    #[instrument(skip_all, fields(client = self.client.name()))]
    pub async fn handle(&self, task: DecisionTask) -> anyhow::Result<Vec<Decision>> {
        let history = EventList::from_raw(task.events)
            .context("Failed to classify decision task history")?
            .with_execution(task.workflow_execution);

        let decisions = self
            .decisions(&history)
            .context("Failed to compute decisions")?;
        info!(count = decisions.len(), "Responding with decisions");

        self.client
            .respond_decision_task_completed(&task.task_token, &decisions)
            .await
            .with_context(|| format!("Failed to respond to decision task {}", task.task_token))?;

        Ok(decisions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_marker_details_are_json_text() {
        let decision = to_decision(&Action::record_marker("marker", json!({ "a": 1 })), 1)
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "decisionType": "RecordMarker",
                "recordMarkerDecisionAttributes": { "markerName": "marker", "details": "{\"a\":1}" }
            })
        );
    }

    #[test]
    fn test_timer_id_carries_last_event_id() {
        let decision = to_decision(&Action::timer("wait", 30), 17).unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "decisionType": "StartTimer",
                "startTimerDecisionAttributes": {
                    "timerId": "wait:17", "control": "wait", "startToFireTimeout": "30"
                }
            })
        );
    }

    #[test]
    fn test_activity_type_defaults_to_task_name() {
        let decision = to_decision(&Action::schedule("fetch", json!({ "x": 1 }), Some("2".into())), 0)
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "decisionType": "ScheduleActivityTask",
                "scheduleActivityTaskDecisionAttributes": {
                    "activityId": "fetch",
                    "activityType": { "name": "fetch", "version": "2" },
                    "input": "{\"x\":1}"
                }
            })
        );
    }

    #[test]
    fn test_noop_renders_nothing() {
        assert_eq!(to_decision(&Action::Noop, 3).unwrap(), None);
    }

    #[test]
    fn test_fail_reason_only() {
        let decision = to_decision(&Action::fatal("er"), 0).unwrap().unwrap();
        assert_eq!(
            serde_json::to_value(&decision).unwrap(),
            json!({
                "decisionType": "FailWorkflowExecution",
                "failWorkflowExecutionDecisionAttributes": { "reason": "er" }
            })
        );
    }
}
