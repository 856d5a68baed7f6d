//! Observability side channel for the decision engine.
//!
//! Observers are told about workflow failures and Continuous pipeline
//! breaks. They never influence the decision batch.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::WorkflowExecution;

/// A workflow failure about to be sent to the service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureNotice {
    pub reason: Value,
    pub details: Value,
    pub workflow: Option<WorkflowExecution>,
}

/// Receives engine notifications
pub trait Observer: Send + Sync {
    /// A FatalError action became a FailWorkflowExecution decision
    fn on_failure(&self, _notice: &FailureNotice) {}

    /// A Continuous pipeline stopped because a break signal fired
    fn on_break(&self, _signal: &str) {}
}

/// Routes notifications to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_failure(&self, notice: &FailureNotice) {
        let workflow_id = notice
            .workflow
            .as_ref()
            .map(|w| w.workflow_id.as_str())
            .unwrap_or("-");
        warn!(
            workflow_id,
            reason = %notice.reason,
            details = %notice.details,
            "Failing workflow execution"
        );
    }

    fn on_break(&self, signal: &str) {
        info!(signal, "Got break signal; stopping continuous pipeline");
    }
}

/// Event recorded by [`RecordingObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Failure(FailureNotice),
    Break(String),
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything observed so far
    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, notification: Notification) {
        match self.notifications.lock() {
            Ok(mut guard) => guard.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}

impl Observer for RecordingObserver {
    fn on_failure(&self, notice: &FailureNotice) {
        self.push(Notification::Failure(notice.clone()));
    }

    fn on_break(&self, signal: &str) {
        self.push(Notification::Break(signal.to_string()));
    }
}
