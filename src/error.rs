//! Error types for the decision engine.
//!
//! These are process-level errors: they can never be expressed as a
//! decision and always abort the current decision cycle.

use thiserror::Error;

use crate::core::task::TaskKind;

/// A `Result` alias with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while computing decisions from a history.
#[derive(Debug, Error)]
pub enum Error {
    /// History contained an event type the engine cannot classify.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// An event was missing an attribute the engine relies on.
    #[error("event {event_id} ({event_type}) is missing attribute '{attribute}'")]
    MissingAttribute {
        event_id: i64,
        event_type: String,
        attribute: &'static str,
    },

    /// A task kind name did not match any known kind.
    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),

    /// A task kind was asked to build a schedule action it does not have.
    #[error("task '{task}' of kind {kind:?} cannot be scheduled")]
    NotSchedulable { task: String, kind: TaskKind },

    /// A task is missing configuration needed to build its decision.
    #[error("task '{task}' is missing required configuration '{field}'")]
    MissingConfig { task: String, field: &'static str },

    /// A timer delay did not resolve to a whole number of seconds.
    #[error("task '{task}' has an invalid timer delay: {value}")]
    InvalidDelay { task: String, value: String },

    /// The most recent event for a task did not map to any lifecycle case.
    #[error("unhandled event case for task '{task}': {event_type}")]
    UnhandledEvent { task: String, event_type: String },

    /// The history carries no workflow execution identity.
    #[error("no workflow execution on event list")]
    MissingExecution,

    /// A `$` reference tried to descend into a scalar output.
    #[error("output from '{reference}' is not an object; cannot access '{path}' (got {output})")]
    NotAnObject {
        reference: String,
        path: String,
        output: String,
    },

    /// A state marker carried an unrecognised state.
    #[error("marker '{marker}' has an invalid state: {state}")]
    InvalidMarker { marker: String, state: String },

    /// Dispatcher input could not carry the async coordination block.
    #[error("input for '{task}' must be an object to carry the async block (got {input})")]
    InvalidAsyncInput { task: String, input: String },

    /// Failed to serialize or deserialize JSON data.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
