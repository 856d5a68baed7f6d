//! Core decision engine.
//!
//! This module contains:
//! - Task: leaf unit of work and its retry/handler state machine
//! - Pipeline: series, parallel, continuous, and generated compositions
//! - AsyncPipeline: lambda dispatch driven by callback signals
//! - Decider: one decision cycle rendered as a protocol batch
//! - Definition: YAML pipeline definitions

pub mod async_pipeline;
pub mod decider;
pub mod definition;
pub mod interpolate;
pub mod node;
pub mod observer;
pub mod pipeline;
pub mod task;

// Re-export commonly used types
pub use async_pipeline::{AsyncConfig, AsyncPipeline, AsyncState};
pub use decider::{to_decision, Decider, Decision, DecisionTask};
pub use definition::{NodeDefinition, PipelineDefinition};
pub use interpolate::{interpolate, Reference};
pub use node::{Node, Outcome};
pub use observer::{FailureNotice, Notification, Observer, RecordingObserver, TracingObserver};
pub use pipeline::{Pipeline, PipelineKind, Subscriber};
pub use task::{HandlerContext, HandlerPhase, Task, TaskConfig, TaskKind, RETRY_LIMIT_REACHED};
