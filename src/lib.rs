//! swf-decider - Replay-driven decider for history-based workflow services
//!
//! The orchestration service keeps the authoritative event history of a
//! workflow execution and periodically asks a decider what to do next.
//! This crate answers that question by replaying the whole history
//! through a tree of tasks and pipelines and emitting an ordered batch of
//! decisions.
//!
//! # Architecture
//!
//! Deciding is a pure function of history:
//! - No state is kept between decision cycles
//! - Every task infers its progress from its own events
//! - Retries, backoff timers, and signals are all read back from history
//!
//! # Modules
//!
//! - `domain`: Data structures (Event, EventList, Action, RetryStrategy)
//! - `core`: Decision engine (Task, Pipeline, AsyncPipeline, Decider)
//! - `adapters`: Protocol client seam
//! - `config`: Decider configuration
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Replay one decision cycle
//! swf-decider decide --pipeline ingest --history history.json
//!
//! # Check a pipeline definition
//! swf-decider validate --pipeline pipelines/ingest.yaml
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;

// Re-export main types at crate root for convenience
pub use adapters::{DecisionClient, MemoryClient, StdoutClient};
pub use config::DeciderConfig;
pub use crate::core::{
    AsyncConfig, AsyncPipeline, Decider, Decision, DecisionTask, Node, Observer, Pipeline,
    PipelineDefinition, Task,
};
pub use domain::{Action, Event, EventList, EventType, RetryStrategy, WorkflowExecution};
pub use error::{Error, Result};
