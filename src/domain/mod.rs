//! Domain types for the decider.
//!
//! This module contains the core data structures:
//! - Events: Classified, immutable history records and the event list
//! - Action: Leaf decision values
//! - Retry: Retry/backoff policies

pub mod action;
pub mod events;
pub mod retry;

// Re-export commonly used types
pub use action::{Action, Timeouts};
pub use events::{Event, EventId, EventList, EventPhase, EventType, Milestone, WorkflowExecution};
pub use retry::RetryStrategy;
