//! Protocol client interfaces.
//!
//! The decider hands every decision batch to a [`DecisionClient`]. The
//! network binding to the orchestration service lives behind this trait;
//! the crate ships a stdout client for local replay and an in-memory
//! client for tests.

pub mod memory;
pub mod stdout;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::decider::Decision;

pub use memory::MemoryClient;
pub use stdout::StdoutClient;

/// Trait for protocol clients
#[async_trait]
pub trait DecisionClient: Send + Sync {
    /// Human-readable client name
    fn name(&self) -> &str;

    /// Submit the decision batch for a decision task
    async fn respond_decision_task_completed(
        &self,
        task_token: &str,
        decisions: &[Decision],
    ) -> Result<()>;
}
