//! In-memory client that records every response.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::DecisionClient;
use crate::core::decider::Decision;

/// Keeps `(task_token, decisions)` pairs in arrival order
#[derive(Debug, Default)]
pub struct MemoryClient {
    responses: Mutex<Vec<(String, Vec<Decision>)>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything responded so far
    pub async fn responses(&self) -> Vec<(String, Vec<Decision>)> {
        self.responses.lock().await.clone()
    }
}

#[async_trait]
impl DecisionClient for MemoryClient {
    fn name(&self) -> &str {
        "memory"
    }

    async fn respond_decision_task_completed(
        &self,
        task_token: &str,
        decisions: &[Decision],
    ) -> Result<()> {
        self.responses
            .lock()
            .await
            .push((task_token.to_string(), decisions.to_vec()));
        Ok(())
    }
}
