//! Client that prints decision batches instead of sending them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::DecisionClient;
use crate::core::decider::Decision;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Response<'a> {
    task_token: &'a str,
    decisions: &'a [Decision],
}

/// Writes each batch as pretty JSON, one document per response
pub struct StdoutClient<W = tokio::io::Stdout> {
    out: Mutex<W>,
}

impl Default for StdoutClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutClient {
    pub fn new() -> Self {
        Self::with_writer(tokio::io::stdout())
    }
}

impl<W> StdoutClient<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Write to any async sink instead of stdout
    pub fn with_writer(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W> DecisionClient for StdoutClient<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        "stdout"
    }

    async fn respond_decision_task_completed(
        &self,
        task_token: &str,
        decisions: &[Decision],
    ) -> Result<()> {
        let mut body = serde_json::to_vec_pretty(&Response {
            task_token,
            decisions,
        })
        .context("Failed to serialize decisions")?;
        body.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&body)
            .await
            .context("Failed to write decisions")?;
        out.flush().await.context("Failed to flush decisions")?;
        Ok(())
    }
}
