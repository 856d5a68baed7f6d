//! Command-line interface for swf-decider.
//!
//! Replays decision cycles locally against a recorded history, prints the
//! leaf actions for debugging, validates pipeline definitions, and shows
//! the resolved configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::AsyncReadExt;

use crate::adapters::StdoutClient;
use crate::config::{self, DeciderConfig};
use crate::core::{Decider, DecisionTask, Pipeline, PipelineDefinition};
use crate::domain::events::RawEvent;
use crate::domain::{EventList, WorkflowExecution};

/// swf-decider - Replay-driven workflow decider
#[derive(Parser, Debug)]
#[command(name = "swf-decider")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay one decision cycle and print the decision batch
    Decide {
        /// Pipeline definition (path, or name under the pipelines directory)
        #[arg(short, long)]
        pipeline: String,

        /// History JSON file (reads from stdin if not provided)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Task token echoed in the response
        #[arg(long, default_value = "local")]
        task_token: String,

        /// Workflow id (overrides the one in the history file)
        #[arg(long, env = "SWF_DECIDER_WORKFLOW_ID")]
        workflow_id: Option<String>,

        /// Run id (overrides the one in the history file)
        #[arg(long, env = "SWF_DECIDER_RUN_ID")]
        run_id: Option<String>,
    },

    /// Print the leaf actions the pipeline would take
    Actions {
        /// Pipeline definition (path, or name under the pipelines directory)
        #[arg(short, long)]
        pipeline: String,

        /// History JSON file (reads from stdin if not provided)
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Validate a pipeline definition
    Validate {
        /// Pipeline definition (path, or name under the pipelines directory)
        #[arg(short, long)]
        pipeline: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Decide {
                pipeline,
                history,
                task_token,
                workflow_id,
                run_id,
            } => decide(&pipeline, history, task_token, workflow_id, run_id).await,
            Commands::Actions { pipeline, history } => show_actions(&pipeline, history).await,
            Commands::Validate { pipeline } => validate_pipeline(&pipeline),
            Commands::Config => show_config(),
        }
    }
}

/// Replay one cycle through the stdout client
async fn decide(
    pipeline_name: &str,
    history_file: Option<PathBuf>,
    task_token: String,
    workflow_id: Option<String>,
    run_id: Option<String>,
) -> Result<()> {
    let cfg = config::config()?;
    let pipeline = load_pipeline(pipeline_name, cfg)?;
    let (events, mut execution) = read_history(history_file).await?;

    if workflow_id.is_some() || run_id.is_some() {
        let current = execution.take().unwrap_or_default();
        execution = Some(WorkflowExecution::new(
            workflow_id.unwrap_or(current.workflow_id),
            run_id.unwrap_or(current.run_id),
        ));
    }

    let decider = Decider::new(pipeline, Arc::new(StdoutClient::new())).with_config(cfg.clone());
    decider
        .handle(DecisionTask {
            task_token,
            workflow_execution: execution,
            events,
        })
        .await?;

    Ok(())
}

/// Print the raw leaf actions without rendering decisions
async fn show_actions(pipeline_name: &str, history_file: Option<PathBuf>) -> Result<()> {
    let cfg = config::config()?;
    let pipeline = load_pipeline(pipeline_name, cfg)?;
    let (events, execution) = read_history(history_file).await?;

    let history = EventList::from_raw(events)
        .context("Failed to classify history")?
        .with_execution(execution);
    let actions = pipeline
        .next_actions(&history)
        .context("Failed to evaluate pipeline")?;

    println!("{}", serde_json::to_string_pretty(&actions)?);
    Ok(())
}

fn validate_pipeline(pipeline_name: &str) -> Result<()> {
    let cfg = config::config()?;
    let path = cfg.pipeline_path(pipeline_name);
    let definition = PipelineDefinition::from_file(&path)?;
    definition.validate()?;
    definition.build(cfg)?;

    println!("Pipeline '{}' is valid ({})", definition.name, path.display());
    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("swf-decider configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "Pipelines:   {}",
        cfg.pipelines_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!();
    println!("Completion result: {}", cfg.completion_result);
    println!();
    println!("Async defaults:");
    println!(
        "  Lambda start-to-close: {}s",
        cfg.async_defaults.lambda_start_to_close
    );
    println!("  Schedule-to-start:     {}s", cfg.async_defaults.schedule_to_start);
    println!("  Start-to-close:        {}s", cfg.async_defaults.start_to_close);

    Ok(())
}

/// Load and build a pipeline definition
fn load_pipeline(name: &str, cfg: &DeciderConfig) -> Result<Pipeline> {
    let path = cfg.pipeline_path(name);
    if !path.exists() {
        anyhow::bail!("Pipeline '{}' not found at {}", name, path.display());
    }

    let definition = PipelineDefinition::from_file(&path)?;
    definition
        .build(cfg)
        .with_context(|| format!("Invalid pipeline definition: {}", path.display()))
}

/// Read history from a file or stdin
async fn read_history(path: Option<PathBuf>) -> Result<(Vec<RawEvent>, Option<WorkflowExecution>)> {
    let content = match path {
        Some(ref path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read history file: {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read history from stdin")?;
            buffer
        }
    };

    let source = path.as_deref().unwrap_or_else(|| Path::new("<stdin>"));
    parse_history(&content).with_context(|| format!("Invalid history in {}", source.display()))
}

/// Accept either a bare event array or a `{events, workflowExecution}` page
pub fn parse_history(content: &str) -> Result<(Vec<RawEvent>, Option<WorkflowExecution>)> {
    let value: Value = serde_json::from_str(content).context("History is not valid JSON")?;

    match value {
        Value::Array(_) => Ok((serde_json::from_value(value)?, None)),
        Value::Object(mut page) => {
            let events = page
                .remove("events")
                .context("History object has no 'events' field")?;
            let execution = match page.remove("workflowExecution") {
                Some(Value::Null) | None => None,
                Some(execution) => Some(serde_json::from_value(execution)?),
            };
            Ok((serde_json::from_value(events)?, execution))
        }
        _ => anyhow::bail!("History must be an event array or an object with 'events'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_array() {
        let (events, execution) = parse_history(
            r#"[{"eventId": 1, "eventType": "WorkflowExecutionStarted",
                 "workflowExecutionStartedEventAttributes": {"input": "{}"}}]"#,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "WorkflowExecutionStarted");
        assert!(execution.is_none());
    }

    #[test]
    fn test_parse_history_page() {
        let (events, execution) = parse_history(
            r#"{"events": [{"eventId": 1, "eventType": "WorkflowExecutionStarted"}],
                "workflowExecution": {"workflowId": "wf", "runId": "r1"}}"#,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(execution, Some(WorkflowExecution::new("wf", "r1")));
    }

    #[test]
    fn test_parse_history_rejects_scalars() {
        assert!(parse_history("42").is_err());
        assert!(parse_history(r#"{"nextPageToken": "x"}"#).is_err());
    }
}
