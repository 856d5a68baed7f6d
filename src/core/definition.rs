//! Pipeline definitions and loading.
//!
//! Pipelines can be declared in YAML as a tree of series, parallel,
//! continuous, and async nodes with tasks at the leaves. Phase handlers
//! are code-only and cannot be declared here.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::DeciderConfig;

use super::async_pipeline::{AsyncConfig, AsyncPipeline};
use super::node::Node;
use super::pipeline::{Pipeline, PipelineKind};
use super::task::{Task, TaskConfig, TaskKind};

/// A complete pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name (used in CLI)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Root node, usually a series
    pub root: NodeDefinition,
}

/// One node of the definition tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDefinition {
    Task(TaskDefinition),
    Series(PipelineBody),
    Parallel(PipelineBody),
    Continuous(PipelineBody),
    Async(AsyncConfig),
}

/// A leaf task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task kind (activity, timer, lambda, child_workflow, marker, fail,
    /// cancel_timer)
    pub kind: String,

    /// Task name (unique within its pipeline)
    pub name: String,

    #[serde(flatten)]
    pub config: TaskConfig,
}

/// Children and signal subscriptions of a pipeline node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineBody {
    pub children: Vec<NodeDefinition>,

    #[serde(default)]
    pub signals: Vec<SignalDefinition>,
}

/// What happens when a signal arrives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDefinition {
    pub signal: String,

    /// Stop a continuous pipeline for good
    #[serde(default, rename = "break")]
    pub stop: bool,

    /// Nodes to run when the signal fires
    #[serde(default)]
    pub run: Vec<NodeDefinition>,
}

impl PipelineDefinition {
    /// Load a pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        Self::from_yaml(&content)
    }

    /// Parse a pipeline from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline YAML")
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }
        validate_node(&self.root, "root")
    }

    /// Build the runtime pipeline, filling unset async timeouts from `config`
    pub fn build(&self, config: &DeciderConfig) -> Result<Pipeline> {
        self.validate()?;
        match build_node(&self.root, config)? {
            Node::Pipeline(pipeline) => Ok(pipeline),
            other => Ok(Pipeline::series(vec![other])),
        }
    }
}

fn validate_node(node: &NodeDefinition, path: &str) -> Result<()> {
    match node {
        NodeDefinition::Task(task) => validate_task(task, path),
        NodeDefinition::Async(config) => {
            if config.name.is_empty() {
                anyhow::bail!("Async pipeline at {} has an empty name", path);
            }
            if config.function_name.is_empty() {
                anyhow::bail!("Async pipeline '{}' needs a function_name", config.name);
            }
            Ok(())
        }
        NodeDefinition::Series(body)
        | NodeDefinition::Parallel(body)
        | NodeDefinition::Continuous(body) => validate_body(body, path),
    }
}

fn validate_body(body: &PipelineBody, path: &str) -> Result<()> {
    if body.children.is_empty() {
        anyhow::bail!("Pipeline at {} must have at least one child", path);
    }

    let mut seen = HashSet::new();
    for (i, child) in body.children.iter().enumerate() {
        let child_path = format!("{}.children[{}]", path, i);
        let name = match child {
            NodeDefinition::Task(task) => Some(task.name.as_str()),
            NodeDefinition::Async(config) => Some(config.name.as_str()),
            _ => None,
        };
        if let Some(name) = name {
            if !seen.insert(name) {
                anyhow::bail!("Duplicate task name '{}' at {}", name, child_path);
            }
        }
        validate_node(child, &child_path)?;
    }

    for (i, signal) in body.signals.iter().enumerate() {
        let signal_path = format!("{}.signals[{}]", path, i);
        if signal.signal.is_empty() {
            anyhow::bail!("Signal at {} has an empty name", signal_path);
        }
        if !signal.stop && signal.run.is_empty() {
            anyhow::bail!(
                "Signal '{}' at {} neither breaks nor runs anything",
                signal.signal,
                signal_path
            );
        }
        for (j, node) in signal.run.iter().enumerate() {
            validate_node(node, &format!("{}.run[{}]", signal_path, j))?;
        }
    }

    Ok(())
}

fn validate_task(task: &TaskDefinition, path: &str) -> Result<()> {
    if task.name.is_empty() {
        anyhow::bail!("Task at {} has an empty name", path);
    }
    let kind: TaskKind = task
        .kind
        .parse()
        .with_context(|| format!("Task '{}' at {}", task.name, path))?;

    match kind {
        TaskKind::Lambda if task.config.function_name.is_none() => {
            anyhow::bail!("Lambda task '{}' needs a function_name", task.name)
        }
        TaskKind::ChildWorkflow if task.config.workflow_type.is_none() => {
            anyhow::bail!("Child workflow task '{}' needs a workflow_type", task.name)
        }
        TaskKind::Timer if task.config.delay.is_null() => {
            anyhow::bail!("Timer task '{}' needs a delay", task.name)
        }
        _ => Ok(()),
    }
}

fn build_node(node: &NodeDefinition, config: &DeciderConfig) -> Result<Node> {
    let (kind, body) = match node {
        NodeDefinition::Task(task) => {
            let kind: TaskKind = task.kind.parse()?;
            return Ok(Task::new(kind, &task.name, task.config.clone()).into());
        }
        NodeDefinition::Async(async_config) => {
            let defaults = &config.async_defaults;
            let mut resolved = async_config.clone();
            resolved
                .lambda_start_to_close_timeout
                .get_or_insert(defaults.lambda_start_to_close);
            resolved
                .schedule_to_start_timeout
                .get_or_insert(defaults.schedule_to_start);
            resolved
                .start_to_close_timeout
                .get_or_insert(defaults.start_to_close);
            return Ok(AsyncPipeline::new(resolved).into());
        }
        NodeDefinition::Series(body) => (PipelineKind::Series, body),
        NodeDefinition::Parallel(body) => (PipelineKind::Parallel, body),
        NodeDefinition::Continuous(body) => (PipelineKind::Continuous, body),
    };

    let children = body
        .children
        .iter()
        .map(|child| build_node(child, config))
        .collect::<Result<Vec<_>>>()?;
    let mut pipeline = Pipeline::new(kind, children);

    for signal in &body.signals {
        if signal.stop {
            pipeline = pipeline.on_break(&signal.signal);
        }
        for run in &signal.run {
            pipeline = pipeline.on_signal(&signal.signal, build_node(run, config)?);
        }
    }

    Ok(pipeline.into())
}
