//! Dynamic `$` references in task configuration.
//!
//! A string value beginning with `$` names an earlier task's output:
//! `$TaskA` is TaskA's whole decoded output and `$TaskA.foo.bar` descends
//! into it. `$$Workflow` names the workflow-start input. Objects are
//! interpolated field by field; every other value passes through.

use serde_json::{Map, Value};

use crate::domain::{Event, EventList, EventType};
use crate::error::{Error, Result};

/// Leading token that names the workflow-start payload
const WORKFLOW_SENTINEL: &str = "$Workflow";

/// A parsed `$` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// `$$Workflow[.path]`
    Workflow { path: Vec<String> },

    /// `$<task>[.path]`
    Task { name: String, path: Vec<String> },
}

impl Reference {
    /// Parse a reference, returning `None` for ordinary strings
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.strip_prefix('$')?;
        let mut tokens = body.split('.').map(str::to_string);
        let head = tokens.next()?;
        let path: Vec<String> = tokens.collect();

        if head == WORKFLOW_SENTINEL {
            Some(Reference::Workflow { path })
        } else {
            Some(Reference::Task { name: head, path })
        }
    }

    fn path(&self) -> &[String] {
        match self {
            Reference::Workflow { path } | Reference::Task { path, .. } => path,
        }
    }

    fn source<'a>(&self, history: &'a EventList) -> Option<&'a Event> {
        match self {
            Reference::Workflow { .. } => history.first_of_type(EventType::WorkflowExecutionStarted),
            Reference::Task { name, .. } => history.most_recent_by_name(name, None),
        }
    }

    fn label(&self) -> String {
        match self {
            Reference::Workflow { .. } => WORKFLOW_SENTINEL.to_string(),
            Reference::Task { name, .. } => name.clone(),
        }
    }

    /// Resolve against the history. Unknown sources resolve to null.
    pub fn resolve(&self, history: &EventList) -> Result<Value> {
        let Some(event) = self.source(history) else {
            return Ok(Value::Null);
        };
        let output = event.output();
        let path = self.path();

        if path.is_empty() {
            return Ok(output.clone());
        }
        if !output.is_object() {
            return Err(Error::NotAnObject {
                reference: self.label(),
                path: path.join("."),
                output: output.to_string(),
            });
        }

        let mut current = output;
        for segment in path {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }
}

/// Interpolate every `$` reference in `value` against `history`
pub fn interpolate(value: &Value, history: &EventList) -> Result<Value> {
    match value {
        Value::String(text) => match Reference::parse(text) {
            Some(reference) => reference.resolve(history),
            None => Ok(value.clone()),
        },
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, field) in map {
                resolved.insert(key.clone(), interpolate(field, history)?);
            }
            Ok(Value::Object(resolved))
        }
        _ => Ok(value.clone()),
    }
}
