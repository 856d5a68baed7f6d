//! Pipeline nodes and their recursive expansion into leaf actions.

use crate::domain::{Action, Event, EventId, EventList};
use crate::error::Result;

use super::async_pipeline::AsyncPipeline;
use super::observer::Observer;
use super::pipeline::Pipeline;
use super::task::Task;

/// Anything a pipeline, handler, or generator can yield
#[derive(Debug, Clone)]
pub enum Node {
    Task(Task),
    Pipeline(Pipeline),
    Action(Action),
}

impl From<Task> for Node {
    fn from(task: Task) -> Self {
        Node::Task(task)
    }
}

impl From<Pipeline> for Node {
    fn from(pipeline: Pipeline) -> Self {
        Node::Pipeline(pipeline)
    }
}

impl From<AsyncPipeline> for Node {
    fn from(pipeline: AsyncPipeline) -> Self {
        Node::Pipeline(pipeline.into())
    }
}

impl From<Action> for Node {
    fn from(action: Action) -> Self {
        Node::Action(action)
    }
}

/// Result of evaluating a node for one decision cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Leaf actions, in order
    pub actions: Vec<Action>,

    /// Id of the event that finished the node, when it finished.
    /// A Series uses it as the lower bound for the next child.
    pub last_event_id: Option<EventId>,
}

impl Outcome {
    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self {
            actions,
            last_event_id: None,
        }
    }

    /// Nothing left to do; finished at `event_id`
    pub fn finished(event_id: EventId) -> Self {
        Self {
            actions: Vec::new(),
            last_event_id: Some(event_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Node {
    /// Evaluate against the history, ignoring own events at or before `after`
    pub fn evaluate(
        &self,
        history: &EventList,
        after: Option<EventId>,
        observer: &dyn Observer,
    ) -> Result<Outcome> {
        match self {
            Node::Task(task) => task.evaluate(history, after, observer),
            Node::Pipeline(pipeline) => pipeline.evaluate(history, after, observer),
            Node::Action(action) => Ok(Outcome::from_actions(vec![action.clone()])),
        }
    }

    /// Most recent activation event of this node
    pub fn most_recent_first_event<'a>(&self, history: &'a EventList) -> Option<&'a Event> {
        match self {
            Node::Task(task) => task.most_recent_first_event(history),
            Node::Pipeline(pipeline) => pipeline.most_recent_first_event(history),
            Node::Action(_) => None,
        }
    }

    /// Most recent completion event of this node
    pub fn most_recent_last_event<'a>(&self, history: &'a EventList) -> Option<&'a Event> {
        match self {
            Node::Task(task) => task.most_recent_last_event(history),
            Node::Pipeline(pipeline) => pipeline.most_recent_last_event(history),
            Node::Action(_) => None,
        }
    }
}

/// Expand nodes depth-first into leaf actions, preserving order.
///
/// The finishing id of the last expanded task or pipeline is carried out.
pub fn expand_nodes(
    nodes: Vec<Node>,
    history: &EventList,
    observer: &dyn Observer,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();
    for node in nodes {
        match node {
            Node::Action(action) => outcome.actions.push(action),
            nested => {
                let expanded = nested.evaluate(history, None, observer)?;
                outcome.actions.extend(expanded.actions);
                outcome.last_event_id = expanded.last_event_id;
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observer::TracingObserver;
    use serde_json::json;

    #[test]
    fn test_expansion_preserves_order() {
        let nodes = vec![
            Node::from(Action::record_marker("m", json!({ "a": 1 }))),
            Node::from(Task::timer("wait", 5)),
            Node::from(Action::Noop),
        ];
        let outcome = expand_nodes(nodes, &EventList::default(), &TracingObserver).unwrap();
        assert_eq!(
            outcome.actions,
            vec![
                Action::record_marker("m", json!({ "a": 1 })),
                Action::timer("wait", 5),
                Action::Noop,
            ]
        );
        assert_eq!(outcome.last_event_id, None);
    }

    #[test]
    fn test_expansion_carries_finishing_id() {
        let history = EventList::from_value(json!([
            { "eventId": 3, "eventType": "TimerStarted",
              "timerStartedEventAttributes": { "control": "wait", "timerId": "wait:2" } },
            { "eventId": 4, "eventType": "TimerFired",
              "timerFiredEventAttributes": { "startedEventId": 3, "timerId": "wait:2" } },
        ]))
        .unwrap();
        let outcome =
            expand_nodes(vec![Task::timer("wait", 5).into()], &history, &TracingObserver).unwrap();
        assert_eq!(outcome, Outcome::finished(4));
    }
}
