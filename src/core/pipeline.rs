//! Pipelines: composition over tasks and nested pipelines.
//!
//! Every pipeline kind first resolves pending signal reactions, then runs
//! its own discovery algorithm:
//! - Series: children in order, stopping at the first child with actions
//! - Parallel: every child, every cycle
//! - Continuous: a Series that restarts from an empty history once
//!   exhausted, until a break signal fires
//!
//! Generated and workflow-start pipelines build their children from the
//! history on each cycle.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{Action, Event, EventId, EventList, EventType};
use crate::error::Result;

use super::async_pipeline::AsyncPipeline;
use super::node::{expand_nodes, Node, Outcome};
use super::observer::{Observer, TracingObserver};
use super::task::Task;

/// Builds a pipeline's children from the history
pub type NodeGenerator = Arc<dyn Fn(&EventList) -> Result<Vec<Node>> + Send + Sync>;

/// Builds the first nodes of a workflow from its start event
pub type StartHandler = Arc<dyn Fn(&Event) -> Result<Vec<Node>> + Send + Sync>;

/// Reaction that runs every cycle once its signal has fired
pub type SignalReaction = Arc<dyn Fn(&EventList) -> Result<Vec<Node>> + Send + Sync>;

/// Discovery algorithm of a pipeline
#[derive(Clone)]
pub enum PipelineKind {
    Series,
    Parallel,
    Continuous,

    /// Children produced per cycle, run as a Series
    Generated(NodeGenerator),

    /// Children produced from the `WorkflowExecutionStarted` event
    WorkflowStart(StartHandler),

    Async(Arc<AsyncPipeline>),
}

impl fmt::Debug for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Series => f.write_str("Series"),
            PipelineKind::Parallel => f.write_str("Parallel"),
            PipelineKind::Continuous => f.write_str("Continuous"),
            PipelineKind::Generated(_) => f.write_str("Generated"),
            PipelineKind::WorkflowStart(_) => f.write_str("WorkflowStart"),
            PipelineKind::Async(pipeline) => f.debug_tuple("Async").field(pipeline).finish(),
        }
    }
}

/// Something that wants to run when a signal arrives
#[derive(Clone)]
pub enum Subscriber {
    /// Runs when it has not started, has not finished, or the signal
    /// fired again after it last finished
    Node(Node),

    /// Stops a Continuous pipeline for good
    Break,

    /// Runs every cycle once the signal has fired
    Reaction(SignalReaction),
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscriber::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Subscriber::Break => f.write_str("Break"),
            Subscriber::Reaction(_) => f.write_str("Reaction"),
        }
    }
}

impl From<Node> for Subscriber {
    fn from(node: Node) -> Self {
        Subscriber::Node(node)
    }
}

impl From<Task> for Subscriber {
    fn from(task: Task) -> Self {
        Subscriber::Node(task.into())
    }
}

impl From<Pipeline> for Subscriber {
    fn from(pipeline: Pipeline) -> Self {
        Subscriber::Node(pipeline.into())
    }
}

/// A composition of nodes plus signal subscriptions
#[derive(Debug, Clone)]
pub struct Pipeline {
    kind: PipelineKind,
    children: Vec<Node>,
    signals: Vec<(String, Vec<Subscriber>)>,
}

impl From<AsyncPipeline> for Pipeline {
    fn from(pipeline: AsyncPipeline) -> Self {
        Self::new(PipelineKind::Async(Arc::new(pipeline)), Vec::new())
    }
}

impl Pipeline {
    pub fn new(kind: PipelineKind, children: Vec<Node>) -> Self {
        Self {
            kind,
            children,
            signals: Vec::new(),
        }
    }

    pub fn series(children: Vec<Node>) -> Self {
        Self::new(PipelineKind::Series, children)
    }

    pub fn parallel(children: Vec<Node>) -> Self {
        Self::new(PipelineKind::Parallel, children)
    }

    pub fn continuous(children: Vec<Node>) -> Self {
        Self::new(PipelineKind::Continuous, children)
    }

    /// Children produced by `generator` each cycle, run in series
    pub fn generated<F>(generator: F) -> Self
    where
        F: Fn(&EventList) -> Result<Vec<Node>> + Send + Sync + 'static,
    {
        Self::new(PipelineKind::Generated(Arc::new(generator)), Vec::new())
    }

    /// Nodes derived from the workflow start event.
    ///
    /// On the very first history event the handler's raw actions win;
    /// afterwards only its tasks and pipelines are evaluated.
    pub fn workflow_start<F>(handler: F) -> Self
    where
        F: Fn(&Event) -> Result<Vec<Node>> + Send + Sync + 'static,
    {
        Self::new(PipelineKind::WorkflowStart(Arc::new(handler)), Vec::new())
    }

    /// Subscribe a node to a signal
    pub fn on_signal(mut self, signal: impl Into<String>, subscriber: impl Into<Subscriber>) -> Self {
        let signal = signal.into();
        let subscriber = subscriber.into();
        match self.signals.iter_mut().find(|(name, _)| *name == signal) {
            Some((_, subscribers)) => subscribers.push(subscriber),
            None => self.signals.push((signal, vec![subscriber])),
        }
        self
    }

    /// Stop a Continuous pipeline once `signal` fires
    pub fn on_break(self, signal: impl Into<String>) -> Self {
        self.on_signal(signal, Subscriber::Break)
    }

    /// Run `reaction` every cycle once `signal` has fired
    pub fn on_signal_reaction<F>(self, signal: impl Into<String>, reaction: F) -> Self
    where
        F: Fn(&EventList) -> Result<Vec<Node>> + Send + Sync + 'static,
    {
        self.on_signal(signal, Subscriber::Reaction(Arc::new(reaction)))
    }

    pub fn kind(&self) -> &PipelineKind {
        &self.kind
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn signals(&self) -> &[(String, Vec<Subscriber>)] {
        &self.signals
    }

    /// Leaf actions for this cycle, with notifications sent to `tracing`
    pub fn next_actions(&self, history: &EventList) -> Result<Vec<Action>> {
        self.next_actions_observed(history, &TracingObserver)
    }

    pub fn next_actions_observed(
        &self,
        history: &EventList,
        observer: &dyn Observer,
    ) -> Result<Vec<Action>> {
        Ok(self.evaluate(history, None, observer)?.actions)
    }

    /// Evaluate, ignoring child events at or before `after`
    #[instrument(level = "debug", skip_all, fields(kind = ?self.kind, events = history.len()))]
    pub fn evaluate(
        &self,
        history: &EventList,
        after: Option<EventId>,
        observer: &dyn Observer,
    ) -> Result<Outcome> {
        match &self.kind {
            PipelineKind::Series => self.run_series(&self.children, history, after, observer),
            PipelineKind::Parallel => self.run_parallel(history, after, observer),
            PipelineKind::Continuous => self.run_continuous(history, after, observer),
            PipelineKind::Generated(generator) => {
                let children = generator(history)?;
                self.run_series(&children, history, after, observer)
            }
            PipelineKind::WorkflowStart(handler) => run_workflow_start(handler, history, observer),
            PipelineKind::Async(pipeline) => pipeline.evaluate(history, observer),
        }
    }

    fn run_series(
        &self,
        children: &[Node],
        history: &EventList,
        after: Option<EventId>,
        observer: &dyn Observer,
    ) -> Result<Outcome> {
        let signal_actions = self.dispatch_signals(history, observer)?;
        if !signal_actions.is_empty() {
            return Ok(Outcome::from_actions(signal_actions));
        }

        let mut bound = after;
        for child in children {
            let outcome = child.evaluate(history, bound, observer)?;
            if !outcome.is_empty() {
                return Ok(outcome);
            }
            if outcome.last_event_id.is_some() {
                bound = outcome.last_event_id;
            }
        }

        Ok(Outcome {
            actions: Vec::new(),
            last_event_id: bound,
        })
    }

    fn run_parallel(
        &self,
        history: &EventList,
        after: Option<EventId>,
        observer: &dyn Observer,
    ) -> Result<Outcome> {
        let mut actions = self.dispatch_signals(history, observer)?;
        let mut finished: Option<EventId> = None;
        let mut all_finished = true;

        for child in &self.children {
            let outcome = child.evaluate(history, after, observer)?;
            actions.extend(outcome.actions);
            match outcome.last_event_id {
                Some(id) => finished = Some(finished.map_or(id, |f| f.max(id))),
                None => all_finished = false,
            }
        }

        let last_event_id = if actions.is_empty() && all_finished {
            finished
        } else {
            None
        };
        Ok(Outcome {
            actions,
            last_event_id,
        })
    }

    fn run_continuous(
        &self,
        history: &EventList,
        after: Option<EventId>,
        observer: &dyn Observer,
    ) -> Result<Outcome> {
        if let Some(signal) = self.fired_break(history) {
            observer.on_break(signal);
            return Ok(Outcome::default());
        }

        let outcome = self.run_series(&self.children, history, after, observer)?;
        if outcome.is_empty() && !history.is_empty() {
            debug!("Continuous pipeline exhausted; starting over");
            return self.run_continuous(&history.empty_like(), None, observer);
        }
        Ok(outcome)
    }

    fn fired_break(&self, history: &EventList) -> Option<&str> {
        self.signals
            .iter()
            .filter(|(_, subscribers)| subscribers.iter().any(|s| matches!(s, Subscriber::Break)))
            .map(|(signal, _)| signal.as_str())
            .find(|signal| history.most_recent_signal(signal).is_some())
    }

    /// Reactions to signals that have fired, expanded to leaf actions
    fn dispatch_signals(&self, history: &EventList, observer: &dyn Observer) -> Result<Vec<Action>> {
        let mut actions = Vec::new();

        for (signal, subscribers) in &self.signals {
            let Some(fired) = history.most_recent_signal(signal) else {
                continue;
            };

            for subscriber in subscribers {
                match subscriber {
                    Subscriber::Break => {}
                    Subscriber::Reaction(reaction) => {
                        let nodes = reaction(history)?;
                        actions.extend(expand_nodes(nodes, history, observer)?.actions);
                    }
                    Subscriber::Node(node) => {
                        let first = node.most_recent_first_event(history);
                        let last = node.most_recent_last_event(history);
                        let from = match (first, last) {
                            (None, _) | (_, None) => Some(None),
                            (Some(_), Some(last)) if fired.id() > last.id() => Some(Some(fired.id())),
                            _ => None,
                        };
                        if let Some(from) = from {
                            debug!(signal = %signal, from = ?from, "Dispatching signal");
                            actions.extend(node.evaluate(history, from, observer)?.actions);
                        }
                    }
                }
            }
        }

        Ok(actions)
    }

    /// Activation event of the first task, descending into nested pipelines
    pub fn most_recent_first_event<'a>(&self, history: &'a EventList) -> Option<&'a Event> {
        match &self.kind {
            PipelineKind::Async(pipeline) => pipeline.pipeline().most_recent_first_event(history),
            _ => self.children.first()?.most_recent_first_event(history),
        }
    }

    /// Completion event of the last task, descending into nested pipelines
    pub fn most_recent_last_event<'a>(&self, history: &'a EventList) -> Option<&'a Event> {
        match &self.kind {
            PipelineKind::Async(pipeline) => pipeline.pipeline().most_recent_last_event(history),
            _ => self.children.last()?.most_recent_last_event(history),
        }
    }
}

fn run_workflow_start(
    handler: &StartHandler,
    history: &EventList,
    observer: &dyn Observer,
) -> Result<Outcome> {
    let Some(start) = history.first_of_type(EventType::WorkflowExecutionStarted) else {
        return Ok(Outcome::default());
    };

    let (raw, nested): (Vec<Node>, Vec<Node>) = handler(start)?
        .into_iter()
        .partition(|node| matches!(node, Node::Action(_)));

    if history.len() == 1 && !raw.is_empty() {
        let actions = raw
            .into_iter()
            .filter_map(|node| match node {
                Node::Action(action) => Some(action),
                _ => None,
            })
            .collect();
        return Ok(Outcome::from_actions(actions));
    }

    expand_nodes(nested, history, observer)
}
