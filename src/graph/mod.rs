//! # Request Graph
//!
//! A directed graph of request nodes. Each node sends one request through the
//! [`Backend`], checks the response with its assertions and, when every check
//! passes, hands the response body to its successors.
//!
//! ## Structure
//!
//! ```text
//!     ┌──────┐
//!     │  P1  │──────┐
//!     └──────┘      ▼
//!               ┌──────┐     ┌──────┐
//!               │  N   │────▶│  S   │
//!               └──────┘     └──────┘
//!     ┌──────┐      ▲
//!     │  P2  │──────┘
//!     └──────┘
//! ```
//!
//! Nodes live in an arena keyed by [`NodeId`]; edges are id lists stored on
//! both ends. `N` fires once `P1` and `P2` have both completed successfully.
//! Its pending payloads are `[N's initial payload, first body, second body]`
//! in predecessor completion order, and its aggregator turns that list into
//! the payload it sends.
//!
//! ## Lifecycle
//!
//! 1. Build: `add_node`, `connect_next`, `add_assertion`,
//!    `set_payload_aggregator` on a `&mut RequestGraph`.
//! 2. Share: wrap the graph in an `Arc`.
//! 3. Execute: `execute(id)` on chosen nodes, or `run()` for every root.
//! 4. Inspect: `report`, `report_tree`, `reports`.
//!
//! ## Worked example
//!
//! `login` returns `{"token":"t1"}` and `cart` returns `{"items":3}`; both
//! feed `checkout`, whose initial payload is `{"currency":"EUR"}`.
//!
//! ```text
//! run()
//!  ├─ login    200 ✓  delivers {"token":"t1"}     checkout: 1 of 2 delivered
//!  └─ cart     200 ✓  delivers {"items":3}        checkout: 2 of 2, claimed
//!      └─ checkout  payloads = [{"currency":"EUR"}, {"token":"t1"}, {"items":3}]
//! ```
//!
//! With the default aggregator `checkout` sends `{"currency":"EUR"}`; a
//! custom [`PayloadAggregator`] can merge all three. Had `cart` failed any
//! assertion, `checkout` would never fire and stays without a report.

mod execution;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::debug;

use crate::assertion::Assertion;
use crate::backend::Backend;
use crate::config::GraphLimits;
use crate::errors::GraphError;
use crate::protocol::{NodeId, Report, RequestSpec};

// ============================================================================
// PAYLOAD AGGREGATION
// ============================================================================

/// Turns a node's pending payloads into the payload it sends.
pub type PayloadAggregator = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Default aggregator: the first pending payload, `null` when there is none.
pub fn first_payload(payloads: &[Value]) -> Value {
    payloads.first().cloned().unwrap_or(Value::Null)
}

// ============================================================================
// NODE
// ============================================================================

#[derive(Debug, Default)]
struct PendingState {
    payloads: Vec<Value>,
    /// Predecessors that succeeded and appended their body.
    delivered: HashSet<NodeId>,
    /// Set exactly once, by whoever starts the node.
    claimed: bool,
}

/// One vertex of the graph.
pub struct Node {
    id: NodeId,
    spec: RequestSpec,
    predecessors: Vec<NodeId>,
    successors: Vec<NodeId>,
    aggregator: PayloadAggregator,
    assertions: Mutex<Vec<Assertion>>,
    pending: Mutex<PendingState>,
    completed: AtomicBool,
    report: OnceLock<Report>,
    /// Flips to `true` once the node and every branch it spawned are done.
    settled: watch::Sender<bool>,
}

impl Node {
    fn new(spec: RequestSpec) -> Self {
        let pending = PendingState {
            payloads: vec![spec.payload.clone()],
            delivered: HashSet::new(),
            claimed: false,
        };

        Self {
            id: NodeId::new(),
            spec,
            predecessors: Vec::new(),
            successors: Vec::new(),
            aggregator: Arc::new(first_payload),
            assertions: Mutex::new(Vec::new()),
            pending: Mutex::new(pending),
            completed: AtomicBool::new(false),
            report: OnceLock::new(),
            settled: watch::channel(false).0,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// `None` until the node has finished executing.
    pub fn report(&self) -> Option<&Report> {
        self.report.get()
    }

    /// Snapshot of the payloads collected so far.
    pub async fn pending_payloads(&self) -> Vec<Value> {
        self.pending.lock().await.payloads.clone()
    }

    fn succeeded(&self) -> bool {
        self.is_completed() && self.report().is_some_and(|r| r.success)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("method", &self.spec.method)
            .field("path", &self.spec.path)
            .field("predecessors", &self.predecessors)
            .field("successors", &self.successors)
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// GRAPH
// ============================================================================

/// Arena of request nodes plus the backend they all share.
pub struct RequestGraph {
    nodes: HashMap<NodeId, Node>,
    /// Insertion order, for deterministic iteration.
    order: Vec<NodeId>,
    backend: Arc<dyn Backend>,
    limits: GraphLimits,
    permits: Option<Semaphore>,
}

impl RequestGraph {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_limits(backend, GraphLimits::default())
    }

    pub fn with_limits(backend: Arc<dyn Backend>, limits: GraphLimits) -> Self {
        let permits = limits.parallelism_bound().map(Semaphore::new);
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            backend,
            limits,
            permits,
        }
    }

    pub fn limits(&self) -> &GraphLimits {
        &self.limits
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Adds an unconnected node and returns its id.
    pub fn add_node(&mut self, spec: RequestSpec) -> Result<NodeId, GraphError> {
        self.limits.check(self.order.len() + 1)?;

        let node = Node::new(spec);
        let id = node.id;
        debug!(node_id = %id, method = %node.spec.method, path = %node.spec.path, "Node added");

        self.order.push(id);
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Makes `to` a successor of `from` (and `from` a predecessor of `to`).
    ///
    /// Re-adding an existing edge is a no-op. Cycles are not rejected here;
    /// `run()` checks for them.
    pub fn connect_next(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::InvalidEdge(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(GraphError::UnknownNode(to));
        }

        let source = self.node_mut(from)?;
        if source.successors.contains(&to) {
            return Ok(());
        }
        source.successors.push(to);
        self.node_mut(to)?.predecessors.push(from);

        debug!(from = %from, to = %to, "Edge added");
        Ok(())
    }

    pub fn set_payload_aggregator<F>(&mut self, id: NodeId, aggregator: F) -> Result<(), GraphError>
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        self.node_mut(id)?.aggregator = Arc::new(aggregator);
        Ok(())
    }

    /// Appends an assertion; assertions are evaluated in insertion order.
    pub fn add_assertion(&mut self, id: NodeId, assertion: Assertion) -> Result<(), GraphError> {
        self.node_mut(id)?.assertions.get_mut().push(assertion);
        Ok(())
    }

    /// Appends a value to the node's pending payloads.
    pub async fn add_payload(&self, id: NodeId, payload: Value) -> Result<(), GraphError> {
        self.node_or_err(id)?.pending.lock().await.payloads.push(payload);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    /// Nodes with no predecessors, in insertion order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.nodes.get(id).is_some_and(|n| n.predecessors.is_empty()))
            .collect()
    }

    pub fn successors_of(&self, id: NodeId) -> Option<&[NodeId]> {
        self.nodes.get(&id).map(|n| n.successors.as_slice())
    }

    pub fn is_completed(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(Node::is_completed)
    }

    /// True when every predecessor completed with a successful report.
    /// A node without predecessors is always ready.
    pub fn is_ready(&self, id: NodeId) -> Result<bool, GraphError> {
        let node = self.node_or_err(id)?;
        Ok(self.predecessors_succeeded(node))
    }

    pub fn report(&self, id: NodeId) -> Option<&Report> {
        self.nodes.get(&id).and_then(Node::report)
    }

    /// Every report produced so far, in node insertion order.
    pub fn reports(&self) -> Vec<&Report> {
        self.order.iter().filter_map(|id| self.report(*id)).collect()
    }

    fn predecessors_succeeded(&self, node: &Node) -> bool {
        node.predecessors
            .iter()
            .all(|p| self.nodes.get(p).is_some_and(Node::succeeded))
    }

    fn node_or_err(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(&id).ok_or(GraphError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(&id).ok_or(GraphError::UnknownNode(id))
    }
}

impl fmt::Debug for RequestGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGraph")
            .field("nodes", &self.order.len())
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::ScriptedBackend;
    use crate::protocol::Method;
    use serde_json::json;

    fn spec(path: &str) -> RequestSpec {
        RequestSpec::new(Method::Get, "https://api.test", path)
    }

    fn empty_graph() -> RequestGraph {
        RequestGraph::new(Arc::new(ScriptedBackend::new()))
    }

    #[test]
    fn test_connect_next_links_both_ends() {
        let mut graph = empty_graph();
        let a = graph.add_node(spec("/a")).unwrap();
        let b = graph.add_node(spec("/b")).unwrap();

        graph.connect_next(a, b).unwrap();
        graph.connect_next(a, b).unwrap();

        assert_eq!(graph.node(a).unwrap().successors(), &[b]);
        assert_eq!(graph.node(b).unwrap().predecessors(), &[a]);
        assert_eq!(graph.roots(), vec![a]);
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let mut graph = empty_graph();
        let a = graph.add_node(spec("/a")).unwrap();

        let err = graph.connect_next(a, a).unwrap_err();
        assert!(matches!(err, GraphError::InvalidEdge(id) if id == a));
        assert!(graph.node(a).unwrap().successors().is_empty());
    }

    #[test]
    fn test_foreign_ids_are_rejected() {
        let mut graph = empty_graph();
        let a = graph.add_node(spec("/a")).unwrap();
        let stranger = NodeId::new();

        assert!(matches!(
            graph.connect_next(a, stranger),
            Err(GraphError::UnknownNode(id)) if id == stranger
        ));
        assert!(matches!(
            graph.connect_next(stranger, a),
            Err(GraphError::UnknownNode(id)) if id == stranger
        ));
        assert!(graph.add_assertion(stranger, Assertion::new(crate::assertion::Severity::Log)).is_err());
        assert!(graph.is_ready(stranger).is_err());
        assert!(graph.report(stranger).is_none());
    }

    #[test]
    fn test_add_node_respects_limits() {
        let limits = GraphLimits {
            max_nodes: 2,
            max_parallel: 1,
        };
        let mut graph = RequestGraph::with_limits(Arc::new(ScriptedBackend::new()), limits);

        graph.add_node(spec("/a")).unwrap();
        graph.add_node(spec("/b")).unwrap();
        assert!(matches!(
            graph.add_node(spec("/c")),
            Err(GraphError::LimitExceeded { actual: 3, .. })
        ));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_fresh_node_state() {
        let mut graph = empty_graph();
        let a = graph.add_node(spec("/a")).unwrap();
        let b = graph.add_node(spec("/b")).unwrap();
        graph.connect_next(a, b).unwrap();

        assert!(!graph.is_completed(a));
        assert!(graph.report(a).is_none());
        assert!(graph.is_ready(a).unwrap());
        assert!(!graph.is_ready(b).unwrap());
        assert!(graph.reports().is_empty());
    }

    #[test]
    fn test_default_aggregator_takes_first() {
        assert_eq!(first_payload(&[json!(1), json!(2)]), json!(1));
        assert_eq!(first_payload(&[]), Value::Null);
    }

    #[tokio::test]
    async fn test_pending_payloads_start_with_initial_payload() {
        let mut graph = empty_graph();
        let a = graph
            .add_node(spec("/a").with_payload(json!({"seed": true})))
            .unwrap();

        graph.add_payload(a, json!("extra")).await.unwrap();

        let payloads = graph.node(a).unwrap().pending_payloads().await;
        assert_eq!(payloads, vec![json!({"seed": true}), json!("extra")]);
    }
}
