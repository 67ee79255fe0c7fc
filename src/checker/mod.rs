//! # Cycle Detection
//!
//! Edge creation never rejects cycles, so a graph can be wired into a ring.
//! Executing a ring would never terminate: every node waits on a predecessor
//! that waits on it. `RequestGraph::run` calls [`CircularChecker::find_cycle`]
//! before executing anything.
//!
//! ## Algorithm
//!
//! Three-colour depth-first search over successor edges:
//!
//! - **White**: not visited yet
//! - **Grey**: on the current DFS path
//! - **Black**: fully explored, known to be cycle-free
//!
//! Reaching a grey node means the current path loops back on itself. Reaching
//! a black node is fine, so a diamond (`A → B → D`, `A → C → D`) is not a cycle.
//!
//! ## Worked examples
//!
//! Diamond, walked from `A`:
//!
//! ```text
//! visit A   grey  [A]
//! visit B   grey  [A, B]
//! visit D   grey  [A, B, D]   D has no successors, D black
//!           B black
//! visit C   grey  [A, C]
//!   D is black, skip           C black
//!           A black           → no cycle
//! ```
//!
//! Ring `A → B → C → A`:
//!
//! ```text
//! visit A   grey  [A]
//! visit B   grey  [A, B]
//! visit C   grey  [A, B, C]
//!   A is grey                 → cycle, returns A
//! ```
//!
//! `find_cycle` returns the grey node the search ran back into, and `run`
//! fails with `GraphError::CircularDependency` naming it.

use std::collections::HashMap;

use crate::graph::RequestGraph;
use crate::protocol::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Read-only cycle detector over a graph's successor edges.
pub struct CircularChecker<'a> {
    graph: &'a RequestGraph,
}

impl<'a> CircularChecker<'a> {
    pub fn new(graph: &'a RequestGraph) -> Self {
        Self { graph }
    }

    /// True if a cycle is reachable from `start` following successor edges.
    /// Unknown ids have no edges and are never circular.
    pub fn check(&self, start: NodeId) -> bool {
        let mut colours = HashMap::new();
        self.visit(start, &mut colours).is_some()
    }

    /// First node found closing a cycle anywhere in the graph.
    ///
    /// Starts a search from every node in insertion order, so rings without
    /// any root node are found too.
    pub fn find_cycle(&self) -> Option<NodeId> {
        let mut colours = HashMap::new();
        for id in self.graph.node_ids() {
            if colour_of(&colours, id) == Colour::White {
                if let Some(found) = self.visit(id, &mut colours) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn visit(&self, id: NodeId, colours: &mut HashMap<NodeId, Colour>) -> Option<NodeId> {
        colours.insert(id, Colour::Grey);

        for &next in self.graph.successors_of(id).unwrap_or(&[]) {
            match colour_of(colours, next) {
                Colour::Grey => return Some(next),
                Colour::White => {
                    if let Some(found) = self.visit(next, colours) {
                        return Some(found);
                    }
                }
                Colour::Black => {}
            }
        }

        colours.insert(id, Colour::Black);
        None
    }
}

fn colour_of(colours: &HashMap<NodeId, Colour>, id: NodeId) -> Colour {
    colours.get(&id).copied().unwrap_or(Colour::White)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::ScriptedBackend;
    use crate::protocol::{Method, RequestSpec};
    use std::sync::Arc;

    fn graph_with(n: usize) -> (RequestGraph, Vec<NodeId>) {
        let mut graph = RequestGraph::new(Arc::new(ScriptedBackend::new()));
        let ids = (0..n)
            .map(|i| {
                graph
                    .add_node(RequestSpec::new(Method::Get, "https://api.test", format!("/n{}", i)))
                    .unwrap()
            })
            .collect();
        (graph, ids)
    }

    #[test]
    fn test_ring_is_circular() {
        let (mut graph, ids) = graph_with(3);
        graph.connect_next(ids[0], ids[1]).unwrap();
        graph.connect_next(ids[1], ids[2]).unwrap();
        graph.connect_next(ids[2], ids[0]).unwrap();

        let checker = CircularChecker::new(&graph);
        assert!(checker.check(ids[0]));
        assert!(checker.check(ids[2]));
        assert!(checker.find_cycle().is_some());
    }

    #[test]
    fn test_chain_is_not_circular() {
        let (mut graph, ids) = graph_with(3);
        graph.connect_next(ids[0], ids[1]).unwrap();
        graph.connect_next(ids[1], ids[2]).unwrap();

        let checker = CircularChecker::new(&graph);
        assert!(!checker.check(ids[0]));
        assert_eq!(checker.find_cycle(), None);
    }

    #[test]
    fn test_diamond_is_not_circular() {
        let (mut graph, ids) = graph_with(4);
        graph.connect_next(ids[0], ids[1]).unwrap();
        graph.connect_next(ids[0], ids[2]).unwrap();
        graph.connect_next(ids[1], ids[3]).unwrap();
        graph.connect_next(ids[2], ids[3]).unwrap();

        let checker = CircularChecker::new(&graph);
        assert!(!checker.check(ids[0]));
        assert_eq!(checker.find_cycle(), None);
    }

    #[test]
    fn test_ring_behind_a_chain() {
        // 0 → 1 → 2 → 3 → 1
        let (mut graph, ids) = graph_with(4);
        graph.connect_next(ids[0], ids[1]).unwrap();
        graph.connect_next(ids[1], ids[2]).unwrap();
        graph.connect_next(ids[2], ids[3]).unwrap();
        graph.connect_next(ids[3], ids[1]).unwrap();

        let checker = CircularChecker::new(&graph);
        assert!(checker.check(ids[0]));
        assert_eq!(checker.find_cycle(), Some(ids[1]));
    }

    #[test]
    fn test_unknown_start_is_not_circular() {
        let (graph, _) = graph_with(1);
        assert!(!CircularChecker::new(&graph).check(NodeId::new()));
    }
}
