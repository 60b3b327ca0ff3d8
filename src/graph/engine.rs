//! Membership graph engine backed by petgraph.
//!
//! Edges point from a group to its members. The forward direction walks to
//! descendants (members and subgroups), the reverse direction walks to
//! ancestors (parent groups).

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

use super::types::{Node, Role};

/// Which way a traversal follows membership edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Group to members, recursively.
    Descendants,
    /// Member to parent groups, recursively.
    Ancestors,
}

impl Walk {
    fn direction(self) -> Direction {
        match self {
            Walk::Descendants => Direction::Outgoing,
            Walk::Ancestors => Direction::Incoming,
        }
    }
}

/// A node reached by a shortest-path traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reached {
    pub node: Node,
    /// Names along the path, starting with the traversal origin.
    pub path: Vec<String>,
    /// Role on the edge adjacent to the reached node's side of the query:
    /// the first edge out of the origin for descendants, the edge out of
    /// the reached ancestor for ancestors.
    pub role: Role,
}

impl Reached {
    pub fn distance(&self) -> usize {
        self.path.len() - 1
    }
}

/// Directed membership graph with a name index.
#[derive(Debug, Clone, Default)]
pub struct MembershipGraph {
    graph: DiGraph<Node, Role>,
    index: HashMap<Node, NodeIndex>,
}

impl MembershipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, returning the existing index if it is already present.
    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.index.insert(node, idx);
        idx
    }

    /// Add (or re-label) the edge `parent -> member`.
    ///
    /// Returns false and leaves the graph untouched when either endpoint is
    /// not a node, which keeps every edge endpoint inside the graph.
    pub fn add_edge(&mut self, parent: &Node, member: &Node, role: Role) -> bool {
        match (self.index.get(parent), self.index.get(member)) {
            (Some(&p), Some(&m)) => {
                self.graph.update_edge(p, m, role);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.index.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Role on the edge `parent -> member`, if that edge exists.
    pub fn role(&self, parent: &Node, member: &Node) -> Option<Role> {
        let p = *self.index.get(parent)?;
        let m = *self.index.get(member)?;
        self.graph.find_edge(p, m).map(|e| self.graph[e])
    }

    /// Direct neighbours in the given direction, sorted by node.
    pub fn neighbors(&self, node: &Node, walk: Walk) -> Vec<(Node, Role)> {
        match self.index.get(node) {
            Some(&idx) => self
                .sorted_neighbors(idx, walk.direction())
                .into_iter()
                .map(|(n, role)| (self.graph[n].clone(), role))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Breadth-first shortest paths from `start`, excluding `start` itself.
    ///
    /// Each node is reported once, at its shortest distance; among equal
    /// distances the first discovered wins. Neighbours are expanded in node
    /// order, so results are deterministic. `cutoff` bounds the distance.
    pub fn shortest_paths(&self, start: &Node, walk: Walk, cutoff: Option<usize>) -> Vec<Reached> {
        let Some(&origin) = self.index.get(start) else {
            return Vec::new();
        };
        let direction = walk.direction();

        // node -> (predecessor, role reported for the node)
        let mut seen: HashMap<NodeIndex, (NodeIndex, Role)> = HashMap::new();
        let mut order: Vec<NodeIndex> = Vec::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        queue.push_back((origin, 0));

        while let Some((current, depth)) = queue.pop_front() {
            if cutoff.map_or(false, |c| depth >= c) {
                continue;
            }
            for (next, edge_role) in self.sorted_neighbors(current, direction) {
                if next == origin || seen.contains_key(&next) {
                    continue;
                }
                let role = match walk {
                    Walk::Descendants if current == origin => edge_role,
                    Walk::Descendants => seen[&current].1,
                    Walk::Ancestors => edge_role,
                };
                seen.insert(next, (current, role));
                order.push(next);
                queue.push_back((next, depth + 1));
            }
        }

        order
            .into_iter()
            .map(|idx| {
                let mut path = vec![self.graph[idx].name.clone()];
                let mut cursor = idx;
                while let Some(&(prev, _)) = seen.get(&cursor) {
                    path.push(self.graph[prev].name.clone());
                    cursor = prev;
                }
                path.reverse();
                Reached {
                    node: self.graph[idx].clone(),
                    path,
                    role: seen[&idx].1,
                }
            })
            .collect()
    }

    fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<(NodeIndex, Role)> {
        let mut out: Vec<(NodeIndex, Role)> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (other, *e.weight())
            })
            .collect();
        out.sort_by(|a, b| self.graph[a.0].cmp(&self.graph[b.0]));
        out
    }
}
