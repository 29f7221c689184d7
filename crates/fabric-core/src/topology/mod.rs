//! Fabric topology
//!
//! - [`Topology`]: the undirected node/link graph
//! - [`TopologyBuilder`]: randomized fabric generation with sample jobs
//! - [`TopologyStore`]: single-writer owner of the topology and the job table

mod builder;
mod store;

pub use builder::{BuildParams, TopologyBuilder, MAX_COMPUTE_NODES, MAX_SWITCHES};
pub use store::{LinkUpdate, TopologyStats, TopologyStore};

use crate::error::{FabricError, Result};
use crate::models::{Link, LinkId, Node, NodeId};
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Undirected fabric graph with id lookups for nodes and links
#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: UnGraph<Node, Link>,
    node_index: HashMap<NodeId, NodeIndex>,
    link_index: HashMap<LinkId, EdgeIndex>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeIndex {
        if let Some(idx) = self.node_index.get(&node.id) {
            return *idx;
        }
        let id = node.id;
        let idx = self.graph.add_node(node);
        self.node_index.insert(id, idx);
        idx
    }

    /// Add a link between two existing nodes. Re-adding an existing link replaces its attributes.
    pub fn add_link(&mut self, link: Link) -> Result<EdgeIndex> {
        let (a, b) = link.id.endpoints();
        let a_idx = self.index_of(a)?;
        let b_idx = self.index_of(b)?;
        if let Some(edge) = self.link_index.get(&link.id).copied() {
            self.graph[edge] = link;
            return Ok(edge);
        }
        let id = link.id;
        let edge = self.graph.add_edge(a_idx, b_idx, link);
        self.link_index.insert(id, edge);
        Ok(edge)
    }

    pub fn graph(&self) -> &UnGraph<Node, Link> {
        &self.graph
    }

    pub fn index_of(&self, id: NodeId) -> Result<NodeIndex> {
        self.node_index
            .get(&id)
            .copied()
            .ok_or_else(|| FabricError::NodeNotFound(id.to_string()))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn link(&self, id: &LinkId) -> Option<&Link> {
        self.link_index.get(id).map(|edge| &self.graph[*edge])
    }

    pub(crate) fn link_mut(&mut self, id: &LinkId) -> Result<&mut Link> {
        let edge = self
            .link_index
            .get(id)
            .copied()
            .ok_or_else(|| FabricError::LinkNotFound(id.to_string()))?;
        Ok(&mut self.graph[edge])
    }

    /// Link joining two nodes, if any
    pub fn link_between(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.link(&LinkId::new(a, b))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.graph.edge_weights()
    }

    pub(crate) fn links_mut(&mut self) -> impl Iterator<Item = &mut Link> {
        self.graph.edge_weights_mut()
    }

    pub fn link_ids(&self) -> Vec<LinkId> {
        let mut ids: Vec<LinkId> = self.link_index.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Links sharing an endpoint with `id`
    pub fn adjacent_links(&self, id: &LinkId) -> Vec<LinkId> {
        let (a, b) = id.endpoints();
        let mut out = Vec::new();
        for endpoint in [a, b] {
            let Some(idx) = self.node_index.get(&endpoint) else {
                continue;
            };
            for edge in self.graph.edges(*idx) {
                let other = edge.weight().id;
                if other != *id && !out.contains(&other) {
                    out.push(other);
                }
            }
        }
        out
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// True when every consecutive pair of the route is a link
    pub fn is_connected_walk(&self, route: &[NodeId]) -> bool {
        match route {
            [] => false,
            [only] => self.contains_node(*only),
            _ => route
                .windows(2)
                .all(|hop| self.link_between(hop[0], hop[1]).is_some()),
        }
    }

    /// Resolve every hop of a route to its link, failing on the first gap
    pub fn route_links(&self, route: &[NodeId]) -> Result<Vec<&Link>> {
        for node in route {
            self.index_of(*node)?;
        }
        route
            .windows(2)
            .map(|hop| {
                self.link_between(hop[0], hop[1])
                    .ok_or_else(|| FabricError::LinkNotFound(LinkId::new(hop[0], hop[1]).to_string()))
            })
            .collect()
    }
}
