//! The derived MATSim-style network graph.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

use crate::dataset::{NodeId, WayId};

/// Link ids are strings: `"{way}_{increment}"` plus a `_r` suffix for
/// backward-direction links.
pub type LinkId = String;

#[derive(Clone, Debug)]
pub struct NetworkNode {
    pub id: NodeId,
    /// Planar coordinate from the projection.
    pub x: f64,
    pub y: f64,
    pub orig_id: String,
}

#[derive(Clone, Debug)]
pub struct NetworkLink {
    pub id: LinkId,
    pub from: NodeId,
    pub to: NodeId,
    /// Length in metres.
    pub length: f64,
    /// Free-flow speed in m/s.
    pub freespeed: f64,
    /// Flow capacity in vehicles per hour.
    pub capacity: f64,
    pub lanes: f64,
    pub modes: BTreeSet<String>,
    pub orig_id: String,
}

/// One raw way segment covered by a derived link: the segment from point
/// `index` to point `index + 1` of the way's node sequence.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WaySegment {
    pub way: WayId,
    pub index: usize,
}

#[derive(Default)]
pub struct Network {
    nodes: FxHashMap<NodeId, NetworkNode>,
    links: FxHashMap<LinkId, NetworkLink>,
    /// Links attached to a node, for cascade removal.
    node_links: FxHashMap<NodeId, FxHashSet<LinkId>>,
}

impl Network {
    pub fn new() -> Self {
        Network::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&NetworkNode> {
        self.nodes.get(&id)
    }

    pub fn link(&self, id: &str) -> Option<&NetworkLink> {
        self.links.get(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> &FxHashMap<NodeId, NetworkNode> {
        &self.nodes
    }

    pub fn links(&self) -> &FxHashMap<LinkId, NetworkLink> {
        &self.links
    }

    pub fn add_node(&mut self, node: NetworkNode) {
        self.nodes.insert(node.id, node);
    }

    /// Removes a node and every link attached to it. Returns the removed
    /// link ids, sorted, so the caller can purge its back-references.
    pub fn remove_node(&mut self, id: NodeId) -> Vec<LinkId> {
        let mut removed: Vec<LinkId> = Vec::new();
        if let Some(attached) = self.node_links.remove(&id) {
            for link_id in attached {
                if self.remove_link_inner(&link_id).is_some() {
                    removed.push(link_id);
                }
            }
        }
        self.nodes.remove(&id);
        removed.sort_unstable();
        removed
    }

    pub fn add_link(&mut self, link: NetworkLink) {
        self.node_links
            .entry(link.from)
            .or_default()
            .insert(link.id.clone());
        self.node_links
            .entry(link.to)
            .or_default()
            .insert(link.id.clone());
        self.links.insert(link.id.clone(), link);
    }

    pub fn remove_link(&mut self, id: &str) -> Option<NetworkLink> {
        self.remove_link_inner(id)
    }

    fn remove_link_inner(&mut self, id: &str) -> Option<NetworkLink> {
        let link = self.links.remove(id)?;
        for endpoint in [link.from, link.to] {
            if let Some(set) = self.node_links.get_mut(&endpoint) {
                set.remove(id);
                if set.is_empty() {
                    self.node_links.remove(&endpoint);
                }
            }
        }
        Some(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: NodeId) -> NetworkNode {
        NetworkNode {
            id,
            x: 0.0,
            y: 0.0,
            orig_id: id.to_string(),
        }
    }

    fn link(id: &str, from: NodeId, to: NodeId) -> NetworkLink {
        NetworkLink {
            id: id.to_string(),
            from,
            to,
            length: 1.0,
            freespeed: 10.0,
            capacity: 600.0,
            lanes: 1.0,
            modes: BTreeSet::new(),
            orig_id: id.to_string(),
        }
    }

    #[test]
    fn test_remove_node_cascades_to_links() {
        let mut net = Network::new();
        for id in [1, 2, 3] {
            net.add_node(node(id));
        }
        net.add_link(link("a", 1, 2));
        net.add_link(link("b", 2, 3));
        net.add_link(link("c", 3, 1));

        let removed = net.remove_node(2);
        assert_eq!(removed, vec!["a".to_string(), "b".to_string()]);
        assert!(net.link("a").is_none());
        assert!(net.link("b").is_none());
        assert!(net.link("c").is_some());
        assert!(!net.contains_node(2));
    }

    #[test]
    fn test_remove_link_detaches_endpoints() {
        let mut net = Network::new();
        net.add_node(node(1));
        net.add_node(node(2));
        net.add_link(link("a", 1, 2));
        assert!(net.remove_link("a").is_some());
        assert!(net.remove_link("a").is_none());
        // Endpoints survive link removal.
        assert!(net.contains_node(1));
        assert_eq!(net.remove_node(1), Vec::<LinkId>::new());
    }

    #[test]
    fn test_self_loop_link_removed_once() {
        let mut net = Network::new();
        net.add_node(node(1));
        net.add_link(link("loop", 1, 1));
        let removed = net.remove_node(1);
        assert_eq!(removed, vec!["loop".to_string()]);
    }
}
