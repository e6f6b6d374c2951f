//! Edit-event impact propagation.
//!
//! Turns a batch of [`EditEvent`]s into the closure of source primitives
//! whose derived output may have changed. The traversal is an explicit
//! worklist with a visited set, so cycles in the relation-referrer graph
//! (a route_master referencing itself through children) terminate.
//!
//! When a node is touched, its referring ways (their link lengths change)
//! and relations (it may be a transit stop) are invalidated transitively.
//! Removed primitives are detached from the dataset by the time the event is
//! processed; their referrer lists are unreliable, so they enter the closure
//! without expansion.

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::config::Settings;
use crate::dataset::{Dataset, EditEvent, NodeId, PrimitiveId, RelationId, WayId};
use crate::network::Network;
use crate::store::ElementStore;

/// Affected primitives, in conversion order: nodes before ways before
/// relations, since link derivation depends on finalized node existence and
/// transit derivation on finalized links.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Closure {
    pub nodes: Vec<NodeId>,
    pub ways: Vec<WayId>,
    pub relations: Vec<RelationId>,
}

impl Closure {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }
}

struct Aggregator<'a> {
    data: &'a Dataset,
    settings: &'a Settings,
    visited: FxHashSet<PrimitiveId>,
    closure: Closure,
}

impl<'a> Aggregator<'a> {
    fn new(data: &'a Dataset, settings: &'a Settings) -> Self {
        Aggregator {
            data,
            settings,
            visited: FxHashSet::default(),
            closure: Closure::default(),
        }
    }

    fn visit(&mut self, start: PrimitiveId) {
        let mut frontier = vec![start];
        while let Some(primitive) = frontier.pop() {
            if !self.visited.insert(primitive) {
                continue;
            }
            match primitive {
                PrimitiveId::Node(id) => {
                    self.closure.nodes.push(id);
                    // A detached node's referrer list is gone; add it to the
                    // closure as "removed" without expansion.
                    if self.data.contains(primitive) {
                        frontier.extend(self.data.referrers(primitive));
                    }
                }
                PrimitiveId::Way(id) => {
                    self.closure.ways.push(id);
                    if self.data.contains(primitive) {
                        frontier.extend(self.data.referrers(primitive));
                    }
                }
                PrimitiveId::Relation(id) => {
                    self.closure.relations.push(id);
                    if self.data.contains(primitive) {
                        frontier.extend(self.data.referrers(primitive));
                        // Downward, ordinary relations are leaves; a grouping
                        // relation invalidates its whole hierarchy.
                        if self.settings.transit_support {
                            if let Some(relation) = self.data.relation(id) {
                                if relation.has_tag("type", "route_master") {
                                    frontier.extend(relation.members.iter().map(|m| m.member));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Endpoint source nodes of a way's existing derived links. Recovers
    /// routes that depended on old link endpoints when the way's tags or
    /// node sequence change.
    fn visit_existing_link_endpoints(&mut self, way: WayId, store: &ElementStore, network: &Network) {
        let links: Vec<String> = store.links_of_way(way).to_vec();
        for link_id in links {
            if let Some(link) = network.link(&link_id) {
                self.visit(PrimitiveId::Node(link.from));
                self.visit(PrimitiveId::Node(link.to));
            }
        }
    }

    fn into_closure(mut self) -> Closure {
        self.closure.nodes.sort_unstable();
        self.closure.ways.sort_unstable();
        self.closure.relations.sort_unstable();
        self.closure
    }
}

/// Closure covering the entire dataset, for a full rebuild.
pub fn full_closure(data: &Dataset) -> Closure {
    Closure {
        nodes: data.node_ids(),
        ways: data.way_ids(),
        relations: data.relation_ids(),
    }
}

/// Computes the combined closure for a batch of events. A batch containing a
/// dataset-wide change widens to the full closure.
pub fn closure_for_events(
    data: &Dataset,
    store: &ElementStore,
    network: &Network,
    settings: &Settings,
    events: &[EditEvent],
) -> Closure {
    if events.iter().any(|e| matches!(e, EditEvent::DataChanged)) {
        return full_closure(data);
    }

    let mut agg = Aggregator::new(data, settings);
    for event in events {
        match event {
            EditEvent::DataChanged => unreachable!("handled above"),
            EditEvent::NodeMoved { node } => {
                agg.visit(PrimitiveId::Node(*node));
            }
            EditEvent::PrimitivesAdded { primitives } => {
                for primitive in primitives {
                    agg.visit(*primitive);
                    if let PrimitiveId::Way(way_id) = primitive {
                        if let Some(way) = data.way(*way_id) {
                            for node in &way.nodes {
                                agg.visit(PrimitiveId::Node(*node));
                            }
                        }
                    }
                }
            }
            EditEvent::PrimitivesRemoved { primitives } => {
                // Detached: only the primitives themselves re-derive.
                for primitive in primitives {
                    agg.visit(*primitive);
                }
            }
            EditEvent::RelationMembersChanged { relation } => {
                agg.visit(PrimitiveId::Relation(*relation));
                if let Some(rel) = data.relation(*relation) {
                    for member in &rel.members {
                        agg.visit(member.member);
                    }
                }
            }
            EditEvent::TagsChanged { primitives } => {
                for primitive in primitives {
                    agg.visit(*primitive);
                    if let PrimitiveId::Way(way_id) = primitive {
                        if let Some(way) = data.way(*way_id) {
                            for node in &way.nodes {
                                agg.visit(PrimitiveId::Node(*node));
                            }
                        }
                        agg.visit_existing_link_endpoints(*way_id, store, network);
                    }
                }
            }
            EditEvent::WayNodesChanged { way } => {
                if let Some(w) = data.way(*way) {
                    for node in &w.nodes {
                        agg.visit(PrimitiveId::Node(*node));
                    }
                }
                agg.visit_existing_link_endpoints(*way, store, network);
                agg.visit(PrimitiveId::Way(*way));
            }
        }
    }
    let closure = agg.into_closure();
    trace!(
        nodes = closure.nodes.len(),
        ways = closure.ways.len(),
        relations = closure.relations.len(),
        "computed impact closure"
    );
    closure
}
