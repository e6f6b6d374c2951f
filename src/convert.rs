//! Per-primitive conversion from OSM source primitives to network elements.
//!
//! A [`ConvertPass`] is created per propagation pass and tracks a visited
//! set per primitive kind, so re-deriving the same primitive twice within
//! one pass is a no-op. Stale derived elements are always removed before
//! re-derivation, which makes a pass idempotent: running it again over an
//! unchanged dataset reproduces the derived graph exactly.

use tracing::{debug, trace};

use crate::config::Settings;
use crate::dataset::{Dataset, Member, NodeId, OsmNode, OsmRelation, OsmWay, PrimitiveId, RelationId, WayId};
use crate::geo::{haversine_distance, Projection};
use crate::network::{LinkId, Network, NetworkLink, NetworkNode, WaySegment};
use crate::propagate::Closure;
use crate::rules;
use crate::store::ElementStore;
use crate::transit::{Line, Route, StopArea};

use rustc_hash::FxHashSet;

/// Traversal direction of a route member way relative to the route.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum MemberDirection {
    Forward,
    Backward,
    /// Not a way, too short, or not connectable; contributes no links.
    Undecided,
}

pub(crate) struct ConvertPass<'a> {
    data: &'a Dataset,
    settings: &'a Settings,
    projection: &'a dyn Projection,
    network: &'a mut Network,
    store: &'a mut ElementStore,
    visited_nodes: FxHashSet<NodeId>,
    visited_ways: FxHashSet<WayId>,
    visited_relations: FxHashSet<RelationId>,
}

impl<'a> ConvertPass<'a> {
    pub(crate) fn new(
        data: &'a Dataset,
        settings: &'a Settings,
        projection: &'a dyn Projection,
        network: &'a mut Network,
        store: &'a mut ElementStore,
    ) -> Self {
        ConvertPass {
            data,
            settings,
            projection,
            network,
            store,
            visited_nodes: FxHashSet::default(),
            visited_ways: FxHashSet::default(),
            visited_relations: FxHashSet::default(),
        }
    }

    /// Re-derives every primitive in the closure, nodes first so link
    /// derivation sees the final node set, relations last so transit
    /// derivation sees the final links.
    pub(crate) fn run(&mut self, closure: &Closure) {
        for node in &closure.nodes {
            self.convert_node(*node);
        }
        for way in &closure.ways {
            self.convert_way(*way);
        }
        for relation in &closure.relations {
            self.convert_relation(*relation);
        }
    }

    fn convert_node(&mut self, id: NodeId) {
        if !self.visited_nodes.insert(id) {
            return;
        }
        let removed = self.network.remove_node(id);
        self.store.purge_links(&removed);
        let Some(node) = self.data.node(id) else {
            // Hard-deleted; the removal above is all there is to do.
            return;
        };
        if self.is_relevant(node) {
            let (x, y) = self.projection.lat_lon_to_east_north(node.lat, node.lon);
            self.network.add_node(NetworkNode {
                id,
                x,
                y,
                orig_id: rules::node_orig_id(node),
            });
            trace!(node = id, "derived network node");
        }
    }

    /// A node becomes a network node if some usable, convertible way needs
    /// it: as an endpoint, as a junction shared with a second convertible
    /// way, as a tagged stop position, or unconditionally in keep-paths
    /// mode.
    fn is_relevant(&self, node: &OsmNode) -> bool {
        if !node.is_usable() {
            return false;
        }
        if self.settings.transit_lite && node.tag(rules::MATSIM_ID).is_none() {
            return false;
        }
        let mut junction_way = false;
        for referrer in self.data.referrers(PrimitiveId::Node(node.id)) {
            let PrimitiveId::Way(way_id) = referrer else {
                continue;
            };
            let Some(way) = self.data.way(way_id) else {
                continue;
            };
            if way.is_usable() && rules::is_matsim_way(way, self.settings) {
                if self.settings.keep_paths
                    || way.is_first_last_node(node.id)
                    || junction_way
                    || node.has_tag("public_transport", "stop_position")
                {
                    return true;
                }
                junction_way = true;
            }
        }
        false
    }

    fn convert_way(&mut self, id: WayId) {
        if !self.visited_ways.insert(id) {
            return;
        }
        let old_links = self.store.take_way_links(id);
        for link in &old_links {
            self.network.remove_link(link);
        }
        let Some(way) = self.data.way(id) else {
            return;
        };
        if way.is_usable() {
            self.derive_links(way);
        }
    }

    fn derive_links(&mut self, way: &OsmWay) {
        let Some(way_type) = rules::way_type(way, self.settings) else {
            return;
        };
        let Some(defaults) = rules::way_defaults(way_type) else {
            return;
        };
        let forward = rules::is_forward(way, &defaults);
        let backward = rules::is_backward(way, &defaults);
        let freespeed = rules::freespeed(way, &defaults);
        let lanes = rules::lanes_per_direction(way, &defaults, forward, backward);
        let capacity = rules::capacity(way, &defaults, lanes);
        let modes = rules::modes(way, &defaults);
        let tagged_length = rules::tagged_length(way);

        let (Some(freespeed), Some(lanes), Some(capacity), Some(modes)) =
            (freespeed, lanes, capacity, modes)
        else {
            return;
        };
        if self.settings.transit_lite && way.tag(rules::MATSIM_ID).is_none() {
            return;
        }

        // Ordered sub-sequence of the way's points that made it into the
        // network; filtered-out points are skipped, their raw segments fold
        // into the neighbouring link.
        let node_order: Vec<NodeId> = way
            .nodes
            .iter()
            .copied()
            .filter(|n| self.network.contains_node(*n))
            .collect();

        let raw_total = self.raw_way_length(way);
        let mut derived = 0usize;
        let mut increment = 0u64;
        for pair in node_order.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let from_idx = way
                .nodes
                .iter()
                .position(|&n| n == from)
                .expect("node_order is drawn from way.nodes");
            let mut to_idx = way
                .nodes
                .iter()
                .position(|&n| n == to)
                .expect("node_order is drawn from way.nodes");
            if from_idx >= to_idx {
                // Loop: take the last occurrence so the span never runs
                // backwards.
                to_idx = way
                    .nodes
                    .iter()
                    .rposition(|&n| n == to)
                    .expect("node_order is drawn from way.nodes");
            }

            let mut segments = Vec::with_capacity(to_idx - from_idx);
            let mut length = 0.0;
            for m in from_idx..to_idx {
                segments.push(WaySegment {
                    way: way.id,
                    index: m,
                });
                length += self.raw_segment_length(way, m);
            }
            if let Some(tagged) = tagged_length {
                if raw_total > 0.0 {
                    length = tagged * length / raw_total;
                }
            }

            if self.network.contains_node(from) && self.network.contains_node(to) {
                if forward {
                    let id = rules::link_id(way.id, increment, false);
                    let orig_id = rules::link_orig_id(way, &id, false);
                    self.add_link(way, id, from, to, length, freespeed, capacity, lanes, &modes, orig_id, segments.clone());
                    derived += 1;
                }
                if backward {
                    let id = rules::link_id(way.id, increment, true);
                    let orig_id = rules::link_orig_id(way, &id, true);
                    self.add_link(way, id, to, from, length, freespeed, capacity, lanes, &modes, orig_id, segments.clone());
                    derived += 1;
                }
            }
            increment += 1;
        }
        if derived > 0 {
            debug!(way = way.id, links = derived, "derived links");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_link(
        &mut self,
        way: &OsmWay,
        id: LinkId,
        from: NodeId,
        to: NodeId,
        length: f64,
        freespeed: f64,
        capacity: f64,
        lanes: f64,
        modes: &std::collections::BTreeSet<String>,
        orig_id: String,
        segments: Vec<WaySegment>,
    ) {
        self.network.add_link(NetworkLink {
            id: id.clone(),
            from,
            to,
            length,
            freespeed,
            capacity,
            lanes,
            modes: modes.clone(),
            orig_id,
        });
        self.store.record_link(way.id, id, segments);
    }

    fn raw_segment_length(&self, way: &OsmWay, index: usize) -> f64 {
        let (Some(a), Some(b)) = (
            way.nodes.get(index).and_then(|n| self.data.node(*n)),
            way.nodes.get(index + 1).and_then(|n| self.data.node(*n)),
        ) else {
            return 0.0;
        };
        haversine_distance(a.lat, a.lon, b.lat, b.lon)
    }

    fn raw_way_length(&self, way: &OsmWay) -> f64 {
        (0..way.nodes.len().saturating_sub(1))
            .map(|m| self.raw_segment_length(way, m))
            .sum()
    }

    fn convert_relation(&mut self, id: RelationId) {
        if !self.visited_relations.insert(id) {
            return;
        }
        if !self.settings.transit_support {
            return;
        }
        self.update_transit_route(id);
        self.store.stop_areas.remove(&id);
        self.create_stop_facility(id);
    }

    /// Route-eligible relations derive (or update, preserving identity) a
    /// transit route; relations that stop qualifying soft-delete theirs.
    fn update_transit_route(&mut self, id: RelationId) {
        let relation = self.data.relation(id);
        let eligible = relation.is_some_and(|rel| {
            rel.is_usable() && rel.has_tag("type", "route") && rel.tag("route").is_some()
        });
        let line = if eligible {
            self.resolve_line(id)
        } else {
            None
        };

        let (Some(relation), Some(line_id)) = (relation, line) else {
            if let Some(route) = self.store.routes.get_mut(&id) {
                route.deleted = true;
                debug!(relation = id, "soft-deleted transit route");
            }
            return;
        };

        let mode = relation.tag("route").unwrap_or_default().to_string();
        let stop_areas = self.route_stop_areas(relation);
        let recompute_path =
            !self.settings.transit_lite || relation.tag(rules::MATSIM_ID).is_some();
        let link_ids = if recompute_path {
            Some(self.determine_network_route(relation))
        } else {
            None
        };

        // The owning line may have changed; detach everywhere, then attach
        // to the resolved one.
        self.store.detach_route_from_lines(id);
        let line_name = self
            .data
            .relation(line_id)
            .and_then(|rel| rel.tag("name").or_else(|| rel.tag("ref")))
            .map(str::to_string);
        self.store
            .lines
            .entry(line_id)
            .or_insert_with(|| Line::new(line_id, line_name))
            .add_route(id);

        match self.store.routes.get_mut(&id) {
            Some(route) => {
                // Update the keyed entry in place so downstream holders of
                // the key observe the same route across edit churn.
                route.deleted = false;
                route.mode = mode;
                route.stop_areas = stop_areas;
                if let Some(link_ids) = link_ids {
                    route.link_ids = link_ids;
                }
            }
            None => {
                self.store.routes.insert(
                    id,
                    Route {
                        relation: id,
                        mode,
                        link_ids: link_ids.flatten(),
                        stop_areas,
                        deleted: false,
                    },
                );
            }
        }
        debug!(relation = id, line = line_id, "derived transit route");
    }

    /// A route's line is the first referrer tagged as a route_master.
    fn resolve_line(&self, route: RelationId) -> Option<RelationId> {
        for referrer in self.data.referrers(PrimitiveId::Relation(route)) {
            if let PrimitiveId::Relation(master) = referrer {
                if let Some(rel) = self.data.relation(master) {
                    if rel.has_tag("type", "route_master") {
                        return Some(master);
                    }
                }
            }
        }
        None
    }

    /// Concatenates member-way link ids, oriented per member traversal
    /// direction: forward members contribute forward links in order,
    /// backward members contribute reverse links in reverse order.
    fn determine_network_route(&self, relation: &OsmRelation) -> Option<Vec<LinkId>> {
        let directions = self.member_directions(&relation.members);
        let mut links: Vec<LinkId> = Vec::new();
        for (member, direction) in relation.members.iter().zip(directions) {
            let PrimitiveId::Way(way_id) = member.member else {
                continue;
            };
            let way_links = self.store.links_of_way(way_id);
            match direction {
                MemberDirection::Forward => {
                    links.extend(
                        way_links
                            .iter()
                            .filter(|l| !l.ends_with(rules::REVERSE_SUFFIX))
                            .cloned(),
                    );
                }
                MemberDirection::Backward => {
                    links.extend(
                        way_links
                            .iter()
                            .rev()
                            .filter(|l| l.ends_with(rules::REVERSE_SUFFIX))
                            .cloned(),
                    );
                }
                MemberDirection::Undecided => {}
            }
        }
        if links.is_empty() {
            None
        } else {
            Some(links)
        }
    }

    /// Orients each member way by chaining endpoints: a member is FORWARD
    /// when its first node continues the previous member's exit node; a
    /// chain head is oriented against the following member.
    fn member_directions(&self, members: &[Member]) -> Vec<MemberDirection> {
        let ways: Vec<Option<&OsmWay>> = members
            .iter()
            .map(|m| match m.member {
                PrimitiveId::Way(id) => self.data.way(id).filter(|w| w.nodes.len() >= 2),
                _ => None,
            })
            .collect();

        let mut directions = vec![MemberDirection::Undecided; members.len()];
        let mut prev_exit: Option<NodeId> = None;
        for i in 0..ways.len() {
            let Some(way) = ways[i] else {
                continue;
            };
            let first = *way.nodes.first().expect("len checked above");
            let last = *way.nodes.last().expect("len checked above");
            let direction = match prev_exit {
                Some(exit) if first == exit => MemberDirection::Forward,
                Some(exit) if last == exit => MemberDirection::Backward,
                _ => {
                    // Chain head or broken chain: orient against the next
                    // way member, defaulting to forward.
                    match ways[i + 1..].iter().flatten().next() {
                        Some(next) => {
                            let next_first = *next.nodes.first().expect("len checked above");
                            let next_last = *next.nodes.last().expect("len checked above");
                            if last == next_first || last == next_last {
                                MemberDirection::Forward
                            } else if first == next_first || first == next_last {
                                MemberDirection::Backward
                            } else {
                                MemberDirection::Forward
                            }
                        }
                        None => MemberDirection::Forward,
                    }
                }
            };
            prev_exit = Some(match direction {
                MemberDirection::Forward => last,
                MemberDirection::Backward => first,
                MemberDirection::Undecided => unreachable!(),
            });
            directions[i] = direction;
        }
        directions
    }

    /// Stop areas referenced by the route's stop and platform members,
    /// resolved through the enclosing stop-area relation.
    fn route_stop_areas(&self, relation: &OsmRelation) -> Vec<RelationId> {
        let mut areas: Vec<RelationId> = Vec::new();
        for member in &relation.members {
            if !member.role.starts_with("stop") && !member.role.starts_with("platform") {
                continue;
            }
            for referrer in self.data.referrers(member.member) {
                let PrimitiveId::Relation(candidate) = referrer else {
                    continue;
                };
                let Some(rel) = self.data.relation(candidate) else {
                    continue;
                };
                if rel.has_tag("public_transport", "stop_area") && !areas.contains(&candidate) {
                    areas.push(candidate);
                }
            }
        }
        areas
    }

    fn create_stop_facility(&mut self, id: RelationId) {
        let Some(relation) = self.data.relation(id) else {
            return;
        };
        if !(relation.has_tag("type", "public_transport")
            && relation.has_tag("public_transport", "stop_area"))
        {
            return;
        }
        let Some(coord) = self.stop_area_coord(relation) else {
            return;
        };
        let (x, y) = self.projection.lat_lon_to_east_north(coord.0, coord.1);
        let link = self.explicit_link_id(relation);
        self.store.stop_areas.insert(
            id,
            StopArea {
                relation: id,
                x,
                y,
                name: relation.tag("name").map(str::to_string),
                link,
            },
        );
        trace!(relation = id, "derived stop facility");
    }

    /// Representative coordinate: the first member node tagged as a stop
    /// position, falling back to the first member node.
    fn stop_area_coord(&self, relation: &OsmRelation) -> Option<(f64, f64)> {
        let mut fallback = None;
        for member in &relation.members {
            let PrimitiveId::Node(node_id) = member.member else {
                continue;
            };
            let Some(node) = self.data.node(node_id) else {
                continue;
            };
            if node.has_tag("public_transport", "stop_position") {
                return Some((node.lat, node.lon));
            }
            if fallback.is_none() {
                fallback = Some((node.lat, node.lon));
            }
        }
        fallback
    }

    /// A `matsim:link` role member pins the facility to the member way's
    /// last derived link.
    fn explicit_link_id(&self, relation: &OsmRelation) -> Option<LinkId> {
        for member in &relation.members {
            if member.role != rules::ROLE_MATSIM_LINK {
                continue;
            }
            let PrimitiveId::Way(way_id) = member.member else {
                continue;
            };
            if let Some(last) = self.store.links_of_way(way_id).last() {
                return Some(last.clone());
            }
        }
        None
    }
}
