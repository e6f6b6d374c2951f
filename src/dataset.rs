//! In-memory OSM source graph with referrer index and typed edit events.
//!
//! The dataset is the editor-owned side of the system: the derived network
//! only reads it and reacts to the [`EditEvent`]s its mutators return.
//! Mutators apply the change, keep the referrer index consistent and hand
//! back the event describing what happened, so a caller can forward it to
//! [`crate::model::NetworkModel::handle_event`] as an explicit message.

use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use thiserror::Error;

pub type NodeId = i64;
pub type WayId = i64;
pub type RelationId = i64;

/// Tag map with deterministic iteration order.
pub type Tags = BTreeMap<String, String>;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PrimitiveId {
    Node(NodeId),
    Way(WayId),
    Relation(RelationId),
}

#[derive(Clone, Debug)]
pub struct OsmNode {
    pub id: NodeId,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
    /// Soft-delete flag; a flagged primitive is unusable but still present.
    pub deleted: bool,
}

impl OsmNode {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tag(key) == Some(value)
    }

    pub fn is_usable(&self) -> bool {
        !self.deleted
    }
}

#[derive(Clone, Debug)]
pub struct OsmWay {
    pub id: WayId,
    /// Ordered node sequence; a node may occur more than once (loops).
    pub nodes: Vec<NodeId>,
    pub tags: Tags,
    pub deleted: bool,
}

impl OsmWay {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tag(key) == Some(value)
    }

    pub fn is_usable(&self) -> bool {
        !self.deleted
    }

    pub fn is_first_last_node(&self, node: NodeId) -> bool {
        self.nodes.first() == Some(&node) || self.nodes.last() == Some(&node)
    }
}

#[derive(Clone, Debug)]
pub struct Member {
    pub role: String,
    pub member: PrimitiveId,
}

impl Member {
    pub fn new(role: &str, member: PrimitiveId) -> Self {
        Member {
            role: role.to_string(),
            member,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OsmRelation {
    pub id: RelationId,
    pub members: Vec<Member>,
    pub tags: Tags,
    pub deleted: bool,
}

impl OsmRelation {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tag(key) == Some(value)
    }

    pub fn is_usable(&self) -> bool {
        !self.deleted
    }
}

/// Typed edit events, one per mutation kind the editor can perform.
#[derive(Clone, Debug)]
pub enum EditEvent {
    /// Dataset-wide change; the model answers with a full rebuild.
    DataChanged,
    NodeMoved { node: NodeId },
    PrimitivesAdded { primitives: Vec<PrimitiveId> },
    /// Hard removal. The primitives are already detached from the dataset
    /// when the event is processed, so their referrers are no longer
    /// queryable.
    PrimitivesRemoved { primitives: Vec<PrimitiveId> },
    RelationMembersChanged { relation: RelationId },
    TagsChanged { primitives: Vec<PrimitiveId> },
    WayNodesChanged { way: WayId },
}

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown way {0}")]
    UnknownWay(WayId),
    #[error("unknown relation {0}")]
    UnknownRelation(RelationId),
    #[error("unknown primitive {0:?}")]
    UnknownPrimitive(PrimitiveId),
    #[error("duplicate primitive {0:?}")]
    Duplicate(PrimitiveId),
}

#[derive(Default)]
pub struct Dataset {
    nodes: FxHashMap<NodeId, OsmNode>,
    ways: FxHashMap<WayId, OsmWay>,
    relations: FxHashMap<RelationId, OsmRelation>,
    /// Back-reference index: primitive → primitives that reference it.
    referrers: FxHashMap<PrimitiveId, FxHashSet<PrimitiveId>>,
}

impl Dataset {
    pub fn new() -> Self {
        Dataset::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&OsmNode> {
        self.nodes.get(&id)
    }

    pub fn way(&self, id: WayId) -> Option<&OsmWay> {
        self.ways.get(&id)
    }

    pub fn relation(&self, id: RelationId) -> Option<&OsmRelation> {
        self.relations.get(&id)
    }

    pub fn contains(&self, primitive: PrimitiveId) -> bool {
        match primitive {
            PrimitiveId::Node(id) => self.nodes.contains_key(&id),
            PrimitiveId::Way(id) => self.ways.contains_key(&id),
            PrimitiveId::Relation(id) => self.relations.contains_key(&id),
        }
    }

    /// Referrers of a primitive, sorted for deterministic traversal order.
    pub fn referrers(&self, primitive: PrimitiveId) -> Vec<PrimitiveId> {
        let mut out: Vec<PrimitiveId> = self
            .referrers
            .get(&primitive)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn way_ids(&self) -> Vec<WayId> {
        let mut ids: Vec<WayId> = self.ways.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn relation_ids(&self) -> Vec<RelationId> {
        let mut ids: Vec<RelationId> = self.relations.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn add_node(
        &mut self,
        id: NodeId,
        lat: f64,
        lon: f64,
        tags: Tags,
    ) -> Result<EditEvent, DatasetError> {
        if self.nodes.contains_key(&id) {
            return Err(DatasetError::Duplicate(PrimitiveId::Node(id)));
        }
        self.nodes.insert(
            id,
            OsmNode {
                id,
                lat,
                lon,
                tags,
                deleted: false,
            },
        );
        Ok(EditEvent::PrimitivesAdded {
            primitives: vec![PrimitiveId::Node(id)],
        })
    }

    pub fn add_way(
        &mut self,
        id: WayId,
        nodes: Vec<NodeId>,
        tags: Tags,
    ) -> Result<EditEvent, DatasetError> {
        if self.ways.contains_key(&id) {
            return Err(DatasetError::Duplicate(PrimitiveId::Way(id)));
        }
        for node in &nodes {
            if !self.nodes.contains_key(node) {
                return Err(DatasetError::UnknownNode(*node));
            }
        }
        for node in &nodes {
            self.referrers
                .entry(PrimitiveId::Node(*node))
                .or_default()
                .insert(PrimitiveId::Way(id));
        }
        self.ways.insert(
            id,
            OsmWay {
                id,
                nodes,
                tags,
                deleted: false,
            },
        );
        Ok(EditEvent::PrimitivesAdded {
            primitives: vec![PrimitiveId::Way(id)],
        })
    }

    pub fn add_relation(
        &mut self,
        id: RelationId,
        members: Vec<Member>,
        tags: Tags,
    ) -> Result<EditEvent, DatasetError> {
        if self.relations.contains_key(&id) {
            return Err(DatasetError::Duplicate(PrimitiveId::Relation(id)));
        }
        for member in &members {
            if !self.contains(member.member) {
                return Err(DatasetError::UnknownPrimitive(member.member));
            }
        }
        for member in &members {
            self.referrers
                .entry(member.member)
                .or_default()
                .insert(PrimitiveId::Relation(id));
        }
        self.relations.insert(
            id,
            OsmRelation {
                id,
                members,
                tags,
                deleted: false,
            },
        );
        Ok(EditEvent::PrimitivesAdded {
            primitives: vec![PrimitiveId::Relation(id)],
        })
    }

    pub fn move_node(&mut self, id: NodeId, lat: f64, lon: f64) -> Result<EditEvent, DatasetError> {
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(DatasetError::UnknownNode(id))?;
        node.lat = lat;
        node.lon = lon;
        Ok(EditEvent::NodeMoved { node: id })
    }

    pub fn set_tags(
        &mut self,
        primitive: PrimitiveId,
        tags: Tags,
    ) -> Result<EditEvent, DatasetError> {
        match primitive {
            PrimitiveId::Node(id) => {
                self.nodes
                    .get_mut(&id)
                    .ok_or(DatasetError::UnknownNode(id))?
                    .tags = tags;
            }
            PrimitiveId::Way(id) => {
                self.ways.get_mut(&id).ok_or(DatasetError::UnknownWay(id))?.tags = tags;
            }
            PrimitiveId::Relation(id) => {
                self.relations
                    .get_mut(&id)
                    .ok_or(DatasetError::UnknownRelation(id))?
                    .tags = tags;
            }
        }
        Ok(EditEvent::TagsChanged {
            primitives: vec![primitive],
        })
    }

    /// Flips the soft-delete flag. The impact on the derived graph is the
    /// same as a tag change: the primitive and its dependents re-derive.
    pub fn set_deleted(
        &mut self,
        primitive: PrimitiveId,
        deleted: bool,
    ) -> Result<EditEvent, DatasetError> {
        match primitive {
            PrimitiveId::Node(id) => {
                self.nodes
                    .get_mut(&id)
                    .ok_or(DatasetError::UnknownNode(id))?
                    .deleted = deleted;
            }
            PrimitiveId::Way(id) => {
                self.ways
                    .get_mut(&id)
                    .ok_or(DatasetError::UnknownWay(id))?
                    .deleted = deleted;
            }
            PrimitiveId::Relation(id) => {
                self.relations
                    .get_mut(&id)
                    .ok_or(DatasetError::UnknownRelation(id))?
                    .deleted = deleted;
            }
        }
        Ok(EditEvent::TagsChanged {
            primitives: vec![primitive],
        })
    }

    pub fn set_way_nodes(
        &mut self,
        id: WayId,
        nodes: Vec<NodeId>,
    ) -> Result<EditEvent, DatasetError> {
        if !self.ways.contains_key(&id) {
            return Err(DatasetError::UnknownWay(id));
        }
        for node in &nodes {
            if !self.nodes.contains_key(node) {
                return Err(DatasetError::UnknownNode(*node));
            }
        }
        let old = std::mem::take(&mut self.ways.get_mut(&id).unwrap().nodes);
        for node in old {
            if let Some(set) = self.referrers.get_mut(&PrimitiveId::Node(node)) {
                set.remove(&PrimitiveId::Way(id));
            }
        }
        for node in &nodes {
            self.referrers
                .entry(PrimitiveId::Node(*node))
                .or_default()
                .insert(PrimitiveId::Way(id));
        }
        self.ways.get_mut(&id).unwrap().nodes = nodes;
        Ok(EditEvent::WayNodesChanged { way: id })
    }

    pub fn set_relation_members(
        &mut self,
        id: RelationId,
        members: Vec<Member>,
    ) -> Result<EditEvent, DatasetError> {
        if !self.relations.contains_key(&id) {
            return Err(DatasetError::UnknownRelation(id));
        }
        for member in &members {
            if !self.contains(member.member) {
                return Err(DatasetError::UnknownPrimitive(member.member));
            }
        }
        let old = std::mem::take(&mut self.relations.get_mut(&id).unwrap().members);
        for member in old {
            if let Some(set) = self.referrers.get_mut(&member.member) {
                set.remove(&PrimitiveId::Relation(id));
            }
        }
        for member in &members {
            self.referrers
                .entry(member.member)
                .or_default()
                .insert(PrimitiveId::Relation(id));
        }
        self.relations.get_mut(&id).unwrap().members = members;
        Ok(EditEvent::RelationMembersChanged { relation: id })
    }

    /// Hard-removes primitives. Referring ways and relations that survive the
    /// removal are stripped of the removed members first, the way an editor
    /// deletes a node that is still part of a way; the returned event batch
    /// carries those strips before the final removal event.
    pub fn remove(&mut self, ids: &[PrimitiveId]) -> Result<Vec<EditEvent>, DatasetError> {
        for id in ids {
            if !self.contains(*id) {
                return Err(DatasetError::UnknownPrimitive(*id));
            }
        }
        let removing: FxHashSet<PrimitiveId> = ids.iter().copied().collect();
        let mut events = Vec::new();

        let mut touched_ways: Vec<WayId> = Vec::new();
        let mut touched_relations: Vec<RelationId> = Vec::new();
        for id in ids {
            for referrer in self.referrers(*id) {
                if removing.contains(&referrer) {
                    continue;
                }
                match referrer {
                    PrimitiveId::Way(way) => {
                        let w = self.ways.get_mut(&way).expect("indexed way exists");
                        w.nodes.retain(|n| PrimitiveId::Node(*n) != *id);
                        if !touched_ways.contains(&way) {
                            touched_ways.push(way);
                        }
                    }
                    PrimitiveId::Relation(relation) => {
                        let r = self
                            .relations
                            .get_mut(&relation)
                            .expect("indexed relation exists");
                        r.members.retain(|m| m.member != *id);
                        if !touched_relations.contains(&relation) {
                            touched_relations.push(relation);
                        }
                    }
                    PrimitiveId::Node(_) => {}
                }
            }
        }

        for id in ids {
            // Deregister the removed primitive's own outgoing references.
            match *id {
                PrimitiveId::Node(_) => {}
                PrimitiveId::Way(way) => {
                    let nodes = self.ways.get(&way).map(|w| w.nodes.clone()).unwrap_or_default();
                    for node in nodes {
                        if let Some(set) = self.referrers.get_mut(&PrimitiveId::Node(node)) {
                            set.remove(id);
                        }
                    }
                }
                PrimitiveId::Relation(relation) => {
                    let members = self
                        .relations
                        .get(&relation)
                        .map(|r| r.members.clone())
                        .unwrap_or_default();
                    for member in members {
                        if let Some(set) = self.referrers.get_mut(&member.member) {
                            set.remove(id);
                        }
                    }
                }
            }
            self.referrers.remove(id);
            match *id {
                PrimitiveId::Node(n) => {
                    self.nodes.remove(&n);
                }
                PrimitiveId::Way(w) => {
                    self.ways.remove(&w);
                }
                PrimitiveId::Relation(r) => {
                    self.relations.remove(&r);
                }
            }
        }

        touched_ways.sort_unstable();
        touched_relations.sort_unstable();
        for way in touched_ways {
            events.push(EditEvent::WayNodesChanged { way });
        }
        for relation in touched_relations {
            events.push(EditEvent::RelationMembersChanged { relation });
        }
        events.push(EditEvent::PrimitivesRemoved {
            primitives: ids.to_vec(),
        });
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Tags {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn small_dataset() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_node(1, 52.0, 13.0, Tags::new()).unwrap();
        ds.add_node(2, 52.0, 13.1, Tags::new()).unwrap();
        ds.add_way(100, vec![1, 2], tags(&[("highway", "residential")]))
            .unwrap();
        ds
    }

    #[test]
    fn test_way_registers_node_referrers() {
        let ds = small_dataset();
        assert_eq!(
            ds.referrers(PrimitiveId::Node(1)),
            vec![PrimitiveId::Way(100)]
        );
    }

    #[test]
    fn test_way_with_unknown_node_is_rejected() {
        let mut ds = small_dataset();
        let err = ds.add_way(101, vec![1, 99], Tags::new()).unwrap_err();
        assert!(matches!(err, DatasetError::UnknownNode(99)));
        assert!(ds.way(101).is_none());
    }

    #[test]
    fn test_set_way_nodes_reindexes_referrers() {
        let mut ds = small_dataset();
        ds.add_node(3, 52.0, 13.2, Tags::new()).unwrap();
        ds.set_way_nodes(100, vec![2, 3]).unwrap();
        assert!(ds.referrers(PrimitiveId::Node(1)).is_empty());
        assert_eq!(
            ds.referrers(PrimitiveId::Node(3)),
            vec![PrimitiveId::Way(100)]
        );
    }

    #[test]
    fn test_remove_node_strips_it_from_ways() {
        let mut ds = small_dataset();
        let events = ds.remove(&[PrimitiveId::Node(2)]).unwrap();
        assert!(ds.node(2).is_none());
        assert_eq!(ds.way(100).unwrap().nodes, vec![1]);
        assert!(matches!(events[0], EditEvent::WayNodesChanged { way: 100 }));
        assert!(matches!(events[1], EditEvent::PrimitivesRemoved { .. }));
    }

    #[test]
    fn test_remove_way_strips_relation_members() {
        let mut ds = small_dataset();
        ds.add_relation(
            200,
            vec![Member::new("", PrimitiveId::Way(100))],
            tags(&[("type", "route"), ("route", "bus")]),
        )
        .unwrap();
        let events = ds.remove(&[PrimitiveId::Way(100)]).unwrap();
        assert!(ds.relation(200).unwrap().members.is_empty());
        assert!(ds.referrers(PrimitiveId::Node(1)).is_empty());
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_remove_batch_skips_strips_between_removed() {
        let mut ds = small_dataset();
        let events = ds
            .remove(&[PrimitiveId::Way(100), PrimitiveId::Node(1), PrimitiveId::Node(2)])
            .unwrap();
        // No WayNodesChanged: the way is going away in the same batch.
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EditEvent::PrimitivesRemoved { .. }));
    }
}
