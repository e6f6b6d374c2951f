//! Back-references from the derived graph to its source primitives.
//!
//! The store is the authoritative mapping between the two graphs: which
//! links a way produced, which raw way segments a link covers, and which
//! transit element a relation derived to. All mutation happens inside a
//! conversion pass; removal and insertion are paired so the store never
//! names a link the network no longer has.

use rustc_hash::FxHashMap;

use crate::dataset::{RelationId, WayId};
use crate::network::{LinkId, WaySegment};
use crate::transit::{Line, Route, StopArea};

#[derive(Default)]
pub struct ElementStore {
    pub(crate) way2links: FxHashMap<WayId, Vec<LinkId>>,
    pub(crate) link2segments: FxHashMap<LinkId, Vec<WaySegment>>,
    pub(crate) stop_areas: FxHashMap<RelationId, StopArea>,
    pub(crate) lines: FxHashMap<RelationId, Line>,
    pub(crate) routes: FxHashMap<RelationId, Route>,
}

impl ElementStore {
    pub fn new() -> Self {
        ElementStore::default()
    }

    pub fn links_of_way(&self, way: WayId) -> &[LinkId] {
        self.way2links.get(&way).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn segments_of_link(&self, link: &str) -> &[WaySegment] {
        self.link2segments
            .get(link)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stop_areas(&self) -> &FxHashMap<RelationId, StopArea> {
        &self.stop_areas
    }

    pub fn lines(&self) -> &FxHashMap<RelationId, Line> {
        &self.lines
    }

    pub fn routes(&self) -> &FxHashMap<RelationId, Route> {
        &self.routes
    }

    pub fn route(&self, relation: RelationId) -> Option<&Route> {
        self.routes.get(&relation)
    }

    /// Takes a way's link list out of the store together with the spans of
    /// every listed link. The caller removes the links from the network.
    pub(crate) fn take_way_links(&mut self, way: WayId) -> Vec<LinkId> {
        let links = self.way2links.remove(&way).unwrap_or_default();
        for link in &links {
            self.link2segments.remove(link);
        }
        links
    }

    /// Records a freshly derived link: appends it to the owning way's link
    /// list and stores its source span.
    pub(crate) fn record_link(&mut self, way: WayId, link: LinkId, segments: Vec<WaySegment>) {
        self.link2segments.insert(link.clone(), segments);
        self.way2links.entry(way).or_default().push(link);
    }

    /// Drops store entries for links that were cascade-removed with a node.
    /// The owning ways are part of the same closure and re-derive afterwards,
    /// but the store must not name removed links in the meantime.
    pub(crate) fn purge_links(&mut self, removed: &[LinkId]) {
        if removed.is_empty() {
            return;
        }
        for link in removed {
            self.link2segments.remove(link);
        }
        for links in self.way2links.values_mut() {
            links.retain(|l| !removed.contains(l));
        }
        self.way2links.retain(|_, links| !links.is_empty());
    }

    /// A route's owning line may have changed; detach it everywhere before
    /// re-attaching it to the resolved line.
    pub(crate) fn detach_route_from_lines(&mut self, route: RelationId) {
        for line in self.lines.values_mut() {
            line.remove_route(route);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_way_links_removes_spans() {
        let mut store = ElementStore::new();
        store.record_link(
            100,
            "100_0".to_string(),
            vec![WaySegment { way: 100, index: 0 }],
        );
        store.record_link(
            100,
            "100_0_r".to_string(),
            vec![WaySegment { way: 100, index: 0 }],
        );
        let links = store.take_way_links(100);
        assert_eq!(links, vec!["100_0".to_string(), "100_0_r".to_string()]);
        assert!(store.segments_of_link("100_0").is_empty());
        assert!(store.links_of_way(100).is_empty());
    }

    #[test]
    fn test_purge_links_keeps_unrelated_entries() {
        let mut store = ElementStore::new();
        store.record_link(100, "100_0".to_string(), vec![]);
        store.record_link(101, "101_0".to_string(), vec![]);
        store.purge_links(&["100_0".to_string()]);
        assert!(store.links_of_way(100).is_empty());
        assert_eq!(store.links_of_way(101), ["101_0".to_string()]);
    }
}
