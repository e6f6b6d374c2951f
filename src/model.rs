//! Orchestrator tying dataset edit events to the derived network.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::Settings;
use crate::convert::ConvertPass;
use crate::dataset::{Dataset, EditEvent, RelationId, WayId};
use crate::geo::Projection;
use crate::network::{LinkId, Network, WaySegment};
use crate::propagate::{self, Closure};
use crate::store::ElementStore;
use crate::transit::{Line, Route, StopArea};

/// Handle returned by [`NetworkModel::subscribe`], used to unsubscribe.
pub type ListenerId = u64;

/// Owns the derived network, the element store and the listener registry.
///
/// Events are processed synchronously and to completion: a propagation pass
/// is a critical section from "closure computed" to "all affected primitives
/// re-derived", after which listeners are notified exactly once per batch.
pub struct NetworkModel {
    network: Network,
    store: ElementStore,
    settings: Settings,
    projection: Box<dyn Projection>,
    listeners: FxHashMap<ListenerId, Box<dyn FnMut()>>,
    next_listener: ListenerId,
}

impl NetworkModel {
    pub fn new(settings: Settings, projection: Box<dyn Projection>) -> Self {
        NetworkModel {
            network: Network::new(),
            store: ElementStore::new(),
            settings,
            projection,
            listeners: FxHashMap::default(),
            next_listener: 0,
        }
    }

    /// Processes a single edit event; see [`Self::handle_events`].
    pub fn handle_event(&mut self, data: &Dataset, event: &EditEvent) {
        self.handle_events(data, std::slice::from_ref(event));
    }

    /// Processes a batch of edit events: computes the combined impact
    /// closure, re-derives each affected primitive once, then fires one
    /// coalesced change notification. An empty batch is a no-op.
    pub fn handle_events(&mut self, data: &Dataset, events: &[EditEvent]) {
        if events.is_empty() {
            return;
        }
        let closure = propagate::closure_for_events(
            data,
            &self.store,
            &self.network,
            &self.settings,
            events,
        );
        debug!(
            events = events.len(),
            affected = closure.len(),
            "propagating edit batch"
        );
        self.run_pass(data, &closure);
        self.fire_changed();
    }

    /// Full rebuild: re-derives every primitive in the dataset. The only
    /// pass that runs without a prior closure computation.
    pub fn visit_all(&mut self, data: &Dataset) {
        let closure = propagate::full_closure(data);
        debug!(affected = closure.len(), "full rebuild");
        self.run_pass(data, &closure);
        self.fire_changed();
    }

    fn run_pass(&mut self, data: &Dataset, closure: &Closure) {
        let mut pass = ConvertPass::new(
            data,
            &self.settings,
            self.projection.as_ref(),
            &mut self.network,
            &mut self.store,
        );
        pass.run(closure);
    }

    /// Replaces the settings snapshot and rebuilds, the way the editor
    /// reacts to a preference change.
    pub fn set_settings(&mut self, data: &Dataset, settings: Settings) {
        self.settings = settings;
        self.visit_all(data);
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether the caller should hand the rebuilt network to an external
    /// cleaning step (dangling-subgraph removal stays outside this crate).
    pub fn wants_external_clean(&self) -> bool {
        self.settings.clean_network && !self.settings.transit_support
    }

    pub fn subscribe(&mut self, listener: impl FnMut() + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    fn fire_changed(&mut self) {
        for listener in self.listeners.values_mut() {
            listener();
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn way_links(&self, way: WayId) -> &[LinkId] {
        self.store.links_of_way(way)
    }

    pub fn link_segments(&self, link: &str) -> &[WaySegment] {
        self.store.segments_of_link(link)
    }

    pub fn stop_areas(&self) -> &FxHashMap<RelationId, StopArea> {
        self.store.stop_areas()
    }

    pub fn lines(&self) -> &FxHashMap<RelationId, Line> {
        self.store.lines()
    }

    pub fn routes(&self) -> &FxHashMap<RelationId, Route> {
        self.store.routes()
    }

    /// The current transit route derived from a relation, if any.
    pub fn route(&self, relation: RelationId) -> Option<&Route> {
        self.store.route(relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Tags;
    use crate::geo::Identity;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_listeners_fire_once_per_batch() {
        let mut ds = Dataset::new();
        let e1 = ds.add_node(1, 52.0, 13.0, Tags::new()).unwrap();
        let e2 = ds.add_node(2, 52.0, 13.1, Tags::new()).unwrap();

        let mut model = NetworkModel::new(Settings::default(), Box::new(Identity));
        let count = Rc::new(Cell::new(0u32));
        let seen = Rc::clone(&count);
        let id = model.subscribe(move || seen.set(seen.get() + 1));

        model.handle_events(&ds, &[e1, e2]);
        assert_eq!(count.get(), 1);

        model.handle_events(&ds, &[]);
        assert_eq!(count.get(), 1, "empty batch is a no-op");

        assert!(model.unsubscribe(id));
        assert!(!model.unsubscribe(id));
        let e3 = ds.move_node(1, 52.1, 13.0).unwrap();
        model.handle_event(&ds, &e3);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_wants_external_clean_requires_transit_off() {
        let settings = Settings {
            clean_network: true,
            transit_support: false,
            ..Settings::default()
        };
        let model = NetworkModel::new(settings, Box::new(Identity));
        assert!(model.wants_external_clean());

        let settings = Settings {
            clean_network: true,
            ..Settings::default()
        };
        let model = NetworkModel::new(settings, Box::new(Identity));
        assert!(!model.wants_external_clean());
    }
}
