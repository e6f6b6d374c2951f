//! Incremental MATSim network derivation from a live-edited OSM graph.
//!
//! The dataset is mutated interactively; every edit event is propagated to
//! the derived network without a full recomputation:
//!
//! 1. [`propagate`] computes the closure of source primitives whose derived
//!    output may have changed,
//! 2. [`convert`] re-derives each affected primitive exactly once (stale
//!    derived elements are removed first),
//! 3. [`store`] keeps the back-references from derived links to their source
//!    way segments consistent,
//! 4. [`model::NetworkModel`] fires a single coalesced change notification
//!    per processed event batch.

pub mod config;
pub mod convert;
pub mod dataset;
pub mod geo;
pub mod model;
pub mod network;
pub mod propagate;
pub mod rules;
pub mod store;
pub mod transit;

pub use config::Settings;
pub use dataset::{Dataset, DatasetError, EditEvent, Member, OsmNode, OsmRelation, OsmWay, PrimitiveId};
pub use model::NetworkModel;
pub use network::{Network, NetworkLink, NetworkNode, WaySegment};
