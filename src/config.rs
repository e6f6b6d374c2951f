//! Conversion settings snapshot.

use serde::{Deserialize, Serialize};

/// Editor preference snapshot passed into every propagation pass.
///
/// The model holds the snapshot by value so a pass's behaviour is fully
/// determined by its inputs; replacing it via
/// [`crate::model::NetworkModel::set_settings`] triggers a full rebuild, the
/// same way the editor reacts to a preference change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Derive transit lines, routes and stop facilities from relations.
    pub transit_support: bool,
    /// Keep every way point as a network node instead of only endpoints,
    /// junctions and stop positions.
    pub keep_paths: bool,
    /// Only convert primitives carrying an explicit `matsim:id` tag.
    pub transit_lite: bool,
    /// Restrict conversion to way classes within the hierarchy filter.
    pub filter_active: bool,
    /// Deepest hierarchy layer still converted when `filter_active` is set.
    pub filter_hierarchy: u8,
    /// Ask the downstream consumer to drop disconnected subgraphs after a
    /// rebuild. The cleaning step itself is external to this crate.
    pub clean_network: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            transit_support: true,
            keep_paths: false,
            transit_lite: false,
            filter_active: false,
            filter_hierarchy: 6,
            clean_network: false,
        }
    }
}
