//! Derived transit elements: stop facilities, lines and routes.

use crate::dataset::RelationId;
use crate::network::LinkId;

/// Stop facility derived from a `public_transport=stop_area` relation.
#[derive(Clone, Debug)]
pub struct StopArea {
    pub relation: RelationId,
    /// Planar coordinate of the representative stop position.
    pub x: f64,
    pub y: f64,
    pub name: Option<String>,
    /// Link the facility is pinned to, from a `matsim:link` role member.
    pub link: Option<LinkId>,
}

/// Transit line derived from a `type=route_master` relation. Owns its route
/// relations by id.
#[derive(Clone, Debug)]
pub struct Line {
    pub relation: RelationId,
    pub name: Option<String>,
    pub routes: Vec<RelationId>,
}

impl Line {
    pub fn new(relation: RelationId, name: Option<String>) -> Self {
        Line {
            relation,
            name,
            routes: Vec::new(),
        }
    }

    pub fn add_route(&mut self, route: RelationId) {
        if !self.routes.contains(&route) {
            self.routes.push(route);
        }
    }

    pub fn remove_route(&mut self, route: RelationId) {
        self.routes.retain(|r| *r != route);
    }
}

/// Transit route derived from a `type=route` relation.
///
/// Routes are soft-deleted rather than dropped when their relation stops
/// qualifying, so the keyed entry (and with it downstream identity) survives
/// tag churn.
#[derive(Clone, Debug)]
pub struct Route {
    pub relation: RelationId,
    /// Value of the `route` tag, e.g. `bus` or `tram`.
    pub mode: String,
    /// Ordered link path; `None` when no member contributed links.
    pub link_ids: Option<Vec<LinkId>>,
    /// Stop areas referenced by the route's stop/platform members.
    pub stop_areas: Vec<RelationId>,
    pub deleted: bool,
}
