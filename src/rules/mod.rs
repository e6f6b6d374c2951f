//! Tag semantics turning OSM ways and nodes into MATSim link/node attributes.
//!
//! These are pure functions: a way whose attributes cannot be determined
//! (missing class, unparsable explicit override) yields `None` and therefore
//! no links, never an error.

mod defaults;

pub use defaults::{way_defaults, WayDefaults};

use std::collections::BTreeSet;

use crate::config::Settings;
use crate::dataset::{OsmNode, OsmWay, WayId};
use crate::network::LinkId;

pub const TAG_HIGHWAY: &str = "highway";
pub const TAG_RAILWAY: &str = "railway";

/// Explicit override tags, matching the MATSim editor conventions.
pub const MATSIM_ID: &str = "matsim:id";
pub const MATSIM_FREESPEED: &str = "matsim:freespeed";
pub const MATSIM_CAPACITY: &str = "matsim:capacity";
pub const MATSIM_PERMLANES: &str = "matsim:permlanes";
pub const MATSIM_MODES: &str = "matsim:modes";
pub const MATSIM_LENGTH: &str = "matsim:length";

/// Relation member role pinning a stop facility to a link.
pub const ROLE_MATSIM_LINK: &str = "matsim:link";

/// Suffix distinguishing backward-direction link ids from forward ones.
pub const REVERSE_SUFFIX: &str = "_r";

/// Classifies a way by its `highway`/`railway` tag, honouring the hierarchy
/// filter. `None` means the way is not convertible.
pub fn way_type<'a>(way: &'a OsmWay, settings: &Settings) -> Option<&'a str> {
    let way_type = way.tag(TAG_HIGHWAY).or_else(|| way.tag(TAG_RAILWAY))?;
    let defaults = way_defaults(way_type)?;
    if settings.filter_active && defaults.hierarchy > settings.filter_hierarchy {
        return None;
    }
    Some(way_type)
}

/// A way that classifies to a known type is eligible for conversion.
pub fn is_matsim_way(way: &OsmWay, settings: &Settings) -> bool {
    way_type(way, settings).is_some()
}

pub fn is_forward(way: &OsmWay, _defaults: &WayDefaults) -> bool {
    !matches!(way.tag("oneway"), Some("-1") | Some("reverse"))
}

pub fn is_backward(way: &OsmWay, defaults: &WayDefaults) -> bool {
    match way.tag("oneway") {
        Some("yes") | Some("true") | Some("1") => false,
        Some("-1") | Some("reverse") => true,
        Some("no") | Some("false") | Some("0") => true,
        _ => !(defaults.oneway || way.has_tag("junction", "roundabout")),
    }
}

/// Free-flow speed in m/s. An explicit override that fails to parse leaves
/// the speed undetermined, which suppresses link creation for the way.
pub fn freespeed(way: &OsmWay, defaults: &WayDefaults) -> Option<f64> {
    if let Some(tag) = way.tag(MATSIM_FREESPEED) {
        return tag.parse::<f64>().ok();
    }
    if let Some(tag) = way.tag("maxspeed") {
        return tag.parse::<f64>().ok().map(|kmh| kmh / 3.6);
    }
    Some(defaults.freespeed * defaults.freespeed_factor)
}

/// Lanes per direction. A total `lanes` tag is split between the two
/// directions of a bidirectional way.
pub fn lanes_per_direction(
    way: &OsmWay,
    defaults: &WayDefaults,
    forward: bool,
    backward: bool,
) -> Option<f64> {
    if let Some(tag) = way.tag(MATSIM_PERMLANES) {
        return tag.parse::<f64>().ok();
    }
    if let Some(tag) = way.tag("lanes") {
        let total = tag.parse::<f64>().ok()?;
        return if forward && backward {
            Some((total / 2.0).max(1.0))
        } else {
            Some(total)
        };
    }
    Some(defaults.lanes_per_direction)
}

/// Flow capacity in vehicles per hour, derived from the lane count unless
/// explicitly overridden.
pub fn capacity(way: &OsmWay, defaults: &WayDefaults, lanes: Option<f64>) -> Option<f64> {
    if let Some(tag) = way.tag(MATSIM_CAPACITY) {
        return tag.parse::<f64>().ok();
    }
    lanes.map(|lanes| lanes * defaults.lane_capacity)
}

/// Allowed travel modes; an explicit comma-separated override replaces the
/// class default.
pub fn modes(way: &OsmWay, defaults: &WayDefaults) -> Option<BTreeSet<String>> {
    if let Some(tag) = way.tag(MATSIM_MODES) {
        let modes: BTreeSet<String> = tag
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        return if modes.is_empty() { None } else { Some(modes) };
    }
    let mut modes = BTreeSet::new();
    modes.insert(defaults.mode.to_string());
    Some(modes)
}

/// Explicit total length override in metres, if present and parsable.
pub fn tagged_length(way: &OsmWay) -> Option<f64> {
    way.tag(MATSIM_LENGTH).and_then(|tag| tag.parse::<f64>().ok())
}

pub fn link_id(way: WayId, increment: u64, reverse: bool) -> LinkId {
    if reverse {
        format!("{}_{}{}", way, increment, REVERSE_SUFFIX)
    } else {
        format!("{}_{}", way, increment)
    }
}

pub fn link_orig_id(way: &OsmWay, link_id: &str, reverse: bool) -> String {
    match way.tag(MATSIM_ID) {
        Some(id) if reverse => format!("{}{}", id, REVERSE_SUFFIX),
        Some(id) => id.to_string(),
        None => link_id.to_string(),
    }
}

pub fn node_orig_id(node: &OsmNode) -> String {
    match node.tag(MATSIM_ID) {
        Some(id) => id.to_string(),
        None => node.id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Tags;

    fn way(tag_pairs: &[(&str, &str)]) -> OsmWay {
        let tags: Tags = tag_pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OsmWay {
            id: 1,
            nodes: vec![],
            tags,
            deleted: false,
        }
    }

    #[test]
    fn test_way_type_requires_known_class() {
        let settings = Settings::default();
        assert_eq!(way_type(&way(&[("highway", "primary")]), &settings), Some("primary"));
        assert_eq!(way_type(&way(&[("railway", "tram")]), &settings), Some("tram"));
        assert_eq!(way_type(&way(&[("highway", "footway")]), &settings), None);
        assert_eq!(way_type(&way(&[("name", "x")]), &settings), None);
    }

    #[test]
    fn test_hierarchy_filter_drops_minor_classes() {
        let settings = Settings {
            filter_active: true,
            filter_hierarchy: 3,
            ..Settings::default()
        };
        assert!(is_matsim_way(&way(&[("highway", "primary")]), &settings));
        assert!(!is_matsim_way(&way(&[("highway", "residential")]), &settings));
    }

    #[test]
    fn test_oneway_directions() {
        let d = way_defaults("secondary").unwrap();
        let both = way(&[("highway", "secondary")]);
        assert!(is_forward(&both, &d) && is_backward(&both, &d));

        let fwd = way(&[("highway", "secondary"), ("oneway", "yes")]);
        assert!(is_forward(&fwd, &d) && !is_backward(&fwd, &d));

        let rev = way(&[("highway", "secondary"), ("oneway", "-1")]);
        assert!(!is_forward(&rev, &d) && is_backward(&rev, &d));

        let roundabout = way(&[("highway", "secondary"), ("junction", "roundabout")]);
        assert!(is_forward(&roundabout, &d) && !is_backward(&roundabout, &d));
    }

    #[test]
    fn test_oneway_no_overrides_class_default() {
        let d = way_defaults("motorway").unwrap();
        let implicit = way(&[("highway", "motorway")]);
        assert!(!is_backward(&implicit, &d));
        let explicit = way(&[("highway", "motorway"), ("oneway", "no")]);
        assert!(is_backward(&explicit, &d));
    }

    #[test]
    fn test_freespeed_sources() {
        let d = way_defaults("residential").unwrap();
        let plain = way(&[("highway", "residential")]);
        assert!((freespeed(&plain, &d).unwrap() - (30.0 / 3.6) * 0.9).abs() < 1e-9);

        let signed = way(&[("highway", "residential"), ("maxspeed", "50")]);
        assert!((freespeed(&signed, &d).unwrap() - 50.0 / 3.6).abs() < 1e-9);

        let explicit = way(&[("highway", "residential"), ("matsim:freespeed", "8.4")]);
        assert_eq!(freespeed(&explicit, &d), Some(8.4));

        let broken = way(&[("highway", "residential"), ("matsim:freespeed", "fast")]);
        assert_eq!(freespeed(&broken, &d), None);
    }

    #[test]
    fn test_lanes_tag_split_between_directions() {
        let d = way_defaults("secondary").unwrap();
        let w = way(&[("highway", "secondary"), ("lanes", "4")]);
        assert_eq!(lanes_per_direction(&w, &d, true, true), Some(2.0));
        assert_eq!(lanes_per_direction(&w, &d, true, false), Some(4.0));
    }

    #[test]
    fn test_capacity_scales_with_lanes() {
        let d = way_defaults("secondary").unwrap();
        let w = way(&[("highway", "secondary")]);
        assert_eq!(capacity(&w, &d, Some(2.0)), Some(2000.0));
        let pinned = way(&[("highway", "secondary"), ("matsim:capacity", "1234")]);
        assert_eq!(capacity(&pinned, &d, Some(2.0)), Some(1234.0));
    }

    #[test]
    fn test_modes_override() {
        let d = way_defaults("rail").unwrap();
        let w = way(&[("railway", "rail")]);
        let default_modes = modes(&w, &d).unwrap();
        assert!(default_modes.contains("train"));

        let multi = way(&[("railway", "rail"), ("matsim:modes", "train, pt")]);
        let m = modes(&multi, &d).unwrap();
        assert_eq!(m.len(), 2);
        assert!(m.contains("pt"));
    }

    #[test]
    fn test_link_ids() {
        assert_eq!(link_id(100, 0, false), "100_0");
        assert_eq!(link_id(100, 3, true), "100_3_r");
    }
}
