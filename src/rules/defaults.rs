//! Per-class conversion defaults for highway and railway ways.

/// Network attributes assumed for a way class unless overridden by tags.
#[derive(Clone, Copy, Debug)]
pub struct WayDefaults {
    /// Hierarchy layer, 1 = motorway. Used by the hierarchy filter.
    pub hierarchy: u8,
    pub lanes_per_direction: f64,
    /// Free-flow speed in m/s.
    pub freespeed: f64,
    /// Scales the default freespeed; urban classes flow below the limit.
    pub freespeed_factor: f64,
    /// Flow capacity per lane in vehicles per hour.
    pub lane_capacity: f64,
    pub oneway: bool,
    pub mode: &'static str,
}

const fn kmh(v: f64) -> f64 {
    v / 3.6
}

/// Defaults table keyed by the `highway`/`railway` tag value.
pub fn way_defaults(way_type: &str) -> Option<WayDefaults> {
    let d = |hierarchy, lanes_per_direction, freespeed, freespeed_factor, lane_capacity, oneway, mode| {
        WayDefaults {
            hierarchy,
            lanes_per_direction,
            freespeed,
            freespeed_factor,
            lane_capacity,
            oneway,
            mode,
        }
    };
    match way_type {
        // Motorways
        "motorway" => Some(d(1, 2.0, kmh(120.0), 1.0, 2000.0, true, "car")),
        "motorway_link" => Some(d(2, 1.0, kmh(80.0), 1.0, 1500.0, true, "car")),

        // Trunk roads
        "trunk" => Some(d(2, 1.0, kmh(80.0), 1.0, 2000.0, false, "car")),
        "trunk_link" => Some(d(2, 1.0, kmh(50.0), 1.0, 1500.0, false, "car")),

        // Primary roads
        "primary" => Some(d(3, 1.0, kmh(80.0), 1.0, 1500.0, false, "car")),
        "primary_link" => Some(d(3, 1.0, kmh(60.0), 1.0, 1500.0, false, "car")),

        // Secondary and tertiary roads
        "secondary" => Some(d(4, 1.0, kmh(60.0), 1.0, 1000.0, false, "car")),
        "tertiary" => Some(d(5, 1.0, kmh(45.0), 0.9, 600.0, false, "car")),

        // Minor roads
        "minor" | "unclassified" => Some(d(6, 1.0, kmh(45.0), 0.9, 600.0, false, "car")),
        "residential" => Some(d(6, 1.0, kmh(30.0), 0.9, 600.0, false, "car")),
        "living_street" => Some(d(6, 1.0, kmh(15.0), 1.0, 300.0, false, "car")),

        // Railways
        "rail" => Some(d(2, 1.0, kmh(160.0), 1.0, 9999.0, false, "train")),
        "light_rail" => Some(d(3, 1.0, kmh(80.0), 1.0, 9999.0, false, "train")),
        "tram" => Some(d(4, 1.0, kmh(50.0), 1.0, 9999.0, false, "tram")),
        "subway" => Some(d(3, 1.0, kmh(80.0), 1.0, 9999.0, false, "subway")),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motorway_is_oneway_by_default() {
        let d = way_defaults("motorway").unwrap();
        assert!(d.oneway);
        assert_eq!(d.lanes_per_direction, 2.0);
    }

    #[test]
    fn test_unknown_class_has_no_defaults() {
        assert!(way_defaults("footway").is_none());
        assert!(way_defaults("bus_stop").is_none());
    }

    #[test]
    fn test_speeds_are_metres_per_second() {
        let d = way_defaults("residential").unwrap();
        assert!((d.freespeed - 30.0 / 3.6).abs() < 1e-9);
    }
}
