//! Great-circle distances and the geographic → planar projection seam.

use geo::HaversineDistance;
use geo::Point;

pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let p1 = Point::new(lon1, lat1);
    let p2 = Point::new(lon2, lat2);
    p1.haversine_distance(&p2)
}

/// Projection from geographic (lat/lon) to planar (east/north) coordinates.
///
/// The editor supplies the projection currently in use; derived node
/// coordinates are recomputed from it on every conversion, so switching the
/// projection only requires a full rebuild.
pub trait Projection {
    fn lat_lon_to_east_north(&self, lat: f64, lon: f64) -> (f64, f64);
}

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Spherical-Mercator projection (EPSG:3857).
pub struct SphericalMercator;

impl Projection for SphericalMercator {
    fn lat_lon_to_east_north(&self, lat: f64, lon: f64) -> (f64, f64) {
        let x = EARTH_RADIUS_M * lon.to_radians();
        let y = EARTH_RADIUS_M
            * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
                .tan()
                .ln();
        (x, y)
    }
}

/// Passes lon/lat through unchanged. Keeps test coordinates readable.
pub struct Identity;

impl Projection for Identity {
    fn lat_lon_to_east_north(&self, lat: f64, lon: f64) -> (f64, f64) {
        (lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // One degree of latitude is ~111.2 km
        let d = haversine_distance(52.0, 13.0, 53.0, 13.0);
        assert!((d - 111_195.0).abs() < 200.0, "got {}", d);
    }

    #[test]
    fn test_haversine_zero() {
        assert_eq!(haversine_distance(52.5, 13.4, 52.5, 13.4), 0.0);
    }

    #[test]
    fn test_mercator_equator_origin() {
        let (x, y) = SphericalMercator.lat_lon_to_east_north(0.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_mercator_monotonic_north() {
        let (_, y1) = SphericalMercator.lat_lon_to_east_north(10.0, 0.0);
        let (_, y2) = SphericalMercator.lat_lon_to_east_north(20.0, 0.0);
        assert!(y2 > y1);
    }
}
