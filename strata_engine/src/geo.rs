// Copyright 2025 the Strata Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geographic value types and the projections an engine may use internally.
//!
//! Everything that crosses the engine boundary upward is expressed as a
//! [`GeoPoint`] in longitude/latitude degrees. Engines work in projected
//! units ([`kurbo::Point`]) determined by the [`Projection`] of their view.

use core::f64::consts::PI;

use kurbo::{Point, Rect};

/// Radius of the spherical Mercator earth model, in meters.
const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of spherical Mercator, in degrees.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Number of pixels along one edge of a tile at zoom `0`.
const TILE_SIZE: f64 = 256.0;

/// A geographic coordinate in degrees.
///
/// This is the canonical coordinate at the boundary of the scene layer.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    /// Longitude in degrees, east positive.
    pub lon: f64,
    /// Latitude in degrees, north positive.
    pub lat: f64,
}

impl GeoPoint {
    /// Creates a point from longitude and latitude in degrees.
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Returns `true` if both coordinates are within `eps` degrees of `other`.
    #[must_use]
    pub fn approx_eq(self, other: Self, eps: f64) -> bool {
        (self.lon - other.lon).abs() <= eps && (self.lat - other.lat).abs() <= eps
    }
}

/// An axis-aligned geographic bounding box.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBounds {
    /// South-west corner.
    pub min: GeoPoint,
    /// North-east corner.
    pub max: GeoPoint,
}

impl GeoBounds {
    /// Creates bounds from two corners, normalizing them so `min <= max` on both axes.
    #[must_use]
    pub fn new(a: GeoPoint, b: GeoPoint) -> Self {
        Self {
            min: GeoPoint::new(a.lon.min(b.lon), a.lat.min(b.lat)),
            max: GeoPoint::new(a.lon.max(b.lon), a.lat.max(b.lat)),
        }
    }

    /// Returns the center of the bounds.
    #[must_use]
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min.lon + self.max.lon) * 0.5,
            (self.min.lat + self.max.lat) * 0.5,
        )
    }

    /// Returns `true` if the bounds have zero width or height.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.max.lon <= self.min.lon || self.max.lat <= self.min.lat
    }

    /// Projects the bounds into `projection` units.
    #[must_use]
    pub fn project(&self, projection: Projection) -> Rect {
        let a = projection.project(self.min);
        let b = projection.project(self.max);
        Rect::from_points(a, b)
    }
}

/// Projection used by an engine view for its native coordinates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Projection {
    /// Spherical Mercator in meters (`EPSG:3857`).
    #[default]
    WebMercator,
    /// Plate carrée in degrees (`EPSG:4326`).
    Geographic,
}

impl Projection {
    /// Returns the EPSG code of this projection.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::WebMercator => "EPSG:3857",
            Self::Geographic => "EPSG:4326",
        }
    }

    /// Converts a geographic point into projected units.
    #[must_use]
    pub fn project(self, point: GeoPoint) -> Point {
        match self {
            Self::WebMercator => {
                let lat = point.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
                let x = EARTH_RADIUS * point.lon.to_radians();
                let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
                Point::new(x, y)
            }
            Self::Geographic => Point::new(point.lon, point.lat),
        }
    }

    /// Converts a projected point back into a geographic point.
    #[must_use]
    pub fn unproject(self, point: Point) -> GeoPoint {
        match self {
            Self::WebMercator => {
                let lon = (point.x / EARTH_RADIUS).to_degrees();
                let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
                GeoPoint::new(lon, lat)
            }
            Self::Geographic => GeoPoint::new(point.x, point.y),
        }
    }

    /// Projected units covered by one pixel at `zoom`.
    #[must_use]
    pub fn resolution(self, zoom: f64) -> f64 {
        let world = match self {
            Self::WebMercator => 2.0 * PI * EARTH_RADIUS,
            Self::Geographic => 360.0,
        };
        world / TILE_SIZE / 2_f64.powf(zoom)
    }

    /// Zoom level at which one pixel covers `resolution` projected units.
    #[must_use]
    pub fn zoom_for_resolution(self, resolution: f64) -> f64 {
        let base = self.resolution(0.0);
        (base / resolution.max(f64::MIN_POSITIVE)).log2()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mercator_roundtrip_is_stable() {
        let p = GeoPoint::new(13.404_954, 52.520_008);
        let back = Projection::WebMercator.unproject(Projection::WebMercator.project(p));
        assert!(back.approx_eq(p, 1e-9), "roundtrip drifted: {back:?}");
    }

    #[test]
    fn mercator_origin_maps_to_zero() {
        let p = Projection::WebMercator.project(GeoPoint::new(0.0, 0.0));
        assert!(p.x.abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn resolution_halves_per_zoom_level() {
        let r0 = Projection::WebMercator.resolution(0.0);
        let r1 = Projection::WebMercator.resolution(1.0);
        assert!((r0 / r1 - 2.0).abs() < 1e-12);
        let z = Projection::WebMercator.zoom_for_resolution(r1);
        assert!((z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bounds_normalize_corners() {
        let b = GeoBounds::new(GeoPoint::new(10.0, 5.0), GeoPoint::new(-10.0, -5.0));
        assert_eq!(b.min, GeoPoint::new(-10.0, -5.0));
        assert_eq!(b.max, GeoPoint::new(10.0, 5.0));
        assert_eq!(b.center(), GeoPoint::new(0.0, 0.0));
        assert!(!b.is_degenerate());
    }
}
