//! Two-point position-vector math.
//!
//! A [`PositionVector`] is built from the two most recent GPS fixes: point `a`
//! is the older fix, point `b` the newer one. The vector therefore encodes both
//! where a vehicle is (`b`) and where it is heading (`a → b`).
//!
//! Coordinates are treated as a flat plane (`x = lon`, `y = lat`) for angle
//! computations. Over the few tens of metres a vector spans, the distortion is
//! far below the angular tolerances the validator works with. Distances use the
//! great-circle formula instead.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// MARK: - GeoPoint

/// A geographic point. `lon` maps to the x axis, `lat` to the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Great-circle distance to `other` in metres (haversine).
    pub fn haversine_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();

        let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lon, self.lat)
    }
}

// MARK: - PositionVector

/// Displacement between two consecutive fixes.
///
/// On the wire the vector is the 4-tuple `[a.lon, a.lat, b.lon, b.lat]`.
/// The all-zero vector stands for "location unknown" and is degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct PositionVector {
    pub a: GeoPoint,
    pub b: GeoPoint,
}

impl PositionVector {
    pub const fn new(a: GeoPoint, b: GeoPoint) -> Self {
        Self { a, b }
    }

    /// Vector whose two points coincide.
    pub const fn point(p: GeoPoint) -> Self {
        Self { a: p, b: p }
    }

    /// `true` when both points are equal: the vector has zero module and
    /// carries no direction.
    pub fn is_degenerate(&self) -> bool {
        self.a == self.b
    }

    /// Rigid translation so that `a` lands on `target`.
    pub fn translate(&self, target: GeoPoint) -> Self {
        let dx = target.lon - self.a.lon;
        let dy = target.lat - self.a.lat;
        Self {
            a: target,
            b: GeoPoint::new(self.b.lon + dx, self.b.lat + dy),
        }
    }

    /// Same segment, opposite heading (`b → a`).
    pub fn reversed(&self) -> Self {
        Self { a: self.b, b: self.a }
    }

    /// Vector from this vector's current position (`b`) to `target`.
    pub fn towards(&self, target: GeoPoint) -> Self {
        Self { a: self.b, b: target }
    }

    /// Direction components `(dx, dy)`.
    fn components(&self) -> (f64, f64) {
        let origin = self.translate(GeoPoint::default());
        (origin.b.lon, origin.b.lat)
    }

    /// Unsigned angle in degrees (`[0, 180]`) between the two directions.
    ///
    /// Returns `None` when either vector is degenerate.
    pub fn angle_between(&self, other: &PositionVector) -> Option<f64> {
        if self.is_degenerate() || other.is_degenerate() {
            return None;
        }
        let (ux, uy) = self.components();
        let (vx, vy) = other.components();

        let numerator = ux * vx + uy * vy;
        let denominator = ux.hypot(uy) * vx.hypot(vy);
        if denominator == 0.0 || !denominator.is_finite() {
            return None;
        }
        let cosine = (numerator / denominator).clamp(-1.0, 1.0);

        Some(cosine.acos().to_degrees().abs())
    }
}

impl From<[f64; 4]> for PositionVector {
    fn from(v: [f64; 4]) -> Self {
        Self {
            a: GeoPoint::new(v[0], v[1]),
            b: GeoPoint::new(v[2], v[3]),
        }
    }
}

impl From<PositionVector> for [f64; 4] {
    fn from(v: PositionVector) -> Self {
        [v.a.lon, v.a.lat, v.b.lon, v.b.lat]
    }
}

impl std::fmt::Display for PositionVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} → {}", self.a, self.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(ax: f64, ay: f64, bx: f64, by: f64) -> PositionVector {
        PositionVector::from([ax, ay, bx, by])
    }

    #[test]
    fn angle_with_itself_is_zero() {
        let u = v(-3.70, 40.41, -3.69, 40.42);
        let angle = u.angle_between(&u).unwrap();
        assert!(angle.abs() < 1e-6, "got {angle}");
    }

    #[test]
    fn angle_with_opposite_is_180() {
        let u = v(-3.70, 40.41, -3.69, 40.42);
        let angle = u.angle_between(&u.reversed()).unwrap();
        assert!((angle - 180.0).abs() < 1e-6, "got {angle}");
    }

    #[test]
    fn right_angle() {
        let east = v(0.0, 0.0, 1.0, 0.0);
        let north = v(5.0, 5.0, 5.0, 7.0);
        let angle = east.angle_between(&north).unwrap();
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_vectors_have_no_angle() {
        let p = PositionVector::point(GeoPoint::new(1.0, 2.0));
        let u = v(0.0, 0.0, 1.0, 1.0);
        assert!(p.is_degenerate());
        assert_eq!(p.angle_between(&u), None);
        assert_eq!(u.angle_between(&p), None);
        assert!(PositionVector::default().is_degenerate());
    }

    #[test]
    fn translate_keeps_direction() {
        let u = v(1.0, 1.0, 3.0, 4.0);
        let t = u.translate(GeoPoint::new(-10.0, 5.0));
        assert_eq!(t.a, GeoPoint::new(-10.0, 5.0));
        assert_eq!(t.b, GeoPoint::new(-8.0, 8.0));
        assert!(u.angle_between(&t).unwrap() < 1e-9);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        let d = GeoPoint::new(0.0, 0.0).haversine_m(&GeoPoint::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 50.0, "got {d}");
    }

    #[test]
    fn wire_form_is_four_floats() {
        let u = v(-3.5, 40.0, -3.4, 40.1);
        let json = serde_json::to_string(&u).unwrap();
        assert_eq!(json, "[-3.5,40.0,-3.4,40.1]");
    }

    proptest! {
        #[test]
        fn angle_is_always_a_real_number_in_range(
            ax in -180.0f64..180.0, ay in -90.0f64..90.0,
            dx in -1e-3f64..1e-3, dy in -1e-3f64..1e-3,
            bx in -180.0f64..180.0, by in -90.0f64..90.0,
            ex in -1e-3f64..1e-3, ey in -1e-3f64..1e-3,
        ) {
            let u = v(ax, ay, ax + dx, ay + dy);
            let w = v(bx, by, bx + ex, by + ey);
            if let Some(angle) = u.angle_between(&w) {
                prop_assert!(!angle.is_nan());
                prop_assert!((0.0..=180.0).contains(&angle));
            }
        }

        #[test]
        fn parallel_scaled_vectors_are_aligned(
            dx in 0.1f64..10.0, dy in 0.1f64..10.0, k in 0.5f64..50.0,
        ) {
            let u = v(0.0, 0.0, dx, dy);
            let w = v(3.0, -2.0, 3.0 + dx * k, -2.0 + dy * k);
            let angle = u.angle_between(&w).unwrap();
            prop_assert!(!angle.is_nan());
            prop_assert!(angle < 1e-4);
        }
    }
}
