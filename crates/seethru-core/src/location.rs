//! Own-vehicle position tracking.
//!
//! [`LocationTracker`] turns the stream of fixes produced by a
//! [`LocationProvider`] into the two-point [`PositionVector`] the protocol
//! works with. The provider is polled lazily on every read; both points are
//! kept behind a single mutex so a reader never observes a half-updated vector.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::geo::{GeoPoint, PositionVector};

/// Fixes older than this (relative to now) invalidate the vector.
pub const DEFAULT_FIX_MAX_AGE_MS: u64 = 5_000;

// MARK: - Fix

/// A single GPS fix as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Ground speed reported by the receiver, in m/s. `None` or `0.0` when
    /// the device does not provide it.
    pub speed_mps: Option<f32>,
}

impl Fix {
    pub fn new(lat: f64, lon: f64, timestamp_ms: u64) -> Self {
        Self { lat, lon, timestamp_ms, speed_mps: None }
    }

    pub fn with_speed(mut self, speed_mps: f32) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lon, self.lat)
    }

    fn same_place(&self, other: &Fix) -> bool {
        self.lat == other.lat && self.lon == other.lon
    }
}

// MARK: - LocationProvider

/// Source of the most recent fix, if any.
pub trait LocationProvider: Send + Sync {
    fn current_fix(&self) -> Option<Fix>;
}

/// Provider holding whatever fix was last pushed into it.
#[derive(Debug, Default)]
pub struct LatestFix {
    fix: Mutex<Option<Fix>>,
}

impl LatestFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, fix: Fix) {
        let mut slot = self.fix.lock().unwrap_or_else(|e| e.into_inner());
        // Out-of-order fixes are ignored.
        if slot.map_or(true, |prev| fix.timestamp_ms > prev.timestamp_ms) {
            *slot = Some(fix);
        }
    }
}

impl LocationProvider for LatestFix {
    fn current_fix(&self) -> Option<Fix> {
        *self.fix.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// MARK: - LocationTracker

#[derive(Debug, Default)]
struct TrackedPoints {
    /// `(older, newer)`; both absent until the first fix.
    points: Option<(Fix, Fix)>,
}

impl TrackedPoints {
    fn absorb(&mut self, fix: Fix) {
        self.points = Some(match self.points {
            None => (fix, fix),
            Some((a, b)) if fix.same_place(&b) => (a, fix),
            Some((_, b)) => (b, fix),
        });
    }

    fn expire(&mut self, now_ms: u64, max_age_ms: u64) {
        if let Some((_, b)) = self.points {
            if now_ms.saturating_sub(b.timestamp_ms) >= max_age_ms {
                self.points = None;
            }
        }
    }
}

/// Builds the own position vector from a [`LocationProvider`].
pub struct LocationTracker {
    provider: Arc<dyn LocationProvider>,
    max_age_ms: u64,
    inner: Mutex<TrackedPoints>,
}

impl LocationTracker {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self::with_max_age(provider, DEFAULT_FIX_MAX_AGE_MS)
    }

    pub fn with_max_age(provider: Arc<dyn LocationProvider>, max_age_ms: u64) -> Self {
        Self {
            provider,
            max_age_ms,
            inner: Mutex::new(TrackedPoints::default()),
        }
    }

    /// Current vector, or `None` when no fresh fix is available.
    pub fn vector(&self) -> Option<PositionVector> {
        self.vector_at(now_ms())
    }

    pub fn vector_at(&self, now_ms: u64) -> Option<PositionVector> {
        self.with_points(now_ms, |(a, b)| PositionVector::new(a.point(), b.point()))
    }

    /// Current vector, zero-filled when unknown (the form sent on the wire).
    pub fn vector_or_zero(&self) -> PositionVector {
        self.vector().unwrap_or_default()
    }

    /// Ground speed in km/h.
    ///
    /// Uses the receiver-reported speed of the newest fix when present;
    /// otherwise derives it from the distance and time between the two
    /// tracked fixes. Zero when unknown.
    pub fn speed_kmh(&self) -> f32 {
        self.speed_kmh_at(now_ms())
    }

    pub fn speed_kmh_at(&self, now_ms: u64) -> f32 {
        self.with_points(now_ms, |(a, b)| match b.speed_mps {
            Some(mps) if mps != 0.0 => mps * 3.6,
            _ => {
                let secs = b.timestamp_ms.saturating_sub(a.timestamp_ms) / 1_000;
                if secs == 0 {
                    0.0
                } else {
                    let metres = a.point().haversine_m(&b.point());
                    (metres / secs as f64 * 3.6) as f32
                }
            }
        })
        .unwrap_or(0.0)
    }

    fn with_points<T>(&self, now_ms: u64, f: impl FnOnce((Fix, Fix)) -> T) -> Option<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(fix) = self.provider.current_fix() {
            inner.absorb(fix);
        }
        inner.expire(now_ms, self.max_age_ms);
        inner.points.map(f)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (Arc<LatestFix>, LocationTracker) {
        let feed = Arc::new(LatestFix::new());
        let tracker = LocationTracker::new(feed.clone());
        (feed, tracker)
    }

    #[test]
    fn no_fix_means_no_vector() {
        let (_, t) = tracker();
        assert_eq!(t.vector_at(1_000), None);
        assert!(t.vector_or_zero().is_degenerate());
    }

    #[test]
    fn first_fix_gives_degenerate_vector() {
        let (feed, t) = tracker();
        feed.push(Fix::new(40.0, -3.0, 1_000));
        let v = t.vector_at(1_500).unwrap();
        assert!(v.is_degenerate());
    }

    #[test]
    fn second_fix_shifts_points() {
        let (feed, t) = tracker();
        feed.push(Fix::new(40.0, -3.0, 1_000));
        t.vector_at(1_000);
        feed.push(Fix::new(40.001, -3.0, 2_000));
        let v = t.vector_at(2_000).unwrap();
        assert_eq!(v.a, GeoPoint::new(-3.0, 40.0));
        assert_eq!(v.b, GeoPoint::new(-3.0, 40.001));
    }

    #[test]
    fn repeated_position_only_refreshes_timestamp() {
        let (feed, t) = tracker();
        feed.push(Fix::new(40.0, -3.0, 1_000));
        t.vector_at(1_000);
        feed.push(Fix::new(40.001, -3.0, 2_000));
        t.vector_at(2_000);
        feed.push(Fix::new(40.001, -3.0, 6_500));
        // Still valid because the refreshed timestamp is recent.
        let v = t.vector_at(7_000).unwrap();
        assert_eq!(v.a, GeoPoint::new(-3.0, 40.0));
        assert_eq!(v.b, GeoPoint::new(-3.0, 40.001));
    }

    #[test]
    fn stale_fix_discards_vector() {
        let (feed, t) = tracker();
        feed.push(Fix::new(40.0, -3.0, 1_000));
        assert!(t.vector_at(5_999).is_some());
        assert_eq!(t.vector_at(6_000), None);
    }

    #[test]
    fn speed_prefers_receiver_value() {
        let (feed, t) = tracker();
        feed.push(Fix::new(40.0, -3.0, 1_000).with_speed(25.0));
        assert!((t.speed_kmh_at(1_000) - 90.0).abs() < 1e-3);
    }

    #[test]
    fn speed_derived_from_displacement() {
        let (feed, t) = tracker();
        feed.push(Fix::new(40.0, -3.0, 1_000));
        t.vector_at(1_000);
        // ~111 m north in 4 s ≈ 100 km/h
        feed.push(Fix::new(40.001, -3.0, 5_000));
        let kmh = t.speed_kmh_at(5_000);
        assert!((kmh - 100.0).abs() < 1.0, "got {kmh}");
    }

    #[test]
    fn out_of_order_fix_is_ignored() {
        let feed = LatestFix::new();
        feed.push(Fix::new(1.0, 1.0, 2_000));
        feed.push(Fix::new(2.0, 2.0, 1_000));
        assert_eq!(feed.current_fix().unwrap().timestamp_ms, 2_000);
    }
}
