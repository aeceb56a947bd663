//! Geometric peer validation.
//!
//! Both roles ask the same question with a different sign: "is the peer on my
//! heading, and is it in front of me (client) / behind me (server)?". The
//! answer comes from two angles:
//!
//! ```text
//!  1. heading agreement      angle(own.a→own.b, peer.a→peer.b)   ≤ direction_deg
//!  2. relative position      angle(reference,   own.b→peer.b)    ≤ position_deg
//!
//!     reference = own.a→own.b   when the peer must be Ahead
//!                 own.b→own.a   when the peer must be Behind
//! ```
//!
//! Missing or degenerate geometry never validates.

use crate::config::ValidationParams;
use crate::geo::PositionVector;

/// Where the peer has to be relative to our own heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeBearing {
    Ahead,
    Behind,
}

/// Outcome of [`check_alignment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Aligned,
    /// Validation switched off in settings.
    Disabled,
    /// No fresh own location.
    LocationUnavailable,
    /// One of the vectors carries no direction.
    Degenerate,
    /// Headings differ by this many degrees.
    DifferentDirection(f64),
    /// Peer lies this many degrees off the required bearing.
    OutOfCone(f64),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Aligned | Self::Disabled)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aligned => f.write_str("aligned"),
            Self::Disabled => f.write_str("validation disabled"),
            Self::LocationUnavailable => f.write_str("Location not available"),
            Self::Degenerate => f.write_str("One point vector"),
            Self::DifferentDirection(deg) => write!(f, "Different directions - {deg:.1} degrees"),
            Self::OutOfCone(deg) => write!(f, "Peer out of position - {deg:.1} degrees"),
        }
    }
}

/// Checks that `peer` travels on our heading and sits on the required side.
pub fn check_alignment(
    own: Option<&PositionVector>,
    peer: &PositionVector,
    bearing: RelativeBearing,
    params: &ValidationParams,
) -> Verdict {
    if params.disabled {
        return Verdict::Disabled;
    }
    let Some(own) = own else {
        return Verdict::LocationUnavailable;
    };
    if own.is_degenerate() || peer.is_degenerate() {
        return Verdict::Degenerate;
    }

    let Some(heading) = own.angle_between(peer) else {
        return Verdict::Degenerate;
    };
    if heading > params.direction_deg {
        return Verdict::DifferentDirection(heading);
    }

    let reference = match bearing {
        RelativeBearing::Ahead => *own,
        RelativeBearing::Behind => own.reversed(),
    };
    let to_peer = own.towards(peer.b);
    match reference.angle_between(&to_peer) {
        Some(deg) if deg <= params.position_deg => Verdict::Aligned,
        Some(deg) => Verdict::OutOfCone(deg),
        // Both vehicles report the exact same position.
        None => Verdict::Degenerate,
    }
}

/// Client side: is the server still ahead enough for its feed to be useful?
///
/// `false` once the bearing from the client to the server exceeds
/// `overtaking_deg`, i.e. the client has overtaken the server.
pub fn still_behind(own: Option<&PositionVector>, server: &PositionVector, params: &ValidationParams) -> bool {
    if params.disabled {
        return true;
    }
    let Some(own) = own else {
        return false;
    };
    own.angle_between(&own.towards(server.b))
        .map_or(false, |deg| deg <= params.overtaking_deg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    // Vehicles driving north along a meridian; 1e-4 deg ≈ 11 m.
    fn northbound(lat: f64) -> PositionVector {
        PositionVector::new(GeoPoint::new(-3.7, lat), GeoPoint::new(-3.7, lat + 1e-4))
    }

    fn params() -> ValidationParams {
        ValidationParams::default()
    }

    #[test]
    fn server_ahead_on_same_heading_is_valid() {
        let me = northbound(40.0);
        let server = northbound(40.001);
        assert_eq!(check_alignment(Some(&me), &server, RelativeBearing::Ahead, &params()), Verdict::Aligned);
    }

    #[test]
    fn server_behind_is_rejected_for_client() {
        let me = northbound(40.001);
        let server = northbound(40.0);
        let verdict = check_alignment(Some(&me), &server, RelativeBearing::Ahead, &params());
        assert!(matches!(verdict, Verdict::OutOfCone(deg) if deg > 170.0));
    }

    #[test]
    fn client_behind_is_valid_for_server() {
        let me = northbound(40.001);
        let client = northbound(40.0);
        assert_eq!(check_alignment(Some(&me), &client, RelativeBearing::Behind, &params()), Verdict::Aligned);
    }

    #[test]
    fn opposite_heading_is_rejected() {
        let me = northbound(40.0);
        let oncoming = northbound(40.001).reversed();
        assert!(matches!(
            check_alignment(Some(&me), &oncoming, RelativeBearing::Ahead, &params()),
            Verdict::DifferentDirection(_)
        ));
    }

    #[test]
    fn degenerate_and_missing_geometry_rejects() {
        let me = northbound(40.0);
        let parked = PositionVector::point(GeoPoint::new(-3.7, 40.001));
        assert_eq!(check_alignment(Some(&me), &parked, RelativeBearing::Ahead, &params()), Verdict::Degenerate);
        assert_eq!(check_alignment(None, &me, RelativeBearing::Ahead, &params()), Verdict::LocationUnavailable);
    }

    #[test]
    fn disabled_validation_accepts_anything() {
        let p = ValidationParams { disabled: true, ..params() };
        let v = check_alignment(None, &PositionVector::default(), RelativeBearing::Behind, &p);
        assert!(v.is_valid());
        assert!(still_behind(None, &PositionVector::default(), &p));
    }

    #[test]
    fn overtaking_ends_usefulness() {
        let me = northbound(40.0);
        assert!(still_behind(Some(&me), &northbound(40.001), &params()));
        // Server directly east of the client: 90 degrees off the heading.
        let abeam = PositionVector::new(GeoPoint::new(-3.699, 40.0), GeoPoint::new(-3.699, 40.0 + 1e-4));
        let mut p = params();
        p.overtaking_deg = 85.0;
        assert!(!still_behind(Some(&me), &abeam, &p));
        assert!(!still_behind(Some(&me), &northbound(39.99), &params()));
        assert!(!still_behind(None, &northbound(40.001), &params()));
    }
}
