//! Candidate collection and nearest-server selection.
//!
//! During the LISTEN window the client records every validated server in
//! first-seen order. A server that advertises again keeps its slot and only
//! refreshes its vector. Selection picks the server whose current position
//! (point `b`) is closest to ours along the great circle; ties go to whoever
//! was seen first.

use std::net::Ipv4Addr;

use crate::geo::{GeoPoint, PositionVector};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub addr: Ipv4Addr,
    pub location: PositionVector,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    entries: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `addr` or refreshes its vector in place.
    ///
    /// Returns `true` when the address was not known yet.
    pub fn upsert(&mut self, addr: Ipv4Addr, location: PositionVector) -> bool {
        if let Some(existing) = self.entries.iter_mut().find(|c| c.addr == addr) {
            existing.location = location;
            return false;
        }
        self.entries.push(Candidate { addr, location });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.entries.iter()
    }

    /// Nearest candidate to `own`, or the first-seen one when `own` is unknown.
    pub fn select_nearest(&self, own: Option<GeoPoint>) -> Option<Ipv4Addr> {
        let first = self.entries.first()?;
        let Some(own) = own else {
            return Some(first.addr);
        };

        let mut best = first;
        let mut best_m = own.haversine_m(&first.location.b);
        for candidate in &self.entries[1..] {
            let d = own.haversine_m(&candidate.location.b);
            // Strict comparison keeps the earlier candidate on ties.
            if d < best_m {
                best = candidate;
                best_m = d;
            }
        }
        Some(best.addr)
    }
}
