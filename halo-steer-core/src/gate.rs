//! Trigger gate: distance policy applied before any encoding or network I/O

use serde::{Deserialize, Serialize};

/// Default maximum distance from instrument to region, meters
pub const DEFAULT_MAX_DISTANCE_M: f64 = 5000.0;

/// True if a region `distance_m` away should trigger a scan.
///
/// The upper bound is inclusive.
pub fn decide(distance_m: f64, max_distance_m: f64) -> bool {
    distance_m <= max_distance_m
}

/// Maximum-distance trigger policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerGate {
    pub max_distance_m: f64,
}

impl Default for TriggerGate {
    fn default() -> Self {
        TriggerGate {
            max_distance_m: DEFAULT_MAX_DISTANCE_M,
        }
    }
}

impl TriggerGate {
    pub fn new(max_distance_m: f64) -> Self {
        Self { max_distance_m }
    }

    pub fn decide(&self, distance_m: f64) -> bool {
        decide(distance_m, self.max_distance_m)
    }
}
