//! Consistency oracle for simulation.
//!
//! Every vehicle has exactly one authoritative copy: the agent that owns it.
//! The oracle compares each agent's replicas against those copies:
//! - Replicas that should exist but do not (missing)
//! - Replicas of vehicles nobody owns any more (stale ghosts)
//! - Position drift between replica and owner (circular metres)

use serde::Serialize;
use std::collections::HashMap;
use v2x_core::{backward_distance, forward_distance, ReplicationStore, VehicleId, VehicleState};

/// Result of one consistency check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    /// (observer, vehicle) pairs checked
    pub checked: usize,

    pub missing_replicas: usize,
    pub stale_ghosts: usize,

    /// Largest circular distance between a replica and its owner's copy
    pub max_position_error: f64,

    pub lane_mismatches: usize,

    /// Agents that each believe they own the emergency vehicle
    pub emergency_owners: usize,
}

impl ConsistencyReport {
    /// True when every agent knows every live vehicle within `tolerance_m`
    /// and holds nothing else.
    pub fn is_consistent(&self, tolerance_m: f64) -> bool {
        self.missing_replicas == 0 && self.stale_ghosts == 0 && self.max_position_error <= tolerance_m
    }
}

/// Ground truth checker over a set of replication stores.
#[derive(Debug, Clone)]
pub struct ConsistencyOracle {
    track_length: f64,
}

impl ConsistencyOracle {
    pub fn new(track_length: f64) -> Self {
        Self { track_length }
    }

    /// Checks every store against the owners' copies.
    ///
    /// When several agents own the emergency vehicle, the first owner's copy
    /// is taken as authoritative.
    pub fn check(&self, stores: &[&ReplicationStore]) -> ConsistencyReport {
        let mut report = ConsistencyReport::default();
        let mut owners: HashMap<&VehicleId, (usize, &VehicleState)> = HashMap::new();

        for (index, store) in stores.iter().enumerate() {
            owners.entry(store.own_id()).or_insert((index, store.own()));
            if let Some(emergency) = store.owned_emergency() {
                report.emergency_owners += 1;
                owners.entry(&emergency.id).or_insert((index, emergency));
            }
        }

        for (index, store) in stores.iter().enumerate() {
            for (id, (owner, truth)) in &owners {
                if *owner == index || store.owned_emergency().is_some_and(|e| &e.id == *id) {
                    continue;
                }
                report.checked += 1;

                let Some(replica) = store.get(id.as_str()) else {
                    report.missing_replicas += 1;
                    continue;
                };
                let error = self.circular_error(replica.position, truth.position);
                report.max_position_error = report.max_position_error.max(error);
                if replica.lane != truth.lane {
                    report.lane_mismatches += 1;
                }
            }

            report.stale_ghosts += store
                .iter()
                .filter(|vehicle| !owners.contains_key(&vehicle.id))
                .count();
        }

        report
    }

    fn circular_error(&self, a: f64, b: f64) -> f64 {
        forward_distance(a, b, self.track_length).min(backward_distance(a, b, self.track_length))
    }
}
