//! Replication Store - the local agent's view of every vehicle.
//!
//! The own vehicle is held apart from the map so it always exists and can
//! never be written by the network. Every other id is a replica, except a
//! summoned emergency vehicle, which the store holds together with its
//! [`EmergencyToken`].

use crate::codec::VehicleUpdate;
use crate::config::RoadConfig;
use crate::vehicle::{VehicleId, VehicleState};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

/// Proof that this agent created, and therefore owns, the emergency vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyToken {
    id: VehicleId,
    claimed_at: Duration,
}

impl EmergencyToken {
    pub fn id(&self) -> &VehicleId {
        &self.id
    }

    pub fn claimed_at(&self) -> Duration {
        self.claimed_at
    }
}

/// Result of merging one inbound update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Echo of our own vehicle; never applied
    IgnoredOwn,
    /// Someone else's claim on the emergency id we own
    IgnoredOwnedEmergency,
    /// First message for this id created a replica
    Materialized,
    /// An existing replica was overwritten
    Refreshed,
}

pub struct ReplicationStore {
    own: VehicleState,
    others: BTreeMap<VehicleId, VehicleState>,
    emergency_token: Option<EmergencyToken>,
    ghost_timeout: Duration,
    config: RoadConfig,
}

impl ReplicationStore {
    pub fn new(own: VehicleState, config: &RoadConfig) -> Self {
        Self {
            own,
            others: BTreeMap::new(),
            emergency_token: None,
            ghost_timeout: config.ghost_timeout(),
            config: config.clone(),
        }
    }

    pub fn own_id(&self) -> &VehicleId {
        &self.own.id
    }

    pub fn own(&self) -> &VehicleState {
        &self.own
    }

    pub fn own_mut(&mut self) -> &mut VehicleState {
        &mut self.own
    }

    pub fn emergency_token(&self) -> Option<&EmergencyToken> {
        self.emergency_token.as_ref()
    }

    pub fn owns_emergency(&self) -> bool {
        self.emergency_token.is_some()
    }

    /// The emergency vehicle, if this agent owns it.
    pub fn owned_emergency(&self) -> Option<&VehicleState> {
        let token = self.emergency_token.as_ref()?;
        self.others.get(&token.id)
    }

    pub fn owned_emergency_mut(&mut self) -> Option<&mut VehicleState> {
        let token = self.emergency_token.as_ref()?;
        self.others.get_mut(&token.id)
    }

    /// Looks up any known vehicle, own included.
    pub fn get(&self, id: &str) -> Option<&VehicleState> {
        if self.own.id.as_str() == id {
            Some(&self.own)
        } else {
            self.others.get(id)
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Every known vehicle, own first, then the rest ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &VehicleState> {
        std::iter::once(&self.own).chain(self.others.values())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut VehicleState> {
        std::iter::once(&mut self.own).chain(self.others.values_mut())
    }

    /// Number of known vehicles, own included.
    pub fn len(&self) -> usize {
        1 + self.others.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Takes ownership of the emergency slot with `vehicle`.
    ///
    /// Fails (returning `false`) whenever the emergency id is already known,
    /// whether we own it or a peer broadcasts it.
    pub fn claim_emergency(&mut self, mut vehicle: VehicleState, now: Duration) -> bool {
        if self.contains(vehicle.id.as_str()) {
            return false;
        }
        vehicle.last_seen_at = now;
        info!(id = %vehicle.id, "claimed emergency vehicle");
        self.emergency_token = Some(EmergencyToken {
            id: vehicle.id.clone(),
            claimed_at: now,
        });
        self.others.insert(vehicle.id.clone(), vehicle);
        true
    }

    /// Merges one decoded message. Last write wins, no ordering checks.
    pub fn apply_update(&mut self, update: &VehicleUpdate, now: Duration) -> ApplyOutcome {
        if update.id == self.own.id {
            return ApplyOutcome::IgnoredOwn;
        }
        if self
            .emergency_token
            .as_ref()
            .is_some_and(|token| token.id == update.id)
        {
            return ApplyOutcome::IgnoredOwnedEmergency;
        }

        match self.others.get_mut(&update.id) {
            Some(replica) => {
                replica.merge_update(update, now);
                ApplyOutcome::Refreshed
            }
            None => {
                debug!(id = %update.id, lane = update.lane, "new replica");
                let replica = VehicleState::from_update(update, now, &self.config);
                self.others.insert(update.id.clone(), replica);
                ApplyOutcome::Materialized
            }
        }
    }

    /// Removes replicas not refreshed for longer than the ghost timeout.
    ///
    /// The own vehicle and an owned emergency vehicle are never swept.
    pub fn sweep_ghosts(&mut self, now: Duration) -> Vec<VehicleId> {
        let owned_emergency = self.emergency_token.as_ref().map(|token| token.id.clone());
        let timeout = self.ghost_timeout;

        let ghosts: Vec<VehicleId> = self
            .others
            .iter()
            .filter(|(id, _)| Some(*id) != owned_emergency.as_ref())
            .filter(|(_, replica)| now.saturating_sub(replica.last_seen_at) > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ghosts {
            self.others.remove(id);
            info!(id = %id, "evicted unreachable vehicle");
        }
        ghosts
    }
}
