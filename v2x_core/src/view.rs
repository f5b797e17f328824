//! Read-only views for the presentation layer.
//!
//! A renderer only needs these values; it never has to re-run any rule.

use crate::replication::ReplicationStore;
use crate::vehicle::VehicleState;
use serde::{Deserialize, Serialize};

/// How to draw one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleView {
    pub id: String,
    pub position: f64,
    pub visual_lane: f64,
    pub color: [u8; 3],
    pub is_emergency: bool,
    pub drowsy_alert: bool,
    pub braking: bool,
    pub speed: f64,
    pub is_own: bool,
}

impl VehicleView {
    pub fn of(state: &VehicleState, is_own: bool) -> Self {
        Self {
            id: state.id.to_string(),
            position: state.position,
            visual_lane: state.visual_lane,
            color: state.color.0,
            is_emergency: state.is_emergency,
            drowsy_alert: state.drowsy_alert,
            braking: state.braking,
            speed: state.speed,
            is_own,
        }
    }

    /// Views of every vehicle in the store, own vehicle first.
    pub fn all(store: &ReplicationStore) -> Vec<Self> {
        let own_id = store.own_id();
        store
            .iter()
            .map(|state| Self::of(state, &state.id == own_id))
            .collect()
    }
}

/// The driver's panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub vehicle_id: String,
    pub speed_kmh: f64,
    pub lane: u8,
    pub braking: bool,

    /// Vehicle-ahead proximity warning
    pub warning: bool,

    /// Our driver is impaired, or any known vehicle reports a drowsy driver
    pub any_drowsy: bool,

    pub known_vehicles: usize,
    pub owns_emergency: bool,
}

impl Dashboard {
    pub fn from_store(store: &ReplicationStore, impaired: bool) -> Self {
        let own = store.own();
        Self {
            vehicle_id: own.id.to_string(),
            speed_kmh: own.speed_kmh(),
            lane: own.lane,
            braking: own.braking,
            warning: own.warning,
            any_drowsy: impaired || store.iter().any(|vehicle| vehicle.drowsy_alert),
            known_vehicles: store.len(),
            owns_emergency: store.owns_emergency(),
        }
    }
}

impl std::fmt::Display for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | {:>3.0} km/h | lane {} | vehicles {}",
            self.vehicle_id, self.speed_kmh, self.lane, self.known_vehicles
        )?;
        if self.braking {
            f.write_str(" | BRAKING")?;
        }
        if self.warning {
            f.write_str(" | VEHICLE AHEAD!")?;
        }
        if self.any_drowsy {
            f.write_str(" | DROWSY DRIVER DETECTED")?;
        }
        if self.owns_emergency {
            f.write_str(" | ambulance dispatched")?;
        }
        Ok(())
    }
}
