//! State Codec - vehicle state to and from the pub/sub wire format.
//!
//! # Wire Format
//!
//! One JSON object per vehicle per tick, using the short keys of the
//! deployed fleet so that mixed agents interoperate:
//!
//! ```text
//! {"id":"CAR1","lane":1,"x":412.5,"spd":27.0,"emb":false,
//!  "col":[0,200,255],"drw":false,"brk":false}
//! ```
//!
//! Only replicated fields are carried. `drw` and `brk` may be absent and
//! then read as `false`.

use crate::config::RoadConfig;
use crate::kinematics::wrap_position;
use crate::vehicle::{Color, VehicleId, VehicleState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an inbound message is rejected. The message is dropped whole.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl DecodeError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Serializing our own state failed.
#[derive(Debug, Error)]
#[error("Failed to encode vehicle state: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Decoded replicated fields of one vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleUpdate {
    pub id: VehicleId,
    pub lane: u8,
    pub position: f64,
    pub speed: f64,
    pub is_emergency: bool,
    pub color: Color,
    pub drowsy_alert: bool,
    pub braking: bool,
}

impl VehicleUpdate {
    /// Snapshot of the replicated fields of a local vehicle.
    pub fn from_state(state: &VehicleState) -> Self {
        Self {
            id: state.id.clone(),
            lane: state.lane,
            position: state.position,
            speed: state.speed,
            is_emergency: state.is_emergency,
            color: state.color,
            drowsy_alert: state.drowsy_alert,
            braking: state.braking,
        }
    }
}

/// On-the-wire layout. Numeric fields are read wide and range-checked after.
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    id: String,
    lane: i64,
    x: f64,
    spd: f64,
    emb: bool,
    col: [i64; 3],
    #[serde(default)]
    drw: bool,
    #[serde(default)]
    brk: bool,
}

/// Encoder/decoder bound to one road layout (lane range, track length).
#[derive(Debug, Clone)]
pub struct StateCodec {
    lane_count: u8,
    track_length: f64,
}

impl StateCodec {
    pub fn new(config: &RoadConfig) -> Self {
        Self {
            lane_count: config.lane_count,
            track_length: config.track_length,
        }
    }

    /// Serializes the replicated fields of `state`.
    pub fn encode(&self, state: &VehicleState) -> Result<Vec<u8>, EncodeError> {
        let [r, g, b] = state.color.0;
        let wire = WireMessage {
            id: state.id.as_str().to_string(),
            lane: i64::from(state.lane),
            x: state.position,
            spd: state.speed,
            emb: state.is_emergency,
            col: [i64::from(r), i64::from(g), i64::from(b)],
            drw: state.drowsy_alert,
            brk: state.braking,
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Parses and validates one inbound message.
    pub fn decode(&self, payload: &[u8]) -> Result<VehicleUpdate, DecodeError> {
        let wire: WireMessage = serde_json::from_slice(payload)?;

        if wire.id.is_empty() {
            return Err(DecodeError::invalid("id", "empty"));
        }
        let lane = u8::try_from(wire.lane)
            .ok()
            .filter(|lane| *lane < self.lane_count)
            .ok_or_else(|| {
                DecodeError::invalid("lane", format!("{} outside 0..{}", wire.lane, self.lane_count))
            })?;
        if !wire.x.is_finite() {
            return Err(DecodeError::invalid("x", format!("{} is not finite", wire.x)));
        }
        if !(wire.spd.is_finite() && wire.spd >= 0.0) {
            return Err(DecodeError::invalid("spd", format!("{} is not a speed", wire.spd)));
        }
        let mut color = [0u8; 3];
        for (slot, component) in color.iter_mut().zip(wire.col) {
            *slot = u8::try_from(component)
                .map_err(|_| DecodeError::invalid("col", format!("{component} outside 0..=255")))?;
        }

        Ok(VehicleUpdate {
            id: VehicleId::new(wire.id),
            lane,
            position: wrap_position(wire.x, self.track_length),
            speed: wire.spd,
            is_emergency: wire.emb,
            color: Color(color),
            drowsy_alert: wire.drw,
            braking: wire.brk,
        })
    }
}
