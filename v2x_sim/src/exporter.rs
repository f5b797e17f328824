//! JSON exporter for offline visualisation.
//!
//! Exports what every agent would draw, frame by frame.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use v2x_core::VehicleView;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Simulation time in seconds
    pub time_sec: f64,

    pub agents: Vec<AgentFrame>,

    /// Events (partitions, disconnects, etc.)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SimEvent>,
}

/// One agent's view of the road.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFrame {
    pub vehicle_id: String,
    pub node: String,
    pub vehicles: Vec<VehicleView>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: Some("info".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    pub scenario: String,
    pub seed: u64,
    pub duration_sec: f64,
    pub frames: Vec<SimFrame>,
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: &str) -> VehicleView {
        VehicleView {
            id: id.to_string(),
            position: 12.5,
            visual_lane: 1.5,
            color: [0, 200, 255],
            is_emergency: false,
            drowsy_alert: false,
            braking: true,
            speed: 20.0,
            is_own: true,
        }
    }

    #[test]
    fn test_export_tracks_duration_and_serializes() {
        let mut export = SimExport::new("car_following", 42);
        export.add_frame(SimFrame {
            time_sec: 0.5,
            agents: vec![AgentFrame {
                vehicle_id: "CAR1".to_string(),
                node: "00000000".to_string(),
                vehicles: vec![view("CAR1")],
            }],
            events: vec![SimEvent::info("leader stops")],
        });
        export.add_frame(SimFrame {
            time_sec: 1.0,
            agents: vec![],
            events: vec![],
        });
        export.finalize(true, None);

        assert_eq!(export.duration_sec, 1.0);
        let json = serde_json::to_string(&export).unwrap();
        assert!(!json.contains("failure_reason"));

        let back: SimExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.frames.len(), 2);
        assert_eq!(back.frames[0].agents[0].vehicles[0], view("CAR1"));
        assert!(back.frames[1].events.is_empty());
    }
}
