//! V2X Core - Distributed Vehicle State Engine
//!
//! Every agent simulates its own car on a shared circular road and
//! broadcasts that car's state. Peers merge what they hear into a local
//! replica of the whole road and run the same traffic rules against it:
//! 1. **Kinematics**: speed tracking and wrap-around position updates
//! 2. **Decision engine**: a fixed-priority rule chain (impaired driver,
//!    yield to ambulance, follow leader, cruise)
//! 3. **Replication**: last-writer-wins merge with ghost eviction and a
//!    single-owner emergency vehicle

pub mod agent_runtime;
pub mod animator;
pub mod attention;
pub mod codec;
pub mod config;
pub mod decision;
pub mod kinematics;
pub mod replication;
pub mod vehicle;
pub mod view;

// Re-export key types for convenience
pub use agent_runtime::{AgentStats, TickReport, UserCommand, VehicleAgent, MAX_TICK_DT};
pub use animator::animate_lane;
pub use attention::{AttentionDebouncer, AttentionSignal};
pub use codec::{DecodeError, EncodeError, StateCodec, VehicleUpdate};
pub use config::{AgentConfig, ConfigError, RoadConfig, DEFAULT_TOPIC};
pub use decision::{decide, Decision, RuleKind, Surroundings};
pub use kinematics::{advance, backward_distance, forward_distance, wrap_position, Motion};
pub use replication::{ApplyOutcome, EmergencyToken, ReplicationStore};
pub use vehicle::{Color, VehicleId, VehicleState, EMERGENCY_VEHICLE_ID};
pub use view::{Dashboard, VehicleView};
