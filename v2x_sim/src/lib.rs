//! V2X Deterministic Simulation Testing (DST) Harness
//!
//! A controlled environment where many vehicle agents run the real agent
//! loop against a virtual clock and an in-memory pub/sub bus.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when the world ticks
//! - **Network**: Router with configurable latency, jitter, loss and partitions
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + seeded ChaCha8)          │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │  Agent  │─── publish ─►│ Router  │──► every mailbox      │
//! │  │  CAR1   │              │ (faults)│    (sender included)  │
//! │  └─────────┘              └─────────┘                       │
//! │       ▲                                                     │
//! │  ┌────┴──────────────────────────────┐                      │
//! │  │        ConsistencyOracle          │                      │
//! │  │  (replicas vs. owner state)       │                      │
//! │  └───────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use v2x_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42, 6).run(ScenarioId::SplitBrain);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod network;
mod oracle;
mod runner;
pub mod scenarios;
mod world;

pub use context::SimContext;
pub use exporter::{AgentFrame, SimEvent, SimExport, SimFrame};
pub use network::{BusMessage, Delivery, SimNetwork, SimNetworkController};
pub use oracle::{ConsistencyOracle, ConsistencyReport};
pub use runner::{ScenarioError, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{AgentHandle, BusMetrics, SimAgent, SimConfig, SimWorld, SpawnSpec};
