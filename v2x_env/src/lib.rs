//! V2X Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the V2X vehicle
//! engine to run in both **Production** (tokio + a real pub/sub broker) and
//! **Simulation** (virtual clock + in-memory bus) environments.
//!
//! # Core Concept
//!
//! The agent loop never touches I/O directly:
//! - Time (`now()`, `sleep()`) comes from a [`V2xContext`]
//! - Outbound state goes through [`NetworkTransport::publish`], fire-and-forget
//! - Inbound payloads are pushed by the transport's delivery path into a
//!   [`Mailbox`] and drained by the agent at one point of its tick
//!
//! # Example
//!
//! ```ignore
//! use v2x_env::{V2xContext, NetworkTransport};
//!
//! async fn agent_loop<Ctx: V2xContext, Net: NetworkTransport>(ctx: &Ctx, net: &Net) {
//!     loop {
//!         for packet in net.drain_inbound() {
//!             merge(packet);
//!         }
//!         let _ = net.publish(encode_own_state());
//!         ctx.sleep(Duration::from_millis(16)).await;
//!     }
//! }
//! ```

mod context;
mod error;
mod mailbox;
mod network;
mod offline;
mod tokio_impl;
mod types;

pub use context::V2xContext;
pub use error::EnvError;
pub use mailbox::{Mailbox, MailboxSender};
pub use network::{NetworkController, NetworkTransport};
pub use offline::OfflineTransport;
pub use tokio_impl::TokioContext;
pub use types::{InboundPacket, NodeId};
