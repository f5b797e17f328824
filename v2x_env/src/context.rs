//! Core environment context trait for V2X agents.

use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the vehicle engine can run
/// in both production (tokio) and simulation (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, `Instant`
/// - **Simulation**: `SimContext` - virtual clock advanced by the world
///
/// # Determinism
///
/// Everything the agent loop reads about time goes through this trait, so a
/// simulated run is fully reproducible from its seed.
#[async_trait]
pub trait V2xContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// Used for tick deltas and replica `last_seen_at` stamps.
    /// In simulation, this is the virtual clock time.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time (for logs and exports only).
    ///
    /// Never transmitted: agents do not share a clock.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances virtual clock
    async fn sleep(&self, duration: Duration);

    /// Spawns a background task.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// In production, returns 0 (not seeded).
    /// In simulation, returns the master seed.
    fn seed(&self) -> u64;
}
