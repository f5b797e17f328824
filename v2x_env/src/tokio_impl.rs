//! Production implementation of V2xContext using Tokio.

use crate::V2xContext;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// Production context backed by Tokio and the OS monotonic clock.
///
/// `system_time()` is anchored at construction so it moves in step with
/// `now()` even if the wall clock is adjusted.
pub struct TokioContext {
    start: Instant,
    start_wall: SystemTime,

    /// Tasks spawned through this context that have not finished
    live_tasks: Arc<AtomicUsize>,
}

impl TokioContext {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            start_wall: SystemTime::now(),
            live_tasks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn live_tasks(&self) -> usize {
        self.live_tasks.load(Ordering::Acquire)
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl V2xContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.start_wall + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let live = Arc::clone(&self.live_tasks);
        let name = name.to_string();
        live.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(task = %name, "task started");

        tokio::spawn(async move {
            future.await;
            live.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!(task = %name, "task finished");
        });
    }

    fn seed(&self) -> u64 {
        // Production is not seeded
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_context_time() {
        let ctx = TokioContext::new();
        let t1 = ctx.now();
        ctx.sleep(Duration::from_millis(10)).await;
        let t2 = ctx.now();

        assert!(t2 - t1 >= Duration::from_millis(10));
        assert!(ctx.system_time() >= ctx.start_wall + Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_spawn_tracks_live_tasks() {
        let ctx = TokioContext::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        ctx.spawn("probe", async move {
            let _ = release_rx.await;
            let _ = done_tx.send(7u8);
        });
        assert_eq!(ctx.live_tasks(), 1);

        release_tx.send(()).unwrap();
        assert_eq!(done_rx.await.unwrap(), 7);
        for _ in 0..100 {
            if ctx.live_tasks() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(ctx.live_tasks(), 0);
    }

    #[test]
    fn test_tokio_context_seed() {
        assert_eq!(TokioContext::new().seed(), 0);
    }
}
