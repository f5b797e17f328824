//! Bounded thread-safe queue between asynchronous producers and the tick loop.
//!
//! Producers (a broker delivery callback, a console reader, the simulated
//! bus) only ever `push`, which never blocks and never runs agent logic.
//! The agent drains the whole queue at a single point of its tick.

use crate::error::EnvError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Receiving side, owned by the agent.
pub struct Mailbox<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

/// Cloneable producer handle.
pub struct MailboxSender<T> {
    tx: mpsc::Sender<T>,
    capacity: usize,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> Mailbox<T> {
    /// Creates a mailbox holding at most `capacity` undrained items.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns a producer handle.
    pub fn sender(&self) -> MailboxSender<T> {
        MailboxSender {
            tx: self.tx.clone(),
            capacity: self.capacity,
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Removes and returns everything queued so far, in arrival order.
    pub fn drain(&self) -> Vec<T> {
        // A poisoned lock only means a previous drain panicked mid-loop;
        // the receiver itself is still consistent.
        let mut rx = self.rx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    /// Number of items rejected because the mailbox was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> MailboxSender<T> {
    /// Queues an item without blocking.
    ///
    /// A full mailbox drops the item and counts it.
    pub fn push(&self, item: T) -> Result<(), EnvError> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EnvError::QueueFull(self.capacity))
            }
            Err(TrySendError::Closed(_)) => Err(EnvError::network("mailbox closed")),
        }
    }
}
