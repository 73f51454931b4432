use crate::domain::payment::PaymentId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

struct Timer {
    generation: u64,
    handle: AbortHandle,
}

/// One cancellable delay per pending payment.
///
/// A timer's handle leaves the map either when it is cancelled or when its
/// task wakes up. A task that finds its entry replaced or gone does nothing.
#[derive(Default)]
pub struct ExpiryScheduler {
    timers: Arc<Mutex<HashMap<PaymentId, Timer>>>,
    next_generation: AtomicU64,
}

impl ExpiryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `on_fire` after `delay` unless the timer is cancelled first.
    /// Re-arming an id replaces its previous timer.
    pub fn schedule<F>(&self, payment_id: PaymentId, delay: Duration, on_fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let key = payment_id.clone();

        // Held across the spawn so the task cannot wake before its entry exists.
        let mut armed = self.timers.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_armed = {
                let mut timers = timers.lock();
                match timers.get(&key) {
                    Some(timer) if timer.generation == generation => {
                        timers.remove(&key);
                        true
                    }
                    _ => false,
                }
            };
            if still_armed {
                tracing::debug!(payment_id = %key, "Expiry timer fired");
                on_fire.await;
            }
        })
        .abort_handle();

        if let Some(previous) = armed.insert(payment_id, Timer { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Disarms the timer. Returns false if it already fired or never existed.
    pub fn cancel(&self, payment_id: &str) -> bool {
        match self.timers.lock().remove(payment_id) {
            Some(timer) => {
                timer.handle.abort();
                tracing::debug!(payment_id, "Expiry timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, payment_id: &str) -> bool {
        self.timers.lock().contains_key(payment_id)
    }

    pub fn armed(&self) -> usize {
        self.timers.lock().len()
    }

    /// Aborts every outstanding timer.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
