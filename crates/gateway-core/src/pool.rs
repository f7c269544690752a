//! Fixed-size pool of reusable worker objects (spec.md §9 "Worker pool of
//! reusable pipes"): a buffered channel seeded with `pool_size` instances.
//! `acquire` receives, `release` sends — natural backpressure, no manual
//! semaphore bookkeeping.

use tokio::sync::mpsc::{self, Receiver, Sender};

pub struct Pool<T> {
    tx: Sender<T>,
    rx: tokio::sync::Mutex<Receiver<T>>,
}

/// A borrowed worker. Returned to the pool automatically on drop, so
/// release happens on every exit path including early returns and panics
/// that unwind through it (spec.md §4.3 "Pool release is guaranteed on
/// every exit path").
pub struct PooledGuard<T> {
    value: Option<T>,
    tx: Sender<T>,
}

impl<T> std::ops::Deref for PooledGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value.as_ref().expect("guard value taken before drop")
    }
}

impl<T> std::ops::DerefMut for PooledGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("guard value taken before drop")
    }
}

impl<T> Drop for PooledGuard<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            // A full channel here would mean more guards exist than were
            // ever issued, which is a pool invariant violation, not a
            // runtime condition to handle gracefully.
            let _ = self.tx.try_send(value);
        }
    }
}

impl<T> Pool<T> {
    /// Seeds the pool with `instances`, sized by the caller via
    /// `make: impl Fn() -> T` so capacity matches `instances.len()`.
    pub fn new(instances: Vec<T>) -> Self {
        let (tx, rx) = mpsc::channel(instances.len().max(1));
        for instance in instances {
            tx.try_send(instance)
                .expect("channel capacity matches seeded instance count");
        }
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    /// Blocks until a worker is available.
    pub async fn acquire(&self) -> PooledGuard<T> {
        let mut rx = self.rx.lock().await;
        let value = rx
            .recv()
            .await
            .expect("pool sender outlives all receivers for the pool's lifetime");
        PooledGuard {
            value: Some(value),
            tx: self.tx.clone(),
        }
    }
}
