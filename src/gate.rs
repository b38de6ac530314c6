use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

use crate::error::FrameQaError;

/// Counting resource bounding simultaneous in-flight remote calls.
///
/// Optionally pauses all new acquisitions for a fixed interval after every
/// `every` completed calls. That is a coarse, non-adaptive rate cap; there is
/// no backoff and nothing is retried.
pub struct ConcurrencyGate {
    semaphore: Semaphore,
    max_concurrent: usize,
    cooldown: Option<(u64, Duration)>,
    completed: AtomicU64,
    paused_until: Mutex<Option<Instant>>,
}

impl ConcurrencyGate {
    /// `max_concurrent` of 0 is treated as 1.
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            cooldown: None,
            completed: AtomicU64::new(0),
            paused_until: Mutex::new(None),
        }
    }

    pub fn with_cooldown(mut self, every: u64, pause: Duration) -> Self {
        self.cooldown = (every > 0 && !pause.is_zero()).then_some((every, pause));
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Returns the number of free permits (for testing).
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of permits released so far.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Take a permit, then wait out any active cooldown while holding it.
    /// The permit is returned to the pool when the guard drops, on every exit
    /// path.
    pub async fn acquire(&self) -> Result<GatePermit<'_>, FrameQaError> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FrameQaError::Other("concurrency gate closed".to_string()))?;

        // A pause also holds back waiters that were already queued.
        loop {
            let until = *self
                .paused_until
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            match until {
                Some(t) if t > Instant::now() => tokio::time::sleep_until(t).await,
                _ => break,
            }
        }

        Ok(GatePermit {
            _permit: permit,
            gate: self,
        })
    }

    fn record_completion(&self) {
        let n = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some((every, pause)) = self.cooldown
            && n % every == 0
        {
            tracing::info!(
                completed = n,
                pause_ms = pause.as_millis() as u64,
                "cooldown: pausing new calls"
            );
            let mut until = self
                .paused_until
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            *until = Some(Instant::now() + pause);
        }
    }
}

/// Scoped permit from a [`ConcurrencyGate`].
pub struct GatePermit<'a> {
    _permit: SemaphorePermit<'a>,
    gate: &'a ConcurrencyGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.record_completion();
    }
}
