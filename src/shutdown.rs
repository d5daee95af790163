//! Cooperative stop request for the capture loop.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Set once from a signal handler, observed by the loop between iterations.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: Mutex<bool>,
    wake: Condvar,
}

impl ShutdownSignal {
    /// A signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop and wake it if it is pacing.
    pub fn request(&self) {
        let mut requested = self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        *requested = true;
        self.wake.notify_all();
    }

    /// Whether a stop was requested.
    pub fn is_requested(&self) -> bool {
        *self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` or until a stop is requested.
    ///
    /// Returns `true` if a stop was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut requested = self.requested.lock().unwrap_or_else(PoisonError::into_inner);
        while !*requested {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            // Condvar waits can wake spuriously
            requested = self
                .wake
                .wait_timeout(requested, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *requested
    }
}
