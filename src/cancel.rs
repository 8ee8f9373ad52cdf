//! Cooperative cancellation signal shared by every worker thread.
//!
//! Nothing is ever forcibly terminated: workers check the token at their
//! own safe points (the top of a control cycle, before each input read) and
//! sleep through [`CancelToken::sleep`], which wakes early on cancellation.
//!
//! ```rust
//! use std::time::Duration;
//! use bldc_supervisor::CancelToken;
//!
//! let token = CancelToken::new();
//! let worker = token.clone();
//!
//! let handle = std::thread::spawn(move || {
//!     let mut ticks = 0;
//!     while !worker.sleep(Duration::from_millis(5)) {
//!         ticks += 1;
//!     }
//!     ticks
//! });
//!
//! std::thread::sleep(Duration::from_millis(20));
//! token.cancel();
//! handle.join().unwrap();
//! assert!(token.is_cancelled());
//! ```

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Clonable cancellation flag with an interruptible sleep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every sleeper. Idempotent.
    pub fn cancel(&self) {
        let _guard = self.inner.lock.lock();
        if !self.inner.cancelled.swap(true, Ordering::AcqRel) {
            tracing::info!("cancellation requested");
        }
        self.inner.wake.notify_all();
    }

    /// Whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for up to `duration`, returning early on cancellation.
    ///
    /// Returns `true` if the token is cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.is_cancelled();
        }
        let mut guard = self.inner.lock.lock();
        self.inner
            .wake
            .wait_while_for(&mut guard, |_| !self.is_cancelled(), duration);
        self.is_cancelled()
    }
}
