//! Cancellable delayed and periodic callbacks.
//!
//! Components that need "do this later" semantics depend on this service
//! rather than on any particular thread or runtime. Each timer runs on its
//! own short-lived thread; cancellation is checked at fire time, so a
//! handle cancelled before the delay elapses suppresses the callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::clock::SharedClock;

/// Handle to a scheduled timer. Dropping the handle does not cancel the
/// timer; call [`TimerHandle::cancel`] to keep it from firing.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct TimerService {
    clock: SharedClock,
}

impl TimerService {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Run `f` once after `delay`, unless the handle is cancelled first.
    pub fn schedule<F>(&self, delay: Duration, f: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let clock = Arc::clone(&self.clock);

        thread::Builder::new()
            .name("timer".to_string())
            .spawn(move || {
                clock.sleep(delay);
                if !flag.load(Ordering::SeqCst) {
                    f();
                }
            })
            .expect("Failed to spawn timer thread");

        TimerHandle { cancelled }
    }

    /// Run `f` every `period` until the handle is cancelled. The first
    /// firing happens one full period after scheduling.
    pub fn schedule_periodic<F>(&self, period: Duration, mut f: F) -> TimerHandle
    where
        F: FnMut() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let clock = Arc::clone(&self.clock);

        thread::Builder::new()
            .name("timer".to_string())
            .spawn(move || loop {
                clock.sleep(period);
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                f();
            })
            .expect("Failed to spawn timer thread");

        TimerHandle { cancelled }
    }
}
