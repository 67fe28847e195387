use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

/// Why a [`StopWaiter::wait`] call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Auto-reset binary signal with a timed wait, used for cooperative task
/// cancellation.
///
/// A call to [`StopWaiter::signal`] wakes exactly one waiter, either one
/// already blocked in [`StopWaiter::wait`] or the next one to arrive, and the
/// waiter that observes the signal consumes it. A broadcast would not be
/// equivalent: it could wake a loop more than once per signal.
#[derive(Debug, Default)]
pub struct StopWaiter {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl StopWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake one waiter. The signal persists until consumed, so signaling
    /// before anyone is waiting is not lost.
    pub fn signal(&self) {
        let mut signaled = lock_ignoring_poison(&self.signaled);
        *signaled = true;
        self.condvar.notify_one();
    }

    /// Block until signaled or until `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut signaled = lock_ignoring_poison(&self.signaled);
        while !*signaled {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return WaitOutcome::TimedOut;
            };
            signaled = match self.condvar.wait_timeout(signaled, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *signaled = false;
        WaitOutcome::Signaled
    }
}

// No code panics while holding the lock, so poisoning is unreachable; a
// poisoned flag is still a plain bool and safe to reuse.
fn lock_ignoring_poison(mutex: &Mutex<bool>) -> MutexGuard<'_, bool> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
