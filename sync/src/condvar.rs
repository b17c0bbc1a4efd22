//! A condition variable whose waits can also be ended by cancellation.
//!
//! [`InterruptibleCondvar`] pairs a native condition variable with its own
//! internal mutex, separate from whatever lock the caller's data lives
//! under. Every wait acquires the internal mutex before releasing the
//! caller's lock, and every wakeup, whether from
//! [`notify_one`](InterruptibleCondvar::notify_one),
//! [`notify_all`](InterruptibleCondvar::notify_all), or a stop request,
//! acquires it before signalling. A wakeup sent after a waiter has
//! committed to sleeping therefore cannot be lost.
//!
//! The waits take any [`lock_api::MutexGuard`], which covers `parking_lot`
//! guards directly.
//!
//! # Example
//!
//! ```
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//! use stopgap_sync::{CancellationSource, InterruptibleCondvar};
//!
//! let slot = Arc::new(Mutex::new(None));
//! let cv = Arc::new(InterruptibleCondvar::new());
//! let source = CancellationSource::new();
//!
//! let consumer = {
//!     let (slot, cv, token) = (slot.clone(), cv.clone(), source.token());
//!     std::thread::spawn(move || {
//!         let mut guard = slot.lock();
//!         if cv.wait_while_or_stopped(&mut guard, &token, |s| s.is_none()) {
//!             guard.take()
//!         } else {
//!             None
//!         }
//!     })
//! };
//!
//! *slot.lock() = Some(42);
//! cv.notify_one();
//! assert_eq!(consumer.join().unwrap(), Some(42));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use lock_api::{MutexGuard, RawMutex};

use crate::cancellation_callback::CancellationCallback;
use crate::cancellation_token::CancellationToken;

struct Inner {
    mutex: parking_lot::Mutex<()>,
    condvar: parking_lot::Condvar,
}

impl Inner {
    fn notify_one(&self) {
        let _held = self.mutex.lock();
        self.condvar.notify_one();
    }

    fn notify_all(&self) {
        let _held = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// A condition variable that waits on a caller-supplied lock and wakes on
/// a signal, a deadline, or a cancellation request.
///
/// The `_while` waits take a condition on the guarded data and block while
/// it holds, re-checking under the caller's lock after every wakeup, so
/// spurious wakeups are absorbed. The `_or_stopped` waits additionally end
/// early when the given token's domain is stopped, returning `false`; all
/// predicate waits return `true` once the condition has cleared.
pub struct InterruptibleCondvar {
    inner: Arc<Inner>,
}

/// Whether a timed wait returned because its deadline passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitTimeoutResult(bool);

impl WaitTimeoutResult {
    pub fn timed_out(&self) -> bool {
        self.0
    }
}

impl InterruptibleCondvar {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                mutex: parking_lot::Mutex::new(()),
                condvar: parking_lot::Condvar::new(),
            }),
        }
    }

    /// Blocks until notified.
    ///
    /// The internal mutex is acquired before the caller's lock is released
    /// and handed to the condition variable, so a notification sent once
    /// this call has started cannot slip by unobserved. On wakeup the
    /// internal mutex is released before the caller's lock is re-acquired.
    ///
    /// Wakeups may be spurious; callers re-check their condition or use
    /// [`wait_while`](Self::wait_while).
    pub fn wait<R, T>(&self, guard: &mut MutexGuard<'_, R, T>)
    where
        R: RawMutex,
        T: ?Sized,
    {
        let mut held = self.inner.mutex.lock();
        MutexGuard::unlocked(guard, || {
            self.inner.condvar.wait(&mut held);
            drop(held);
        });
    }

    /// Blocks while `condition` holds for the guarded data.
    pub fn wait_while<R, T, F>(&self, guard: &mut MutexGuard<'_, R, T>, mut condition: F)
    where
        R: RawMutex,
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            self.wait(guard);
        }
    }

    /// Blocks until notified or `deadline` passes.
    pub fn wait_until<R, T>(
        &self,
        guard: &mut MutexGuard<'_, R, T>,
        deadline: Instant,
    ) -> WaitTimeoutResult
    where
        R: RawMutex,
        T: ?Sized,
    {
        let mut held = self.inner.mutex.lock();
        let timed_out = MutexGuard::unlocked(guard, || {
            let result = self.inner.condvar.wait_until(&mut held, deadline);
            drop(held);
            result.timed_out()
        });
        WaitTimeoutResult(timed_out)
    }

    /// Blocks until notified or `timeout` elapses.
    pub fn wait_for<R, T>(
        &self,
        guard: &mut MutexGuard<'_, R, T>,
        timeout: Duration,
    ) -> WaitTimeoutResult
    where
        R: RawMutex,
        T: ?Sized,
    {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_until(guard, deadline),
            // A timeout too large to represent is an unbounded wait.
            None => {
                self.wait(guard);
                WaitTimeoutResult(false)
            }
        }
    }

    /// Blocks while `condition` holds, giving up once `deadline` passes.
    ///
    /// Keeps waiting after spurious or unrelated wakeups until the
    /// condition clears or the deadline is reached. Returns `true` if the
    /// condition cleared, `false` if the deadline passed with the condition
    /// still holding at the final re-check.
    pub fn wait_while_until<R, T, F>(
        &self,
        guard: &mut MutexGuard<'_, R, T>,
        deadline: Instant,
        mut condition: F,
    ) -> bool
    where
        R: RawMutex,
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut **guard) {
            if self.wait_until(guard, deadline).timed_out() {
                return !condition(&mut **guard);
            }
        }
        true
    }

    /// Blocks while `condition` holds, giving up once `timeout` elapses.
    pub fn wait_while_for<R, T, F>(
        &self,
        guard: &mut MutexGuard<'_, R, T>,
        timeout: Duration,
        condition: F,
    ) -> bool
    where
        R: RawMutex,
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_while_until(guard, deadline, condition),
            None => {
                self.wait_while(guard, condition);
                true
            }
        }
    }

    /// Blocks while `condition` holds, unless `token` is stopped first.
    ///
    /// Returns `true` once the condition has cleared. Returns `false` when
    /// the stop is observed with the condition still holding; a stop
    /// requested before the call returns the condition's current state
    /// without blocking. The registered stop wakeup notifies all waiters,
    /// so every wait parked on this variable gets a chance to notice its
    /// token.
    pub fn wait_while_or_stopped<R, T, F>(
        &self,
        guard: &mut MutexGuard<'_, R, T>,
        token: &CancellationToken,
        mut condition: F,
    ) -> bool
    where
        R: RawMutex,
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        if token.stop_requested() {
            return !condition(&mut **guard);
        }
        let _wake_on_stop = self.stop_waker(token);
        while condition(&mut **guard) {
            let mut held = self.inner.mutex.lock();
            if token.stop_requested() {
                return false;
            }
            MutexGuard::unlocked(guard, || {
                self.inner.condvar.wait(&mut held);
                drop(held);
            });
        }
        true
    }

    /// Blocks while `condition` holds, unless `token` is stopped or
    /// `deadline` passes first.
    ///
    /// Returns `false` when the stop is observed before the caller's lock
    /// is released. After a wakeup at the deadline, or one that raced a
    /// stop, the condition is re-checked under the caller's lock and its
    /// negation returned.
    pub fn wait_while_until_or_stopped<R, T, F>(
        &self,
        guard: &mut MutexGuard<'_, R, T>,
        token: &CancellationToken,
        deadline: Instant,
        mut condition: F,
    ) -> bool
    where
        R: RawMutex,
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        if token.stop_requested() {
            return !condition(&mut **guard);
        }
        let _wake_on_stop = self.stop_waker(token);
        while condition(&mut **guard) {
            let mut held = self.inner.mutex.lock();
            if token.stop_requested() {
                return false;
            }
            let timed_out = MutexGuard::unlocked(guard, || {
                let result = self.inner.condvar.wait_until(&mut held, deadline);
                drop(held);
                result.timed_out()
            });
            if timed_out || token.stop_requested() {
                return !condition(&mut **guard);
            }
        }
        true
    }

    /// Blocks while `condition` holds, unless `token` is stopped or
    /// `timeout` elapses first.
    pub fn wait_while_for_or_stopped<R, T, F>(
        &self,
        guard: &mut MutexGuard<'_, R, T>,
        token: &CancellationToken,
        timeout: Duration,
        condition: F,
    ) -> bool
    where
        R: RawMutex,
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.wait_while_until_or_stopped(guard, token, deadline, condition),
            None => self.wait_while_or_stopped(guard, token, condition),
        }
    }

    /// Wakes one waiter.
    ///
    /// The signal is raised while holding the internal mutex. That
    /// acquisition is what orders the signal against waiters that have
    /// already released their caller's lock but not yet parked; skipping it
    /// would let such a waiter sleep through the notification.
    pub fn notify_one(&self) {
        self.inner.notify_one();
    }

    /// Wakes every current waiter. Ordered like
    /// [`notify_one`](Self::notify_one).
    pub fn notify_all(&self) {
        self.inner.notify_all();
    }

    /// A callback that wakes every waiter when `token`'s domain stops.
    fn stop_waker(&self, token: &CancellationToken) -> CancellationCallback {
        let inner = self.inner.clone();
        CancellationCallback::new(token, move || inner.notify_all())
    }
}

impl Default for InterruptibleCondvar {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptibleCondvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad("InterruptibleCondvar { .. }")
    }
}
