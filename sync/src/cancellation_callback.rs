use std::sync::Arc;

use crate::cancellation_state::CancellationState;
use crate::cancellation_token::CancellationToken;

/// Runs a closure exactly once when cancellation is requested.
///
/// Construction either registers the closure or, if cancellation has
/// already been requested or never can be, runs it synchronously before
/// returning. A registered closure runs on the thread calling
/// [`request_stop`](crate::CancellationSource::request_stop), in
/// registration order with its peers. However registration, cancellation,
/// and drop interleave, the closure runs at most once, and never after a
/// drop that deregistered it.
///
/// The closure must not request a stop on its own domain; that request
/// would re-enter the registry lock the running drain already holds.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use stopgap_sync::{CancellationCallback, CancellationSource};
///
/// let source = CancellationSource::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let armed = {
///     let fired = fired.clone();
///     CancellationCallback::new(&source.token(), move || {
///         fired.store(true, Ordering::Release);
///     })
/// };
///
/// source.request_stop();
/// assert!(fired.load(Ordering::Acquire));
/// drop(armed);
/// ```
#[must_use = "the closure is deregistered as soon as this handle drops"]
pub struct CancellationCallback {
    registration: Option<(Arc<CancellationState>, usize)>,
}

impl CancellationCallback {
    /// Arms `callback` against `token`.
    pub fn new<F>(token: &CancellationToken, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(state) = token.state() else {
            callback();
            return Self { registration: None };
        };
        if state.stop_requested() {
            callback();
            return Self { registration: None };
        }
        let armed = {
            let mut list = state.lock_callbacks();
            if state.stop_requested() {
                Err(callback)
            } else {
                Ok(list.register(Box::new(callback)))
            }
        };
        match armed {
            Ok(id) => Self {
                registration: Some((state, id)),
            },
            Err(callback) => {
                // Lost the race to a concurrent stop; the drain never saw
                // this closure, so it runs here instead.
                callback();
                Self { registration: None }
            }
        }
    }
}

impl Drop for CancellationCallback {
    /// Deregisters the closure if it has not run.
    ///
    /// Once the stop flag is visible the registry is left alone entirely;
    /// the closure has either run or is being run by the drain. That makes
    /// it safe to drop one of these from inside another cancellation
    /// callback.
    fn drop(&mut self) {
        let Some((state, id)) = self.registration.take() else {
            return;
        };
        if state.stop_requested() {
            return;
        }
        let mut list = state.lock_callbacks();
        if !state.stop_requested() {
            list.deregister(id);
        }
    }
}

impl std::fmt::Debug for CancellationCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationCallback")
            .field("registered", &self.registration.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation_token::CancellationSource;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    fn counting(count: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let count = count.clone();
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_immediately_when_cancellation_impossible() {
        let count = Arc::new(AtomicUsize::new(0));
        let armed = CancellationCallback::new(&CancellationToken::disabled(), counting(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(armed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runs_immediately_when_already_stopped() {
        let source = CancellationSource::new();
        source.request_stop();

        let count = Arc::new(AtomicUsize::new(0));
        let armed = CancellationCallback::new(&source.token(), counting(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(armed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runs_once_on_stop_and_not_again() {
        let source = CancellationSource::new();
        let count = Arc::new(AtomicUsize::new(0));
        let armed = CancellationCallback::new(&source.token(), counting(&count));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(source.request_stop());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(source.request_stop());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(armed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_callback_does_not_run() {
        let source = CancellationSource::new();
        let count = Arc::new(AtomicUsize::new(0));
        drop(CancellationCallback::new(&source.token(), counting(&count)));

        source.request_stop();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn every_callback_runs_exactly_once_across_racing_registration() {
        for _ in 0..50 {
            let source = CancellationSource::new();
            let count = Arc::new(AtomicUsize::new(0));
            let (tx, rx) = mpsc::channel();

            thread::scope(|s| {
                for _ in 0..4 {
                    let token = source.token();
                    let tx = tx.clone();
                    let count = count.clone();
                    s.spawn(move || {
                        for _ in 0..2 {
                            let armed = CancellationCallback::new(&token, counting(&count));
                            tx.send(armed).unwrap();
                        }
                    });
                }
                s.spawn(|| {
                    assert!(source.request_stop());
                });
            });
            drop(tx);

            // Every handle is still alive in the channel, so each closure
            // was either drained by the stop or ran inline at registration.
            let held: Vec<_> = rx.into_iter().collect();
            assert_eq!(count.load(Ordering::SeqCst), 8);
            drop(held);
            assert_eq!(count.load(Ordering::SeqCst), 8);
        }
    }

    #[test]
    fn concurrent_drops_never_deadlock_or_double_run() {
        for _ in 0..50 {
            let source = CancellationSource::new();
            let token = source.token();
            let flags: Vec<_> = (0..8).map(|_| Arc::new(AtomicBool::new(false))).collect();
            let mut kept: Vec<_> = flags
                .iter()
                .map(|flag| {
                    let flag = flag.clone();
                    CancellationCallback::new(&token, move || {
                        assert!(!flag.swap(true, Ordering::SeqCst));
                    })
                })
                .collect();
            let dropped = kept.split_off(4);

            thread::scope(|s| {
                s.spawn(move || drop(dropped));
                s.spawn(|| {
                    assert!(source.request_stop());
                });
            });

            for flag in &flags[..4] {
                assert!(flag.load(Ordering::SeqCst));
            }
            drop(kept);
            for flag in &flags[..4] {
                assert!(flag.load(Ordering::SeqCst));
            }
        }
    }

    #[test]
    fn callbacks_can_arm_and_drop_peers_during_a_drain() {
        let source = CancellationSource::new();
        let token = source.token();
        let inner_fired = Arc::new(AtomicBool::new(false));

        let _outer = {
            let token = token.clone();
            let inner_fired = inner_fired.clone();
            CancellationCallback::new(&source.token(), move || {
                let inner_fired = inner_fired.clone();
                let inner = CancellationCallback::new(&token, move || {
                    inner_fired.store(true, Ordering::SeqCst);
                });
                drop(inner);
            })
        };

        source.request_stop();
        assert!(inner_fired.load(Ordering::SeqCst));
    }
}
