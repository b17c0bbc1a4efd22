use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) type BoxedCallback = Box<dyn FnOnce() + Send>;

/// Shared core of one cancellation domain: the latching stop flag plus the
/// callbacks to run when it latches.
pub(crate) struct CancellationState {
    stop_requested: AtomicBool,
    callbacks: Mutex<CallbackList>,
}

/// Registered callbacks in registration order.
///
/// Only reachable through the guard returned by
/// [`CancellationState::lock_callbacks`]. [`register`](Self::register) and
/// [`deregister`](Self::deregister) never take the lock themselves; the
/// caller owns it for the whole check-then-mutate sequence.
pub(crate) struct CallbackList {
    next_id: usize,
    entries: Vec<(usize, BoxedCallback)>,
}

impl CancellationState {
    pub(crate) fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            callbacks: Mutex::new(CallbackList {
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Latches the stop flag, then removes and runs every registered
    /// callback in registration order while holding the list lock.
    ///
    /// Redundant calls take and release the lock, find the list empty, and
    /// do nothing else.
    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        let mut callbacks = self.callbacks.lock();
        for (_, callback) in callbacks.entries.drain(..) {
            callback();
        }
    }

    pub(crate) fn lock_callbacks(&self) -> MutexGuard<'_, CallbackList> {
        self.callbacks.lock()
    }
}

impl CallbackList {
    pub(crate) fn register(&mut self, callback: BoxedCallback) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, callback));
        id
    }

    pub(crate) fn deregister(&mut self, id: usize) {
        self.entries.retain(|(entry, _)| *entry != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn drain_runs_in_registration_order_and_clears() {
        let state = CancellationState::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            state
                .lock_callbacks()
                .register(Box::new(move || order.lock().push(i)));
        }

        assert!(!state.stop_requested());
        state.request_stop();
        assert!(state.stop_requested());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(state.lock_callbacks().entries.is_empty());
    }

    #[test]
    fn redundant_stop_does_not_rerun_callbacks() {
        let state = CancellationState::new();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            state.lock_callbacks().register(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        state.request_stop();
        state.request_stop();
        state.request_stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(state.stop_requested());
    }

    #[test]
    fn deregistered_callback_never_runs() {
        let state = CancellationState::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = {
            let count = count.clone();
            state.lock_callbacks().register(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }))
        };
        state.lock_callbacks().deregister(id);

        state.request_stop();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn registration_ids_are_unique() {
        let state = CancellationState::new();
        let mut list = state.lock_callbacks();
        let a = list.register(Box::new(|| {}));
        let b = list.register(Box::new(|| {}));
        assert_ne!(a, b);
        list.deregister(a);
        assert_eq!(list.entries.len(), 1);
    }
}
