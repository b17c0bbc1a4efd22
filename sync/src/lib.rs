//! Cooperative cancellation and interruptible synchronization primitives
//! for native threads.
//!
//! Features:
//! - A [`CancellationSource`]/[`CancellationToken`] pair: any clone of the
//!   source can request a stop, and every token from the same domain
//!   observes it forever.
//! - [`CancellationCallback`]s that run exactly once when a stop is
//!   requested, however registration and cancellation interleave.
//! - An [`InterruptibleCondvar`] whose waits wake on a signal, a deadline,
//!   or a stop request, without missed wakeups, over any
//!   [`lock_api`]-compatible mutex guard.
//! - [`InterruptibleThread`], a thread handle that requests a stop and
//!   joins when dropped.
//! - [`AtomicArc`], the lock-free shared-ownership slot the handles above
//!   are built on.
//!
//! Everything here targets plain OS threads and blocking waits; there is
//! no async runtime involved.
//!
//! # Example
//!
//! ```
//! use stopgap_sync::{CancellationCallback, CancellationSource};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let source = CancellationSource::new();
//! let woken = Arc::new(AtomicBool::new(false));
//! let _armed = {
//!     let woken = woken.clone();
//!     CancellationCallback::new(&source.token(), move || {
//!         woken.store(true, Ordering::Release);
//!     })
//! };
//!
//! source.request_stop();
//! assert!(woken.load(Ordering::Acquire));
//! ```

mod atomic_arc;
mod cancellation_callback;
mod cancellation_state;
mod cancellation_token;
mod condvar;
mod thread;

pub use atomic_arc::*;
pub use cancellation_callback::*;
pub use cancellation_token::*;
pub use condvar::*;
pub use thread::*;


/// Number of hardware threads the host can run in parallel, with a floor
/// of one when it cannot be determined.
pub fn available_parallelism() -> std::num::NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(std::num::NonZeroUsize::MIN)
}
