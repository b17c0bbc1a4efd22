//! Threads that are cancelled and joined when their handle drops.

use std::any::Any;
use std::fmt;
use std::thread;

use trace_err::*;
use tracing::error;

use crate::cancellation_token::{CancellationSource, CancellationToken};

/// Entry point accepted by [`InterruptibleThread::spawn`].
///
/// Implemented for `FnOnce(CancellationToken)`, which receives the thread's
/// own token, and for plain `FnOnce()`. Closures passed to `spawn` need the
/// token parameter's type spelled out for inference to pick the right form.
pub trait ThreadFn<Marker>: Send + 'static {
    fn run(self, token: CancellationToken);
}

/// Marker for entry points that take the thread's token.
pub enum TokenArg {}

/// Marker for entry points that ignore cancellation.
pub enum NoArg {}

impl<F> ThreadFn<TokenArg> for F
where
    F: FnOnce(CancellationToken) + Send + 'static,
{
    fn run(self, token: CancellationToken) {
        self(token)
    }
}

impl<F> ThreadFn<NoArg> for F
where
    F: FnOnce() + Send + 'static,
{
    fn run(self, _token: CancellationToken) {
        self()
    }
}

/// A thread handle that owns a [`CancellationSource`] for its thread.
///
/// Dropping the handle while the thread is still running requests a stop
/// and then joins, so the thread outlives the handle only through an
/// explicit [`detach`](Self::detach). The shutdown is cooperative: the
/// join lasts as long as the entry point takes to notice its token.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use stopgap_sync::{CancellationToken, InterruptibleThread};
///
/// let worker = InterruptibleThread::spawn(|token: CancellationToken| {
///     while !token.stop_requested() {
///         std::thread::sleep(Duration::from_millis(1));
///     }
/// });
/// // Requests the stop and joins.
/// drop(worker);
/// ```
pub struct InterruptibleThread {
    handle: Option<thread::JoinHandle<()>>,
    source: CancellationSource,
}

impl InterruptibleThread {
    /// Spawns a thread running `f` with a fresh cancellation domain.
    ///
    /// Panics if the operating system refuses to spawn a thread.
    pub fn spawn<Marker, F>(f: F) -> Self
    where
        F: ThreadFn<Marker>,
    {
        let source = CancellationSource::new();
        let token = source.token();
        let handle = thread::Builder::new()
            .spawn(move || f.run(token))
            .trace_expect("Failed to spawn thread");
        Self {
            handle: Some(handle),
            source,
        }
    }

    /// Whether there is a running thread to join or detach.
    pub fn joinable(&self) -> bool {
        self.handle.is_some()
    }

    /// Waits for the thread to finish without requesting a stop.
    ///
    /// An `Err` carries the thread's panic payload. Panics if there is no
    /// thread to join.
    pub fn join(&mut self) -> thread::Result<()> {
        self.handle
            .take()
            .trace_expect("Join of an empty thread handle")
            .join()
    }

    /// Lets the thread run on unobserved and disables this handle's
    /// cancellation domain.
    ///
    /// The thread keeps the token it was spawned with, but with the source
    /// gone nobody can stop it through this handle any more. Panics if
    /// there is no thread to detach.
    pub fn detach(&mut self) {
        drop(
            self.handle
                .take()
                .trace_expect("Detach of an empty thread handle"),
        );
        self.source = CancellationSource::disabled();
    }

    /// Requests a stop on the thread's domain.
    pub fn request_stop(&self) -> bool {
        self.source.request_stop()
    }

    /// A clone of the thread's cancellation source.
    pub fn stop_source(&self) -> CancellationSource {
        self.source.clone()
    }

    /// A token observing the thread's cancellation domain.
    pub fn stop_token(&self) -> CancellationToken {
        self.source.token()
    }

    /// The underlying [`std::thread::Thread`], while joinable.
    pub fn thread(&self) -> Option<&thread::Thread> {
        self.handle.as_ref().map(|handle| handle.thread())
    }
}

impl Default for InterruptibleThread {
    /// A handle with no thread and a disabled cancellation domain.
    fn default() -> Self {
        Self {
            handle: None,
            source: CancellationSource::disabled(),
        }
    }
}

impl Drop for InterruptibleThread {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.source.request_stop();
            if let Err(payload) = handle.join() {
                error!("Thread panicked: {}", panic_message(payload.as_ref()));
            }
        }
    }
}

impl fmt::Debug for InterruptibleThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptibleThread")
            .field("joinable", &self.joinable())
            .field("stop_possible", &self.source.stop_possible())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
