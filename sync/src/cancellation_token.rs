//! Cancellation requests and the handles that observe them.
//!
//! A [`CancellationSource`] owns a cancellation domain. Cloning the source,
//! or any [`CancellationToken`] taken from it, shares the same domain; a
//! [`request_stop`](CancellationSource::request_stop) through any clone is
//! visible through all of them, forever.
//!
//! # Example
//!
//! ```
//! use stopgap_sync::CancellationSource;
//!
//! let source = CancellationSource::new();
//! let token = source.token();
//!
//! assert!(!token.stop_requested());
//! assert!(source.request_stop());
//! assert!(token.stop_requested());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::atomic_arc::AtomicArc;
use crate::cancellation_state::CancellationState;

/// Observer half of a cancellation domain.
///
/// A token is either attached to a domain or [`disabled`](Self::disabled).
/// A disabled token reports that cancellation is impossible and never
/// becomes stop-requested. Tokens are handed to the code doing the work;
/// only a [`CancellationSource`] can request a stop.
pub struct CancellationToken {
    state: AtomicArc<CancellationState>,
}

impl CancellationToken {
    /// A token that can never become stop-requested.
    pub fn disabled() -> Self {
        Self {
            state: AtomicArc::empty(),
        }
    }

    pub(crate) fn from_state(state: Option<Arc<CancellationState>>) -> Self {
        Self {
            state: AtomicArc::new(state),
        }
    }

    pub(crate) fn state(&self) -> Option<Arc<CancellationState>> {
        self.state.load()
    }

    /// Whether this token is attached to a domain at all.
    pub fn stop_possible(&self) -> bool {
        self.state.load().is_some()
    }

    /// Whether a stop has been requested. Always false for a disabled
    /// token.
    pub fn stop_requested(&self) -> bool {
        self.state.load().is_some_and(|state| state.stop_requested())
    }

    /// Exchanges the domains of two tokens.
    pub fn swap(&self, other: &Self) {
        self.state.swap(&other.state);
    }
}

impl Clone for CancellationToken {
    fn clone(&self) -> Self {
        Self::from_state(self.state.load())
    }
}

impl Default for CancellationToken {
    /// Equivalent to [`CancellationToken::disabled`].
    fn default() -> Self {
        Self::disabled()
    }
}

impl PartialEq for CancellationToken {
    /// Two tokens are equal when they observe the same domain. Disabled
    /// tokens are all equal to each other.
    fn eq(&self, other: &Self) -> bool {
        AtomicArc::ptr_eq(&self.state.load(), &other.state.load())
    }
}

impl Eq for CancellationToken {}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("stop_possible", &self.stop_possible())
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// Owner half of a cancellation domain.
///
/// Every clone of a source can request a stop for the whole domain. The
/// request is one-way and permanent.
#[derive(Clone, PartialEq, Eq)]
pub struct CancellationSource {
    token: CancellationToken,
}

impl CancellationSource {
    /// A source owning a fresh domain.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::from_state(Some(Arc::new(CancellationState::new()))),
        }
    }

    /// A source with no domain. Its tokens are disabled and
    /// [`request_stop`](Self::request_stop) reports failure.
    pub fn disabled() -> Self {
        Self {
            token: CancellationToken::disabled(),
        }
    }

    /// A token observing this source's domain.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Requests a stop.
    ///
    /// Returns `false` only for a [`disabled`](Self::disabled) source. Every
    /// call on a live source returns `true`, including calls after the
    /// first; the callbacks still run only once.
    pub fn request_stop(&self) -> bool {
        match self.token.state() {
            Some(state) => {
                state.request_stop();
                true
            }
            None => false,
        }
    }

    /// Whether a stop has been requested on this domain.
    pub fn stop_requested(&self) -> bool {
        self.token.stop_requested()
    }

    /// Whether this source has a domain to stop.
    pub fn stop_possible(&self) -> bool {
        self.token.stop_possible()
    }

    /// Exchanges the domains of two sources.
    pub fn swap(&self, other: &Self) {
        self.token.swap(&other.token);
    }
}

impl Default for CancellationSource {
    /// Equivalent to [`CancellationSource::new`].
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("stop_possible", &self.stop_possible())
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}
