//! A nullable, atomically swappable [`Arc`] slot.

use std::sync::Arc;

/// A shared-ownership slot that can be read and replaced concurrently
/// without locking.
///
/// The slot holds `None` or an [`Arc<T>`]. [`load`](Self::load) always
/// returns a fully valid value that stays alive for as long as the caller
/// holds it, even if the slot is overwritten in the meantime. Writers never
/// block readers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use stopgap_sync::AtomicArc;
///
/// let slot = AtomicArc::new(Some(Arc::new("first")));
/// let seen = slot.load();
/// slot.store(Some(Arc::new("second")));
/// // The earlier load is unaffected by the store.
/// assert_eq!(*seen.unwrap(), "first");
/// ```
pub struct AtomicArc<T> {
    cell: arc_swap::ArcSwapOption<T>,
}

impl<T> AtomicArc<T> {
    /// Creates a slot holding `value`.
    pub fn new(value: Option<Arc<T>>) -> Self {
        Self {
            cell: arc_swap::ArcSwapOption::new(value),
        }
    }

    /// Creates a slot holding `None`.
    pub fn empty() -> Self {
        Self {
            cell: arc_swap::ArcSwapOption::empty(),
        }
    }

    /// Returns the current value.
    pub fn load(&self) -> Option<Arc<T>> {
        self.cell.load_full()
    }

    /// Replaces the current value.
    pub fn store(&self, value: Option<Arc<T>>) {
        self.cell.store(value);
    }

    /// Replaces the current value, returning the previous one.
    pub fn exchange(&self, value: Option<Arc<T>>) -> Option<Arc<T>> {
        self.cell.swap(value)
    }

    /// Stores `new` only if the slot still holds `current`, compared by
    /// pointer identity.
    ///
    /// On success returns the replaced value, on failure the value that was
    /// observed instead.
    pub fn compare_exchange(
        &self,
        current: &Option<Arc<T>>,
        new: Option<Arc<T>>,
    ) -> Result<Option<Arc<T>>, Option<Arc<T>>> {
        let previous = arc_swap::Guard::into_inner(self.cell.compare_and_swap(current, new));
        if Self::ptr_eq(&previous, current) {
            Ok(previous)
        } else {
            Err(previous)
        }
    }

    /// Like [`compare_exchange`](Self::compare_exchange). The underlying
    /// compare-and-swap never fails spuriously, so this delegates to the
    /// strong form.
    pub fn compare_exchange_weak(
        &self,
        current: &Option<Arc<T>>,
        new: Option<Arc<T>>,
    ) -> Result<Option<Arc<T>>, Option<Arc<T>>> {
        self.compare_exchange(current, new)
    }

    /// Whether two values refer to the same allocation, with `None` equal
    /// only to `None`.
    pub fn ptr_eq(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
        opt_ptr(a) == opt_ptr(b)
    }

    /// Atomically exchanges the contents of two slots.
    ///
    /// Neither slot ever holds a torn or freed value at any point, and
    /// concurrent loads on either side observe one of the in-flight values.
    /// The exchange retries while other writers interfere, so it is bounded
    /// only by contention. Swapping a slot with itself does nothing.
    pub fn swap(&self, other: &Self) {
        if std::ptr::eq(self, other) {
            return;
        }
        loop {
            let this_old = self.load();
            let other_old = other.load();
            if other.compare_exchange(&other_old, this_old.clone()).is_err() {
                continue;
            }
            if self.compare_exchange(&this_old, other_old.clone()).is_ok() {
                return;
            }
            // Undo the first half before retrying. Failure here means a
            // later writer owns the slot, and the retry re-reads anyway.
            let _ = other.compare_exchange(&this_old, other_old);
        }
    }
}

impl<T> Default for AtomicArc<T> {
    fn default() -> Self {
        Self::empty()
    }
}

fn opt_ptr<T>(value: &Option<Arc<T>>) -> *const T {
    value.as_ref().map_or(std::ptr::null(), Arc::as_ptr)
}
