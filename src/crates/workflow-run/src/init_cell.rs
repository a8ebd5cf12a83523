//! One-shot initialization cell for long-lived background tasks.

use parking_lot::Mutex;

/// Guards one-time initialization of a value under concurrency.
///
/// `init` runs its factory at most once across all callers; racing losers
/// return `false` without running their factory and observe the winner's
/// value from `get` as soon as their call returns. The run layer stores
/// [`Shared`](futures::future::Shared) task handles in these cells so that
/// every caller racing to start the run loop, or to dispose it, awaits the
/// same underlying task.
///
/// The factory must be synchronous and cheap (spawn a task, build a
/// future); it runs while the slot's lock is held.
#[derive(Debug, Default)]
pub struct InitCell<T> {
    slot: Mutex<Option<T>>,
}

impl<T> InitCell<T> {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Run `factory` and store its value, unless a value is already stored.
    ///
    /// Returns `true` if this call performed the initialization.
    pub fn init(&self, factory: impl FnOnce() -> T) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(factory());
        true
    }

    /// Return the initialized value, or `None` if `init` has not run yet.
    ///
    /// Never suspends; losers of an `init` race see `Some` because the
    /// winner stores its value before any `init` call returns.
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.slot.lock().clone()
    }
}
