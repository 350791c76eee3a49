//! Shared recorder for values observed inside stage closures.

use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct Recorded<T> {
    value: Option<T>,
    count: usize,
}

/// Records the last value set and how many times it was set.
///
/// Clones share the same slot, so a clone can move into a closure while the
/// test keeps the original for assertions.
#[derive(Debug)]
pub struct Probe<T> {
    slot: Arc<Mutex<Recorded<T>>>,
}

impl<T> Clone for Probe<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for Probe<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Recorded {
                value: None,
                count: 0,
            })),
        }
    }
}

impl<T: Clone> Probe<T> {
    /// Creates an empty probe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any earlier one.
    pub fn set(&self, value: T) {
        let mut slot = self.slot.lock();
        slot.value = Some(value);
        slot.count += 1;
    }

    /// Returns the last stored value.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.slot.lock().value.clone()
    }

    /// Removes and returns the stored value; the count is kept.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().value.take()
    }

    /// Returns true if a value is stored.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.slot.lock().value.is_some()
    }

    /// Returns how many times [`set`](Self::set) was called.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.slot.lock().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_records_last_value() {
        let probe = Probe::new();
        assert!(!probe.is_set());

        let clone = probe.clone();
        clone.set(1);
        clone.set(2);

        assert_eq!(probe.get(), Some(2));
        assert_eq!(probe.set_count(), 2);
        assert_eq!(probe.take(), Some(2));
        assert!(!probe.is_set());
        assert_eq!(probe.set_count(), 2);
    }
}
