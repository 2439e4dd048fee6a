//! Shared latest-value cell.
//!
//! The processing loop (or the relay's receive loop) is the single writer;
//! each streaming response is a reader. `publish` swaps the whole value, so
//! a reader always observes either a fully old or fully new frame/report
//! pair, never a mix. There is no history: a slow reader simply sees a newer
//! value on its next snapshot.

use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct StateCell<T> {
    inner: Arc<RwLock<Option<T>>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> StateCell<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Replace the current value. Whole-value swap; never partial.
    pub fn publish(&self, value: T) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(value);
    }

    /// Clone of the current value, or None before the first publish.
    pub fn snapshot(&self) -> Option<T> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_empty_and_snapshots_latest() {
        let cell: StateCell<u32> = StateCell::new();
        assert_eq!(cell.snapshot(), None);
        cell.publish(1);
        cell.publish(2);
        assert_eq!(cell.snapshot(), Some(2));
    }

    #[test]
    fn readers_never_see_a_torn_pair() {
        let cell: StateCell<(u64, u64)> = StateCell::new();
        let writer = cell.clone();
        let handle = thread::spawn(move || {
            for i in 0..1000u64 {
                writer.publish((i, i));
            }
        });
        for _ in 0..1000 {
            if let Some((a, b)) = cell.snapshot() {
                assert_eq!(a, b);
            }
        }
        handle.join().unwrap();
    }
}
