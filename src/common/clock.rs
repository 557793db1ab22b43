//! Lamport logical clock
//!
//! Every node owns one clock. The leader stamps admitted operations with
//! [`LamportClock::tick`]; replicas fold incoming order keys in with
//! [`LamportClock::merge`]. Values saturate at `u64::MAX`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LamportClock {
    value: AtomicU64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::with_value(0)
    }

    pub fn with_value(value: u64) -> Self {
        Self {
            value: AtomicU64::new(value),
        }
    }

    /// Advance the clock for a local event and return the new value.
    pub fn tick(&self) -> u64 {
        self.update(|current| current.saturating_add(1))
    }

    /// Set the clock to `max(local, remote) + 1` and return the new value.
    pub fn merge(&self, remote: u64) -> u64 {
        self.update(|current| current.max(remote).saturating_add(1))
    }

    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    fn update(&self, f: impl Fn(u64) -> u64) -> u64 {
        let previous = self
            .value
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(f(v)))
            .unwrap_or_else(|v| v);
        f(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_tick() {
        let clock = LamportClock::new();
        assert_eq!(clock.current(), 0);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.current(), 2);
    }

    #[test]
    fn test_merge() {
        let clock = LamportClock::with_value(5);
        assert_eq!(clock.merge(2), 6);
        assert_eq!(clock.merge(10), 11);
        assert_eq!(clock.merge(11), 12);
    }

    #[test]
    fn test_saturates() {
        let clock = LamportClock::with_value(u64::MAX);
        assert_eq!(clock.tick(), u64::MAX);
        assert_eq!(clock.merge(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_concurrent_ticks_are_unique() {
        let clock = Arc::new(LamportClock::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let clock = clock.clone();
                std::thread::spawn(move || (0..250).map(|_| clock.tick()).collect::<Vec<_>>())
            })
            .collect();

        let mut values: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 1000);
        assert_eq!(clock.current(), 1000);
    }

    proptest! {
        #[test]
        fn clock_never_decreases(events in prop::collection::vec(prop::option::of(any::<u64>()), 1..64)) {
            let clock = LamportClock::new();
            let mut last = clock.current();
            for event in events {
                let next = match event {
                    None => clock.tick(),
                    Some(remote) => clock.merge(remote),
                };
                prop_assert!(next >= last);
                if last < u64::MAX {
                    prop_assert!(next > last);
                }
                last = next;
            }
        }
    }
}
