use std::cell::{Cell, RefCell};

/// Tag of one recomputation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    /// Numeric value of the tag.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Issues monotonically increasing generations.
#[derive(Debug, Default)]
pub struct PassTracker {
    latest: Cell<u64>,
}

impl PassTracker {
    /// Creates a tracker that has not issued any generation.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest: Cell::new(0),
        }
    }

    /// Starts a new pass, superseding every pass issued before it.
    pub fn begin(&self) -> Generation {
        let next = self.latest.get().wrapping_add(1);
        self.latest.set(next);
        Generation(next)
    }

    /// Reports whether no pass was started after `generation`.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.latest.get() == generation.0
    }
}

/// Latest result published by a pass.
#[derive(Debug)]
pub struct Published<T> {
    slot: RefCell<Option<(Generation, T)>>,
}

impl<T> Default for Published<T> {
    fn default() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }
}

impl<T> Published<T> {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` unless a result of the same or a newer generation is
    /// already published. Returns whether the value was stored.
    pub fn publish(&self, generation: Generation, value: T) -> bool {
        let mut slot = self.slot.borrow_mut();
        if slot
            .as_ref()
            .is_some_and(|(published, _)| *published >= generation)
        {
            return false;
        }
        *slot = Some((generation, value));
        true
    }

    /// Generation of the published result.
    #[must_use]
    pub fn generation(&self) -> Option<Generation> {
        self.slot.borrow().as_ref().map(|(generation, _)| *generation)
    }

    /// Runs `read` against the published result.
    pub fn with<R>(&self, read: impl FnOnce(Option<&T>) -> R) -> R {
        let slot = self.slot.borrow();
        read(slot.as_ref().map(|(_, value)| value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_latest_generation_is_current() {
        let tracker = PassTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();

        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));
        assert!(first < second);
    }

    #[test]
    fn older_results_never_replace_newer_ones() {
        let tracker = PassTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        let published = Published::new();

        assert!(published.publish(second, "second"));
        assert!(!published.publish(first, "first"));

        assert_eq!(published.generation(), Some(second));
        assert_eq!(published.with(|value| value.copied()), Some("second"));
    }
}
