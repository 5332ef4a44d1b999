use std::time::Duration;

/// Coalesces a burst of notifications into a single firing.
///
/// Holds at most one pending deadline. Every [`poke`](Self::poke) pushes the
/// deadline to `now + window`; [`poll`](Self::poll) fires once the deadline
/// has passed and clears it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Duration>,
}

impl Debouncer {
    /// Creates an idle debouncer with the provided quiet window.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Quiet window that must elapse after the last poke.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Deadline of the pending firing, if any.
    #[must_use]
    pub const fn pending(&self) -> Option<Duration> {
        self.deadline
    }

    /// Records a notification, restarting the quiet window.
    pub fn poke(&mut self, now: Duration) {
        self.deadline = Some(now.saturating_add(self.window));
    }

    /// Reports whether the quiet window elapsed, consuming the pending firing.
    pub fn poll(&mut self, now: Duration) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drops the pending firing.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn burst_fires_once_after_the_last_poke() {
        let mut debouncer = Debouncer::new(ms(300));

        debouncer.poke(ms(0));
        debouncer.poke(ms(120));
        debouncer.poke(ms(250));

        assert!(!debouncer.poll(ms(549)));
        assert!(debouncer.poll(ms(550)));
        assert!(!debouncer.poll(ms(900)));
    }

    #[test]
    fn idle_debouncer_never_fires() {
        let mut debouncer = Debouncer::new(ms(300));

        assert!(!debouncer.poll(ms(10_000)));
        assert_eq!(debouncer.pending(), None);
    }

    #[test]
    fn cancel_drops_the_pending_firing() {
        let mut debouncer = Debouncer::new(ms(300));
        debouncer.poke(ms(0));

        debouncer.cancel();

        assert!(!debouncer.poll(ms(1_000)));
    }
}
