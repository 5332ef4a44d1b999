#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Long-press recognizer that turns a sustained press on empty map area into
//! a create-tree intent.
//!
//! The machine is driven by timestamps supplied by the host: presses,
//! releases and cancellations carry the time they happened, and
//! [`GestureMachine::advance`] fires the dwell timer once its deadline has
//! passed. The timer lives inside the session, so ending the session removes
//! it and a cancelled press can never fire late.

use std::time::Duration;

use canopy_core::{Command, Coordinate, PointerKind};
use tracing::{debug, trace};

/// Press duration after which a press on empty map area becomes a long press.
pub const DEFAULT_DWELL: Duration = Duration::from_millis(1000);

/// Tunables of the gesture recognizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GestureConfig {
    /// Minimum sustained press that triggers a create intent.
    pub dwell: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            dwell: DEFAULT_DWELL,
        }
    }
}

/// Pointer-down observation handed to the machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Press {
    /// Time the press started.
    pub at: Duration,
    /// Device that pressed.
    pub kind: PointerKind,
    /// Whether the press landed on an existing point or cluster.
    pub over_feature: bool,
    /// Geographic coordinate under the pointer.
    pub coordinate: Coordinate,
}

/// Scheduled transition to a long press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DwellTimer {
    deadline: Duration,
}

impl DwellTimer {
    /// Time at which the timer fires.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// State of the single press currently in progress.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GestureSession {
    /// Time the press started.
    pub started_at: Duration,
    /// Device that pressed.
    pub kind: PointerKind,
    /// Whether the press landed on an existing feature.
    pub over_feature: bool,
    /// Coordinate under the pointer when the press started.
    pub coordinate: Coordinate,
    dwell_timer: Option<DwellTimer>,
}

impl GestureSession {
    /// Pending long-press timer, absent for presses over features.
    #[must_use]
    pub const fn dwell_timer(&self) -> Option<DwellTimer> {
        self.dwell_timer
    }
}

/// Coarse phase of the recognizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GesturePhase {
    /// No pointer is down.
    Idle,
    /// A press is in progress.
    Pressing,
}

/// How a press ended.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GestureResolution {
    /// Press over a feature was released; the detail handler takes over.
    Tap,
    /// Press on empty map area lasted the full dwell time.
    LongPress {
        /// Coordinate under the pointer when the press started.
        coordinate: Coordinate,
    },
    /// Press ended before anything fired.
    Cancelled,
}

/// Recognizer for tap versus long press.
#[derive(Clone, Debug, Default)]
pub struct GestureMachine {
    config: GestureConfig,
    session: Option<GestureSession>,
}

impl GestureMachine {
    /// Creates an idle recognizer.
    #[must_use]
    pub const fn new(config: GestureConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> GesturePhase {
        if self.session.is_some() {
            GesturePhase::Pressing
        } else {
            GesturePhase::Idle
        }
    }

    /// Press currently in progress.
    #[must_use]
    pub const fn session(&self) -> Option<&GestureSession> {
        self.session.as_ref()
    }

    /// Time the pending dwell timer fires, if one is scheduled.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.session
            .and_then(|session| session.dwell_timer)
            .map(|timer| timer.deadline)
    }

    /// Starts a press session.
    ///
    /// Presses on empty map area dismiss an open popup and schedule the dwell
    /// timer; presses over a feature schedule nothing. A press arriving while
    /// another is in progress is ignored and `false` is returned.
    pub fn pointer_down(&mut self, press: Press, popup_open: bool, out: &mut Vec<Command>) -> bool {
        if self.session.is_some() {
            trace!(?press, "ignoring press while another is in progress");
            return false;
        }

        let dwell_timer = if press.over_feature {
            None
        } else {
            if popup_open {
                out.push(Command::ClosePopup);
            }
            Some(DwellTimer {
                deadline: press.at.saturating_add(self.config.dwell),
            })
        };

        self.session = Some(GestureSession {
            started_at: press.at,
            kind: press.kind,
            over_feature: press.over_feature,
            coordinate: press.coordinate,
            dwell_timer,
        });
        true
    }

    /// Ends the press with a release.
    ///
    /// A release observed at or after the deadline resolves the long press
    /// first, since the timer would already have fired. `at` must be the
    /// time the release happened; callers that learn of releases late must
    /// call [`advance`](Self::advance) at [`next_deadline`](Self::next_deadline)
    /// so a release is never stamped past a deadline it preceded.
    pub fn pointer_up(
        &mut self,
        at: Duration,
        out: &mut Vec<Command>,
    ) -> Option<GestureResolution> {
        if let Some(resolution) = self.advance(at, out) {
            return Some(resolution);
        }

        let session = self.session.take()?;
        if session.over_feature {
            Some(GestureResolution::Tap)
        } else {
            debug!(held = ?at.saturating_sub(session.started_at), "press released before dwell");
            Some(GestureResolution::Cancelled)
        }
    }

    /// Ends the press because the platform cancelled it.
    pub fn cancel(&mut self, at: Duration, out: &mut Vec<Command>) -> Option<GestureResolution> {
        if let Some(resolution) = self.advance(at, out) {
            return Some(resolution);
        }

        self.session.take().map(|_| GestureResolution::Cancelled)
    }

    /// Fires the dwell timer if its deadline has passed.
    pub fn advance(
        &mut self,
        now: Duration,
        out: &mut Vec<Command>,
    ) -> Option<GestureResolution> {
        let due = self.next_deadline().is_some_and(|deadline| now >= deadline);
        if !due {
            return None;
        }

        let session = self.session.take()?;
        debug!(coordinate = ?session.coordinate, "long press recognized");
        out.push(Command::OpenCreationForm {
            coordinate: session.coordinate,
        });
        Some(GestureResolution::LongPress {
            coordinate: session.coordinate,
        })
    }

    /// Emergency cancel bound to the Escape key.
    ///
    /// Drops any press in progress and dismisses both the popup and the
    /// creation form.
    pub fn escape(&mut self, out: &mut Vec<Command>) {
        self.session = None;
        out.push(Command::ClosePopup);
        out.push(Command::DismissCreationForm);
    }
}
