//! Phase state machine.
//!
//! Wall-clock based: a running phase is stored as the instant it ends, not as
//! a decrementing counter, so time keeps passing while the process is
//! suspended or gone. Nothing here reads the clock; callers pass `now`.
//!
//! ## Transitions
//!
//! ```text
//! Study --(sessions < 3 or long breaks off)--> ShortBreak --> Study
//! Study --(3rd session, long breaks on)-----> LongBreak  --> Study
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut machine = PhaseMachine::new(&settings);
//! machine.start(clock.now());
//! // In a loop:
//! machine.tick(&settings, clock.now()); // Some(PhaseCompleted) on expiry
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::phase::Phase;
use crate::events::Event;
use crate::settings::Settings;

/// Completed study sessions that earn a long break.
pub const SESSIONS_PER_LONG_BREAK: u32 = 3;

/// Upper bound on phases replayed by [`CatchUpPolicy::FastForward`].
pub const MAX_CATCH_UP_STEPS: u32 = 10_000;

/// What to do with a running timer whose end passed while nobody was ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpPolicy {
    /// Apply a single advance and start the next phase from now.
    #[default]
    Collapse,
    /// Replay every phase that would have ended, back to back, so the
    /// current phase and session count match an uninterrupted run.
    FastForward,
}

/// The countdown, either frozen or anchored to an end instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    Paused { remaining: TimeDelta },
    Running { ends_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerState {
    pub phase: Phase,
    /// Study phases completed since the last long break (or reset).
    pub session_count: u32,
    pub countdown: Countdown,
}

impl TimerState {
    /// Study, paused, nothing completed, full study duration.
    pub fn initial(settings: &Settings) -> Self {
        Self {
            phase: Phase::Study,
            session_count: 0,
            countdown: Countdown::Paused {
                remaining: settings.duration_for(Phase::Study),
            },
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.countdown, Countdown::Running { .. })
    }

    /// Time left in the current phase, never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        let remaining = match self.countdown {
            Countdown::Paused { remaining } => remaining,
            Countdown::Running { ends_at } => ends_at - now,
        };
        remaining.max(TimeDelta::zero())
    }
}

/// Read-only view handed to displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub phase: Phase,
    pub label: String,
    pub remaining_ms: u64,
    pub is_running: bool,
    pub session_count: u32,
    pub ends_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

impl TimerSnapshot {
    pub fn remaining(&self) -> TimeDelta {
        TimeDelta::milliseconds(i64::try_from(self.remaining_ms).unwrap_or(i64::MAX))
    }
}

/// Which phase follows `phase`, and the session count after the move.
pub fn next_phase(phase: Phase, session_count: u32, use_long_breaks: bool) -> (Phase, u32) {
    match phase {
        Phase::Study => {
            let completed = session_count.saturating_add(1);
            if use_long_breaks && completed >= SESSIONS_PER_LONG_BREAK {
                (Phase::LongBreak, 0)
            } else {
                (Phase::ShortBreak, completed)
            }
        }
        Phase::ShortBreak | Phase::LongBreak => (Phase::Study, session_count),
    }
}

/// The single owner and mutator of [`TimerState`].
///
/// Every method that changes state returns the resulting [`Event`]; `None`
/// means nothing changed and nothing needs persisting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseMachine {
    state: TimerState,
}

impl PhaseMachine {
    pub fn new(settings: &Settings) -> Self {
        Self::from_state(TimerState::initial(settings))
    }

    pub fn from_state(state: TimerState) -> Self {
        Self { state }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn session_count(&self) -> u32 {
        self.state.session_count
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        self.state.remaining(now)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> TimerSnapshot {
        let ends_at = match self.state.countdown {
            Countdown::Running { ends_at } => Some(ends_at),
            Countdown::Paused { .. } => None,
        };
        TimerSnapshot {
            phase: self.state.phase,
            label: self.state.phase.label().to_string(),
            remaining_ms: millis(self.remaining(now)),
            is_running: self.is_running(),
            session_count: self.state.session_count,
            ends_at,
            at: now,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Resume the countdown. No-op while already running.
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<Event> {
        let Countdown::Paused { remaining } = self.state.countdown else {
            return None;
        };
        let ends_at = end_after(now, remaining);
        self.state.countdown = Countdown::Running { ends_at };
        debug!(phase = %self.state.phase, %ends_at, "timer started");
        Some(Event::TimerStarted {
            phase: self.state.phase,
            remaining_ms: millis(remaining),
            ends_at,
            at: now,
        })
    }

    /// Freeze the countdown. No-op while already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<Event> {
        if !self.is_running() {
            return None;
        }
        let remaining = self.remaining(now);
        self.state.countdown = Countdown::Paused { remaining };
        debug!(phase = %self.state.phase, remaining_ms = millis(remaining), "timer paused");
        Some(Event::TimerPaused {
            phase: self.state.phase,
            remaining_ms: millis(remaining),
            at: now,
        })
    }

    /// Back to the first study phase of a fresh cycle, paused.
    pub fn reset(&mut self, settings: &Settings, now: DateTime<Utc>) -> Event {
        self.state = TimerState::initial(settings);
        debug!("timer reset");
        Event::TimerReset { at: now }
    }

    /// Move to the next phase by hand. Ends up paused with a full countdown.
    pub fn skip(&mut self, settings: &Settings, now: DateTime<Utc>) -> Event {
        self.pause(now);
        let (from, to) = self.advance(settings);
        self.state.countdown = Countdown::Paused {
            remaining: settings.duration_for(to),
        };
        Event::TimerSkipped {
            from,
            to,
            session_count: self.state.session_count,
            at: now,
        }
    }

    /// Poll for expiry. On expiry advances once and keeps running.
    pub fn tick(&mut self, settings: &Settings, now: DateTime<Utc>) -> Option<Event> {
        let Countdown::Running { ends_at } = self.state.countdown else {
            return None;
        };
        if ends_at > now {
            return None;
        }
        let (from, to) = self.advance(settings);
        self.state.countdown = Countdown::Running {
            ends_at: end_after(now, settings.duration_for(to)),
        };
        info!(%from, %to, session_count = self.state.session_count, "phase completed");
        Some(self.completed(from, 1, settings, now))
    }

    /// Account for time that passed while nobody was ticking, e.g. between
    /// a save and the next process start.
    pub fn catch_up(
        &mut self,
        settings: &Settings,
        now: DateTime<Utc>,
        policy: CatchUpPolicy,
    ) -> Option<Event> {
        match policy {
            CatchUpPolicy::Collapse => self.tick(settings, now),
            CatchUpPolicy::FastForward => self.fast_forward(settings, now),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn fast_forward(&mut self, settings: &Settings, now: DateTime<Utc>) -> Option<Event> {
        let Countdown::Running { ends_at } = self.state.countdown else {
            return None;
        };
        if ends_at > now {
            return None;
        }

        let from = self.state.phase;
        let mut phase_end = ends_at;
        let mut completed = 0;
        while phase_end <= now && completed < MAX_CATCH_UP_STEPS {
            let (_, to) = self.advance(settings);
            phase_end = end_after(phase_end, settings.duration_for(to));
            completed += 1;
        }
        if phase_end <= now {
            warn!(completed, "catch-up limit reached, restarting current phase from now");
            phase_end = end_after(now, settings.duration_for(self.state.phase));
        }
        self.state.countdown = Countdown::Running { ends_at: phase_end };
        info!(
            %from,
            to = %self.state.phase,
            completed,
            session_count = self.state.session_count,
            "fast-forwarded missed phases"
        );
        Some(self.completed(from, completed, settings, now))
    }

    /// Apply the transition rule. Leaves the countdown to the caller.
    fn advance(&mut self, settings: &Settings) -> (Phase, Phase) {
        let from = self.state.phase;
        let (to, session_count) = next_phase(from, self.state.session_count, settings.use_long_breaks);
        self.state.phase = to;
        self.state.session_count = session_count;
        debug!(%from, %to, session_count, "phase advanced");
        (from, to)
    }

    fn completed(&self, from: Phase, phases: u32, settings: &Settings, now: DateTime<Utc>) -> Event {
        Event::PhaseCompleted {
            from,
            to: self.state.phase,
            session_count: self.state.session_count,
            phases_completed: phases,
            alarm_volume: settings.alarm_volume,
            at: now,
        }
    }
}

/// `start + length`, pinned to the last representable instant on overflow.
fn end_after(start: DateTime<Utc>, length: TimeDelta) -> DateTime<Utc> {
    start.checked_add_signed(length).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn millis(delta: TimeDelta) -> u64 {
    u64::try_from(delta.num_milliseconds()).unwrap_or(0)
}
