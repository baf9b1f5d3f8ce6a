//! Timer state persistence.
//!
//! The countdown is stored under one of two mutually exclusive keys: the
//! absolute end time while running, the remaining time while paused. Saving
//! one deletes the other so a stale value can never be read back.
//!
//! Encodings: flags are `"0"`/`"1"`, `PomodoroEndTime` is Unix epoch
//! milliseconds, `PomodoroCurrentTime` is remaining milliseconds. Saves that
//! used 100 ns ticks under the same keys are not readable: a tick count read
//! as milliseconds is far longer than any phase, so it exceeds the countdown
//! bound and loads as the reset state.

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::machine::{CatchUpPolicy, Countdown, PhaseMachine, TimerState};
use super::phase::Phase;
use crate::error::Result;
use crate::events::Event;
use crate::settings::Settings;
use crate::storage::{KvStore, KvWrite};

pub const IS_STUDY_KEY: &str = "PomodoroIsStudy";
pub const IS_RUNNING_KEY: &str = "PomodoroIsRunning";
pub const SESSION_COUNT_KEY: &str = "PomodoroSessionCount";
pub const END_TIME_KEY: &str = "PomodoroEndTime";
pub const CURRENT_TIME_KEY: &str = "PomodoroCurrentTime";

/// Where a restored machine came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    /// Nothing was stored yet.
    Fresh,
    /// Stored state was read back as-is.
    Stored,
    /// Stored state was unreadable and replaced by the reset state.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct Restored {
    pub machine: PhaseMachine,
    /// Completion produced by catching up on an expired running phase.
    pub event: Option<Event>,
    pub source: RestoreSource,
}

impl Restored {
    /// Whether the store no longer matches `machine`.
    pub fn needs_save(&self) -> bool {
        self.source != RestoreSource::Stored || self.event.is_some()
    }
}

/// Write `state` in one batch.
pub fn save<S: KvStore + ?Sized>(store: &mut S, state: &TimerState) -> Result<()> {
    let mut writes = vec![
        KvWrite::set(IS_RUNNING_KEY, flag(state.is_running())),
        KvWrite::set(IS_STUDY_KEY, flag(state.phase == Phase::Study)),
        KvWrite::set(SESSION_COUNT_KEY, state.session_count.to_string()),
    ];
    match state.countdown {
        Countdown::Running { ends_at } => {
            writes.push(KvWrite::set(END_TIME_KEY, ends_at.timestamp_millis().to_string()));
            writes.push(KvWrite::delete(CURRENT_TIME_KEY));
        }
        Countdown::Paused { remaining } => {
            writes.push(KvWrite::set(CURRENT_TIME_KEY, remaining.num_milliseconds().to_string()));
            writes.push(KvWrite::delete(END_TIME_KEY));
        }
    }
    store.write_batch(&writes)?;
    debug!(phase = %state.phase, running = state.is_running(), "timer state saved");
    Ok(())
}

/// Read the stored state and bring it up to `now`.
///
/// A running phase that already ended is advanced according to `policy`
/// before returning. Corrupt data is replaced by the reset state; only store
/// failures are returned as errors.
pub fn load<S: KvStore + ?Sized>(
    store: &S,
    settings: &Settings,
    now: DateTime<Utc>,
    policy: CatchUpPolicy,
) -> Result<Restored> {
    match decode(store, settings, now)? {
        Decoded::Fresh => {
            debug!("no stored timer state, starting fresh");
            Ok(Restored {
                machine: PhaseMachine::new(settings),
                event: None,
                source: RestoreSource::Fresh,
            })
        }
        Decoded::Corrupt(reason) => {
            warn!(%reason, "discarding unreadable timer state");
            Ok(Restored {
                machine: PhaseMachine::new(settings),
                event: None,
                source: RestoreSource::Recovered,
            })
        }
        Decoded::State(state) => {
            let mut machine = PhaseMachine::from_state(state);
            let event = machine.catch_up(settings, now, policy);
            Ok(Restored {
                machine,
                event,
                source: RestoreSource::Stored,
            })
        }
    }
}

enum Decoded {
    Fresh,
    Corrupt(String),
    State(TimerState),
}

fn decode<S: KvStore + ?Sized>(
    store: &S,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<Decoded> {
    let Some(raw_running) = store.get(IS_RUNNING_KEY)? else {
        return Ok(Decoded::Fresh);
    };
    let Some(running) = parse_flag(&raw_running) else {
        return Ok(Decoded::Corrupt(format!("{IS_RUNNING_KEY}={raw_running:?}")));
    };

    let is_study = match store.get(IS_STUDY_KEY)? {
        None => true,
        Some(raw) => match parse_flag(&raw) {
            Some(v) => v,
            None => return Ok(Decoded::Corrupt(format!("{IS_STUDY_KEY}={raw:?}"))),
        },
    };

    let session_count = match store.get(SESSION_COUNT_KEY)? {
        None => 0,
        Some(raw) => match raw.trim().parse::<u32>() {
            Ok(v) => v,
            Err(_) => return Ok(Decoded::Corrupt(format!("{SESSION_COUNT_KEY}={raw:?}"))),
        },
    };

    let mut phase = if is_study {
        Phase::Study
    } else {
        break_flavor(session_count, settings)
    };

    let countdown = if running {
        let Some(raw) = store.get(END_TIME_KEY)? else {
            return Ok(Decoded::Corrupt("running without an end time".into()));
        };
        match raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .filter(|ends_at| ends_at.signed_duration_since(now) <= paused_limit(settings))
        {
            Some(ends_at) => Countdown::Running { ends_at },
            None => return Ok(Decoded::Corrupt(format!("{END_TIME_KEY}={raw:?}"))),
        }
    } else {
        match store.get(CURRENT_TIME_KEY)? {
            None => {
                phase = Phase::Study;
                Countdown::Paused {
                    remaining: settings.duration_for(Phase::Study),
                }
            }
            Some(raw) => match raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|ms| *ms >= 0)
                .and_then(TimeDelta::try_milliseconds)
                .filter(|remaining| *remaining <= paused_limit(settings))
                .filter(|remaining| now.checked_add_signed(*remaining).is_some())
            {
                Some(remaining) => Countdown::Paused { remaining },
                None => return Ok(Decoded::Corrupt(format!("{CURRENT_TIME_KEY}={raw:?}"))),
            },
        }
    };

    Ok(Decoded::State(TimerState {
        phase,
        session_count,
        countdown,
    }))
}

/// Longest countdown accepted on load: a day, or the longest configured
/// phase if that is longer.
fn paused_limit(settings: &Settings) -> TimeDelta {
    Phase::ALL
        .into_iter()
        .fold(TimeDelta::hours(24), |limit, phase| limit.max(settings.duration_for(phase)))
}

/// Only "in a break" is stored, so the kind of break is re-derived: a long
/// break is the one place the session count is zero while long breaks are on.
fn break_flavor(session_count: u32, settings: &Settings) -> Phase {
    if settings.use_long_breaks && session_count == 0 {
        Phase::LongBreak
    } else {
        Phase::ShortBreak
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    raw.trim().parse::<i64>().ok().map(|v| v == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn running_study(ends_at: DateTime<Utc>) -> TimerState {
        TimerState {
            phase: Phase::Study,
            session_count: 1,
            countdown: Countdown::Running { ends_at },
        }
    }

    #[test]
    fn saving_running_clears_current_time() {
        let mut store = MemoryStore::new();
        store.set(CURRENT_TIME_KEY, "1000").unwrap();
        save(&mut store, &running_study(t0())).unwrap();

        let entries = store.entries();
        assert_eq!(entries[IS_RUNNING_KEY], "1");
        assert_eq!(entries[IS_STUDY_KEY], "1");
        assert_eq!(entries[SESSION_COUNT_KEY], "1");
        assert_eq!(entries[END_TIME_KEY], t0().timestamp_millis().to_string());
        assert!(!entries.contains_key(CURRENT_TIME_KEY));
    }

    #[test]
    fn saving_paused_clears_end_time() {
        let mut store = MemoryStore::new();
        save(&mut store, &running_study(t0())).unwrap();
        let paused = TimerState {
            phase: Phase::ShortBreak,
            session_count: 2,
            countdown: Countdown::Paused {
                remaining: TimeDelta::seconds(90),
            },
        };
        save(&mut store, &paused).unwrap();

        let entries = store.entries();
        assert_eq!(entries[IS_RUNNING_KEY], "0");
        assert_eq!(entries[IS_STUDY_KEY], "0");
        assert_eq!(entries[CURRENT_TIME_KEY], "90000");
        assert!(!entries.contains_key(END_TIME_KEY));
    }

    #[test]
    fn empty_store_is_fresh() {
        let store = MemoryStore::new();
        let settings = Settings::default();
        let restored = load(&store, &settings, t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Fresh);
        assert!(restored.needs_save());
        assert_eq!(*restored.machine.state(), TimerState::initial(&settings));
    }

    #[test]
    fn paused_state_round_trips() {
        let mut store = MemoryStore::new();
        let settings = Settings::default();
        let state = TimerState {
            phase: Phase::ShortBreak,
            session_count: 1,
            countdown: Countdown::Paused {
                remaining: TimeDelta::milliseconds(123_456),
            },
        };
        save(&mut store, &state).unwrap();
        let restored = load(&store, &settings, t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Stored);
        assert!(!restored.needs_save());
        assert_eq!(*restored.machine.state(), state);
    }

    #[test]
    fn running_reload_before_expiry_keeps_end() {
        let mut store = MemoryStore::new();
        let settings = Settings::default();
        let ends_at = t0() + TimeDelta::minutes(25);
        save(&mut store, &running_study(ends_at)).unwrap();

        let now = t0() + TimeDelta::minutes(10);
        let restored = load(&store, &settings, now, CatchUpPolicy::Collapse).unwrap();
        assert!(restored.event.is_none());
        assert!(restored.machine.is_running());
        assert_eq!(restored.machine.remaining(now), TimeDelta::minutes(15));
    }

    #[test]
    fn running_reload_after_expiry_advances() {
        let mut store = MemoryStore::new();
        let settings = Settings::default();
        save(&mut store, &running_study(t0())).unwrap();

        let now = t0() + TimeDelta::hours(3);
        let restored = load(&store, &settings, now, CatchUpPolicy::Collapse).unwrap();
        assert!(restored.needs_save());
        assert_eq!(restored.machine.phase(), Phase::ShortBreak);
        assert_eq!(restored.machine.session_count(), 2);
        assert!(restored.machine.is_running());
        assert_eq!(restored.machine.remaining(now), TimeDelta::minutes(5));
    }

    #[test]
    fn corrupt_end_time_recovers_to_reset_state() {
        let mut store = MemoryStore::new();
        let settings = Settings::default();
        store.set(IS_RUNNING_KEY, "1").unwrap();
        store.set(IS_STUDY_KEY, "0").unwrap();
        store.set(SESSION_COUNT_KEY, "2").unwrap();
        store.set(END_TIME_KEY, "next tuesday").unwrap();

        let restored = load(&store, &settings, t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Recovered);
        assert_eq!(*restored.machine.state(), TimerState::initial(&settings));
    }

    #[test]
    fn out_of_range_end_time_is_corrupt() {
        let mut store = MemoryStore::new();
        store.set(IS_RUNNING_KEY, "1").unwrap();
        store.set(END_TIME_KEY, i64::MAX.to_string().as_str()).unwrap();
        let restored = load(&store, &Settings::default(), t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Recovered);
    }

    #[test]
    fn far_future_end_time_is_corrupt() {
        let mut store = MemoryStore::new();
        let ends_at = t0() + TimeDelta::days(400);
        store.set(IS_RUNNING_KEY, "1").unwrap();
        store.set(END_TIME_KEY, ends_at.timestamp_millis().to_string().as_str()).unwrap();
        let restored = load(&store, &Settings::default(), t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Recovered);
    }

    #[test]
    fn running_without_end_time_is_corrupt() {
        let mut store = MemoryStore::new();
        store.set(IS_RUNNING_KEY, "1").unwrap();
        let restored = load(&store, &Settings::default(), t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Recovered);
    }

    #[test]
    fn negative_remaining_is_corrupt() {
        let mut store = MemoryStore::new();
        store.set(IS_RUNNING_KEY, "0").unwrap();
        store.set(CURRENT_TIME_KEY, "-5").unwrap();
        let restored = load(&store, &Settings::default(), t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Recovered);
    }

    #[test]
    fn unbounded_remaining_is_corrupt() {
        let mut store = MemoryStore::new();
        store.set(IS_RUNNING_KEY, "0").unwrap();
        store.set(CURRENT_TIME_KEY, i64::MAX.to_string().as_str()).unwrap();
        let settings = Settings::default();
        let restored = load(&store, &settings, t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Recovered);
        assert!(restored.needs_save());
        assert_eq!(*restored.machine.state(), TimerState::initial(&settings));
    }

    #[test]
    fn tick_encoded_remaining_is_corrupt() {
        // 25 minutes in 100 ns ticks.
        let mut store = MemoryStore::new();
        store.set(IS_RUNNING_KEY, "0").unwrap();
        store.set(CURRENT_TIME_KEY, "15000000000").unwrap();
        let restored = load(&store, &Settings::default(), t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Recovered);
    }

    #[test]
    fn remaining_up_to_longest_phase_is_kept() {
        let mut store = MemoryStore::new();
        let settings = Settings {
            study_duration_min: 48 * 60,
            ..Settings::default()
        };
        store.set(IS_RUNNING_KEY, "0").unwrap();
        store.set(CURRENT_TIME_KEY, (47 * 3_600_000i64).to_string().as_str()).unwrap();
        let restored = load(&store, &settings, t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.source, RestoreSource::Stored);
        assert_eq!(restored.machine.remaining(t0()), TimeDelta::hours(47));
    }

    #[test]
    fn paused_without_remaining_falls_back_to_study() {
        let mut store = MemoryStore::new();
        let settings = Settings::default();
        store.set(IS_RUNNING_KEY, "0").unwrap();
        store.set(IS_STUDY_KEY, "0").unwrap();
        store.set(SESSION_COUNT_KEY, "2").unwrap();

        let restored = load(&store, &settings, t0(), CatchUpPolicy::Collapse).unwrap();
        let state = restored.machine.state();
        assert_eq!(state.phase, Phase::Study);
        assert_eq!(state.session_count, 2);
        assert_eq!(restored.machine.remaining(t0()), TimeDelta::minutes(25));
    }

    #[test]
    fn paused_long_break_reloads_as_long_break() {
        let mut store = MemoryStore::new();
        let settings = Settings {
            use_long_breaks: true,
            ..Settings::default()
        };
        let state = TimerState {
            phase: Phase::LongBreak,
            session_count: 0,
            countdown: Countdown::Paused {
                remaining: TimeDelta::minutes(12),
            },
        };
        save(&mut store, &state).unwrap();
        let restored = load(&store, &settings, t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(*restored.machine.state(), state);
    }

    #[test]
    fn paused_long_break_reloads_as_short_break_after_toggle_off() {
        let mut store = MemoryStore::new();
        let state = TimerState {
            phase: Phase::LongBreak,
            session_count: 0,
            countdown: Countdown::Paused {
                remaining: TimeDelta::minutes(12),
            },
        };
        save(&mut store, &state).unwrap();

        let toggled_off = Settings::default();
        let restored = load(&store, &toggled_off, t0(), CatchUpPolicy::Collapse).unwrap();
        assert_eq!(restored.machine.phase(), Phase::ShortBreak);
        assert_eq!(restored.machine.session_count(), 0);
        assert_eq!(restored.machine.remaining(t0()), TimeDelta::minutes(12));
    }
}
