//! User-configurable timer settings.
//!
//! Stored in the key/value store under fixed keys so that a settings screen
//! and the timer can share them. Missing keys are seeded on first run;
//! unreadable values fall back to the field default.

use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ValidationError};
use crate::storage::{KvStore, KvWrite};
use crate::timer::Phase;

pub const STUDY_DURATION_KEY: &str = "StudyDuration";
pub const SHORT_BREAK_DURATION_KEY: &str = "ShortBreakDuration";
pub const LONG_BREAK_DURATION_KEY: &str = "LongBreakDuration";
pub const STUDY_SELECTED_KEY: &str = "StudySelected";
pub const SHORT_BREAK_SELECTED_KEY: &str = "ShortBreakSelected";
pub const LONG_BREAK_SELECTED_KEY: &str = "LongBreakSelected";
pub const USE_LONG_BREAKS_KEY: &str = "UseLongBreaks";
pub const ALARM_VOLUME_KEY: &str = "AlarmVolume";

pub const DEFAULT_STUDY_MIN: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MIN: u32 = 5;
pub const DEFAULT_LONG_BREAK_MIN: u32 = 15;
pub const DEFAULT_ALARM_VOLUME: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub study_duration_min: u32,
    pub short_break_min: u32,
    pub long_break_min: u32,
    pub use_long_breaks: bool,
    /// 0.0 ..= 1.0
    pub alarm_volume: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            study_duration_min: DEFAULT_STUDY_MIN,
            short_break_min: DEFAULT_SHORT_BREAK_MIN,
            long_break_min: DEFAULT_LONG_BREAK_MIN,
            use_long_breaks: false,
            alarm_volume: DEFAULT_ALARM_VOLUME,
        }
    }
}

fn duration_key(phase: Phase) -> &'static str {
    match phase {
        Phase::Study => STUDY_DURATION_KEY,
        Phase::ShortBreak => SHORT_BREAK_DURATION_KEY,
        Phase::LongBreak => LONG_BREAK_DURATION_KEY,
    }
}

fn selected_key(phase: Phase) -> &'static str {
    match phase {
        Phase::Study => STUDY_SELECTED_KEY,
        Phase::ShortBreak => SHORT_BREAK_SELECTED_KEY,
        Phase::LongBreak => LONG_BREAK_SELECTED_KEY,
    }
}

impl Settings {
    /// Configured length of `phase`, in minutes.
    pub fn minutes_for(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Study => self.study_duration_min,
            Phase::ShortBreak => self.short_break_min,
            Phase::LongBreak => self.long_break_min,
        }
    }

    /// Full length of `phase`.
    pub fn duration_for(&self, phase: Phase) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.minutes_for(phase)))
    }

    /// Write defaults for every key that is not present yet.
    ///
    /// Returns `true` if anything was written (i.e. this looks like a first run).
    pub fn seed_defaults<S: KvStore + ?Sized>(store: &mut S) -> Result<bool> {
        let defaults = Settings::default();
        let mut writes = Vec::new();

        if !store.contains(STUDY_DURATION_KEY)? {
            for phase in Phase::ALL {
                writes.push(KvWrite::set(
                    duration_key(phase),
                    defaults.minutes_for(phase).to_string(),
                ));
            }
        }
        for phase in Phase::ALL {
            if !store.contains(selected_key(phase))? {
                writes.push(KvWrite::set(
                    selected_key(phase),
                    defaults.minutes_for(phase).to_string(),
                ));
            }
        }
        if !store.contains(USE_LONG_BREAKS_KEY)? {
            writes.push(KvWrite::set(USE_LONG_BREAKS_KEY, "0"));
        }
        if !store.contains(ALARM_VOLUME_KEY)? {
            writes.push(KvWrite::set(
                ALARM_VOLUME_KEY,
                DEFAULT_ALARM_VOLUME.to_string(),
            ));
        }

        if writes.is_empty() {
            return Ok(false);
        }
        store.write_batch(&writes)?;
        Ok(true)
    }

    /// Read settings, substituting the default for anything missing or invalid.
    pub fn load<S: KvStore + ?Sized>(store: &S) -> Result<Self> {
        let defaults = Settings::default();
        let minutes = |key: &str, default: u32| read_or(store, key, default, |m: &u32| *m > 0);

        let volume: f32 = read_or(store, ALARM_VOLUME_KEY, defaults.alarm_volume, |v: &f32| {
            v.is_finite()
        })?;
        let long_breaks: i64 = read_or(store, USE_LONG_BREAKS_KEY, 0, |_| true)?;

        Ok(Self {
            study_duration_min: minutes(STUDY_DURATION_KEY, defaults.study_duration_min)?,
            short_break_min: minutes(SHORT_BREAK_DURATION_KEY, defaults.short_break_min)?,
            long_break_min: minutes(LONG_BREAK_DURATION_KEY, defaults.long_break_min)?,
            use_long_breaks: long_breaks == 1,
            alarm_volume: volume.clamp(0.0, 1.0),
        })
    }

    /// Choose a new length for `phase`. Also records it as the selected preset.
    pub fn store_duration<S: KvStore + ?Sized>(
        store: &mut S,
        phase: Phase,
        minutes: u32,
    ) -> Result<()> {
        if minutes == 0 {
            return Err(ValidationError::InvalidValue {
                field: duration_key(phase).to_string(),
                message: "duration must be at least one minute".into(),
            }
            .into());
        }
        store.write_batch(&[
            KvWrite::set(selected_key(phase), minutes.to_string()),
            KvWrite::set(duration_key(phase), minutes.to_string()),
        ])
    }

    pub fn store_use_long_breaks<S: KvStore + ?Sized>(store: &mut S, enabled: bool) -> Result<()> {
        store.set(USE_LONG_BREAKS_KEY, if enabled { "1" } else { "0" })
    }

    pub fn store_alarm_volume<S: KvStore + ?Sized>(store: &mut S, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(ValidationError::InvalidValue {
                field: ALARM_VOLUME_KEY.to_string(),
                message: format!("{volume} is outside 0.0..=1.0"),
            }
            .into());
        }
        store.set(ALARM_VOLUME_KEY, &volume.to_string())
    }

    /// Preset last chosen for `phase`, if any.
    pub fn selected_minutes<S: KvStore + ?Sized>(store: &S, phase: Phase) -> Result<Option<u32>> {
        Ok(store
            .get(selected_key(phase))?
            .and_then(|raw| raw.trim().parse().ok()))
    }
}

fn read_or<S, T>(store: &S, key: &str, default: T, valid: impl Fn(&T) -> bool) -> Result<T>
where
    S: KvStore + ?Sized,
    T: FromStr + Copy + std::fmt::Debug,
{
    let Some(raw) = store.get(key)? else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => Ok(value),
        _ => {
            warn!(key, raw = %raw, ?default, "ignoring invalid setting");
            Ok(default)
        }
    }
}
