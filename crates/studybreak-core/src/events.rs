use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Every state change of the timer produces an Event.
/// Hosts print or forward them; the facade turns completions into alarms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        phase: Phase,
        remaining_ms: u64,
        ends_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    /// Manual advance. Leaves the timer paused and does not ring.
    TimerSkipped {
        from: Phase,
        to: Phase,
        session_count: u32,
        at: DateTime<Utc>,
    },
    /// A running phase ran out. `phases_completed` is more than one only when
    /// a long absence was fast-forwarded.
    PhaseCompleted {
        from: Phase,
        to: Phase,
        session_count: u32,
        phases_completed: u32,
        alarm_volume: f32,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::TimerStarted { at, .. }
            | Event::TimerPaused { at, .. }
            | Event::TimerReset { at }
            | Event::TimerSkipped { at, .. }
            | Event::PhaseCompleted { at, .. } => *at,
        }
    }
}
