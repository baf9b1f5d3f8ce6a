//! Alarm notifications.
//!
//! The core only decides *when* to ring and how loud; rendering the sound is
//! the host's job, through an [`AlarmSink`].

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::events::Event;
use crate::timer::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub completed: Phase,
    pub next: Phase,
    pub volume: f32,
    pub phases_completed: u32,
}

impl Alarm {
    /// The alarm a completion event asks for. Other events are silent.
    pub fn from_event(event: &Event) -> Option<Self> {
        match *event {
            Event::PhaseCompleted {
                from,
                to,
                phases_completed,
                alarm_volume,
                ..
            } => Some(Self {
                completed: from,
                next: to,
                volume: alarm_volume,
                phases_completed,
            }),
            _ => None,
        }
    }
}

/// Fire-and-forget receiver for alarms.
///
/// The facade rings after releasing its timer lock, so a sink may call back
/// into it. A command issued from inside `ring` that completes a phase itself
/// would wait on this same sink and must not be made.
pub trait AlarmSink: Send {
    fn ring(&mut self, alarm: &Alarm);
}

impl<F> AlarmSink for F
where
    F: FnMut(&Alarm) + Send,
{
    fn ring(&mut self, alarm: &Alarm) {
        self(alarm)
    }
}

/// Keeps every alarm it receives. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct RecordingAlarm {
    rung: Arc<Mutex<Vec<Alarm>>>,
}

impl RecordingAlarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rung(&self) -> Vec<Alarm> {
        self.rung.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl AlarmSink for RecordingAlarm {
    fn ring(&mut self, alarm: &Alarm) {
        if let Ok(mut rung) = self.rung.lock() {
            rung.push(*alarm);
        }
    }
}
