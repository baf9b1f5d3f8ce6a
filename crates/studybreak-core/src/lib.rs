//! # Studybreak Core Library
//!
//! Core logic for a study/break interval timer that keeps correct time
//! across process suspension, termination and restart. Front ends (the
//! `studybreak` CLI, or any GUI) are thin layers over [`TimerFacade`].
//!
//! ## Architecture
//!
//! - **Phase machine**: wall-clock based; a running phase is an end instant,
//!   and the caller polls `tick()` to detect expiry
//! - **Persistence**: the timer state lives in a flat key/value store next to
//!   the user settings, written synchronously after every change
//! - **Settings**: durations, long-break toggle and alarm volume, seeded with
//!   defaults on first run
//! - **Config**: TOML host configuration (tick cadence, catch-up policy, logging)
//!
//! ## Key Components
//!
//! - [`TimerFacade`]: commands and snapshot for UI collaborators
//! - [`PhaseMachine`]: the state machine itself
//! - [`KvStore`]: storage seam, backed by [`Database`] or [`MemoryStore`]
//! - [`Config`]: application configuration management

pub mod alarm;
pub mod error;
pub mod events;
pub mod facade;
pub mod settings;
pub mod storage;
pub mod timer;

pub use alarm::{Alarm, AlarmSink, RecordingAlarm};
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use events::Event;
pub use facade::{TimerFacade, TimerFacadeBuilder};
pub use settings::Settings;
pub use storage::{Config, Database, KvStore, MemoryStore};
pub use timer::{
    CatchUpPolicy, Clock, Countdown, ManualClock, Phase, PhaseMachine, SystemClock, TimerSnapshot,
    TimerState,
};
