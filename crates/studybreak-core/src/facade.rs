//! Timer facade: the one entry point for UI collaborators.
//!
//! Owns the phase machine, the loaded settings and the store behind a single
//! mutex. Every mutation is written to the store before the call returns, so
//! the process may be killed right after any command without losing state.
//! Alarms ring after that mutex is released.
//!
//! Construct it once at startup and hand it (or an `Arc` of it) to whoever
//! needs it:
//!
//! ```ignore
//! let timer = TimerFacade::builder()
//!     .store(Database::open()?)
//!     .alarm(|alarm: &Alarm| play_chime(alarm.volume))
//!     .build()?;
//! timer.toggle_play_pause()?;
//! loop { timer.tick()?; }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::alarm::{Alarm, AlarmSink};
use crate::error::{ConfigError, CoreError, Result};
use crate::events::Event;
use crate::settings::Settings;
use crate::storage::KvStore;
use crate::timer::{persist, CatchUpPolicy, Clock, Phase, PhaseMachine, SystemClock, TimerSnapshot};

struct Inner {
    machine: PhaseMachine,
    settings: Settings,
    store: Box<dyn KvStore>,
    /// The machine changed and the store has not caught up yet.
    dirty: bool,
}

impl Inner {
    /// Persist after a state change.
    fn commit(&mut self, event: Option<Event>) -> Result<Option<Event>> {
        if event.is_some() {
            self.dirty = true;
            self.persist()?;
        }
        Ok(event)
    }

    fn persist(&mut self) -> Result<()> {
        persist::save(self.store.as_mut(), self.machine.state())?;
        self.dirty = false;
        Ok(())
    }

    /// Write only what this instance changed, so state saved by another
    /// instance over the same store is never rolled back.
    fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.persist()
        } else {
            Ok(())
        }
    }

    fn reload_settings(&mut self) -> Result<Settings> {
        self.settings = Settings::load(self.store.as_ref())?;
        Ok(self.settings)
    }
}

pub struct TimerFacade {
    inner: Mutex<Inner>,
    alarm: Mutex<Box<dyn AlarmSink>>,
    clock: Arc<dyn Clock>,
    catch_up: CatchUpPolicy,
}

impl TimerFacade {
    pub fn builder() -> TimerFacadeBuilder {
        TimerFacadeBuilder::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| CoreError::LockPoisoned)
    }

    /// Run one command under the lock, persist its outcome, then ring any
    /// alarm it produced once the lock is released.
    fn apply<F>(&self, command: F) -> Result<Option<Event>>
    where
        F: FnOnce(&mut Inner, DateTime<Utc>) -> Result<Option<Event>>,
    {
        let now = self.clock.now();
        let event = {
            let mut inner = self.lock()?;
            let event = command(&mut *inner, now)?;
            inner.commit(event)?
        };
        self.ring(event.as_ref())?;
        Ok(event)
    }

    fn ring(&self, event: Option<&Event>) -> Result<()> {
        if let Some(alarm) = event.and_then(Alarm::from_event) {
            self.alarm
                .lock()
                .map_err(|_| CoreError::LockPoisoned)?
                .ring(&alarm);
        }
        Ok(())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start when paused, pause when running.
    pub fn toggle_play_pause(&self) -> Result<Option<Event>> {
        self.apply(|inner, now| {
            Ok(if inner.machine.is_running() {
                inner.machine.pause(now)
            } else {
                inner.machine.start(now)
            })
        })
    }

    pub fn reset(&self) -> Result<Option<Event>> {
        self.apply(|inner, now| {
            let settings = inner.settings;
            Ok(Some(inner.machine.reset(&settings, now)))
        })
    }

    pub fn skip(&self) -> Result<Option<Event>> {
        self.apply(|inner, now| {
            let settings = inner.settings;
            Ok(Some(inner.machine.skip(&settings, now)))
        })
    }

    /// Poll for natural expiry. Call on the host's cadence while running;
    /// cheap when nothing happened.
    pub fn tick(&self) -> Result<Option<Event>> {
        self.apply(|inner, now| {
            let settings = inner.settings;
            Ok(inner.machine.tick(&settings, now))
        })
    }

    /// Re-read settings and timer state from the store, for hosts that share
    /// it with other processes. Unsaved changes of this instance are written
    /// first. A stored phase that ended meanwhile is caught up and rings.
    pub fn reload(&self) -> Result<Option<Event>> {
        let now = self.clock.now();
        let event = {
            let mut inner = self.lock()?;
            inner.flush()?;
            let settings = inner.reload_settings()?;
            let restored = persist::load(inner.store.as_ref(), &settings, now, self.catch_up)?;
            let needs_save = restored.needs_save();
            inner.machine = restored.machine;
            if needs_save {
                inner.persist()?;
            }
            debug!(phase = %inner.machine.phase(), running = inner.machine.is_running(), "timer reloaded");
            restored.event
        };
        self.ring(event.as_ref())?;
        Ok(event)
    }

    pub fn snapshot(&self) -> Result<TimerSnapshot> {
        let now = self.clock.now();
        Ok(self.lock()?.machine.snapshot(now))
    }

    // ── Settings ─────────────────────────────────────────────────────

    pub fn settings(&self) -> Result<Settings> {
        Ok(self.lock()?.settings)
    }

    /// Re-read settings changed elsewhere. The running phase is untouched;
    /// new durations apply from the next transition.
    pub fn load_settings(&self) -> Result<Settings> {
        self.lock()?.reload_settings()
    }

    /// Pick a new length for `phase`. Restarts the cycle.
    pub fn set_duration(&self, phase: Phase, minutes: u32) -> Result<Option<Event>> {
        self.apply(|inner, now| {
            Settings::store_duration(inner.store.as_mut(), phase, minutes)?;
            let settings = inner.reload_settings()?;
            Ok(Some(inner.machine.reset(&settings, now)))
        })
    }

    pub fn set_use_long_breaks(&self, enabled: bool) -> Result<Settings> {
        let mut inner = self.lock()?;
        Settings::store_use_long_breaks(inner.store.as_mut(), enabled)?;
        inner.reload_settings()
    }

    pub fn set_alarm_volume(&self, volume: f32) -> Result<Settings> {
        let mut inner = self.lock()?;
        Settings::store_alarm_volume(inner.store.as_mut(), volume)?;
        inner.reload_settings()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Flush state not yet written. Hook this to every teardown signal the
    /// host has (backgrounding, pause, shutdown).
    pub fn suspend(&self) -> Result<()> {
        self.lock()?.flush()
    }
}

impl Drop for TimerFacade {
    fn drop(&mut self) {
        let inner = match self.inner.get_mut() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = inner.flush() {
            warn!("failed to save timer state on shutdown: {err}");
        }
    }
}

/// Wires a [`TimerFacade`] together. The store and the alarm sink are required.
#[derive(Default)]
pub struct TimerFacadeBuilder {
    store: Option<Box<dyn KvStore>>,
    alarm: Option<Box<dyn AlarmSink>>,
    clock: Option<Arc<dyn Clock>>,
    catch_up: CatchUpPolicy,
}

impl TimerFacadeBuilder {
    pub fn store(mut self, store: impl KvStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn alarm(mut self, alarm: impl AlarmSink + 'static) -> Self {
        self.alarm = Some(Box::new(alarm));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn catch_up(mut self, policy: CatchUpPolicy) -> Self {
        self.catch_up = policy;
        self
    }

    /// Seed settings, load them, restore the timer and bring it up to now.
    ///
    /// # Errors
    /// [`ConfigError::MissingCollaborator`] when the store or alarm sink was
    /// never provided; store errors otherwise.
    pub fn build(self) -> Result<TimerFacade> {
        let mut store = self
            .store
            .ok_or(ConfigError::MissingCollaborator { name: "key/value store" })?;
        let mut alarm = self
            .alarm
            .ok_or(ConfigError::MissingCollaborator { name: "alarm sink" })?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

        if Settings::seed_defaults(store.as_mut())? {
            info!("seeded default settings");
        }
        let settings = Settings::load(store.as_ref())?;
        let now = clock.now();
        let restored = persist::load(store.as_ref(), &settings, now, self.catch_up)?;
        if restored.needs_save() {
            persist::save(store.as_mut(), restored.machine.state())?;
        }
        if let Some(alarm_due) = restored.event.as_ref().and_then(Alarm::from_event) {
            info!(
                completed = %alarm_due.completed,
                next = %alarm_due.next,
                phases = alarm_due.phases_completed,
                "phase ended while away"
            );
            alarm.ring(&alarm_due);
        }

        Ok(TimerFacade {
            inner: Mutex::new(Inner {
                machine: restored.machine,
                settings,
                store,
                dirty: false,
            }),
            alarm: Mutex::new(alarm),
            clock,
            catch_up: self.catch_up,
        })
    }
}
