pub mod config;
pub mod settings;
pub mod timer;

use studybreak_core::{Alarm, Config, Database, Result, TimerFacade};

/// Open the timer over the on-disk store. Restoring brings it up to now,
/// so a phase that ended while no command was running is applied here.
pub fn open_timer(config: &Config) -> Result<TimerFacade> {
    TimerFacade::builder()
        .store(Database::open()?)
        .alarm(terminal_bell)
        .catch_up(config.timer.catch_up)
        .build()
}

fn terminal_bell(alarm: &Alarm) {
    tracing::info!(
        completed = %alarm.completed,
        next = %alarm.next,
        volume = alarm.volume,
        "alarm"
    );
    if alarm.volume > 0.0 {
        eprint!("\x07");
    }
}
