use clap::{Subcommand, ValueEnum};
use serde_json::json;
use studybreak_core::{Config, Phase};

use super::open_timer;

#[derive(Clone, Copy, ValueEnum)]
pub enum PhaseArg {
    Study,
    ShortBreak,
    LongBreak,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Study => Phase::Study,
            PhaseArg::ShortBreak => Phase::ShortBreak,
            PhaseArg::LongBreak => Phase::LongBreak,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum SettingsAction {
    /// Print current settings as JSON
    Show,
    /// Set a phase length in minutes (resets the timer)
    Duration { phase: PhaseArg, minutes: u32 },
    /// Turn the long break after every third study session on or off
    LongBreaks { state: Switch },
    /// Alarm volume between 0.0 and 1.0
    Volume { level: f32 },
}

pub fn run(action: SettingsAction, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let timer = open_timer(config)?;

    let settings = match action {
        SettingsAction::Show => timer.settings()?,
        SettingsAction::Duration { phase, minutes } => {
            timer.set_duration(phase.into(), minutes)?;
            timer.settings()?
        }
        SettingsAction::LongBreaks { state } => {
            timer.set_use_long_breaks(matches!(state, Switch::On))?
        }
        SettingsAction::Volume { level } => timer.set_alarm_volume(level)?,
    };
    println!("{}", serde_json::to_string_pretty(&json!(settings))?);

    timer.suspend()?;
    Ok(())
}
