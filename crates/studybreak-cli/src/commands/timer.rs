use std::time::{Duration, Instant};

use clap::Subcommand;
use serde_json::json;
use studybreak_core::{Config, Event, TimerFacade, TimerSnapshot};

use super::open_timer;

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start when paused, pause when running
    Toggle,
    /// Back to the first study phase, paused
    Reset,
    /// Jump to the next phase, paused
    Skip,
    /// Print current timer state as JSON
    Status,
    /// Poll the timer and show a live countdown
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        for_secs: Option<u64>,
        /// Stop when the current phase completes
        #[arg(long)]
        until_complete: bool,
    },
}

pub fn run(action: TimerAction, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let timer = open_timer(config)?;

    match action {
        TimerAction::Toggle => print_outcome(&timer, timer.toggle_play_pause()?)?,
        TimerAction::Reset => print_outcome(&timer, timer.reset()?)?,
        TimerAction::Skip => print_outcome(&timer, timer.skip()?)?,
        TimerAction::Status => {
            let completed = timer.tick()?;
            print_outcome(&timer, completed)?;
        }
        TimerAction::Watch {
            for_secs,
            until_complete,
        } => watch(&timer, config, for_secs, until_complete)?,
    }

    timer.suspend()?;
    Ok(())
}

fn print_outcome(
    timer: &TimerFacade,
    event: Option<Event>,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = timer.snapshot()?;
    let out = json!({ "snapshot": snapshot, "event": event });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn watch(
    timer: &TimerFacade,
    config: &Config,
    for_secs: Option<u64>,
    until_complete: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let interval = Duration::from_millis(config.timer.tick_interval_ms);
    let deadline = for_secs.map(|secs| Instant::now() + Duration::from_secs(secs));

    if until_complete && !timer.snapshot()?.is_running {
        return Err("timer is paused; nothing will complete".into());
    }

    loop {
        // Another process may have toggled, skipped or reset since the last poll.
        let completed = match timer.reload()? {
            Some(event) => Some(event),
            None => timer.tick()?,
        };
        let snapshot = timer.snapshot()?;
        eprint!("\r{}", render_line(&snapshot));

        if let Some(event) = completed {
            eprintln!();
            println!("{}", serde_json::to_string(&event)?);
            if until_complete {
                break;
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            eprintln!();
            break;
        }
        std::thread::sleep(interval);
    }
    Ok(())
}

fn render_line(snapshot: &TimerSnapshot) -> String {
    let state = if snapshot.is_running { "" } else { " (paused)" };
    format!(
        "{:<11} {}{}   ",
        snapshot.label,
        format_remaining(snapshot.remaining_ms),
        state
    )
}

/// Whole minutes (not capped at 59) and seconds, `MM:SS`.
fn format_remaining(remaining_ms: u64) -> String {
    let secs = remaining_ms / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
