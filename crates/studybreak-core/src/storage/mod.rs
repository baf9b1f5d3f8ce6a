mod config;
pub mod database;
pub mod kv;
pub mod memory;

pub use config::{Config, LoggingConfig, TimerConfig};
pub use database::Database;
pub use kv::{KvStore, KvWrite};
pub use memory::MemoryStore;

use std::path::PathBuf;

use crate::error::Result;

/// Returns the data directory, creating it if needed.
///
/// `STUDYBREAK_HOME` wins when set. Otherwise `~/.config/studybreak`, or
/// `~/.config/studybreak-dev` when `STUDYBREAK_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os("STUDYBREAK_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("STUDYBREAK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("studybreak-dev")
            } else {
                base_dir.join("studybreak")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
