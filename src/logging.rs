use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Route `tracing` output to the log file in the data directory. The terminal
/// UI owns stdout, so nothing is ever written there.
pub fn init_logging(config: &Config) -> Result<()> {
    if let Some(parent) = config.log_path.parent() {
        fs::create_dir_all(parent).context("failed to create log directory")?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
        .with_context(|| format!("failed to open log file {}", config.log_path.display()))?;

    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter \"{}\"", config.log_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install log subscriber: {err}"))
}

/// Install file logging if possible. On failure the reason goes to `warn_to`
/// and the program runs without a log file, so a read-only data directory
/// does not stop a one-shot command.
pub fn init_logging_or_warn(config: &Config, warn_to: &mut impl Write) -> bool {
    match init_logging(config) {
        Ok(()) => true,
        Err(err) => {
            // Nowhere left to report a failed warning.
            let _ = writeln!(warn_to, "warning: logging disabled: {err:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::{ConfigFile, EnvOverrides};

    #[test]
    fn unwritable_log_location_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-directory");
        fs::write(&blocker, "").unwrap();
        let config = Config::resolve(
            blocker,
            ConfigFile::default(),
            EnvOverrides::default(),
            Some(PathBuf::from("library.sqlite")),
        )
        .unwrap();

        let mut warnings = Vec::new();
        assert!(!init_logging_or_warn(&config, &mut warnings));
        let warnings = String::from_utf8(warnings).unwrap();
        assert!(warnings.starts_with("warning: logging disabled: failed to create log directory"));
    }
}
