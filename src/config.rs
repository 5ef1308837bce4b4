//! Runtime configuration.
//!
//! Values are resolved in this order, later sources overriding earlier ones:
//! 1. Built-in defaults (everything lives in `~/.library-catalog/`)
//! 2. `~/.library-catalog/config.toml`, if present
//! 3. Environment: `LIBRARY_CATALOG_DB`, `LIBRARY_CATALOG_LOG`
//! 4. The `--db` command-line flag

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".library-catalog";
const DB_FILE_NAME: &str = "library.sqlite";
const CONFIG_FILE_NAME: &str = "config.toml";
const LOG_FILE_NAME: &str = "library-catalog.log";

const DB_ENV: &str = "LIBRARY_CATALOG_DB";
const LOG_ENV: &str = "LIBRARY_CATALOG_LOG";

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// SQLite takes the busy timeout as a C `int` of milliseconds.
const MAX_BUSY_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Shape of the optional `config.toml`. Every key may be omitted.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub database_path: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

impl ConfigFile {
    /// Parse the file at `path`; a missing file is the same as an empty one.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Overrides taken from the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub database_path: Option<PathBuf>,
    pub log_filter: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let non_empty = |key: &str| env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            database_path: non_empty(DB_ENV).map(PathBuf::from),
            log_filter: non_empty(LOG_ENV),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub log_path: PathBuf,
    pub log_filter: String,
    pub busy_timeout: Duration,
}

impl Config {
    /// Load configuration from the default locations, applying `db_flag` last.
    pub fn load(db_flag: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir()?;
        let file = ConfigFile::read(&data_dir.join(CONFIG_FILE_NAME))?;
        Self::resolve(data_dir, file, EnvOverrides::from_env(), db_flag)
    }

    /// Merge every source in precedence order. Relative paths from the config
    /// file are taken relative to the data directory.
    pub fn resolve(
        data_dir: PathBuf,
        file: ConfigFile,
        env: EnvOverrides,
        db_flag: Option<PathBuf>,
    ) -> Result<Self> {
        let file_db = file.database_path.map(|path| {
            if path.is_relative() {
                data_dir.join(path)
            } else {
                path
            }
        });
        let database_path = db_flag
            .or(env.database_path)
            .or(file_db)
            .unwrap_or_else(|| data_dir.join(DB_FILE_NAME));
        let log_filter = env
            .log_filter
            .or(file.log_filter)
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let busy_timeout_ms = file.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS);
        if busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            bail!("busy_timeout_ms = {busy_timeout_ms} is too large (at most {MAX_BUSY_TIMEOUT_MS})");
        }

        Ok(Self {
            log_path: data_dir.join(LOG_FILE_NAME),
            data_dir,
            database_path,
            log_filter,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        })
    }
}

/// Resolve the absolute path to the application data directory.
fn data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}
