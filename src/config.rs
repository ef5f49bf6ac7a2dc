//! Application configuration.
//!
//! Each value is resolved with priority: config.toml > .env / environment > default.
//! Scheduling constants are not configurable; they live next to the code that
//! uses them.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// ==================== Defaults ====================

pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the database path
pub const DB_ENV: &str = "FLASHBACK_DB";

/// Environment variable overriding the candidate batch size
pub const BATCH_SIZE_ENV: &str = "FLASHBACK_BATCH_SIZE";

pub const DEFAULT_DB_PATH: &str = "data/flashback.db";

/// Cards fetched per selection, before weighting
pub const DEFAULT_BATCH_SIZE: usize = 50;

// ==================== Resolved Configuration ====================

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub study: StudyConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudyConfig {
    pub batch_size: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// ==================== File Structure ====================

/// Configuration file structure for config.toml
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database: Option<FileDatabaseConfig>,
    study: Option<FileStudyConfig>,
}

#[derive(Debug, Deserialize)]
struct FileDatabaseConfig {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileStudyConfig {
    batch_size: Option<usize>,
}

/// Load configuration from `config.toml` in the working directory.
pub fn load() -> Result<Config> {
    load_from(Path::new(CONFIG_FILE))
}

/// Load configuration from `config_path`, falling back to the environment.
pub fn load_from(config_path: &Path) -> Result<Config> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let file = match std::fs::read_to_string(config_path) {
        Ok(contents) => parse_file(&contents)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
        Err(e) => return Err(e.into()),
    };
    resolve(file, |key| std::env::var(key).ok())
}

fn parse_file(contents: &str) -> Result<FileConfig> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("{}: {}", CONFIG_FILE, e)))
}

fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let file_path = file.database.and_then(|db| db.path);
    let path = if let Some(path) = file_path {
        tracing::info!("Using database from {}: {}", CONFIG_FILE, path);
        PathBuf::from(path)
    } else if let Some(path) = env(DB_ENV) {
        tracing::info!("Using database from {} env: {}", DB_ENV, path);
        PathBuf::from(path)
    } else {
        tracing::info!("Using default database path: {}", DEFAULT_DB_PATH);
        PathBuf::from(DEFAULT_DB_PATH)
    };

    let file_batch = file.study.and_then(|s| s.batch_size);
    let batch_size = match (file_batch, env(BATCH_SIZE_ENV)) {
        (Some(size), _) => size,
        (None, Some(raw)) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a number: {}", BATCH_SIZE_ENV, raw)))?,
        (None, None) => DEFAULT_BATCH_SIZE,
    };
    if batch_size == 0 {
        return Err(Error::Config("batch_size must be at least 1".into()));
    }

    Ok(Config {
        database: DatabaseConfig { path },
        study: StudyConfig { batch_size },
    })
}
