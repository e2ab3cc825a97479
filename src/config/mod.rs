// src/config/mod.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

fn default_batch_size() -> usize {
    100
}

/// Run configuration, constructed once in `main` and passed by reference to
/// every component. Loadable from a YAML file or from the environment
/// variables the nightly job already exports.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Local base directory the transfer job drops dated CSV exports under.
    pub local_base_dir: PathBuf,
    /// Path of the destination database file.
    pub db_path: PathBuf,
    /// Destination table name.
    pub table: String,
    /// Number of files processed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(cfg)
    }

    /// Build a config from `LOCAL_BASE_DIR`, `DB_PATH`, `DB_TABLE` and the
    /// optional `BATCH_SIZE`.
    pub fn from_env() -> Result<Self> {
        let local_base_dir = env::var("LOCAL_BASE_DIR")
            .context("LOCAL_BASE_DIR is not set")?
            .into();
        let db_path = env::var("DB_PATH").context("DB_PATH is not set")?.into();
        let table = env::var("DB_TABLE").context("DB_TABLE is not set")?;
        let batch_size = match env::var("BATCH_SIZE") {
            Ok(v) => v
                .parse()
                .with_context(|| format!("invalid BATCH_SIZE {:?}", v))?,
            Err(_) => default_batch_size(),
        };
        Ok(Self {
            local_base_dir,
            db_path,
            table,
            batch_size,
        })
    }
}
