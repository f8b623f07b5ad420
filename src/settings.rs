use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::db::{LocationSeed, ProvisioningPolicy};

const DATA_DIR_NAME: &str = ".filament_station";
const CONFIG_PATH_ENV: &str = "FS_CONF_PATH";
const DB_PATH_ENV: &str = "FS_DB_PATH";

/// A printed location label: the exact QR payload and what to call it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationCode {
    pub qr: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

impl LocationCode {
    fn new(qr: &str, name: &str) -> Self {
        Self {
            qr: qr.into(),
            name: name.into(),
            capacity: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    pub locations: Vec<LocationCode>,
    /// Payloads starting with one of these are locations even when not listed above.
    pub location_code_prefixes: Vec<String>,
    pub spool_code_prefixes: Vec<String>,
    pub pair_window_seconds: u64,
    pub debounce_ms: u64,
    pub tick_interval_ms: u64,
    pub auto_create_spools: bool,
    pub auto_create_locations: bool,
    /// Browser binary used to open spool profile pages.
    pub browser: Option<String>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            locations: vec![
                LocationCode::new("fs://loc/pla-a", "PLA Dry Box A"),
                LocationCode::new("fs://loc/petg-b", "PETG Dry Box B"),
                LocationCode::new("fs://loc/tpu-c", "TPU Dry Box C"),
                LocationCode::new("fs://loc/ams-1", "AMS Slot 1"),
                LocationCode::new("fs://loc/ams-2", "AMS Slot 2"),
                LocationCode::new("fs://loc/ams-3", "AMS Slot 3"),
                LocationCode::new("fs://loc/ams-4", "AMS Slot 4"),
                LocationCode::new("fs://loc/dryer", "Dryer"),
            ],
            location_code_prefixes: vec!["fs://loc/".into()],
            spool_code_prefixes: vec![
                "https://3dfilamentprofiles.com/".into(),
                "fs://spool/".into(),
            ],
            pair_window_seconds: 10,
            debounce_ms: 1500,
            tick_interval_ms: 500,
            auto_create_spools: true,
            auto_create_locations: false,
            browser: None,
        }
    }
}

impl StationConfig {
    pub fn pair_window(&self) -> Duration {
        Duration::from_secs(self.pair_window_seconds)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn provisioning(&self) -> ProvisioningPolicy {
        ProvisioningPolicy {
            auto_create_spools: self.auto_create_spools,
            auto_create_locations: self.auto_create_locations,
        }
    }

    pub fn location_seeds(&self) -> Vec<LocationSeed> {
        self.locations
            .iter()
            .map(|loc| LocationSeed {
                id: loc.qr.trim().to_string(),
                label: loc.name.clone(),
                capacity: loc.capacity,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.pair_window_seconds == 0 {
            bail!("pair_window_seconds must be greater than zero");
        }
        if self.debounce_ms == 0 {
            bail!("debounce_ms must be greater than zero");
        }
        if self.quiet_period() >= self.pair_window() {
            bail!(
                "debounce_ms ({}) must be shorter than the pairing window ({}s)",
                self.debounce_ms,
                self.pair_window_seconds
            );
        }
        if self.tick_interval_ms == 0 {
            bail!("tick_interval_ms must be greater than zero");
        }
        if self.spool_code_prefixes.is_empty() {
            bail!("at least one spool code prefix is required");
        }
        if self
            .spool_code_prefixes
            .iter()
            .chain(&self.location_code_prefixes)
            .any(|prefix| prefix.trim().is_empty())
        {
            bail!("code prefixes cannot be empty");
        }

        let mut seen = HashSet::new();
        for loc in &self.locations {
            let qr = loc.qr.trim();
            if qr.is_empty() {
                bail!("location '{}' has an empty QR payload", loc.name);
            }
            if !seen.insert(qr) {
                bail!("duplicate location QR payload '{qr}'");
            }
        }

        Ok(())
    }

    /// Reads the config at `path`, writing the defaults there first if it is missing.
    /// A file that fails to parse falls back to the defaults without being overwritten.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("Ignoring unreadable config {}: {err}", path.display());
                    Self::default()
                }
            }
        } else {
            let config = Self::default();
            config.persist(path)?;
            info!("Wrote default config to {}", path.display());
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

/// Where the station keeps its files.
#[derive(Debug, Clone)]
pub struct StationPaths {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
}

impl StationPaths {
    /// `FS_CONF_PATH` / `FS_DB_PATH` win; otherwise both live under `$HOME/.filament_station`.
    pub fn from_env() -> Self {
        let data_dir = env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_DIR_NAME);

        Self {
            config_path: env::var_os(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("config.json")),
            db_path: env::var_os(DB_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir.join("filaments.sqlite3")),
        }
    }
}
