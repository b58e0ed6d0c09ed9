use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub enhance: EnhanceConfig,
    pub schedule: ScheduleConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub api_url: String,
    pub access_key: String,
    /// Spreadsheet page to render.
    pub sheet_url: String,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    pub default_preset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// `HH:MM` (UTC) of the daily label check.
    pub daily_check_time: String,
    /// `HH:MM` (UTC) of the end-of-day report.
    pub daily_report_time: String,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    pub monthly_limit: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: "~/.sheetshot".to_string(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.apiflash.com/v1/urltoimage".to_string(),
            access_key: String::new(),
            sheet_url: String::new(),
            width: 2440,
            height: 2000,
            quality: 100,
            timeout_seconds: 60,
        }
    }
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            default_preset: "default".to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            daily_check_time: "00:01".to_string(),
            daily_report_time: "23:00".to_string(),
            poll_interval_seconds: 60,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { monthly_limit: 100 }
    }
}

impl AppConfig {
    /// Load config from `~/.sheetshot/config.toml`, creating defaults if missing.
    pub fn load() -> Result<Self> {
        let base_dir = Self::default_base_dir()?;
        let config_path = base_dir.join("config.toml");

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = AppConfig::default();
            config.ensure_dirs()?;
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| CoreError::Config(format!("failed to serialize config: {e}")))?;
            fs::write(&config_path, toml_str)?;
            Ok(config)
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read config: {e}")))?;
        let config: AppConfig = toml::from_str(&contents)
            .map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Returns the resolved base directory (expands `~`).
    pub fn base_dir(&self) -> Result<PathBuf> {
        resolve_tilde(&self.storage.base_dir)
    }

    /// Returns the default base directory (`~/.sheetshot`).
    pub fn default_base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Config("could not determine home directory".to_string()))?;
        Ok(home.join(".sheetshot"))
    }

    /// Root of the archive (`metadata.json` and per-scope image folders).
    pub fn screenshots_dir(&self) -> Result<PathBuf> {
        Ok(self.base_dir()?.join("screenshots"))
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        let base = self.base_dir()?;
        fs::create_dir_all(&base)?;
        fs::create_dir_all(base.join("screenshots"))?;
        Ok(())
    }
}

/// Expand `~` to the user's home directory.
fn resolve_tilde(path: &str) -> Result<PathBuf> {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Config("could not determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if path == "~" {
        dirs::home_dir()
            .ok_or_else(|| CoreError::Config("could not determine home directory".to_string()))
    } else {
        Ok(PathBuf::from(path))
    }
}

/// Initialize tracing/logging with env filter.
///
/// Respects `RUST_LOG` env var. Defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
