use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Source;

const DEFAULT_POLL_INTERVAL_MS: u64 = 33;
const DEFAULT_STOP_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_FALLBACK_SOURCES: usize = 16;
const DEFAULT_CAPTURE_WIDTH: u32 = 320;
const DEFAULT_CAPTURE_HEIGHT: u32 = 240;

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    source_list: Option<PathBuf>,
    fallback_sources: Option<usize>,
    poll_interval_ms: Option<u64>,
    stop_timeout_ms: Option<u64>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

/// Engine configuration.
///
/// Loaded from an optional JSON file (`CAMWALL_CONFIG`), then overridden
/// field by field from the environment, then validated.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Text file with one source address per line; blank lines ignored.
    pub source_list: Option<PathBuf>,
    /// Number of synthetic `stub://` sources generated when no list is available.
    pub fallback_sources: usize,
    /// Target delay between successive pull attempts for one source.
    pub poll_interval: Duration,
    /// Bound on how long `stop` waits for an acquisition loop to exit.
    pub stop_timeout: Duration,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Dimensions for synthetic capture backends; real streams keep their
    /// native dimensions.
    pub width: u32,
    pub height: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_list: None,
            fallback_sources: DEFAULT_FALLBACK_SOURCES,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stop_timeout: Duration::from_millis(DEFAULT_STOP_TIMEOUT_MS),
            capture: CaptureSettings {
                width: DEFAULT_CAPTURE_WIDTH,
                height: DEFAULT_CAPTURE_HEIGHT,
            },
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMWALL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EngineConfigFile) -> Self {
        Self {
            source_list: file.source_list,
            fallback_sources: file.fallback_sources.unwrap_or(DEFAULT_FALLBACK_SOURCES),
            poll_interval: Duration::from_millis(
                file.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            stop_timeout: Duration::from_millis(
                file.stop_timeout_ms.unwrap_or(DEFAULT_STOP_TIMEOUT_MS),
            ),
            capture: CaptureSettings {
                width: file
                    .capture
                    .as_ref()
                    .and_then(|capture| capture.width)
                    .unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: file
                    .capture
                    .as_ref()
                    .and_then(|capture| capture.height)
                    .unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("CAMWALL_SOURCES") {
            if !path.trim().is_empty() {
                self.source_list = Some(PathBuf::from(path));
            }
        }
        if let Ok(count) = std::env::var("CAMWALL_FALLBACK_SOURCES") {
            self.fallback_sources = count
                .parse()
                .map_err(|_| anyhow!("CAMWALL_FALLBACK_SOURCES must be an integer"))?;
        }
        if let Ok(interval) = std::env::var("CAMWALL_POLL_INTERVAL_MS") {
            let ms: u64 = interval
                .parse()
                .map_err(|_| anyhow!("CAMWALL_POLL_INTERVAL_MS must be an integer"))?;
            self.poll_interval = Duration::from_millis(ms);
        }
        if let Ok(timeout) = std::env::var("CAMWALL_STOP_TIMEOUT_MS") {
            let ms: u64 = timeout
                .parse()
                .map_err(|_| anyhow!("CAMWALL_STOP_TIMEOUT_MS must be an integer"))?;
            self.stop_timeout = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(anyhow!("poll_interval must be greater than zero"));
        }
        if self.stop_timeout.is_zero() {
            return Err(anyhow!("stop_timeout must be greater than zero"));
        }
        if self.fallback_sources == 0 {
            return Err(anyhow!("fallback_sources must be at least 1"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture dimensions must be greater than zero"));
        }
        Ok(())
    }

    /// Resolve the configured source list into indexed sources.
    ///
    /// Falls back to a generated synthetic list when no file is configured
    /// or the configured file does not exist, so the engine stays
    /// exercisable without real cameras.
    pub fn load_sources(&self) -> Result<Vec<Source>> {
        let addresses = match &self.source_list {
            Some(path) if path.exists() => read_source_list(path)?,
            Some(path) => {
                log::warn!(
                    "source list {} not found, generating {} synthetic sources",
                    path.display(),
                    self.fallback_sources
                );
                synthetic_addresses(self.fallback_sources)
            }
            None => synthetic_addresses(self.fallback_sources),
        };
        Ok(addresses
            .into_iter()
            .enumerate()
            .map(|(index, address)| Source::new(index, address))
            .collect())
    }
}

/// Read a source list: one connection address per line, blank lines ignored.
pub fn read_source_list(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read source list {}: {}", path.display(), e))?;
    Ok(raw
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect())
}

pub fn synthetic_addresses(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("stub://camera-{}", i + 1)).collect()
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
