//! Daemon configuration.
//!
//! Layered like the rest of the deployment tooling expects: optional JSON
//! config file named by an environment variable, then per-field environment
//! overrides, then validation. Missing file and missing fields fall back to
//! defaults so `lotmond` and `lot_relay` run out of the box.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureConfig;
use crate::layout::DEFAULT_MARGIN;

const DEFAULT_ZONES_PATH: &str = "zones.json";
const DEFAULT_STREAM_ADDR: &str = "0.0.0.0:9999";
const DEFAULT_JPEG_QUALITY: u8 = 70;
const DEFAULT_UPSTREAM_ADDR: &str = "127.0.0.1:9999";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_RECONNECT_SECS: u64 = 5;
const DEFAULT_PLACEHOLDER_WIDTH: u32 = 960;
const DEFAULT_PLACEHOLDER_HEIGHT: u32 = 540;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    zones_path: Option<PathBuf>,
    capture: Option<CaptureConfigFile>,
    stream: Option<StreamConfigFile>,
    vehicle_labels: Option<Vec<String>>,
    auto_layout_margin: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    addr: Option<String>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub zones_path: PathBuf,
    pub capture: CaptureConfig,
    pub stream_addr: String,
    pub jpeg_quality: u8,
    /// Class labels counted as vehicles. Empty means the built-in set.
    pub vehicle_labels: Vec<String>,
    pub auto_layout_margin: i32,
}

impl MonitorConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOTMON_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file::<MonitorConfigFile>(Path::new(path))?,
            None => MonitorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let capture_defaults = CaptureConfig::default();
        let capture = CaptureConfig {
            source: file
                .capture
                .as_ref()
                .and_then(|capture| capture.source.clone())
                .unwrap_or(capture_defaults.source),
            width: file
                .capture
                .as_ref()
                .and_then(|capture| capture.width)
                .unwrap_or(capture_defaults.width),
            height: file
                .capture
                .as_ref()
                .and_then(|capture| capture.height)
                .unwrap_or(capture_defaults.height),
            target_fps: file
                .capture
                .as_ref()
                .and_then(|capture| capture.target_fps)
                .unwrap_or(capture_defaults.target_fps),
        };
        Self {
            zones_path: file
                .zones_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ZONES_PATH)),
            capture,
            stream_addr: file
                .stream
                .as_ref()
                .and_then(|stream| stream.addr.clone())
                .unwrap_or_else(|| DEFAULT_STREAM_ADDR.to_string()),
            jpeg_quality: file
                .stream
                .and_then(|stream| stream.jpeg_quality)
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            vehicle_labels: file.vehicle_labels.unwrap_or_default(),
            auto_layout_margin: file.auto_layout_margin.unwrap_or(DEFAULT_MARGIN),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("LOTMON_ZONES_PATH") {
            if !path.trim().is_empty() {
                self.zones_path = PathBuf::from(path);
            }
        }
        if let Ok(source) = std::env::var("LOTMON_SOURCE") {
            if !source.trim().is_empty() {
                self.capture.source = source;
            }
        }
        if let Ok(addr) = std::env::var("LOTMON_STREAM_ADDR") {
            if !addr.trim().is_empty() {
                self.stream_addr = addr;
            }
        }
        if let Ok(quality) = std::env::var("LOTMON_JPEG_QUALITY") {
            self.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("LOTMON_JPEG_QUALITY must be an integer 1-100"))?;
        }
        if let Ok(fps) = std::env::var("LOTMON_TARGET_FPS") {
            self.capture.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("LOTMON_TARGET_FPS must be an integer"))?;
        }
        if let Ok(labels) = std::env::var("LOTMON_VEHICLE_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.vehicle_labels = parsed;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.capture.target_fps == 0 {
            return Err(anyhow!("capture target_fps must be greater than zero"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture dimensions must be non-zero"));
        }
        if self.auto_layout_margin < 0 {
            return Err(anyhow!("auto_layout_margin must not be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    upstream_addr: Option<String>,
    http_addr: Option<String>,
    reconnect_secs: Option<u64>,
    jpeg_quality: Option<u8>,
    placeholder_width: Option<u32>,
    placeholder_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub upstream_addr: String,
    pub http_addr: String,
    pub reconnect_delay: Duration,
    pub jpeg_quality: u8,
    pub placeholder_size: (u32, u32),
}

impl RelayConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOT_RELAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file::<RelayConfigFile>(Path::new(path))?,
            None => RelayConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Self {
        Self {
            upstream_addr: file
                .upstream_addr
                .unwrap_or_else(|| DEFAULT_UPSTREAM_ADDR.to_string()),
            http_addr: file
                .http_addr
                .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string()),
            reconnect_delay: Duration::from_secs(
                file.reconnect_secs.unwrap_or(DEFAULT_RECONNECT_SECS),
            ),
            jpeg_quality: file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            placeholder_size: (
                file.placeholder_width.unwrap_or(DEFAULT_PLACEHOLDER_WIDTH),
                file.placeholder_height
                    .unwrap_or(DEFAULT_PLACEHOLDER_HEIGHT),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("LOT_RELAY_UPSTREAM") {
            if !addr.trim().is_empty() {
                self.upstream_addr = addr;
            }
        }
        if let Ok(addr) = std::env::var("LOT_RELAY_HTTP_ADDR") {
            if !addr.trim().is_empty() {
                self.http_addr = addr;
            }
        }
        if let Ok(secs) = std::env::var("LOT_RELAY_RECONNECT_SECS") {
            let seconds: u64 = secs.parse().map_err(|_| {
                anyhow!("LOT_RELAY_RECONNECT_SECS must be an integer number of seconds")
            })?;
            self.reconnect_delay = Duration::from_secs(seconds);
        }
        if let Ok(quality) = std::env::var("LOT_RELAY_JPEG_QUALITY") {
            self.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("LOT_RELAY_JPEG_QUALITY must be an integer 1-100"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.reconnect_delay.is_zero() {
            return Err(anyhow!("reconnect delay must be greater than zero"));
        }
        if self.placeholder_size.0 == 0 || self.placeholder_size.1 == 0 {
            return Err(anyhow!("placeholder dimensions must be non-zero"));
        }
        Ok(())
    }
}

fn read_config_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
