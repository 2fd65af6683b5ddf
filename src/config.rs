//! Configuration for dyno_logger.
//!
//! Supports loading from TOML file with CLI argument overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::acquisition_module::{
    AcquisitionConfig, DEFAULT_ERROR_BUDGET, DEFAULT_MAX_ITEMS, MAX_ITEMS_LIMIT,
};

/// Config file looked up when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/dyno_logger.toml";

/// Channels recorded by the dynamometer build.
pub const NUM_CHANNELS: usize = 3;

pub const DEFAULT_CHANNEL_NAMES: [&str; NUM_CHANNELS] =
    ["torque [Nm]", "rotation speed [1/s]", "power [W]"];

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub log_level: String,
    pub realtime_priority: bool,
    /// Directory that receives generated log files and the `latest` link.
    pub output_dir: PathBuf,
    /// Explicit log file; overrides the generated name.
    pub output_file: Option<PathBuf>,
    pub max_items: usize,
    pub error_budget: u32,
    pub channel_names: Vec<String>,
    pub sampler: SamplerConfig,
    pub refresh_interval: Duration,
}

/// Settings of the simulated sampler.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub data_rate_hz: f64,
    pub amplitudes: Vec<f64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            data_rate_hz: 100.0,
            amplitudes: vec![0.1, 10.0, 1.0],
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            realtime_priority: false,
            output_dir: PathBuf::from("data"),
            output_file: None,
            max_items: DEFAULT_MAX_ITEMS,
            error_budget: DEFAULT_ERROR_BUDGET,
            channel_names: DEFAULT_CHANNEL_NAMES.iter().map(|s| s.to_string()).collect(),
            sampler: SamplerConfig::default(),
            refresh_interval: Duration::from_millis(100),
        }
    }
}

impl LoggerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Loads `explicit` if given, failing when it can't be read. Without one,
    /// `fallback` is loaded if it exists and defaults are used otherwise.
    /// The flag is true when defaults were used.
    pub fn load(explicit: Option<&Path>, fallback: &Path) -> Result<(Self, bool)> {
        match explicit {
            Some(path) => Ok((Self::from_file(path)?, false)),
            None if fallback.exists() => Ok((Self::from_file(fallback)?, false)),
            None => Ok((Self::default(), true)),
        }
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(
        &mut self,
        output: Option<PathBuf>,
        max_items: Option<usize>,
        error_budget: Option<u32>,
    ) {
        if let Some(path) = output {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                self.output_dir = dir.to_path_buf();
            }
            self.output_file = Some(path);
        }
        if let Some(max_items) = max_items {
            self.max_items = max_items;
        }
        if let Some(error_budget) = error_budget {
            self.error_budget = error_budget;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 || self.max_items > MAX_ITEMS_LIMIT {
            bail!(
                "max_items must be between 1 and {}, got {}",
                MAX_ITEMS_LIMIT,
                self.max_items
            );
        }
        if self.channel_names.len() != NUM_CHANNELS {
            bail!(
                "expected {} channel names, got {}",
                NUM_CHANNELS,
                self.channel_names.len()
            );
        }
        if self.sampler.amplitudes.len() != NUM_CHANNELS {
            bail!(
                "expected {} sampler amplitudes, got {}",
                NUM_CHANNELS,
                self.sampler.amplitudes.len()
            );
        }
        let rate = self.sampler.data_rate_hz;
        if !(rate > 0.0) {
            bail!("data_rate_hz must be positive, got {}", rate);
        }
        if Duration::try_from_secs_f64(1.0 / rate).is_err() {
            bail!("data_rate_hz {} is too small", rate);
        }
        Ok(())
    }

    pub fn acquisition(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            max_items: self.max_items,
            error_budget: self.error_budget,
            realtime_priority: self.realtime_priority,
        }
    }

    /// Amplitudes as a fixed array. Call after `validate`.
    pub fn amplitudes(&self) -> Result<[f64; NUM_CHANNELS]> {
        <[f64; NUM_CHANNELS]>::try_from(self.sampler.amplitudes.as_slice())
            .context("sampler amplitudes do not match channel count")
    }
}

/// TOML file structure for deserialization.
#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    output: OutputToml,
    #[serde(default)]
    buffer: BufferToml,
    #[serde(default)]
    channels: ChannelsToml,
    #[serde(default)]
    sampler: SamplerToml,
    #[serde(default)]
    display: DisplayToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
    realtime_priority: bool,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            realtime_priority: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct OutputToml {
    dir: PathBuf,
    file: Option<PathBuf>,
}

impl Default for OutputToml {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            file: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BufferToml {
    max_items: usize,
    error_budget: u32,
}

impl Default for BufferToml {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            error_budget: DEFAULT_ERROR_BUDGET,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ChannelsToml {
    names: Vec<String>,
}

impl Default for ChannelsToml {
    fn default() -> Self {
        Self {
            names: DEFAULT_CHANNEL_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SamplerToml {
    data_rate_hz: f64,
    amplitudes: Vec<f64>,
}

impl Default for SamplerToml {
    fn default() -> Self {
        let defaults = SamplerConfig::default();
        Self {
            data_rate_hz: defaults.data_rate_hz,
            amplitudes: defaults.amplitudes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DisplayToml {
    refresh_ms: u64,
}

impl Default for DisplayToml {
    fn default() -> Self {
        Self { refresh_ms: 100 }
    }
}

impl From<TomlConfig> for LoggerConfig {
    fn from(toml: TomlConfig) -> Self {
        Self {
            log_level: toml.general.log_level,
            realtime_priority: toml.general.realtime_priority,
            output_dir: toml.output.dir,
            output_file: toml.output.file,
            max_items: toml.buffer.max_items,
            error_budget: toml.buffer.error_budget,
            channel_names: toml.channels.names,
            sampler: SamplerConfig {
                data_rate_hz: toml.sampler.data_rate_hz,
                amplitudes: toml.sampler.amplitudes,
            },
            refresh_interval: Duration::from_millis(toml.display.refresh_ms),
        }
    }
}
