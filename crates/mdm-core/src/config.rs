use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Chunk retry parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds; attempt `n` waits `n * base_delay_secs`.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.base_delay_secs.is_finite() && self.base_delay_secs >= 0.0,
            "retry.base_delay_secs must be a non-negative number of seconds, got {}",
            self.base_delay_secs
        );
        Ok(())
    }

    pub fn policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.max_delay_secs);
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::try_from_secs_f64(self.base_delay_secs.max(0.0)).unwrap_or(max_delay),
            max_delay,
        }
    }
}

/// Settings shared by every component that issues HTTP requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    /// Abort a transfer whose throughput stays under 1 KiB/s for this long.
    pub low_speed_time_secs: u64,
    /// Hard wall-clock limit for one request.
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_time_secs: 60,
            timeout_secs: 3600,
            proxy: None,
            user_agent: None,
        }
    }
}

/// Global configuration loaded from `~/.config/mdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdmConfig {
    /// Connections (chunks) per job.
    pub connections: usize,
    /// Jobs processed concurrently.
    pub workers: usize,
    /// Below this many bytes per connection a job is fetched as a single stream.
    pub min_chunk_size: u64,
    /// Body read buffer in bytes, handed to libcurl.
    pub buffer_size: usize,
    /// Progress display refresh interval.
    pub progress_refresh_ms: u64,
    /// Directory for outputs without an explicit path (defaults to the working directory).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for MdmConfig {
    fn default() -> Self {
        Self {
            connections: 8,
            workers: 3,
            min_chunk_size: 1024 * 1024,
            buffer_size: 64 * 1024,
            progress_refresh_ms: 250,
            download_dir: None,
            retry: RetryConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl MdmConfig {
    /// Rejects values that would only fail later, mid-download.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.buffer_size > 0, "buffer_size must be at least 1 byte");
        self.retry.validate()
    }

    pub fn progress_refresh(&self) -> Duration {
        Duration::from_millis(self.progress_refresh_ms.max(50))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    parse(&data).with_context(|| format!("invalid config {}", path.display()))
}

fn parse(data: &str) -> Result<MdmConfig> {
    let cfg: MdmConfig = toml::from_str(data)?;
    cfg.validate()?;
    Ok(cfg)
}
