use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::checks::{Check, CheckKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error("reading config file: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("writing config file: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("parsing config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("encoding config file: {0}")]
    EncodeFailed(#[from] toml::ser::Error),
    #[error("no config path available ($XDG_CONFIG_HOME and $HOME are both unset)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: Upstream,
    pub engine: Engine,
    #[serde(rename = "check")]
    pub checks: Vec<CheckEntry>,
}

/// Where reports go. An empty base URL leaves the engine in log-only mode.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Upstream {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    /// Cap on logged request/response bodies, in bytes. Zero disables it.
    pub max_body: usize,
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout_secs: upcast::DEFAULT_TIMEOUT.as_secs(),
            retries: upcast::DEFAULT_RETRIES,
            retry_delay_ms: upcast::DEFAULT_RETRY_DELAY.as_millis() as u64,
            max_body: upcast::DEFAULT_MAX_BODY,
        }
    }
}

/// Engine knobs. Parallelism and interval are clamped at setup.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    pub disabled: bool,
    pub parallel: usize,
    /// Report interval. Zero selects the default.
    pub interval_secs: u64,
    pub fast_tick_secs: u64,
    pub trigger_buffer: usize,
    pub degraded_threshold_ms: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            disabled: false,
            parallel: 1,
            interval_secs: 0,
            fast_tick_secs: 10,
            trigger_buffer: 10,
            degraded_threshold_ms: 1000,
        }
    }
}

/// One check definition as written in the config file
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckEntry {
    pub name: String,
    pub kind: CheckKind,
    pub target: String,
    #[serde(default)]
    pub expect: String,
    #[serde(default = "default_check_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_check_interval")]
    pub interval_secs: u64,
}

fn default_check_timeout() -> u64 {
    15
}

fn default_check_interval() -> u64 {
    300
}

impl CheckEntry {
    pub fn to_check(&self) -> Check {
        Check {
            name: self.name.clone(),
            kind: self.kind,
            target: self.target.clone(),
            expect: self.expect.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            interval: Duration::from_secs(self.interval_secs),
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/checkup/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Ok(home_dir) = env::var("HOME") {
        path::PathBuf::from(home_dir).join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("checkup/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Current Internal Configuration State:")?;
        writeln!(f, "  Upstream")?;
        writeln!(
            f,
            "    Base URL: {}",
            if self.upstream.base_url.is_empty() { "(log only)" } else { &self.upstream.base_url }
        )?;
        writeln!(f, "    Timeout: {}s, Retries: {}", self.upstream.timeout_secs, self.upstream.retries)?;
        writeln!(f, "  Engine")?;
        writeln!(f, "    Disabled: {}", self.engine.disabled)?;
        writeln!(f, "    Parallel: {}", self.engine.parallel)?;
        writeln!(f, "    Report Interval: {}s", self.engine.interval_secs)?;
        writeln!(f, "  Checks: {}", self.checks.len())?;
        for check in &self.checks {
            writeln!(
                f,
                "    {} ({}) -> {} every {}s",
                check.name, check.kind, check.target, check.interval_secs
            )?;
        }
        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/checkup/config.toml
    /// or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }
}
