//! Application configuration.
//!
//! Layers, later wins: built-in defaults, `~/.config/syscheck/config.yaml`
//! (or `--config PATH`), then `SYSCHECK_*` environment variables with `__`
//! separating nested keys (`SYSCHECK_SSH__PORT=2222`). Command-line flags
//! are applied on top by the command handlers.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::connector::{SshOptions, WinRmOptions};
use crate::render::OutputFormat;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub output: OutputFormat,
    pub profile_dir: Option<PathBuf>,
    pub ssh: SshConfig,
    pub winrm: WinRmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            output: OutputFormat::Text,
            profile_dir: None,
            ssh: SshConfig::default(),
            winrm: WinRmConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub port: u16,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub strict_host_key_checking: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        let defaults = SshOptions::default();
        Self {
            port: defaults.port,
            connect_timeout_secs: defaults.connect_timeout_secs,
            command_timeout_secs: defaults.command_timeout_secs,
            strict_host_key_checking: defaults.strict_host_key_checking,
        }
    }
}

impl SshConfig {
    pub fn to_options(&self, port: Option<u16>) -> SshOptions {
        SshOptions {
            port: port.unwrap_or(self.port),
            connect_timeout_secs: self.connect_timeout_secs,
            command_timeout_secs: self.command_timeout_secs,
            strict_host_key_checking: self.strict_host_key_checking.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WinRmConfig {
    /// Defaults to 5985, or 5986 with `https`.
    pub port: Option<u16>,
    pub https: bool,
    pub timeout_secs: Option<u64>,
    pub accept_invalid_certs: bool,
}

impl WinRmConfig {
    pub fn to_options(&self, port: Option<u16>) -> WinRmOptions {
        let default_port = if self.https { 5986 } else { 5985 };
        WinRmOptions {
            port: port.or(self.port).unwrap_or(default_port),
            https: self.https,
            timeout_secs: self
                .timeout_secs
                .unwrap_or(WinRmOptions::default().timeout_secs),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("syscheck").join("config.yaml"))
    }

    pub fn profile_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.profile_dir {
            return Ok(dir.clone());
        }
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("syscheck").join("profiles"))
    }
}

/// Load configuration. An explicitly named file must exist; the default
/// location is optional.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                bail!("config file {} does not exist", path.display());
            }
            path.to_path_buf()
        }
        None => Config::path()?,
    };

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(&path))
        .merge(Env::prefixed("SYSCHECK_").split("__"))
        .extract()
        .with_context(|| format!("loading configuration from {}", path.display()))
}
