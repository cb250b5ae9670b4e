//! Application configuration.
//!
//! Settings come from built-in defaults, optionally merged with a YAML file.
//! Every section and field may be omitted.

use crate::error::{LayupError, Result};
use crate::registry::{DEFAULT_ARCHITECTURE, DEFAULT_OS};
use crate::transport::ClientConfig;
use config::{Config as ConfigRs, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};


/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub registries: Registries,
    #[serde(default)]
    pub auth: Auth,
}

impl Config {
    /// Parses a `Config` from a YAML string.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let builder = ConfigRs::builder()
            .add_source(Self::defaults()?)
            .add_source(File::from_str(s, FileFormat::Yaml));

        Self::from_builder(builder, None)
    }

    /// Loads a `Config`, merging the file at `path` over the defaults.
    ///
    /// Without a path, the default location is used if a file exists there.
    /// An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigRs::builder().add_source(Self::defaults()?);

        let source = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_path().filter(|p| p.is_file()),
        };
        if let Some(p) = &source {
            log::debug!("loading configuration from {}", p.display());
            builder = builder.add_source(File::from(p.as_path()).required(true));
        }

        Self::from_builder(builder, source.map(|p| p.display().to_string()))
    }

    /// Transport settings derived from the network section.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_timeout(self.network.timeout)
            .with_max_idle_per_host(self.network.max_idle_per_host)
    }

    fn defaults() -> Result<ConfigRs> {
        ConfigRs::try_from(&Config::default()).map_err(|e| {
            LayupError::config_with_source("Failed to build default configuration", None, e)
        })
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        path: Option<String>,
    ) -> Result<Self> {
        builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| {
                LayupError::config_with_source(
                    "Failed to deserialize configuration".to_string(),
                    path,
                    e,
                )
            })
    }
}

/// `$XDG_CONFIG_HOME/layup/config.yaml` or the platform equivalent.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("layup").join("config.yaml"))
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    /// Connection timeout in seconds. Transfers have no overall deadline.
    #[serde(default = "default_network_timeout")]
    pub timeout: u64,

    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            timeout: default_network_timeout(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

fn default_network_timeout() -> u64 {
    30
}

fn default_max_idle_per_host() -> usize {
    10
}

/// Platform picked when a base image is multi-platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    #[serde(default = "default_os")]
    pub os: String,

    #[serde(default = "default_architecture")]
    pub architecture: String,
}

impl Platform {
    /// Parses `os/architecture`, e.g. `linux/arm64`.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::config::Platform;
    ///
    /// let platform = Platform::parse("linux/arm64").unwrap();
    /// assert_eq!(platform.architecture, "arm64");
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().split_once('/') {
            Some((os, architecture)) if !os.is_empty() && !architecture.is_empty() => Ok(Self {
                os: os.to_string(),
                architecture: architecture.to_string(),
            }),
            _ => Err(LayupError::input(format!(
                "platform '{}' is not OS/ARCHITECTURE",
                s
            ))),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self {
            os: default_os(),
            architecture: default_architecture(),
        }
    }
}

fn default_os() -> String {
    DEFAULT_OS.to_string()
}

fn default_architecture() -> String {
    DEFAULT_ARCHITECTURE.to_string()
}

/// Registry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Registries {
    /// Hosts (with port, if any) reached over plain HTTP.
    #[serde(default)]
    pub insecure: Vec<String>,
}

/// Credential settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Auth {
    /// Directory holding docker's `config.json`. Defaults to `~/.docker`.
    #[serde(default)]
    pub docker_config: Option<PathBuf>,
}
