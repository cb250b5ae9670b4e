//! Application context that holds resolved configuration
//!
//! The context is built following the precedence order:
//! 1. Default values
//! 2. Config file values
//! 3. Environment variables
//! 4. CLI flags
//!
//! Once built, the context is passed as read-only throughout the application.

use liblayup::auth::DockerKeychain;
use liblayup::config::{Config, Platform};
use liblayup::transport::HttpTransport;
use liblayup::{Registry, Result};
use log::LevelFilter;
use std::env;
use std::path::Path;
use std::sync::Arc;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// How much the CLI reports, from the `-v` count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerbosityLevel {
    Normal,
    Verbose,
    Debug,
    Trace,
}

impl VerbosityLevel {
    pub fn from_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Normal,
            1 => VerbosityLevel::Verbose,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }

    /// Log level installed unless `RUST_LOG` says otherwise.
    pub fn log_filter(&self) -> LevelFilter {
        match self {
            VerbosityLevel::Normal => LevelFilter::Warn,
            VerbosityLevel::Verbose => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Whether output may use colors and progress indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl From<&str> for ColorChoice {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "always" => ColorChoice::Always,
            "never" => ColorChoice::Never,
            _ => ColorChoice::Auto,
        }
    }
}

/// Application context with resolved configuration and runtime state
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Resolved configuration
    pub config: Config,
    pub color: ColorChoice,
    pub verbosity: VerbosityLevel,
}

impl AppContext {
    /// Build context with precedence: defaults > config file > env vars > CLI flags
    pub fn build(
        config_path: Option<&Path>,
        color: ColorChoice,
        verbosity: VerbosityLevel,
    ) -> Result<Self> {
        let mut config = Config::load(config_path)?;
        apply_env(&mut config, |name| env::var(name).ok())?;

        Ok(Self {
            config,
            color,
            verbosity,
        })
    }

    /// The registry facade configured by this context.
    pub fn registry(&self) -> Result<Registry> {
        let transport = HttpTransport::with_config(self.config.client_config())?;
        let keychain = match &self.config.auth.docker_config {
            Some(dir) => DockerKeychain::in_dir(dir),
            None => DockerKeychain::from_env(),
        };
        log::debug!("reading credentials from {}", keychain.path().display());

        Ok(Registry::new(Arc::new(transport), Arc::new(keychain))
            .with_insecure(self.config.registries.insecure.clone())
            .with_platform(
                self.config.platform.os.clone(),
                self.config.platform.architecture.clone(),
            ))
    }
}

/// Applies `LAYUP_PLATFORM`, `LAYUP_INSECURE_REGISTRIES` and `DOCKER_CONFIG`.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(platform) = lookup("LAYUP_PLATFORM") {
        config.platform = Platform::parse(&platform)?;
    }
    if let Some(hosts) = lookup("LAYUP_INSECURE_REGISTRIES") {
        for host in hosts.split(',').map(str::trim).filter(|h| !h.is_empty()) {
            if !config.registries.insecure.iter().any(|h| h == host) {
                config.registries.insecure.push(host.to_string());
            }
        }
    }
    if let Some(dir) = lookup("DOCKER_CONFIG").filter(|d| !d.is_empty()) {
        config.auth.docker_config = Some(dir.into());
    }
    Ok(())
}
