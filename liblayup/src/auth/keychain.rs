//! Credentials from a Docker client `config.json`.
//!
//! Only the inline `auths` section is read. Credential helpers (`credsStore`,
//! `credHelpers`) are external programs and are not invoked; hosts delegated
//! to one resolve to anonymous access with a warning.

use super::{CredentialResolver, Credentials};
use crate::error::{LayupError, Result};
use crate::reference::DEFAULT_REGISTRY;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(test)]
#[path = "keychain_tests.rs"]
mod tests;

/// Key under which `docker login` stores Docker Hub credentials.
const DOCKER_HUB_KEY: &str = "https://index.docker.io/v1/";

const DOCKER_HUB_HOSTS: &[&str] = &[DEFAULT_REGISTRY, "docker.io", "registry-1.docker.io"];

#[derive(Debug, Default, Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,

    #[serde(default, rename = "credHelpers")]
    cred_helpers: HashMap<String, String>,

    #[serde(default, rename = "credsStore")]
    creds_store: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,

    #[serde(default)]
    username: Option<String>,

    #[serde(default)]
    password: Option<String>,

    #[serde(default)]
    registrytoken: Option<String>,
}

/// Resolves credentials from a Docker `config.json`.
///
/// A missing file means anonymous access for every host. A file that exists
/// but cannot be read or parsed is an authentication error.
#[derive(Debug, Clone)]
pub struct DockerKeychain {
    path: PathBuf,
}

impl DockerKeychain {
    /// Uses the config file at `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Locates `config.json` the way the Docker client does: under
    /// `$DOCKER_CONFIG` if set, else `~/.docker`.
    pub fn from_env() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));
        Self::new(dir.join("config.json"))
    }

    /// Uses `config.json` inside the given directory.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(dir.as_ref().join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Option<DockerConfig>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no docker config at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(LayupError::authentication(
                    format!("Failed to read docker config {}: {}", self.path.display(), e),
                    None,
                ));
            }
        };

        serde_json::from_str(&contents).map(Some).map_err(|e| {
            LayupError::authentication(
                format!("Failed to parse docker config {}: {}", self.path.display(), e),
                None,
            )
        })
    }
}

impl CredentialResolver for DockerKeychain {
    fn resolve(&self, registry: &str) -> Result<Credentials> {
        let Some(config) = self.load()? else {
            return Ok(Credentials::Anonymous);
        };

        let candidates = candidate_hosts(registry);

        let entry = config.auths.iter().find_map(|(key, entry)| {
            let host = normalize_key(key);
            candidates.contains(&host).then_some(entry)
        });

        match entry {
            Some(entry) => entry_credentials(registry, entry),
            None => {
                if candidates.iter().any(|h| config.cred_helpers.contains_key(*h))
                    || config.creds_store.is_some()
                {
                    log::warn!(
                        "credentials for {} are held by a credential helper, which is not supported; using anonymous access",
                        registry
                    );
                }
                Ok(Credentials::Anonymous)
            }
        }
    }
}

fn candidate_hosts(registry: &str) -> Vec<&str> {
    if DOCKER_HUB_HOSTS.contains(&registry) {
        DOCKER_HUB_HOSTS.to_vec()
    } else {
        vec![registry]
    }
}

/// Reduces an `auths` key such as `https://host:5000/v2/` to `host:5000`.
fn normalize_key(key: &str) -> &str {
    if key == DOCKER_HUB_KEY {
        return DEFAULT_REGISTRY;
    }
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

fn entry_credentials(registry: &str, entry: &AuthEntry) -> Result<Credentials> {
    if let Some(token) = entry.registrytoken.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Credentials::bearer(token));
    }

    if let Some(auth) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        use base64::{Engine as _, engine::general_purpose};
        let decoded = general_purpose::STANDARD.decode(auth.trim()).map_err(|e| {
            LayupError::authentication(
                format!("Invalid auth entry for {}: {}", registry, e),
                None,
            )
        })?;
        let decoded = String::from_utf8(decoded).map_err(|e| {
            LayupError::authentication(
                format!("Invalid auth entry for {}: {}", registry, e),
                None,
            )
        })?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| {
            LayupError::authentication(
                format!("Invalid auth entry for {}: expected user:password", registry),
                None,
            )
        })?;
        return Ok(Credentials::basic(username, password));
    }

    match (&entry.username, &entry.password) {
        (Some(username), Some(password)) => Ok(Credentials::basic(username, password)),
        _ => Ok(Credentials::Anonymous),
    }
}
