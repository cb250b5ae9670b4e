//! Image reference parsing.
//!
//! References are parsed with weak validation: hostnames are not checked
//! against DNS rules and tags only need to be non-empty. The parser follows
//! the usual conventions of the Docker CLI:
//!
//! - the first path component is a registry host when it contains `.` or `:`
//!   or is `localhost`; otherwise the registry is Docker Hub
//! - single-component Docker Hub repositories live under `library/`
//! - a reference without tag or digest means `:latest`

use crate::digest::Digest;
use crate::error::{LayupError, Result};
use std::fmt;
use std::str::FromStr;


/// Registry used when a reference names none.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Tag used when a reference names neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

const DEFAULT_PREFIX: &str = "library";
const LOCALHOST: &str = "localhost";
const ALIASES: &[(&str, &str)] = &[
    ("docker.io", DEFAULT_REGISTRY),
    ("registry-1.docker.io", DEFAULT_REGISTRY),
];

/// A repository on a specific registry, e.g. `ghcr.io/user/app`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Repository {
    registry: String,
    path: String,
}

impl Repository {
    /// Creates a repository from an already normalized registry and path.
    pub fn new<R: Into<String>, P: Into<String>>(registry: R, path: P) -> Self {
        Self {
            registry: registry.into(),
            path: path.into(),
        }
    }

    /// Returns the registry host (with port, if any).
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Returns the repository path within the registry.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the token scope for this repository, e.g. `repository:user/app:pull`.
    pub fn scope(&self, actions: &str) -> String {
        format!("repository:{}:{}", self.path, actions)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.path)
    }
}

/// A parsed image reference: registry, repository path, and tag or digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    repository: Repository,
    tag: Option<String>,
    digest: Option<Digest>,
}

impl Reference {
    /// Parses a reference string.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::Reference;
    ///
    /// let reference = Reference::parse("alpine").unwrap();
    /// assert_eq!(reference.registry(), "index.docker.io");
    /// assert_eq!(reference.repository_path(), "library/alpine");
    /// assert_eq!(reference.identifier(), "latest");
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }

    /// Returns the registry part of the reference.
    pub fn registry(&self) -> &str {
        self.repository.registry()
    }

    /// Returns the repository path part of the reference.
    pub fn repository_path(&self) -> &str {
        self.repository.path()
    }

    /// Returns the repository (registry + path) this reference lives in.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Returns the tag part of the reference, if present.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Returns the digest part of the reference, if present.
    pub fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    /// Returns what to put after `/manifests/`: the digest if present, else the tag.
    pub fn identifier(&self) -> &str {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => digest.as_str(),
            (None, Some(tag)) => tag,
            (None, None) => DEFAULT_TAG,
        }
    }

    fn invalid(s: &str, why: &str) -> LayupError {
        LayupError::input(format!("could not parse reference '{}': {}", s, why))
    }
}

impl FromStr for Reference {
    type Err = LayupError;

    fn from_str(s: &str) -> Result<Self> {
        let original = s;
        let s = s.trim();
        if s.is_empty() {
            return Err(Self::invalid(original, "reference is empty"));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(Self::invalid(original, "reference contains whitespace"));
        }

        // Split off a digest first; it may itself contain ':'.
        let (mut name, digest) = match s.split_once('@') {
            Some((name, digest)) => {
                let digest = Digest::from_str(digest)
                    .map_err(|e| Self::invalid(original, &e.to_string()))?;
                (name, Some(digest))
            }
            None => (s, None),
        };

        // A ':' after the last '/' starts the tag; earlier ones belong to a port.
        let slash = name.rfind('/');
        let mut tag = None;
        if let Some(colon) = name.rfind(':')
            && slash.is_none_or(|slash| colon > slash)
        {
            let value = &name[colon + 1..];
            if value.is_empty() {
                return Err(Self::invalid(original, "tag is empty"));
            }
            tag = Some(value.to_string());
            name = &name[..colon];
        }

        let mut registry = DEFAULT_REGISTRY;
        if let Some((first, rest)) = name.split_once('/')
            && (first.contains('.') || first.contains(':') || first == LOCALHOST)
        {
            registry = first;
            name = rest;
        }
        for (from, into) in ALIASES {
            if registry == *from {
                registry = into;
                break;
            }
        }

        if name.is_empty() {
            return Err(Self::invalid(original, "repository is empty"));
        }
        if name.split('/').any(str::is_empty) {
            return Err(Self::invalid(original, "repository has an empty path component"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '.' | '_' | '-' | '/'))
        {
            return Err(Self::invalid(
                original,
                &format!("repository contains invalid character '{}'", bad),
            ));
        }

        let path = if registry == DEFAULT_REGISTRY && !name.contains('/') {
            format!("{}/{}", DEFAULT_PREFIX, name)
        } else {
            name.to_string()
        };

        Ok(Reference {
            repository: Repository::new(registry, path),
            tag,
            digest,
        })
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
