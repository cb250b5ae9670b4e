//! Authentication handling for OCI registries.
//!
//! This module provides the credential types sent to registries, the parser
//! for `WWW-Authenticate` challenges, and the [`CredentialResolver`] seam
//! through which the pipeline asks "what credentials does this host take?".
//! Credentials are never stored or cached here; resolvers are consulted once
//! per registry client.

use crate::error::{LayupError, Result};
use std::collections::HashMap;

mod keychain;

pub use keychain::DockerKeychain;


/// Credentials for registry authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No authentication required (anonymous access)
    Anonymous,

    /// HTTP Basic authentication with username and password
    Basic {
        /// Username for authentication
        username: String,
        /// Password for authentication
        password: String,
    },

    /// Bearer token authentication (OAuth2-style)
    Bearer {
        /// The bearer token
        token: String,
    },
}

impl Credentials {
    /// Creates anonymous credentials.
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// Creates Basic authentication credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::auth::Credentials;
    ///
    /// let creds = Credentials::basic("username", "password");
    /// assert!(creds.to_header_value().unwrap().starts_with("Basic "));
    /// ```
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates Bearer token credentials.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Returns true for [`Credentials::Anonymous`].
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns the Authorization header value for these credentials.
    pub fn to_header_value(&self) -> Option<String> {
        match self {
            Self::Anonymous => None,
            Self::Basic { username, password } => {
                use base64::{Engine as _, engine::general_purpose};
                let credentials = format!("{}:{}", username, password);
                let encoded = general_purpose::STANDARD.encode(credentials);
                Some(format!("Basic {}", encoded))
            }
            Self::Bearer { token } => Some(format!("Bearer {}", token)),
        }
    }
}

/// Information parsed from a WWW-Authenticate header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// The authentication scheme (e.g., "Bearer")
    pub scheme: String,

    /// The authentication realm, empty when a non-Bearer challenge has none
    pub realm: String,

    /// The service identifier
    pub service: Option<String>,

    /// The scope being requested
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parses a WWW-Authenticate header value.
    ///
    /// Quoted values may contain commas, as scopes with several actions do.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::auth::AuthChallenge;
    ///
    /// let header = r#"Bearer realm="https://auth.example.com/token",scope="repository:app:pull,push""#;
    /// let challenge = AuthChallenge::parse(header).unwrap();
    /// assert_eq!(challenge.scheme, "Bearer");
    /// assert_eq!(challenge.scope.as_deref(), Some("repository:app:pull,push"));
    /// ```
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();

        if header.is_empty() {
            return Err(LayupError::validation("Invalid WWW-Authenticate header format"));
        }
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        for (key, value) in split_params(params) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        // Only a token exchange needs the realm.
        let realm = match realm {
            Some(realm) => realm,
            None if scheme.eq_ignore_ascii_case("bearer") => {
                return Err(LayupError::validation(
                    "WWW-Authenticate header missing required 'realm' parameter",
                ));
            }
            None => String::new(),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            realm,
            service,
            scope,
        })
    }

    /// Returns true for the `Bearer` scheme, compared case-insensitively.
    pub fn is_bearer(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("bearer")
    }

    /// Returns true for the `Basic` scheme, compared case-insensitively.
    pub fn is_basic(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("basic")
    }
}

/// Splits `key=value, key="quoted, value"` parameters.
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = params.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| *c == ',' || c.is_whitespace()) {
            chars.next();
        }

        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
        }

        pairs.push((key.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    pairs
}

/// Resolves the credentials to use for a registry host.
///
/// Implementations return [`Credentials::Anonymous`] when nothing is
/// configured for the host, and an authentication error when configuration
/// exists but cannot be used.
pub trait CredentialResolver: Send + Sync {
    /// Resolves credentials for `registry` (a host, optionally with port).
    fn resolve(&self, registry: &str) -> Result<Credentials>;
}

/// Always resolves to anonymous access.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CredentialResolver for Anonymous {
    fn resolve(&self, _registry: &str) -> Result<Credentials> {
        Ok(Credentials::Anonymous)
    }
}

/// A fixed host to credentials map.
///
/// # Examples
///
/// ```
/// use liblayup::auth::{CredentialResolver, Credentials, StaticCredentials};
///
/// let resolver = StaticCredentials::new()
///     .with("registry.example.com", Credentials::basic("ci", "secret"));
///
/// assert!(!resolver.resolve("registry.example.com").unwrap().is_anonymous());
/// assert!(resolver.resolve("ghcr.io").unwrap().is_anonymous());
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    hosts: HashMap<String, Credentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds credentials for a host.
    pub fn with<S: Into<String>>(mut self, registry: S, credentials: Credentials) -> Self {
        self.hosts.insert(registry.into(), credentials);
        self
    }
}

impl CredentialResolver for StaticCredentials {
    fn resolve(&self, registry: &str) -> Result<Credentials> {
        Ok(self
            .hosts
            .get(registry)
            .cloned()
            .unwrap_or(Credentials::Anonymous))
    }
}
