//! Error types for layup.
//!
//! Every failure in the pipeline is represented by [`LayupError`]. Errors
//! raised deep inside a stage are wrapped with the stage name as they cross
//! each composition boundary, so the rendered message reads as a trail:
//!
//! ```text
//! pushing: uploading blob sha256:...: Authentication error (status: Some(401)): ...
//! ```

use std::path::Path;
use thiserror::Error;


/// Boxed source error carried by several variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for layup operations
#[derive(Error, Debug)]
pub enum LayupError {
    /// Malformed user input (image reference, `KEY=VALUE` pair)
    #[error("Invalid input: {message}")]
    Input { message: String },

    /// Authentication errors (credential resolution, 401, 403, token exchange)
    #[error("Authentication error (status: {status_code:?}): {message}")]
    Authentication {
        message: String,
        status_code: Option<u16>,
    },

    /// Local filesystem and stream errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<String>,
        #[source]
        source: std::io::Error,
    },

    /// Network-related errors (connection, timeout, DNS)
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Resource not found errors (404)
    #[error("{resource_type} not found: {name}")]
    NotFound { resource_type: String, name: String },

    /// Rate limiting errors (429)
    #[error("Rate limit: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<u64>,
    },

    /// Server errors (5xx) and unexpected statuses
    #[error("Server error (status: {status_code}): {message}")]
    Server { message: String, status_code: u16 },

    /// Validation errors (malformed manifest, digest mismatch, etc.)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration errors (invalid config file, unreadable docker config)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// An error annotated with the pipeline stage it surfaced from
    #[error("{stage}: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<LayupError>,
    },
}

/// Result type alias for layup operations
pub type Result<T> = std::result::Result<T, LayupError>;

impl LayupError {
    /// Creates a new input error.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::error::LayupError;
    ///
    /// let err = LayupError::input("missing '=' in env entry");
    /// assert!(matches!(err, LayupError::Input { .. }));
    /// ```
    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Creates a new authentication error.
    pub fn authentication<S: Into<String>>(message: S, status_code: Option<u16>) -> Self {
        Self::Authentication {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new I/O error for the given local path.
    ///
    /// The path is appended to the message so it shows up in the rendered
    /// error, and is also kept separately for callers that inspect it.
    pub fn io<S: Into<String>>(message: S, path: &Path, source: std::io::Error) -> Self {
        let path = path.display().to_string();
        Self::Io {
            message: format!("{} '{}'", message.into(), path),
            path: Some(path),
            source,
        }
    }

    /// Creates a new I/O error that is not tied to a filesystem path.
    pub fn io_stream<S: Into<String>>(message: S, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            source,
        }
    }

    /// Creates a new network error.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::error::LayupError;
    ///
    /// let err = LayupError::network("connection refused");
    /// assert!(matches!(err, LayupError::Network { .. }));
    /// ```
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new network error with a source error.
    pub fn network_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new not found error.
    pub fn not_found<S: Into<String>>(resource_type: S, name: S) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit<S: Into<String>>(message: S, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new server error.
    pub fn server<S: Into<String>>(message: S, status_code: u16) -> Self {
        Self::Server {
            message: message.into(),
            status_code,
        }
    }

    /// Creates a new validation error.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::error::LayupError;
    ///
    /// let err = LayupError::validation("blob digest mismatch");
    /// assert!(matches!(err, LayupError::Validation { .. }));
    /// ```
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new validation error with a source error.
    pub fn validation_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(message: S, path: Option<S>) -> Self {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: None,
        }
    }

    /// Creates a new configuration error with a source error.
    pub fn config_with_source<S, E>(message: S, path: Option<S>, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Config {
            message: message.into(),
            path: path.map(|p| p.into()),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps this error with the name of the stage it surfaced from.
    pub fn in_stage<S: Into<String>>(self, stage: S) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping every stage annotation.
    pub fn root_cause(&self) -> &LayupError {
        let mut current = self;
        while let LayupError::Stage { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns the stage names from outermost to innermost.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::error::LayupError;
    ///
    /// let err = LayupError::network("reset")
    ///     .in_stage("uploading blob")
    ///     .in_stage("pushing");
    /// assert_eq!(err.stages(), vec!["pushing", "uploading blob"]);
    /// ```
    pub fn stages(&self) -> Vec<&str> {
        let mut stages = Vec::new();
        let mut current = self;
        while let LayupError::Stage { stage, source } = current {
            stages.push(stage.as_str());
            current = source;
        }
        stages
    }
}

/// Extension trait to annotate results with a stage name.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with the given stage name.
    fn stage<S: Into<String>>(self, stage: S) -> Result<T>;

    /// Like [`ResultExt::stage`], but builds the stage name lazily.
    fn with_stage<S, F>(self, f: F) -> Result<T>
    where
        S: Into<String>,
        F: FnOnce() -> S;
}

impl<T> ResultExt<T> for Result<T> {
    fn stage<S: Into<String>>(self, stage: S) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }

    fn with_stage<S, F>(self, f: F) -> Result<T>
    where
        S: Into<String>,
        F: FnOnce() -> S,
    {
        self.map_err(|e| e.in_stage(f()))
    }
}
