use super::{Body, Method, Request, Response, Transport};
use crate::error::{LayupError, Result};
use reqwest::blocking::Client as ReqwestClient;
use std::time::Duration;

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

/// Configuration for the HTTP transport.
///
/// `timeout_seconds` bounds connection setup only. Once connected, a request
/// has no overall deadline, so large blob transfers are not cut off.
///
/// # Examples
///
/// ```
/// use liblayup::transport::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_timeout(60)
///     .with_max_idle_per_host(20);
/// assert_eq!(config.timeout_seconds, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Connection timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Maximum idle connections per host (default: 10)
    pub max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_idle_per_host: 10,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connection timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the maximum idle connections per host.
    pub fn with_max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = max;
        self
    }
}

/// [`Transport`] over reqwest's blocking client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: ReqwestClient,
    config: ClientConfig,
}

impl HttpTransport {
    /// Creates a transport with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a transport with custom configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .timeout(None::<Duration>)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .user_agent(concat!("layup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LayupError::network_with_source("Failed to create HTTP client", e))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn translate_reqwest_error(&self, error: reqwest::Error, url: &str) -> LayupError {
        if error.is_timeout() {
            LayupError::network(format!(
                "Connection to {} timed out after {} seconds",
                url, self.config.timeout_seconds
            ))
        } else if error.is_connect() {
            LayupError::network_with_source(format!("Failed to connect to {}", url), error)
        } else if error.is_request() {
            LayupError::network_with_source(format!("Failed to send request to {}", url), error)
        } else {
            LayupError::network_with_source(
                format!("Network error communicating with {}", url),
                error,
            )
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: Request) -> Result<Response> {
        let Request {
            method,
            url,
            headers,
            body,
        } = request;

        log::trace!("{} {}", method, url);

        let method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self.http_client.request(method, &url);
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match body {
            Body::Empty => builder,
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Stream { reader, length } => {
                builder.body(reqwest::blocking::Body::sized(reader, length))
            }
        };

        let response = builder
            .send()
            .map_err(|e| self.translate_reqwest_error(e, &url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| {
                LayupError::network_with_source(format!("Failed to read response from {}", url), e)
            })?
            .to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
