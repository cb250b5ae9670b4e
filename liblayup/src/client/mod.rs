//! Registry API client for one registry host.
//!
//! This module implements the parts of the OCI Distribution Specification v2
//! API that building and pushing an image needs: manifest and blob reads,
//! blob existence checks, cross-repository mounts, monolithic blob uploads
//! and manifest uploads. Requests go through an injected [`Transport`].
//!
//! Authentication follows the registry's lead. Requests are sent without an
//! `Authorization` header until the registry answers `401`; the
//! `WWW-Authenticate` challenge then decides between Basic credentials and a
//! bearer token from the realm, and the request is retried once. The
//! resulting header is reused for every later request of this client.

use crate::auth::{AuthChallenge, Credentials};
use crate::digest::Digest;
use crate::error::{LayupError, Result};
use crate::layer::BlobSource;
use crate::oci::MANIFEST_ACCEPT;
use crate::reference::Repository;
use crate::transport::{Body, Request, Response, Transport};
use serde::Deserialize;
use std::io::Read;
use std::sync::{Arc, Mutex};
use url::Url;


/// Hosts reached over plain HTTP without being configured as insecure.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Token endpoint response. Registries send `token`, `access_token`, or both.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// A manifest as fetched, with its verified digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedManifest {
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
    pub digest: Digest,
}

/// Result of a cross-repository mount request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    /// The registry attached the blob to the repository.
    Mounted,
    /// The registry could not mount and opened an upload session instead.
    Declined { location: String },
}

/// Client for a single registry host.
pub struct Client {
    transport: Arc<dyn Transport>,
    registry: String,
    base_url: String,
    credentials: Credentials,
    scopes: Vec<String>,
    authorization: Mutex<Option<String>>,
}

impl Client {
    /// Creates a client for `registry` (host with optional port).
    ///
    /// The scheme is `http` for loopback hosts and when `insecure` is set,
    /// `https` otherwise.
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: &str,
        credentials: Credentials,
        insecure: bool,
    ) -> Self {
        let scheme = if insecure || is_loopback(registry) {
            "http"
        } else {
            "https"
        };
        Self {
            transport,
            registry: registry.to_string(),
            base_url: format!("{}://{}", scheme, registry),
            credentials,
            scopes: Vec::new(),
            authorization: Mutex::new(None),
        }
    }

    /// Sets the scopes requested from a token server,
    /// e.g. `repository:team/app:pull,push`.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Base URL including scheme, without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches a manifest by tag or digest.
    ///
    /// The returned digest is computed from the bytes and checked against the
    /// `Docker-Content-Digest` header and against `reference` when it is a
    /// digest.
    pub fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<FetchedManifest> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repository, reference);
        let accept = MANIFEST_ACCEPT.join(", ");

        let response = self.send(&|| Ok(Request::get(&url).header("Accept", accept.as_str())))?;
        let response = check_response_status(
            response,
            "manifest",
            &format!("{}/{}:{}", self.registry, repository, reference),
        )?;

        let digest = Digest::sha256(&response.body);
        if let Some(header) = response.header("Docker-Content-Digest") {
            verify_reported_digest(header, &digest)?;
        }
        if let Ok(requested) = reference.parse::<Digest>()
            && requested != digest
        {
            return Err(LayupError::validation(format!(
                "Digest mismatch: requested manifest {}, received {}",
                requested, digest
            )));
        }

        let media_type = response.header("Content-Type").map(|v| v.to_string());
        Ok(FetchedManifest {
            bytes: response.body,
            media_type,
            digest,
        })
    }

    /// Fetches a blob and verifies it against `digest`.
    pub fn fetch_blob(&self, repository: &str, digest: &Digest) -> Result<Vec<u8>> {
        let url = format!("{}/v2/{}/blobs/{}", self.base_url, repository, digest);

        let response = self.send(&|| Ok(Request::get(&url)))?;
        let response = check_response_status(
            response,
            "blob",
            &format!("{}/{}@{}", self.registry, repository, digest),
        )?;

        digest.verify(&response.body)?;
        Ok(response.body)
    }

    /// Checks whether a blob exists in a repository.
    pub fn blob_exists(&self, repository: &str, digest: &Digest) -> Result<bool> {
        let url = format!("{}/v2/{}/blobs/{}", self.base_url, repository, digest);

        let response = self.send(&|| Ok(Request::head(&url)))?;
        if response.status == 404 {
            return Ok(false);
        }
        check_response_status(response, "blob", digest.as_str())?;
        Ok(true)
    }

    /// Asks the registry to mount `digest` from `from` into `repository`.
    pub fn mount_blob(
        &self,
        repository: &str,
        digest: &Digest,
        from: &str,
    ) -> Result<MountOutcome> {
        let mut url =
            self.parse_url(&format!("{}/v2/{}/blobs/uploads/", self.base_url, repository))?;
        url.query_pairs_mut()
            .append_pair("mount", digest.as_str())
            .append_pair("from", from);
        let url = url.to_string();

        let response = self.send(&|| Ok(Request::post(&url)))?;
        match response.status {
            201 => Ok(MountOutcome::Mounted),
            202 => Ok(MountOutcome::Declined {
                location: upload_location(&response)?,
            }),
            _ => {
                let response = check_response_status(response, "upload", repository)?;
                Err(LayupError::server(
                    format!("Unexpected response to mount of {} into {}", digest, repository),
                    response.status,
                ))
            }
        }
    }

    /// Opens an upload session and returns its location.
    pub fn start_upload(&self, repository: &str) -> Result<String> {
        let url = format!("{}/v2/{}/blobs/uploads/", self.base_url, repository);

        let response = self.send(&|| Ok(Request::post(&url)))?;
        let response = check_response_status(response, "upload", repository)?;
        upload_location(&response)
    }

    /// Completes an upload session with the whole blob in one `PUT`.
    ///
    /// `open` is called for every attempt, since a rejected streamed body
    /// cannot be sent again.
    pub fn upload_blob(
        &self,
        location: &str,
        digest: &Digest,
        length: u64,
        open: &dyn Fn() -> Result<Box<dyn Read + Send>>,
    ) -> Result<()> {
        let mut url = self.parse_url(location)?;
        url.query_pairs_mut().append_pair("digest", digest.as_str());
        let url = url.to_string();

        let response = self.send(&|| {
            Ok(Request::put(&url)
                .header("Content-Type", "application/octet-stream")
                .body(Body::Stream {
                    reader: open()?,
                    length,
                }))
        })?;
        let response = check_response_status(response, "upload", location)?;

        if let Some(header) = response.header("Docker-Content-Digest") {
            verify_reported_digest(header, digest)?;
        }
        Ok(())
    }

    /// Uploads a manifest under a tag or digest and returns its digest.
    pub fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        bytes: &[u8],
    ) -> Result<Digest> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, repository, reference);

        let response = self.send(&|| {
            Ok(Request::put(&url)
                .header("Content-Type", media_type)
                .body(Body::Bytes(bytes.to_vec())))
        })?;
        let response = check_response_status(
            response,
            "repository",
            &format!("{}/{}", self.registry, repository),
        )?;

        let digest = Digest::sha256(bytes);
        if let Some(header) = response.header("Docker-Content-Digest") {
            verify_reported_digest(header, &digest)?;
        }
        Ok(digest)
    }

    /// Sends a request, authenticating and retrying once on `401`.
    fn send(&self, build: &dyn Fn() -> Result<Request>) -> Result<Response> {
        let response = self.transport.execute(self.authorize(build()?))?;
        if response.status != 401 {
            return Ok(response);
        }

        let Some(header) = response.header("WWW-Authenticate") else {
            return Ok(response);
        };
        let challenge = AuthChallenge::parse(header)?;

        let Some(authorization) = self.authenticate(&challenge)? else {
            return Ok(response);
        };
        *self.lock_authorization() = Some(authorization);

        log::debug!("retrying request to {} with credentials", self.registry);
        self.transport.execute(self.authorize(build()?))
    }

    fn authorize(&self, request: Request) -> Request {
        match self.lock_authorization().clone() {
            Some(value) if request.header_value("Authorization").is_none() => {
                request.header("Authorization", value)
            }
            _ => request,
        }
    }

    fn lock_authorization(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.authorization
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answers a challenge with an `Authorization` header value, or `None`
    /// when there is nothing to answer with.
    fn authenticate(&self, challenge: &AuthChallenge) -> Result<Option<String>> {
        if challenge.is_basic() {
            return Ok(match &self.credentials {
                Credentials::Anonymous => None,
                creds => creds.to_header_value(),
            });
        }

        if !challenge.is_bearer() {
            return Err(LayupError::authentication(
                format!(
                    "Unsupported authentication scheme '{}' from {}",
                    challenge.scheme, self.registry
                ),
                Some(401),
            ));
        }

        if let Credentials::Bearer { token } = &self.credentials {
            return Ok(Some(format!("Bearer {}", token)));
        }

        self.fetch_token(challenge).map(Some)
    }

    /// Exchanges credentials for a bearer token at the challenge realm.
    fn fetch_token(&self, challenge: &AuthChallenge) -> Result<String> {
        let mut url = Url::parse(&challenge.realm).map_err(|e| {
            LayupError::authentication(
                format!("Invalid token realm '{}': {}", challenge.realm, e),
                None,
            )
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &challenge.service {
                query.append_pair("service", service);
            }
            if self.scopes.is_empty() {
                if let Some(scope) = &challenge.scope {
                    query.append_pair("scope", scope);
                }
            } else {
                for scope in &self.scopes {
                    query.append_pair("scope", scope);
                }
            }
        }

        log::debug!("requesting token from {}", challenge.realm);

        let mut request = Request::get(url.as_str());
        if let Some(value) = self.credentials.to_header_value() {
            request = request.header("Authorization", value);
        }
        let response = self.transport.execute(request)?;

        if response.status == 401 || response.status == 403 {
            return Err(LayupError::authentication(
                format!(
                    "Token request for {} was rejected: {}",
                    self.registry,
                    response.text()
                ),
                Some(response.status),
            ));
        }
        let response = check_response_status(response, "token endpoint", &challenge.realm)?;

        let token: TokenResponse = serde_json::from_slice(&response.body).map_err(|e| {
            LayupError::authentication(format!("Invalid token response: {}", e), None)
        })?;
        token
            .token
            .or(token.access_token)
            .filter(|t| !t.is_empty())
            .map(|t| format!("Bearer {}", t))
            .ok_or_else(|| LayupError::authentication("Token response carried no token", None))
    }

    /// Parses an absolute URL or resolves a path against the base URL.
    fn parse_url(&self, location: &str) -> Result<Url> {
        let base = Url::parse(&format!("{}/", self.base_url))
            .map_err(|e| LayupError::validation_with_source("Invalid registry URL", e))?;
        base.join(location).map_err(|e| {
            LayupError::validation_with_source(format!("Invalid upload location '{}'", location), e)
        })
    }
}

impl BlobSource for Client {
    fn fetch_blob(&self, repository: &Repository, digest: &Digest) -> Result<Vec<u8>> {
        if repository.registry() != self.registry {
            return Err(LayupError::validation(format!(
                "Client for {} cannot read blobs of {}",
                self.registry, repository
            )));
        }
        Client::fetch_blob(self, repository.path(), digest)
    }
}

/// Returns true for loopback registries, with or without a port.
pub fn is_loopback(registry: &str) -> bool {
    let host = if registry.starts_with('[') {
        registry
            .find(']')
            .map(|end| &registry[..=end])
            .unwrap_or(registry)
    } else {
        registry.split(':').next().unwrap_or(registry)
    };
    LOCAL_HOSTS.contains(&host)
}

fn upload_location(response: &Response) -> Result<String> {
    response
        .header("Location")
        .map(|v| v.to_string())
        .ok_or_else(|| LayupError::validation("Upload response missing Location header"))
}

fn verify_reported_digest(header: &str, expected: &Digest) -> Result<()> {
    let reported: Digest = header.trim().parse()?;
    if &reported != expected {
        return Err(LayupError::validation(format!(
            "Digest mismatch: registry reported {}, expected {}",
            reported, expected
        )));
    }
    Ok(())
}

/// Maps a response to an error by status, passing successes through.
fn check_response_status(
    response: Response,
    resource_type: &str,
    name: &str,
) -> Result<Response> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    let body = response.text();

    match status {
        401 => Err(LayupError::authentication(
            format!("Authentication required for {}: {}", name, body),
            Some(401),
        )),
        403 => Err(LayupError::authentication(
            format!("Access forbidden for {}: {}", name, body),
            Some(403),
        )),
        404 => Err(LayupError::not_found(resource_type, name)),
        429 => {
            let retry_after = response
                .header("Retry-After")
                .and_then(|v| v.trim().parse::<u64>().ok());
            Err(LayupError::rate_limit(
                format!("Rate limit exceeded for {}", name),
                retry_after,
            ))
        }
        _ => Err(LayupError::server(
            format!("HTTP {} for {}: {}", status, name, body),
            status,
        )),
    }
}
