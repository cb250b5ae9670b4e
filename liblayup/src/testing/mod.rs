//! Fixtures shared by unit tests: tar builders, a small base image and an
//! in-memory registry speaking the distribution API over [`Transport`].

use crate::auth::Anonymous;
use crate::digest::Digest;
use crate::error::{LayupError, Result};
use crate::image::Image;
use crate::layer::{Layer, TarballLayer};
use crate::oci::{
    ConfigFile, DOCKER_CONFIG, DOCKER_LAYER_GZIP, DOCKER_MANIFEST, Descriptor, History, Manifest,
    OCI_CONFIG, OCI_LAYER_GZIP, OCI_MANIFEST, RootFs, RuntimeConfig,
};
use crate::registry::Registry;
use crate::transport::{Body, Method, Request, Response, Transport};
use flate2::read::GzDecoder;
use serde_json::{Map, json};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// Host of the in-memory registry. Loopback, so clients use plain HTTP.
pub(crate) const FAKE_HOST: &str = "localhost:5000";

/// Builds an uncompressed tar with one regular file per entry.
pub(crate) fn tar_with<C: AsRef<[u8]>>(entries: &[(&str, C)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, contents) in entries {
        let contents = contents.as_ref();
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, name, contents).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Decompresses a layer and lists its entries with their contents.
pub(crate) fn layer_entries(layer: &dyn Layer) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(GzDecoder::new(layer.compressed().unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (name, contents)
        })
        .collect()
}

/// An OCI base image with one layer.
pub(crate) fn base_image(env: &[&str], cmd: &[&str]) -> Image {
    base_image_with(OCI_MANIFEST, env, cmd)
}

/// A one-layer base image whose manifest has `media_type`.
pub(crate) fn base_image_with(media_type: &str, env: &[&str], cmd: &[&str]) -> Image {
    let docker = media_type == DOCKER_MANIFEST;
    let layer = TarballLayer::from_bytes(tar_with(&[("etc/os-release", "ID=base\n")]));

    let mut runtime = RuntimeConfig {
        env: (!env.is_empty()).then(|| env.iter().map(|e| e.to_string()).collect()),
        cmd: (!cmd.is_empty()).then(|| cmd.iter().map(|c| c.to_string()).collect()),
        extra: Map::new(),
    };
    runtime.extra.insert("WorkingDir".to_string(), json!("/"));

    let config = ConfigFile {
        created: Some("2024-01-01T00:00:00Z".to_string()),
        architecture: "amd64".to_string(),
        os: "linux".to_string(),
        config: Some(runtime),
        rootfs: RootFs {
            fs_type: "layers".to_string(),
            diff_ids: vec![layer.diff_id().unwrap()],
        },
        history: vec![History {
            created: Some("2024-01-01T00:00:00Z".to_string()),
            created_by: Some("ADD rootfs.tar /".to_string()),
            ..Default::default()
        }],
        extra: Map::new(),
    };

    let manifest = Manifest {
        schema_version: 2,
        media_type: Some(media_type.to_string()),
        config: Descriptor::new(
            if docker { DOCKER_CONFIG } else { OCI_CONFIG },
            0,
            Digest::sha256(b""),
        ),
        layers: vec![Descriptor::new(
            if docker { DOCKER_LAYER_GZIP } else { OCI_LAYER_GZIP },
            layer.size().unwrap(),
            layer.digest().unwrap(),
        )],
        extra: Map::new(),
    };

    Image::compose(manifest, config, vec![Arc::new(layer)]).unwrap()
}

/// Reads a whole layer blob.
pub(crate) fn compressed_bytes(layer: &dyn Layer) -> Vec<u8> {
    let mut bytes = Vec::new();
    layer.compressed().unwrap().read_to_end(&mut bytes).unwrap();
    bytes
}

#[derive(Default)]
struct State {
    blobs: HashMap<String, HashMap<String, Vec<u8>>>,
    manifests: HashMap<String, HashMap<String, (String, Vec<u8>)>>,
    sessions: HashMap<String, String>,
    next_session: u64,
    requests: Vec<String>,
    uploads: usize,
    mounts: usize,
    blob_reads: usize,
}

/// An in-memory registry.
///
/// Blobs and manifests are stored per repository. Mounts succeed when the
/// source repository holds the blob, unless mounts are disabled. Every
/// request is logged as `METHOD /path`.
#[derive(Default)]
pub(crate) struct FakeRegistry {
    state: Mutex<State>,
    deny_mounts: bool,
    reject_uploads: bool,
}

impl FakeRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A registry that answers every mount with a fresh upload session.
    pub(crate) fn denying_mounts() -> Arc<Self> {
        Arc::new(Self {
            deny_mounts: true,
            ..Default::default()
        })
    }

    /// A registry that fails every blob upload with `500`.
    pub(crate) fn rejecting_uploads() -> Arc<Self> {
        Arc::new(Self {
            reject_uploads: true,
            ..Default::default()
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn seed_blob(&self, repository: &str, bytes: Vec<u8>) -> Digest {
        let digest = Digest::sha256(&bytes);
        self.lock()
            .blobs
            .entry(repository.to_string())
            .or_default()
            .insert(digest.to_string(), bytes);
        digest
    }

    pub(crate) fn seed_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        bytes: Vec<u8>,
    ) -> Digest {
        let digest = Digest::sha256(&bytes);
        let mut state = self.lock();
        let manifests = state.manifests.entry(repository.to_string()).or_default();
        manifests.insert(digest.to_string(), (media_type.to_string(), bytes.clone()));
        manifests.insert(reference.to_string(), (media_type.to_string(), bytes));
        digest
    }

    /// Stores every blob of `image` and its manifest under `tag`.
    pub(crate) fn seed_image(&self, repository: &str, image: &Image, tag: &str) {
        for layer in image.layers() {
            self.seed_blob(repository, compressed_bytes(layer.as_ref()));
        }
        self.seed_blob(repository, image.raw_config().to_vec());
        self.seed_manifest(
            repository,
            tag,
            image.media_type(),
            image.raw_manifest().to_vec(),
        );
    }

    pub(crate) fn has_blob(&self, repository: &str, digest: &Digest) -> bool {
        self.lock()
            .blobs
            .get(repository)
            .is_some_and(|blobs| blobs.contains_key(digest.as_str()))
    }

    pub(crate) fn manifest(&self, repository: &str, reference: &str) -> Option<Vec<u8>> {
        self.lock()
            .manifests
            .get(repository)
            .and_then(|manifests| manifests.get(reference))
            .map(|(_, bytes)| bytes.clone())
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Number of blobs received through `PUT` uploads.
    pub(crate) fn uploads(&self) -> usize {
        self.lock().uploads
    }

    /// Number of successful cross-repository mounts.
    pub(crate) fn mounts(&self) -> usize {
        self.lock().mounts
    }

    /// Number of blob bodies served by `GET`.
    pub(crate) fn blob_reads(&self) -> usize {
        self.lock().blob_reads
    }

    /// A registry facade over this fake with anonymous credentials.
    pub(crate) fn registry(self: &Arc<Self>) -> Registry {
        let transport: Arc<dyn Transport> = Arc::clone(self) as Arc<dyn Transport>;
        Registry::new(transport, Arc::new(Anonymous))
    }

    fn open_session(state: &mut State, repository: &str) -> Response {
        state.next_session += 1;
        let id = format!("session-{}", state.next_session);
        state.sessions.insert(id.clone(), repository.to_string());
        Response::new(202).with_header(
            "Location",
            format!("/v2/{}/blobs/uploads/{}", repository, id),
        )
    }

    fn post_upload(
        &self,
        state: &mut State,
        repository: &str,
        query: &HashMap<String, String>,
    ) -> Response {
        if let (Some(digest), Some(from)) = (query.get("mount"), query.get("from"))
            && !self.deny_mounts
        {
            let source = state
                .blobs
                .get(from.as_str())
                .and_then(|blobs| blobs.get(digest.as_str()))
                .cloned();
            if let Some(bytes) = source {
                state
                    .blobs
                    .entry(repository.to_string())
                    .or_default()
                    .insert(digest.clone(), bytes);
                state.mounts += 1;
                return Response::new(201)
                    .with_header("Location", format!("/v2/{}/blobs/{}", repository, digest))
                    .with_header("Docker-Content-Digest", digest.as_str());
            }
        }
        Self::open_session(state, repository)
    }

    fn put_upload(
        &self,
        state: &mut State,
        repository: &str,
        session: &str,
        query: &HashMap<String, String>,
        body: Vec<u8>,
    ) -> Response {
        if state.sessions.remove(session).as_deref() != Some(repository) {
            return Response::new(404).with_body(r#"{"errors":[{"code":"BLOB_UPLOAD_UNKNOWN"}]}"#);
        }
        if self.reject_uploads {
            return Response::new(500).with_body("storage unavailable");
        }
        let Some(expected) = query.get("digest") else {
            return Response::new(400).with_body(r#"{"errors":[{"code":"DIGEST_INVALID"}]}"#);
        };
        let actual = Digest::sha256(&body);
        if actual.as_str() != expected {
            return Response::new(400).with_body(r#"{"errors":[{"code":"DIGEST_INVALID"}]}"#);
        }
        state
            .blobs
            .entry(repository.to_string())
            .or_default()
            .insert(actual.to_string(), body);
        state.uploads += 1;
        Response::new(201)
            .with_header("Location", format!("/v2/{}/blobs/{}", repository, actual))
            .with_header("Docker-Content-Digest", actual.as_str())
    }

    fn blob(&self, state: &mut State, method: Method, repository: &str, digest: &str) -> Response {
        let Some(bytes) = state
            .blobs
            .get(repository)
            .and_then(|blobs| blobs.get(digest))
            .cloned()
        else {
            return Response::new(404).with_body(r#"{"errors":[{"code":"BLOB_UNKNOWN"}]}"#);
        };
        let response = Response::new(200)
            .with_header("Docker-Content-Digest", digest)
            .with_header("Content-Length", bytes.len().to_string());
        match method {
            Method::Get => {
                state.blob_reads += 1;
                response.with_body(bytes)
            }
            _ => response,
        }
    }

    fn manifest_request(
        &self,
        state: &mut State,
        method: Method,
        repository: &str,
        reference: &str,
        request: Request,
    ) -> Result<Response> {
        match method {
            Method::Put => {
                let media_type = request
                    .header_value("Content-Type")
                    .unwrap_or(OCI_MANIFEST)
                    .to_string();
                let bytes = read_body(request.body)?;
                let digest = Digest::sha256(&bytes);
                let manifests = state.manifests.entry(repository.to_string()).or_default();
                manifests.insert(digest.to_string(), (media_type.clone(), bytes.clone()));
                manifests.insert(reference.to_string(), (media_type, bytes));
                Ok(Response::new(201).with_header("Docker-Content-Digest", digest.as_str()))
            }
            _ => {
                let Some((media_type, bytes)) = state
                    .manifests
                    .get(repository)
                    .and_then(|manifests| manifests.get(reference))
                    .cloned()
                else {
                    return Ok(Response::new(404)
                        .with_body(r#"{"errors":[{"code":"MANIFEST_UNKNOWN"}]}"#));
                };
                let response = Response::new(200)
                    .with_header("Content-Type", media_type)
                    .with_header("Docker-Content-Digest", Digest::sha256(&bytes).as_str());
                Ok(match method {
                    Method::Get => response.with_body(bytes),
                    _ => response,
                })
            }
        }
    }
}

fn read_body(body: Body) -> Result<Vec<u8>> {
    match body {
        Body::Empty => Ok(Vec::new()),
        Body::Bytes(bytes) => Ok(bytes),
        Body::Stream { mut reader, .. } => {
            let mut bytes = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .map_err(|e| LayupError::io_stream("Failed to read request body", e))?;
            Ok(bytes)
        }
    }
}

impl Transport for FakeRegistry {
    fn execute(&self, request: Request) -> Result<Response> {
        let url = Url::parse(&request.url)
            .map_err(|e| LayupError::network_with_source("Invalid request URL", e))?;
        let path = url.path().to_string();
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let method = request.method;

        let mut state = self.lock();
        state.requests.push(format!("{} {}", method, path));

        let Some(rest) = path.strip_prefix("/v2/") else {
            return Ok(Response::new(404));
        };

        if let Some((repository, session)) = rest.split_once("/blobs/uploads/") {
            return match method {
                Method::Post => Ok(self.post_upload(&mut state, repository, &query)),
                Method::Put => {
                    let body = read_body(request.body)?;
                    Ok(self.put_upload(&mut state, repository, session, &query, body))
                }
                _ => Ok(Response::new(405)),
            };
        }
        if let Some((repository, digest)) = rest.rsplit_once("/blobs/") {
            return Ok(self.blob(&mut state, method, repository, digest));
        }
        if let Some((repository, reference)) = rest.rsplit_once("/manifests/") {
            return self.manifest_request(&mut state, method, repository, reference, request);
        }
        Ok(Response::new(404))
    }
}
