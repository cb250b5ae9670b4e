//! Image manifest and configuration documents.
//!
//! These types model the fields the pipeline reads or rewrites and keep
//! everything else in a flattened `extra` map, so metadata this crate does
//! not understand survives a round trip through mutation untouched.

use crate::digest::Digest;
use crate::error::{LayupError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};


/// OCI image manifest media type.
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index media type.
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
/// OCI image config media type.
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
/// OCI gzip layer media type.
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Docker schema 2 manifest media type.
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker manifest list media type.
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
/// Docker image config media type.
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
/// Docker gzip layer media type.
pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";

/// Media types sent in the `Accept` header when fetching manifests.
pub const MANIFEST_ACCEPT: &[&str] = &[
    OCI_MANIFEST,
    OCI_INDEX,
    DOCKER_MANIFEST,
    DOCKER_MANIFEST_LIST,
];

/// A content descriptor: media type, size and digest of a blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,

    pub size: u64,

    pub digest: Digest,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Descriptor {
    /// Creates a descriptor with no extra fields.
    pub fn new<S: Into<String>>(media_type: S, size: u64, digest: Digest) -> Self {
        Self {
            media_type: media_type.into(),
            size,
            digest,
            extra: Map::new(),
        }
    }
}

/// A single-platform image manifest (OCI or Docker schema 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    pub config: Descriptor,

    pub layers: Vec<Descriptor>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Manifest {
    /// Returns true for Docker schema 2 manifests.
    pub fn is_docker(&self) -> bool {
        self.media_type.as_deref() == Some(DOCKER_MANIFEST)
    }

    /// Returns the media type to use when uploading this manifest.
    pub fn upload_media_type(&self) -> &str {
        self.media_type.as_deref().unwrap_or(OCI_MANIFEST)
    }

    /// Returns the layer media type matching this manifest's family.
    pub fn gzip_layer_media_type(&self) -> &'static str {
        if self.is_docker() {
            DOCKER_LAYER_GZIP
        } else {
            OCI_LAYER_GZIP
        }
    }
}

/// Platform of an index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,

    pub os: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// An entry of an image index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(rename = "mediaType")]
    pub media_type: String,

    pub size: u64,

    pub digest: Digest,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// A multi-platform image index (OCI index or Docker manifest list).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,

    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,

    pub manifests: Vec<IndexEntry>,
}

/// Represents either a single-platform image manifest or a multi-platform image index.
///
/// A tag may point at either; an index is only ever read here, to pick the
/// manifest of one platform.
#[derive(Debug, Clone)]
pub enum ManifestOrIndex {
    /// A single-platform image manifest
    Manifest(Manifest),
    /// A multi-platform image index
    Index(Index),
}

impl ManifestOrIndex {
    /// Parse manifest bytes, detecting whether it's a manifest or an index.
    ///
    /// The `mediaType` field decides when present; otherwise the shape of the
    /// document does (`manifests` means index, `layers`/`config` manifest).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| LayupError::validation_with_source("Failed to parse manifest JSON", e))?;

        let media_type = value
            .get("mediaType")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let is_index = if media_type.contains("index") || media_type.contains("list") {
            true
        } else if media_type.contains("manifest") {
            false
        } else if value.get("manifests").is_some() {
            true
        } else if value.get("layers").is_some() || value.get("config").is_some() {
            false
        } else {
            return Err(LayupError::validation(
                "Unable to determine if content is a manifest or index",
            ));
        };

        if is_index {
            let index: Index = serde_json::from_value(value)
                .map_err(|e| LayupError::validation_with_source("Failed to parse image index", e))?;
            Ok(ManifestOrIndex::Index(index))
        } else {
            let manifest: Manifest = serde_json::from_value(value).map_err(|e| {
                LayupError::validation_with_source("Failed to parse image manifest", e)
            })?;
            if manifest.schema_version != 2 {
                return Err(LayupError::validation(format!(
                    "Unsupported manifest schema version {}",
                    manifest.schema_version
                )));
            }
            Ok(ManifestOrIndex::Manifest(manifest))
        }
    }

    /// Find the index entry for a specific platform.
    ///
    /// # Arguments
    ///
    /// * `os` - Operating system (e.g., "linux", "windows")
    /// * `arch` - Architecture (e.g., "amd64", "arm64")
    pub fn find_platform(&self, os: &str, arch: &str) -> Option<&IndexEntry> {
        match self {
            ManifestOrIndex::Manifest(_) => None,
            ManifestOrIndex::Index(index) => index.manifests.iter().find(|entry| {
                entry
                    .platform
                    .as_ref()
                    .is_some_and(|p| p.os == os && p.architecture == arch)
            }),
        }
    }
}

/// The runtime part of an image config (`config` in the JSON document).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(rename = "Env", default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,

    #[serde(rename = "Cmd", default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The ordered list of layer diff-ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootFs {
    #[serde(rename = "type")]
    pub fs_type: String,

    #[serde(default)]
    pub diff_ids: Vec<Digest>,
}

impl Default for RootFs {
    fn default() -> Self {
        Self {
            fs_type: "layers".to_string(),
            diff_ids: Vec::new(),
        }
    }
}

/// One history entry of an image config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_layer: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An image configuration blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<RuntimeConfig>,

    #[serde(default)]
    pub rootfs: RootFs,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<History>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConfigFile {
    /// Parses a config blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| LayupError::validation_with_source("Failed to parse image config", e))
    }

    /// Serializes the config blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| LayupError::validation_with_source("Failed to serialize image config", e))
    }
}
