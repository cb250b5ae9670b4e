//! Immutable image values.
//!
//! An [`Image`] ties a manifest, its config blob and its layers together and
//! keeps them consistent: the manifest's config descriptor always matches the
//! config bytes, the layer list always matches the manifest's layer
//! descriptors, and the image digest is the sha256 of the serialized
//! manifest. Images are never edited in place; the mutate module builds new
//! ones through [`Image::compose`].

use crate::digest::Digest;
use crate::error::{LayupError, Result};
use crate::layer::Layer;
use crate::oci::{ConfigFile, Manifest};
use std::sync::Arc;


/// A container image: manifest, config and ordered layers.
#[derive(Debug, Clone)]
pub struct Image {
    manifest: Manifest,
    raw_manifest: Arc<[u8]>,
    digest: Digest,
    config: ConfigFile,
    raw_config: Arc<[u8]>,
    layers: Vec<Arc<dyn Layer>>,
}

impl Image {
    /// Builds an image from documents fetched as-is from a registry.
    ///
    /// The raw bytes are kept so that the digests of an unmodified image
    /// stay exactly those of the source. The config bytes must match the
    /// manifest's config descriptor, and the layer list must line up with
    /// both the manifest and the config's diff-ids.
    pub fn from_raw(
        raw_manifest: Vec<u8>,
        raw_config: Vec<u8>,
        layers: Vec<Arc<dyn Layer>>,
    ) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(&raw_manifest)
            .map_err(|e| LayupError::validation_with_source("Failed to parse image manifest", e))?;
        manifest.config.digest.verify(&raw_config)?;
        let config = ConfigFile::from_bytes(&raw_config)?;

        Self::check_layers(&manifest, &config, &layers)?;

        Ok(Self {
            digest: Digest::sha256(&raw_manifest),
            manifest,
            raw_manifest: raw_manifest.into(),
            config,
            raw_config: raw_config.into(),
            layers,
        })
    }

    /// Builds a new image from a manifest template, a config and its layers.
    ///
    /// The config is serialized, the manifest's config descriptor is pointed
    /// at the new blob, and the manifest is serialized and hashed. The
    /// template's layer descriptors must already describe `layers`.
    pub fn compose(
        mut manifest: Manifest,
        config: ConfigFile,
        layers: Vec<Arc<dyn Layer>>,
    ) -> Result<Self> {
        Self::check_layers(&manifest, &config, &layers)?;

        let raw_config = config.to_bytes()?;
        manifest.config.digest = Digest::sha256(&raw_config);
        manifest.config.size = raw_config.len() as u64;

        let raw_manifest = serde_json::to_vec(&manifest).map_err(|e| {
            LayupError::validation_with_source("Failed to serialize image manifest", e)
        })?;

        Ok(Self {
            digest: Digest::sha256(&raw_manifest),
            manifest,
            raw_manifest: raw_manifest.into(),
            config,
            raw_config: raw_config.into(),
            layers,
        })
    }

    fn check_layers(
        manifest: &Manifest,
        config: &ConfigFile,
        layers: &[Arc<dyn Layer>],
    ) -> Result<()> {
        if manifest.layers.len() != layers.len() {
            return Err(LayupError::validation(format!(
                "Manifest lists {} layers but the image has {}",
                manifest.layers.len(),
                layers.len()
            )));
        }
        if config.rootfs.diff_ids.len() != layers.len() {
            return Err(LayupError::validation(format!(
                "Config lists {} diff-ids but the image has {} layers",
                config.rootfs.diff_ids.len(),
                layers.len()
            )));
        }
        Ok(())
    }

    /// The manifest digest, which is the image's identity.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The serialized manifest exactly as it will be uploaded.
    pub fn raw_manifest(&self) -> &[u8] {
        &self.raw_manifest
    }

    pub fn config_file(&self) -> &ConfigFile {
        &self.config
    }

    /// The serialized config blob exactly as it will be uploaded.
    pub fn raw_config(&self) -> &[u8] {
        &self.raw_config
    }

    /// Layers in manifest order, base first.
    pub fn layers(&self) -> &[Arc<dyn Layer>] {
        &self.layers
    }

    /// The media type the manifest is uploaded with.
    pub fn media_type(&self) -> &str {
        self.manifest.upload_media_type()
    }
}
