//! Registry operations module.
//!
//! [`Registry`] is the facade the pipeline talks to: it resolves references,
//! fetches images and pushes composed images. It owns the transport and the
//! credential resolver and creates one [`Client`] per operation, scoped to
//! the repositories that operation touches.
//!
//! Pushing follows a fixed order. Each layer is skipped if the destination
//! already has it, mounted if a mount source on the same registry has it,
//! and uploaded otherwise. The config blob follows, and the manifest goes
//! last, so a manifest is never committed before every blob it references.

use crate::auth::CredentialResolver;
use crate::client::{Client, MountOutcome};
use crate::digest::Digest;
use crate::error::{LayupError, Result, ResultExt};
use crate::image::Image;
use crate::layer::{BlobSource, Layer, RemoteLayer};
use crate::oci::{ConfigFile, Descriptor, Manifest, ManifestOrIndex};
use crate::pipeline::{Event, Observer};
use crate::reference::{Reference, Repository};
use crate::transport::Transport;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::sync::Arc;


/// Default platform picked from a multi-platform base image.
pub const DEFAULT_OS: &str = "linux";
pub const DEFAULT_ARCHITECTURE: &str = "amd64";

/// What a push did with each blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Digest of the pushed manifest.
    pub digest: Option<Digest>,
    /// Blobs uploaded in full.
    pub uploaded: Vec<Digest>,
    /// Blobs mounted from another repository.
    pub mounted: Vec<Digest>,
    /// Blobs the destination already had.
    pub skipped: Vec<Digest>,
}

/// High-level registry access for fetching and pushing images.
pub struct Registry {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialResolver>,
    insecure: Vec<String>,
    os: String,
    architecture: String,
}

impl Registry {
    /// Creates a registry facade.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::auth::Anonymous;
    /// use liblayup::registry::Registry;
    /// use liblayup::transport::HttpTransport;
    /// use std::sync::Arc;
    ///
    /// let registry = Registry::new(
    ///     Arc::new(HttpTransport::new().unwrap()),
    ///     Arc::new(Anonymous),
    /// );
    /// let reference = registry.resolve("alpine").unwrap();
    /// assert_eq!(reference.to_string(), "index.docker.io/library/alpine");
    /// ```
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialResolver>) -> Self {
        Self {
            transport,
            credentials,
            insecure: Vec::new(),
            os: DEFAULT_OS.to_string(),
            architecture: DEFAULT_ARCHITECTURE.to_string(),
        }
    }

    /// Registries reached over plain HTTP.
    pub fn with_insecure(mut self, hosts: Vec<String>) -> Self {
        self.insecure = hosts;
        self
    }

    /// The platform selected when a base reference points at an index.
    pub fn with_platform<O: Into<String>, A: Into<String>>(mut self, os: O, architecture: A) -> Self {
        self.os = os.into();
        self.architecture = architecture.into();
        self
    }

    /// Parses an image reference.
    pub fn resolve(&self, reference: &str) -> Result<Reference> {
        Reference::parse(reference)
    }

    fn client(&self, registry: &str, scopes: Vec<String>) -> Result<Client> {
        let credentials = self.credentials.resolve(registry)?;
        let insecure = self.insecure.iter().any(|h| h == registry);
        Ok(Client::new(Arc::clone(&self.transport), registry, credentials, insecure)
            .with_scopes(scopes))
    }

    /// Fetches an image's manifest and config.
    ///
    /// Layers stay remote: their bytes are only read if a push has to copy
    /// them. An index is resolved to the configured platform's manifest.
    pub fn fetch_image(&self, reference: &Reference) -> Result<(Image, Repository)> {
        let repository = reference.repository().clone();
        let client = Arc::new(
            self.client(reference.registry(), vec![repository.scope("pull")])
                .stage("authenticating")?,
        );

        let fetched = client
            .fetch_manifest(repository.path(), reference.identifier())
            .stage("fetching manifest")?;

        let raw_manifest = match ManifestOrIndex::from_bytes(&fetched.bytes)? {
            ManifestOrIndex::Manifest(_) => fetched.bytes,
            index @ ManifestOrIndex::Index(_) => {
                let entry = index
                    .find_platform(&self.os, &self.architecture)
                    .ok_or_else(|| {
                        LayupError::not_found(
                            "platform".to_string(),
                            format!("{}/{} in {}", self.os, self.architecture, reference),
                        )
                    })?;
                info!(
                    "{} is an index; using {}/{} manifest {}",
                    reference, self.os, self.architecture, entry.digest
                );
                client
                    .fetch_manifest(repository.path(), entry.digest.as_str())
                    .stage("fetching platform manifest")?
                    .bytes
            }
        };

        let manifest = match ManifestOrIndex::from_bytes(&raw_manifest)? {
            ManifestOrIndex::Manifest(manifest) => manifest,
            ManifestOrIndex::Index(_) => {
                return Err(LayupError::validation(format!(
                    "{} resolves to a nested index",
                    reference
                )));
            }
        };

        let raw_config = client
            .fetch_blob(repository.path(), &manifest.config.digest)
            .stage("fetching config")?;
        let config = ConfigFile::from_bytes(&raw_config)?;

        let layers = remote_layers(&manifest, &config, client, &repository);
        let image = Image::from_raw(raw_manifest, raw_config, layers)?;
        debug!("fetched {} as {}", reference, image.digest());

        Ok((image, repository))
    }

    /// Pushes `image` to `dest`.
    pub fn push_image(
        &self,
        image: &Image,
        mount_sources: &[Repository],
        dest: &Reference,
    ) -> Result<PushReport> {
        self.push_image_with(image, mount_sources, dest, &|_: &Event| {})
    }

    /// Pushes `image` to `dest`, reporting each blob decision to `observer`.
    ///
    /// Mount sources on other registries are ignored; a registry can only
    /// mount blobs it stores.
    pub fn push_image_with(
        &self,
        image: &Image,
        mount_sources: &[Repository],
        dest: &Reference,
        observer: &dyn Observer,
    ) -> Result<PushReport> {
        if let Some(wanted) = dest.digest()
            && wanted != image.digest()
        {
            return Err(LayupError::input(format!(
                "Destination {} names digest {} but the image is {}",
                dest,
                wanted,
                image.digest()
            )));
        }

        let repository = dest.repository();
        let mounts: Vec<&Repository> = mount_sources
            .iter()
            .filter(|source| {
                let usable = source.registry() == repository.registry() && *source != repository;
                if !usable {
                    debug!("not mounting from {} into {}", source, repository);
                }
                usable
            })
            .collect();

        let mut scopes = vec![repository.scope("pull,push")];
        scopes.extend(mounts.iter().map(|source| source.scope("pull")));
        let client = self
            .client(dest.registry(), scopes)
            .stage("authenticating target")?;

        let mut report = PushReport::default();
        let mut seen = HashSet::new();

        for (descriptor, layer) in image.manifest().layers.iter().zip(image.layers()) {
            if !seen.insert(descriptor.digest.clone()) {
                continue;
            }
            push_layer(
                &client,
                repository.path(),
                descriptor,
                layer.as_ref(),
                &mounts,
                observer,
                &mut report,
            )
            .with_stage(|| format!("uploading layer {}", descriptor.digest))?;
        }

        push_config(&client, repository.path(), image, observer, &mut report)
            .stage("uploading config")?;

        let pushed = client
            .put_manifest(
                repository.path(),
                dest.identifier(),
                image.media_type(),
                image.raw_manifest(),
            )
            .stage("uploading manifest")?;
        if &pushed != image.digest() {
            return Err(LayupError::validation(format!(
                "Digest mismatch: pushed manifest {}, expected {}",
                pushed,
                image.digest()
            ))
            .in_stage("uploading manifest"));
        }

        info!("pushed {} as {}", dest, pushed);
        observer.on_event(&Event::ManifestPushed {
            digest: pushed.clone(),
        });
        report.digest = Some(pushed);
        Ok(report)
    }
}

fn remote_layers(
    manifest: &Manifest,
    config: &ConfigFile,
    client: Arc<Client>,
    repository: &Repository,
) -> Vec<Arc<dyn Layer>> {
    let source: Arc<dyn BlobSource> = client;
    manifest
        .layers
        .iter()
        .zip(&config.rootfs.diff_ids)
        .map(|(descriptor, diff_id)| {
            Arc::new(RemoteLayer::new(
                Arc::clone(&source),
                repository.clone(),
                descriptor.clone(),
                diff_id.clone(),
            )) as Arc<dyn Layer>
        })
        .collect()
}

fn push_layer(
    client: &Client,
    repository: &str,
    descriptor: &Descriptor,
    layer: &dyn Layer,
    mounts: &[&Repository],
    observer: &dyn Observer,
    report: &mut PushReport,
) -> Result<()> {
    let digest = &descriptor.digest;

    if client.blob_exists(repository, digest)? {
        debug!("layer {} already present", digest);
        observer.on_event(&Event::BlobSkipped {
            digest: digest.clone(),
        });
        report.skipped.push(digest.clone());
        return Ok(());
    }

    let mut session = None;
    for source in mounts {
        match client.mount_blob(repository, digest, source.path())? {
            MountOutcome::Mounted => {
                debug!("mounted {} from {}", digest, source);
                observer.on_event(&Event::BlobMounted {
                    digest: digest.clone(),
                    from: (*source).clone(),
                });
                report.mounted.push(digest.clone());
                return Ok(());
            }
            MountOutcome::Declined { location } => {
                warn!("registry declined to mount {} from {}", digest, source);
                session = Some(location);
                break;
            }
        }
    }

    let location = match session {
        Some(location) => location,
        None => client.start_upload(repository)?,
    };
    client.upload_blob(&location, digest, descriptor.size, &|| layer.compressed())?;

    debug!("uploaded {} ({} bytes)", digest, descriptor.size);
    observer.on_event(&Event::BlobUploaded {
        digest: digest.clone(),
        size: descriptor.size,
    });
    report.uploaded.push(digest.clone());
    Ok(())
}

fn push_config(
    client: &Client,
    repository: &str,
    image: &Image,
    observer: &dyn Observer,
    report: &mut PushReport,
) -> Result<()> {
    let digest = &image.manifest().config.digest;

    if client.blob_exists(repository, digest)? {
        observer.on_event(&Event::BlobSkipped {
            digest: digest.clone(),
        });
        report.skipped.push(digest.clone());
        return Ok(());
    }

    let raw_config = image.raw_config();
    let location = client.start_upload(repository)?;
    client.upload_blob(&location, digest, raw_config.len() as u64, &|| {
        Ok(Box::new(Cursor::new(raw_config.to_vec())) as Box<dyn Read + Send>)
    })?;

    observer.on_event(&Event::BlobUploaded {
        digest: digest.clone(),
        size: raw_config.len() as u64,
    });
    report.uploaded.push(digest.clone());
    Ok(())
}
