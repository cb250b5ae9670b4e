//! Content-addressed image layers.
//!
//! A [`Layer`] exposes the two digests a registry and an image config need:
//! the digest of the compressed blob and the diff-id of the uncompressed tar
//! stream. [`TarballLayer`] builds both from an opener closure that yields a
//! fresh reader of the tar bytes on every call, so digest computation and
//! upload each consume the content independently. [`RemoteLayer`] stands for
//! a layer that already lives in a registry and is only read if it has to be
//! copied.

use crate::digest::{Digest, DigestWriter};
use crate::error::{LayupError, Result};
use crate::reference::Repository;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

mod remote;

pub use remote::RemoteLayer;

#[cfg(test)]
mod tests;

/// A filesystem layer addressed by digest.
pub trait Layer: Send + Sync + fmt::Debug {
    /// Digest of the compressed blob, as stored in the registry.
    fn digest(&self) -> Result<Digest>;

    /// Digest of the uncompressed tar stream, as listed in the image config.
    fn diff_id(&self) -> Result<Digest>;

    /// Size of the compressed blob in bytes.
    fn size(&self) -> Result<u64>;

    /// Opens a fresh reader over the compressed blob.
    fn compressed(&self) -> Result<Box<dyn Read + Send>>;
}

/// Anything that can hand out blobs of a repository by digest.
///
/// The registry client implements this; remote layers use it to read their
/// bytes back when they cannot be mounted at the destination.
pub trait BlobSource: Send + Sync {
    /// Fetches a whole blob, verifying it against `digest`.
    fn fetch_blob(&self, repository: &Repository, digest: &Digest) -> Result<Vec<u8>>;
}

/// Produces a fresh reader over a layer's uncompressed tar bytes.
pub type Opener = Arc<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct LayerDigests {
    digest: Digest,
    diff_id: Digest,
    size: u64,
}

/// A layer built from an uncompressed tar stream.
///
/// Digests are computed once, on first request, in a single pass over the
/// stream; compression is deterministic (fixed gzip header, default level),
/// so every call to [`Layer::compressed`] yields bytes matching [`Layer::digest`].
pub struct TarballLayer {
    opener: Opener,
    digests: OnceLock<LayerDigests>,
}

impl TarballLayer {
    /// Creates a layer from an opener closure.
    ///
    /// # Examples
    ///
    /// ```
    /// use liblayup::layer::{Layer, TarballLayer};
    /// use std::io::{Cursor, Read};
    ///
    /// let tar = liblayup::archive::archive_to_vec::<&str>(&[]).unwrap();
    /// let layer = TarballLayer::from_opener(move || {
    ///     Ok(Box::new(Cursor::new(tar.clone())) as Box<dyn Read + Send>)
    /// });
    /// assert_eq!(layer.diff_id().unwrap().algorithm(), "sha256");
    /// ```
    pub fn from_opener<F>(opener: F) -> Self
    where
        F: Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        Self {
            opener: Arc::new(opener),
            digests: OnceLock::new(),
        }
    }

    /// Creates a layer over an in-memory tar buffer.
    pub fn from_bytes(tar: Vec<u8>) -> Self {
        let tar: Arc<[u8]> = tar.into();
        Self::from_opener(move || {
            let reader: Box<dyn Read + Send> = Box::new(Cursor::new(Arc::clone(&tar)));
            Ok(reader)
        })
    }

    /// Creates a layer over a tar file on disk, reopened for every read.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        let path: PathBuf = path.as_ref().to_path_buf();
        Self::from_opener(move || {
            let file = File::open(&path)?;
            Ok(Box::new(file) as Box<dyn Read + Send>)
        })
    }

    fn digests(&self) -> Result<&LayerDigests> {
        if let Some(digests) = self.digests.get() {
            return Ok(digests);
        }

        let (counter, diff_id) = self.compress_into(DigestWriter::new(io::sink()))?;
        let (_, digest, size) = counter.finish();
        log::debug!("computed layer {} (diff-id {}, {} bytes)", digest, diff_id, size);

        Ok(self.digests.get_or_init(|| LayerDigests {
            digest,
            diff_id,
            size,
        }))
    }

    /// Streams the tar bytes through gzip into `sink`, hashing the
    /// uncompressed side on the way. Returns the sink and the diff-id.
    fn compress_into<W: Write>(&self, sink: W) -> Result<(W, Digest)> {
        let mut reader = (self.opener)()
            .map_err(|e| LayupError::io_stream("failed to open layer contents", e))?;

        let encoder = GzEncoder::new(sink, Compression::default());
        let mut uncompressed = DigestWriter::new(encoder);
        io::copy(&mut reader, &mut uncompressed)
            .map_err(|e| LayupError::io_stream("failed to read layer contents", e))?;

        let (encoder, diff_id, _) = uncompressed.finish();
        let sink = encoder
            .finish()
            .map_err(|e| LayupError::io_stream("failed to compress layer", e))?;
        Ok((sink, diff_id))
    }
}

impl fmt::Debug for TarballLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarballLayer")
            .field("digests", &self.digests.get())
            .finish_non_exhaustive()
    }
}

impl Layer for TarballLayer {
    fn digest(&self) -> Result<Digest> {
        Ok(self.digests()?.digest.clone())
    }

    fn diff_id(&self) -> Result<Digest> {
        Ok(self.digests()?.diff_id.clone())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.digests()?.size)
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        let (bytes, _) = self.compress_into(Vec::new())?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
