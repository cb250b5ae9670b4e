use super::{BlobSource, Layer};
use crate::digest::Digest;
use crate::error::Result;
use crate::oci::Descriptor;
use crate::reference::Repository;
use std::fmt;
use std::io::{Cursor, Read};
use std::sync::Arc;

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;

/// A layer of an image fetched from a registry.
///
/// Only the descriptor and diff-id are held; the blob is downloaded on
/// [`Layer::compressed`], which happens only when the destination has neither
/// the blob nor a repository it can be mounted from.
pub struct RemoteLayer {
    source: Arc<dyn BlobSource>,
    repository: Repository,
    descriptor: Descriptor,
    diff_id: Digest,
}

impl RemoteLayer {
    pub fn new(
        source: Arc<dyn BlobSource>,
        repository: Repository,
        descriptor: Descriptor,
        diff_id: Digest,
    ) -> Self {
        Self {
            source,
            repository,
            descriptor,
            diff_id,
        }
    }

    /// The repository the layer was fetched from.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl fmt::Debug for RemoteLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteLayer")
            .field("repository", &self.repository)
            .field("digest", &self.descriptor.digest)
            .field("diff_id", &self.diff_id)
            .finish()
    }
}

impl Layer for RemoteLayer {
    fn digest(&self) -> Result<Digest> {
        Ok(self.descriptor.digest.clone())
    }

    fn diff_id(&self) -> Result<Digest> {
        Ok(self.diff_id.clone())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.descriptor.size)
    }

    fn compressed(&self) -> Result<Box<dyn Read + Send>> {
        let bytes = self
            .source
            .fetch_blob(&self.repository, &self.descriptor.digest)?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
