use super::*;
use crate::error::LayupError;
use crate::oci::OCI_LAYER_GZIP;
use std::sync::Mutex;

#[derive(Default)]
struct RecordingSource {
    blob: Vec<u8>,
    requests: Mutex<Vec<(String, String)>>,
}

impl BlobSource for RecordingSource {
    fn fetch_blob(&self, repository: &Repository, digest: &Digest) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((repository.to_string(), digest.to_string()));
        digest.verify(&self.blob)?;
        Ok(self.blob.clone())
    }
}

fn remote_layer(source: Arc<RecordingSource>, digest: Digest) -> RemoteLayer {
    RemoteLayer::new(
        source,
        Repository::new("registry.example.com", "team/base"),
        Descriptor::new(OCI_LAYER_GZIP, 4, digest),
        Digest::sha256(b"uncompressed"),
    )
}

#[test]
fn test_metadata_comes_from_descriptor_without_fetching() {
    let source = Arc::new(RecordingSource {
        blob: b"blob".to_vec(),
        ..Default::default()
    });
    let layer = remote_layer(Arc::clone(&source), Digest::sha256(b"blob"));

    assert_eq!(layer.digest().unwrap(), Digest::sha256(b"blob"));
    assert_eq!(layer.diff_id().unwrap(), Digest::sha256(b"uncompressed"));
    assert_eq!(layer.size().unwrap(), 4);
    assert!(source.requests.lock().unwrap().is_empty());
}

#[test]
fn test_compressed_fetches_from_source_repository() {
    let source = Arc::new(RecordingSource {
        blob: b"blob".to_vec(),
        ..Default::default()
    });
    let layer = remote_layer(Arc::clone(&source), Digest::sha256(b"blob"));

    let mut bytes = Vec::new();
    layer.compressed().unwrap().read_to_end(&mut bytes).unwrap();

    assert_eq!(bytes, b"blob");
    let requests = source.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "registry.example.com/team/base");
}

#[test]
fn test_compressed_propagates_digest_mismatch() {
    let source = Arc::new(RecordingSource {
        blob: b"tampered".to_vec(),
        ..Default::default()
    });
    let layer = remote_layer(source, Digest::sha256(b"blob"));

    let Err(err) = layer.compressed() else {
        panic!("expected a digest mismatch");
    };
    assert!(matches!(err, LayupError::Validation { .. }));
}
