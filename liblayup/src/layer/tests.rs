use super::*;
use flate2::read::GzDecoder;
use std::sync::atomic::{AtomicUsize, Ordering};

fn sample_tar() -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(5);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "hello.txt", &b"hello"[..])
        .unwrap();
    builder.into_inner().unwrap()
}

fn read_all(mut reader: Box<dyn Read + Send>) -> Vec<u8> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes).unwrap();
    bytes
}

#[test]
fn test_diff_id_is_digest_of_uncompressed_bytes() {
    let tar = sample_tar();
    let layer = TarballLayer::from_bytes(tar.clone());

    assert_eq!(layer.diff_id().unwrap(), Digest::sha256(&tar));
}

#[test]
fn test_digest_and_size_match_compressed_stream() {
    let layer = TarballLayer::from_bytes(sample_tar());

    let compressed = read_all(layer.compressed().unwrap());

    assert_eq!(layer.digest().unwrap(), Digest::sha256(&compressed));
    assert_eq!(layer.size().unwrap(), compressed.len() as u64);
    assert_ne!(layer.digest().unwrap(), layer.diff_id().unwrap());
}

#[test]
fn test_compressed_stream_decompresses_to_tar() {
    let tar = sample_tar();
    let layer = TarballLayer::from_bytes(tar.clone());

    let mut decoded = Vec::new();
    GzDecoder::new(layer.compressed().unwrap())
        .read_to_end(&mut decoded)
        .unwrap();

    assert_eq!(decoded, tar);
}

#[test]
fn test_compressed_stream_is_rereadable_and_stable() {
    let layer = TarballLayer::from_bytes(sample_tar());

    let first = read_all(layer.compressed().unwrap());
    let second = read_all(layer.compressed().unwrap());

    assert_eq!(first, second);
}

#[test]
fn test_equal_content_gives_equal_digests() {
    let a = TarballLayer::from_bytes(sample_tar());
    let b = TarballLayer::from_bytes(sample_tar());

    assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    assert_eq!(a.diff_id().unwrap(), b.diff_id().unwrap());
}

#[test]
fn test_digests_are_computed_lazily_and_once() {
    let opens = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opens);
    let tar = sample_tar();
    let layer = TarballLayer::from_opener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Cursor::new(tar.clone())) as Box<dyn Read + Send>)
    });

    assert_eq!(opens.load(Ordering::SeqCst), 0);

    layer.digest().unwrap();
    layer.diff_id().unwrap();
    layer.size().unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 1);

    read_all(layer.compressed().unwrap());
    assert_eq!(opens.load(Ordering::SeqCst), 2);
}

#[test]
fn test_opener_failure_is_io_error() {
    let layer = TarballLayer::from_opener(|| {
        Err(io::Error::new(io::ErrorKind::NotFound, "archive vanished"))
    });

    let err = layer.digest().unwrap_err();
    assert!(matches!(err, LayupError::Io { path: None, .. }));
}

#[test]
fn test_from_file_reopens_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layer.tar");
    std::fs::write(&path, sample_tar()).unwrap();

    let layer = TarballLayer::from_file(&path);

    assert_eq!(layer.diff_id().unwrap(), Digest::sha256(&sample_tar()));
    let first = read_all(layer.compressed().unwrap());
    let second = read_all(layer.compressed().unwrap());
    assert_eq!(first, second);
}
