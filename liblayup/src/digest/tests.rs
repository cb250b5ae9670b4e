use super::*;
use std::str::FromStr;

const EMPTY_SHA256: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

#[test]
fn test_digest_from_valid_string_succeeds() {
    let valid_digest_str =
        "sha256:7173b809ca12ec5dee4506cd86be934c4596dd234ee82c0662eac04a8c2c71dc";
    let digest = Digest::from_str(valid_digest_str);
    assert!(digest.is_ok());
}

#[test]
fn test_digest_from_invalid_string_fails() {
    let invalid_digest_str = "sha256:invalid-digest";
    let digest = Digest::from_str(invalid_digest_str);
    assert!(digest.is_err());
    assert!(matches!(digest.unwrap_err(), LayupError::Validation { .. }));
}

#[test]
fn test_digest_short_hex_fails() {
    assert!(Digest::from_str("sha256:abcd").is_err());
}

#[test]
fn test_digest_display_trait() {
    let digest_str = "sha256:7173b809ca12ec5dee4506cd86be934c4596dd234ee82c0662eac04a8c2c71dc";
    let digest = Digest::from_str(digest_str).unwrap();
    assert_eq!(digest.to_string(), digest_str);
}

#[test]
fn test_digest_accessors() {
    let digest = Digest::from_str(EMPTY_SHA256).unwrap();
    assert_eq!(digest.algorithm(), "sha256");
    assert_eq!(
        digest.hex(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_sha256_of_empty_input() {
    assert_eq!(Digest::sha256(b"").as_str(), EMPTY_SHA256);
}

#[test]
fn test_verify_accepts_matching_bytes() {
    let digest = Digest::sha256(b"layer bytes");
    assert!(digest.verify(b"layer bytes").is_ok());
}

#[test]
fn test_verify_rejects_mismatch() {
    let digest = Digest::sha256(b"layer bytes");
    let err = digest.verify(b"tampered").unwrap_err();
    assert!(err.to_string().contains("Digest mismatch"));
}

#[test]
fn test_serde_uses_plain_string() {
    let digest = Digest::sha256(b"");
    let json = serde_json::to_string(&digest).unwrap();
    assert_eq!(json, format!("\"{}\"", EMPTY_SHA256));

    let back: Digest = serde_json::from_str(&json).unwrap();
    assert_eq!(back, digest);
}

#[test]
fn test_serde_rejects_malformed_digest() {
    let result: std::result::Result<Digest, _> = serde_json::from_str("\"sha256:nope\"");
    assert!(result.is_err());
}

#[test]
fn test_digest_writer_forwards_and_counts() {
    let mut writer = DigestWriter::new(Vec::new());
    writer.write_all(b"abc").unwrap();
    writer.write_all(b"def").unwrap();
    assert_eq!(writer.written(), 6);

    let (inner, digest, size) = writer.finish();
    assert_eq!(inner, b"abcdef");
    assert_eq!(size, 6);
    assert_eq!(digest, Digest::sha256(b"abcdef"));
}
