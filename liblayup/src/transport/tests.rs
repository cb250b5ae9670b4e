use super::*;
use std::io::Cursor;

#[test]
fn test_request_builders() {
    let request = Request::put("http://localhost:5000/v2/app/manifests/latest")
        .header("Content-Type", "application/json")
        .body(Body::Bytes(b"{}".to_vec()));

    assert_eq!(request.method, Method::Put);
    assert_eq!(request.header_value("content-type"), Some("application/json"));
    assert_eq!(request.body.len(), 2);
}

#[test]
fn test_request_defaults_to_empty_body() {
    let request = Request::head("http://localhost:5000/v2/");
    assert!(request.body.is_empty());
    assert!(request.header_value("Authorization").is_none());
}

#[test]
fn test_stream_body_reports_declared_length() {
    let body = Body::Stream {
        reader: Box::new(Cursor::new(vec![0u8; 16])),
        length: 16,
    };
    assert_eq!(body.len(), 16);
    assert_eq!(format!("{:?}", body), "Stream(16 bytes)");
}

#[test]
fn test_response_header_lookup_ignores_case() {
    let response = Response::new(201)
        .with_header("Docker-Content-Digest", "sha256:abc")
        .with_header("location", "/v2/app/blobs/sha256:abc");

    assert_eq!(response.header("docker-content-digest"), Some("sha256:abc"));
    assert_eq!(response.header("Location"), Some("/v2/app/blobs/sha256:abc"));
    assert!(response.header("Content-Length").is_none());
}

#[test]
fn test_response_success_range() {
    assert!(Response::new(200).is_success());
    assert!(Response::new(202).is_success());
    assert!(!Response::new(307).is_success());
    assert!(!Response::new(404).is_success());
}

#[test]
fn test_response_text() {
    let response = Response::new(500).with_body("upstream down");
    assert_eq!(response.text(), "upstream down");
}

#[test]
fn test_method_display() {
    assert_eq!(Method::Head.to_string(), "HEAD");
    assert_eq!(Method::Post.as_str(), "POST");
}
