use liblayup::auth::{Anonymous, StaticCredentials};
use liblayup::transport::HttpTransport;
use liblayup::{
    BuildRequest, ConfigOverrides, Credentials, Digest, LayupError, Pipeline, Reference, Registry,
    Silent, Stage,
};
use std::sync::Arc;

#[test]
fn test_version_is_set() {
    assert!(!liblayup::version().is_empty());
}

#[test]
fn test_reference_defaults() {
    let reference: Reference = Reference::parse("alpine").unwrap();
    assert_eq!(reference.registry(), "index.docker.io");
    assert_eq!(reference.repository_path(), "library/alpine");
    assert_eq!(reference.identifier(), "latest");
}

#[test]
fn test_digest_of_bytes() {
    let digest = Digest::sha256(b"{}");
    assert_eq!(
        digest.as_str(),
        "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
    );
}

#[test]
fn test_overrides_builder() {
    let overrides = ConfigOverrides::new()
        .with_env("PORT", "8080")
        .with_cmd("/app --serve");
    assert_eq!(overrides.env_list(), vec!["PORT=8080"]);
    assert_eq!(overrides.cmd(), "/app --serve");
}

#[test]
fn test_registry_builder_chains() {
    let credentials = StaticCredentials::new().with("registry.lan", Credentials::basic("u", "p"));
    let registry = Registry::new(Arc::new(HttpTransport::new().unwrap()), Arc::new(credentials))
        .with_insecure(vec!["registry.lan".to_string()])
        .with_platform("linux", "arm64");

    let reference = registry.resolve("registry.lan/team/app:v1").unwrap();
    assert_eq!(reference.registry(), "registry.lan");
}

#[test]
fn test_pipeline_rejects_bad_base_before_network() {
    let registry = Registry::new(Arc::new(HttpTransport::new().unwrap()), Arc::new(Anonymous));
    let request = BuildRequest::from_cli("not a reference", "localhost:1/app", vec![], &["A=1"], "")
        .unwrap();

    let mut pipeline = Pipeline::new(&registry, &Silent);
    let err = pipeline.run(&request).unwrap_err();

    assert_eq!(pipeline.state(), Stage::Failed);
    assert_eq!(err.stages(), vec!["fetching"]);
    assert!(matches!(err.root_cause(), LayupError::Input { .. }));
}
