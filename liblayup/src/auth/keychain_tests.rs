use super::*;
use base64::{Engine as _, engine::general_purpose};
use tempfile::tempdir;

fn keychain_with(contents: &str) -> (tempfile::TempDir, DockerKeychain) {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("config.json"), contents).unwrap();
    let keychain = DockerKeychain::in_dir(dir.path());
    (dir, keychain)
}

#[test]
fn test_missing_file_is_anonymous() {
    let dir = tempdir().unwrap();
    let keychain = DockerKeychain::in_dir(dir.path().join("nowhere"));

    assert_eq!(
        keychain.resolve("registry.example.com").unwrap(),
        Credentials::Anonymous
    );
}

#[test]
fn test_auth_field_is_decoded() {
    let auth = general_purpose::STANDARD.encode("ci:s3cret");
    let (_dir, keychain) = keychain_with(&format!(
        r#"{{"auths":{{"registry.example.com":{{"auth":"{}"}}}}}}"#,
        auth
    ));

    assert_eq!(
        keychain.resolve("registry.example.com").unwrap(),
        Credentials::basic("ci", "s3cret")
    );
}

#[test]
fn test_password_may_contain_colons() {
    let auth = general_purpose::STANDARD.encode("ci:a:b:c");
    let (_dir, keychain) = keychain_with(&format!(
        r#"{{"auths":{{"registry.example.com":{{"auth":"{}"}}}}}}"#,
        auth
    ));

    assert_eq!(
        keychain.resolve("registry.example.com").unwrap(),
        Credentials::basic("ci", "a:b:c")
    );
}

#[test]
fn test_username_and_password_fields() {
    let (_dir, keychain) = keychain_with(
        r#"{"auths":{"localhost:5000":{"username":"dev","password":"pw"}}}"#,
    );

    assert_eq!(
        keychain.resolve("localhost:5000").unwrap(),
        Credentials::basic("dev", "pw")
    );
}

#[test]
fn test_registry_token_is_bearer() {
    let (_dir, keychain) =
        keychain_with(r#"{"auths":{"ghcr.io":{"registrytoken":"tok-123"}}}"#);

    assert_eq!(
        keychain.resolve("ghcr.io").unwrap(),
        Credentials::bearer("tok-123")
    );
}

#[test]
fn test_docker_hub_legacy_key() {
    let auth = general_purpose::STANDARD.encode("hubuser:hubpass");
    let (_dir, keychain) = keychain_with(&format!(
        r#"{{"auths":{{"https://index.docker.io/v1/":{{"auth":"{}"}}}}}}"#,
        auth
    ));

    assert_eq!(
        keychain.resolve("index.docker.io").unwrap(),
        Credentials::basic("hubuser", "hubpass")
    );
}

#[test]
fn test_keys_with_scheme_and_path_match_host() {
    let (_dir, keychain) = keychain_with(
        r#"{"auths":{"https://registry.example.com/v2/":{"username":"u","password":"p"}}}"#,
    );

    assert_eq!(
        keychain.resolve("registry.example.com").unwrap(),
        Credentials::basic("u", "p")
    );
    assert_eq!(
        keychain.resolve("other.example.com").unwrap(),
        Credentials::Anonymous
    );
}

#[test]
fn test_unparseable_file_is_authentication_error() {
    let (_dir, keychain) = keychain_with("{ not json");

    let err = keychain.resolve("registry.example.com").unwrap_err();
    assert!(matches!(err, LayupError::Authentication { .. }));
}

#[test]
fn test_invalid_auth_field_is_authentication_error() {
    let (_dir, keychain) =
        keychain_with(r#"{"auths":{"registry.example.com":{"auth":"!!not-base64!!"}}}"#);

    let err = keychain.resolve("registry.example.com").unwrap_err();
    assert!(matches!(err, LayupError::Authentication { .. }));
}

#[test]
fn test_credential_helper_hosts_fall_back_to_anonymous() {
    let (_dir, keychain) =
        keychain_with(r#"{"auths":{},"credHelpers":{"gcr.io":"gcloud"}}"#);

    assert_eq!(keychain.resolve("gcr.io").unwrap(), Credentials::Anonymous);
}

#[test]
fn test_normalize_key() {
    assert_eq!(normalize_key("https://index.docker.io/v1/"), DEFAULT_REGISTRY);
    assert_eq!(normalize_key("http://localhost:5000"), "localhost:5000");
    assert_eq!(normalize_key("quay.io"), "quay.io");
}
