//! Tests for file configuration, environment overrides and option building

mod common;

use axum::body::Body;
use axum::http::Request;
use common::*;
use grapi::config::{ENV_JWT_SECRET, ENV_LOG_LEVEL, ENV_URI_PREFIX};
use grapi::prelude::*;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;
use tower::ServiceExt;

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_yaml_file_drives_routes_and_auth() {
    let file = yaml_file(&format!(
        "uri_prefix: v2\njwt_secret: {}\nlog_level: silent\n",
        SECRET
    ));
    let config = ApiConfig::from_yaml_file(file.path()).unwrap();

    let store = seeded_store();
    let options = Options::builder()
        .store(store.clone())
        .login_model(UserLogin)
        .config(config)
        .build()
        .unwrap();
    assert_eq!(options.uri_prefix(), "/v2");
    assert_eq!(options.log_level(), LogLevel::Silent);

    let api = Api::new(options)
        .set_auth("/login/")
        .unwrap()
        .add_default_routes(vec![RouteConfig::<User>::new().use_default_auth()])
        .unwrap();
    assert!(
        api.routes()
            .contains(&("POST".to_string(), "/v2/login".to_string()))
    );

    let server = server(api);
    let login = server
        .post("/v2/login")
        .json(&json!({"name": "admin", "password": "admin"}))
        .await;
    login.assert_status_ok();
    let token = login.json::<Value>()["token"].as_str().unwrap().to_string();

    server
        .get("/v2/users/3")
        .authorization_bearer(token)
        .await
        .assert_status_ok();
}

#[test]
fn test_missing_file_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ApiConfig::from_yaml_file(dir.path().join("absent.yaml"));

    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn test_malformed_yaml_is_a_load_error() {
    let file = yaml_file("uri_prefix: [unclosed\n");
    let result = ApiConfig::from_yaml_file(file.path());

    assert!(matches!(result, Err(ConfigError::Load(_))));

    let file = yaml_file("log_level: loud\n");
    assert!(ApiConfig::from_yaml_file(file.path()).is_err());
}

#[test]
fn test_overrides_replace_file_values() {
    let file = yaml_file("uri_prefix: /v1\njwt_secret: from-file\n");
    let env: HashMap<&str, &str> = HashMap::from([
        (ENV_URI_PREFIX, "/v3"),
        (ENV_LOG_LEVEL, "1"),
        (ENV_JWT_SECRET, "from-env"),
    ]);

    let config = ApiConfig::from_yaml_file(file.path())
        .unwrap()
        .with_overrides_from(|key| env.get(key).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.uri_prefix, "/v3");
    assert_eq!(config.log_level, LogLevel::Verbose);
    assert_eq!(config.jwt_secret.as_deref(), Some("from-env"));
}

#[test]
fn test_bad_log_level_override() {
    let result = ApiConfig::default().with_overrides_from(|key| {
        (key == ENV_LOG_LEVEL).then(|| "chatty".to_string())
    });

    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn test_options_need_a_store() {
    let result = Options::builder().jwt_secret(SECRET).build();
    assert!(matches!(result, Err(ConfigError::MissingStore)));
}

#[test]
fn test_empty_secret_counts_as_missing() {
    let store = MemoryStore::new();
    let options = Options::builder()
        .store(store.clone())
        .jwt_secret("")
        .login_model(UserLogin)
        .build()
        .unwrap();
    assert!(options.jwt_secret().is_none());

    let result = Api::new(options)
        .add_default_routes(vec![RouteConfig::<Widget>::new().use_default_auth()]);
    assert!(matches!(result, Err(ConfigError::MissingSecret)));
}

#[tokio::test]
async fn test_verbose_router_serves_requests() {
    let store = MemoryStore::new();
    store
        .seed("widgets", vec![json!({"id": 1, "name": "a"})])
        .unwrap();
    let options = Options::builder()
        .store(store)
        .log_level(LogLevel::Verbose)
        .build()
        .unwrap();

    let router = Api::new(options)
        .add_default_routes::<Widget>(vec![])
        .unwrap()
        .router();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/widgets/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
