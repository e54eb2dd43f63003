use super::*;
use crate::model::SaveKind;
use serde_json::json;

/// A base URL nothing listens on
fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api", port)
}

fn unreachable_adapter() -> RemoteAdapter {
    RemoteAdapter::new(&unreachable_url(), Duration::from_secs(2)).unwrap()
}

#[test]
fn test_session_ids_are_path_encoded() {
    let adapter = RemoteAdapter::new("http://localhost:8000/api", Duration::from_secs(1)).unwrap();
    let url = adapter.url(&["sessions", "a b/c?d"]).unwrap();
    assert_eq!(url.path(), "/api/sessions/a%20b%2Fc%3Fd");
    assert!(url.query().is_none());
}

#[test]
fn test_trailing_slash_in_base_url() {
    let adapter = RemoteAdapter::new("http://localhost:8000/api/", Duration::from_secs(1)).unwrap();
    let url = adapter.url(&["sessions", "s1", "exists"]).unwrap();
    assert_eq!(url.as_str(), "http://localhost:8000/api/sessions/s1/exists");
}

#[test]
fn test_invalid_base_url_rejected() {
    assert!(matches!(
        RemoteAdapter::new("not a url", Duration::from_secs(1)),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        RemoteAdapter::new("mailto:someone@example.com", Duration::from_secs(1)),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_from_config() {
    let config = SyncConfig::default().with_remote_url("http://example.com:9000/base");
    let adapter = RemoteAdapter::from_config(&config).unwrap();
    assert_eq!(adapter.base_url().as_str(), "http://example.com:9000/base");
    assert_eq!(adapter.kind(), AdapterKind::Remote);
    assert_eq!(adapter.priority(), REMOTE_PRIORITY);
}

#[tokio::test]
async fn test_unreachable_save_fails_and_goes_offline() {
    let adapter = unreachable_adapter();
    assert!(adapter.is_online());

    let request = SaveRequest::new("s1", json!({"rows": 1}), "data", SaveKind::Data);
    let result = adapter.save_state(&request).await;

    assert!(!result.success);
    assert_eq!(result.session_id, "s1");
    assert!(result.error.is_some());
    assert!(!adapter.is_online());
}

#[tokio::test]
async fn test_unreachable_reads_error() {
    let adapter = unreachable_adapter();

    let err = adapter.load_state("s1").await.unwrap_err();
    assert!(err.is_network());
    assert!(adapter.list_sessions().await.is_err());
    assert!(adapter.has_session("s1").await.is_err());
    assert!(!adapter.is_online());
}

#[tokio::test]
async fn test_unreachable_health_check_is_false() {
    let adapter = unreachable_adapter();
    assert!(!adapter.health_check().await);
    assert!(!adapter.is_online());
}

#[test]
fn test_save_body_carries_stamp() {
    let request = SaveRequest::new("s1", json!({"labels": []}), "labels", SaveKind::Labels);
    let body = SaveSessionBody::from(&request);
    let value = serde_json::to_value(&body).unwrap();

    assert_eq!(value["sessionId"], "s1");
    assert_eq!(value["type"], "labels");
    assert!(value.get("updatedAt").is_some());
    assert_eq!(body.into_request().stamped_at, request.stamped_at);
}

#[test]
fn test_save_body_without_stamp() {
    let body: SaveSessionBody = serde_json::from_value(json!({
        "sessionId": "s1",
        "dataState": {},
        "activeTab": "data"
    }))
    .unwrap();
    assert_eq!(body.kind, SaveKind::Data);
    assert!(body.updated_at.is_none());
}
