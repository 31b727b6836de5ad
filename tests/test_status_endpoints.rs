//! Status endpoint tests against a live session
//!
//! The routes read the same watch channel the session publishes to, so
//! `/health` must follow connection changes without any extra wiring.

use sensor_monitor::config::MqttSection;
use sensor_monitor::lifecycle::HostLifecycle;
use sensor_monitor::observability::routes;
use sensor_monitor::session::SessionManager;
use sensor_monitor::testing::MockTransportFactory;
use std::sync::Arc;
use std::time::Duration;
use warp::http::StatusCode;

fn section() -> MqttSection {
    MqttSection {
        broker_url: "mqtt://localhost:1883".to_string(),
        topic: "sensors/temperature".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_health_tracks_session_connection() {
    // Arrange
    let factory = MockTransportFactory::new();
    let mut manager = SessionManager::new(section());
    let mut rx = manager.subscribe();
    let filter = routes(manager.subscribe());
    manager
        .start(&factory, Arc::new(HostLifecycle::default()))
        .unwrap();

    let before = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(before.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Act
    factory.connect();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.is_connected()))
        .await
        .unwrap()
        .unwrap();

    // Assert
    let after = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(after.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(after.body()).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connectionState"], "connected");

    manager.shutdown().await;
}

#[tokio::test]
async fn test_snapshot_exposes_latest_reading_and_window() {
    let factory = MockTransportFactory::new();
    let mut manager = SessionManager::new(section());
    let mut rx = manager.subscribe();
    let filter = routes(manager.subscribe());
    manager
        .start(&factory, Arc::new(HostLifecycle::default()))
        .unwrap();

    factory.connect();
    factory.deliver(
        "sensors/temperature",
        br#"{"value": 24.5, "observedAt": "2024-01-01T00:00:00Z"}"#,
    );
    tokio::time::timeout(
        Duration::from_secs(2),
        rx.wait_for(|s| s.latest_reading.is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    let response = warp::test::request().path("/snapshot").reply(&filter).await;
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();

    assert_eq!(body["latestReading"]["value"], 24.5);
    assert_eq!(body["latestReading"]["observedAt"], "2024-01-01T00:00:00Z");
    assert_eq!(body["latestReading"]["source"], "live");
    assert_eq!(body["history"], serde_json::json!([24.5]));
    assert!(body["lastError"].is_null());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_config_error_visible_through_health() {
    let factory = MockTransportFactory::new();
    let mut manager = SessionManager::new(MqttSection::default());
    let filter = routes(manager.subscribe());

    let _ = manager.start(&factory, Arc::new(HostLifecycle::default()));

    let response = warp::test::request().path("/health").reply(&filter).await;
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["lastError"], "missing broker URL or topic");
}
