//! Integration tests for MQTT client
//!
//! Tests the MQTT client's behaviour without a reachable broker:
//! - Client construction from configuration and credential files
//! - Initial connect failures surface as errors
//! - Publishes after a failed connect go to the offline queue
//! - Disconnect is safe in every state


use bytes::Bytes;
use rumqttc::v5::MqttOptions;
use std::net::TcpListener;
use telemetry_agent::config::QosLevel;
use telemetry_agent::error::AgentError;
use telemetry_agent::publisher::Publisher;
use telemetry_agent::transport::mqtt::{MqttClient, MqttError};
use telemetry_agent::transport::{ConnectionState, PublishOutcome, Transport};
use test_helpers::{local_broker_config, test_config};

/// A localhost port with nothing listening on it
fn refused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn plaintext_client(port: u16) -> MqttClient {
    let config = local_broker_config(port);
    let options = MqttOptions::new("test-thing", "127.0.0.1", port);
    MqttClient::with_options(options, &config.mqtt)
}

#[tokio::test]
async fn test_mqtt_client_creation() {
    let client = plaintext_client(1883);

    assert!(
        !client.is_connected(),
        "Client should not be connected until connect() is called"
    );
    assert_eq!(client.connection_state(), None);
    assert_eq!(client.queued_messages().await, 0);
}

#[tokio::test]
async fn test_missing_credentials_are_configuration_errors() {
    let config = test_config();
    let mut paths = config.credential_paths();
    paths.root_ca = "/nonexistent/root-CA.pem".into();

    let err = match MqttClient::new(&config.device.id, &config.mqtt, &paths) {
        Ok(_) => panic!("client must not build without credential files"),
        Err(e) => e,
    };
    assert!(matches!(err, MqttError::Credentials(_)));
    assert!(err.to_string().contains("/nonexistent/root-CA.pem"));

    let agent_error = AgentError::from(err);
    assert!(agent_error.is_fatal_configuration());
}

#[tokio::test]
async fn test_tls_client_builds_from_credential_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config();
    let mut paths = config.credential_paths();
    for (name, path) in [
        ("root-CA.pem", &mut paths.root_ca),
        ("private.key", &mut paths.private_key),
        ("cert.pem", &mut paths.certificate),
    ] {
        let file = dir.path().join(name);
        std::fs::write(&file, b"-----BEGIN TEST-----\n-----END TEST-----\n").unwrap();
        *path = file;
    }

    let client = MqttClient::new(&config.device.id, &config.mqtt, &paths).unwrap();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connect_to_unreachable_broker_fails() {
    let mut client = plaintext_client(refused_port());

    let result = client.connect().await;

    assert!(result.is_err(), "Connect must fail without a broker");
    assert!(!client.is_connected());
    assert!(matches!(
        client.connection_state(),
        Some(ConnectionState::Disconnected(_))
    ));
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let mut client = plaintext_client(refused_port());
    let _ = client.connect().await;

    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("Connection failed"));
}

#[tokio::test]
async fn test_publish_before_connect_fails() {
    let client = plaintext_client(1883);

    let result = client
        .publish("iot/device/sensordata", Bytes::from_static(b"{}"), QosLevel::AtMostOnce)
        .await;
    assert!(matches!(result, Err(MqttError::NotConnected)));
}

#[tokio::test]
async fn test_publisher_over_mqtt_client_reports_connect_failure() {
    let mut publisher = Publisher::new(plaintext_client(refused_port()));

    let result = publisher.connect().await;

    assert!(matches!(result, Err(AgentError::Connection { .. })));
    assert!(!publisher.is_connected());

    // offline queueing still accepts the payload
    assert!(
        publisher
            .publish("iot/device/sensordata", Bytes::from_static(b"{}"), QosLevel::AtMostOnce)
            .await
    );
    assert_eq!(publisher.transport().queued_messages().await, 1);
}

#[tokio::test]
async fn test_publish_after_failed_connect_is_queued() {
    let mut client = plaintext_client(refused_port());
    assert!(client.connect().await.is_err());

    for _ in 0..3 {
        let outcome = client
            .publish_message(
                "iot/device/sensordata",
                Bytes::from_static(b"{\"id\":\"device_001\"}"),
                QosLevel::AtLeastOnce,
            )
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Queued);
    }
    assert_eq!(client.queued_messages().await, 3);
}

#[tokio::test]
async fn test_bounded_queue_rejects_overflow() {
    let port = refused_port();
    let mut config = local_broker_config(port);
    config.mqtt.queue.offline_limit = Some(1);
    let mut client = MqttClient::with_options(MqttOptions::new("test-thing", "127.0.0.1", port), &config.mqtt);
    assert!(client.connect().await.is_err());

    let first = client
        .publish_message("t", Bytes::from_static(b"1"), QosLevel::AtMostOnce)
        .await;
    let second = client
        .publish_message("t", Bytes::from_static(b"2"), QosLevel::AtMostOnce)
        .await;

    assert!(matches!(first, Ok(PublishOutcome::Queued)));
    assert!(matches!(second, Err(MqttError::QueueFull { limit: 1 })));
    assert_eq!(client.queued_messages().await, 1);
}

#[tokio::test]
async fn test_disconnect_is_safe_in_any_state() {
    let mut never_connected = plaintext_client(1883);
    assert!(never_connected.disconnect().await.is_ok());

    let mut failed = plaintext_client(refused_port());
    let _ = failed.connect().await;
    assert!(failed.disconnect().await.is_ok());
    assert!(!failed.is_connected());
}
