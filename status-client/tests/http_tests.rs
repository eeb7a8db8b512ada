//! HTTP behaviour of the status client against a mock receiver

use status_client::{ClientError, Command, Endpoint, StatusClient, VolumeDisplay, STATUS_PATH};
use std::time::Duration;

const STATUS_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<item>
<Power><value>ON</value></Power>
<InputFuncSelect><value>TUNER</value></InputFuncSelect>
<VolumeDisplay><value>Absolute</value></VolumeDisplay>
<MasterVolume><value>-35.0</value></MasterVolume>
<Mute><value>on</value></Mute>
</item>"#;

fn endpoint_for(server: &mockito::ServerGuard) -> Endpoint {
    let host = server.host_with_port();
    let (ip, port) = host.rsplit_once(':').unwrap();
    Endpoint::new(ip, port.parse().unwrap())
}

#[tokio::test]
async fn test_fetch_status_parses_document() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", STATUS_PATH)
        .with_status(200)
        .with_header("content-type", "text/xml")
        .with_body(STATUS_BODY)
        .create_async()
        .await;

    let client = StatusClient::new();
    let report = client.fetch_status(&endpoint_for(&server)).await.unwrap();

    mock.assert_async().await;
    assert_eq!(report.power, Some(true));
    assert_eq!(report.active_input.as_deref(), Some("TUNER"));
    assert_eq!(report.volume_display, Some(VolumeDisplay::Absolute));
    assert_eq!(report.to_delta(report.volume_display).volume_level, Some(45));
    assert_eq!(report.muted, Some(true));
}

#[tokio::test]
async fn test_forbidden_status_code_is_distinct() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", STATUS_PATH)
        .with_status(403)
        .create_async()
        .await;

    let client = StatusClient::new();
    let error = client.fetch_status(&endpoint_for(&server)).await.unwrap_err();

    assert!(error.is_forbidden(), "got {:?}", error);
}

#[tokio::test]
async fn test_forbidden_body_sentinel_is_distinct() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", STATUS_PATH)
        .with_status(200)
        .with_body("<html><head><title>403 Forbidden</title></head></html>")
        .create_async()
        .await;

    let client = StatusClient::new();
    let error = client.fetch_status(&endpoint_for(&server)).await.unwrap_err();

    assert!(matches!(error, ClientError::Forbidden(_)));
}

#[tokio::test]
async fn test_server_error_status() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", STATUS_PATH)
        .with_status(500)
        .create_async()
        .await;

    let client = StatusClient::new();
    let error = client.fetch_status(&endpoint_for(&server)).await.unwrap_err();

    assert!(matches!(error, ClientError::Status(500)));
}

#[tokio::test]
async fn test_unreachable_device_is_transport_error() {
    let client = StatusClient::with_timeout(Duration::from_millis(300)).unwrap();
    // Port 9 on localhost is the discard service and normally closed
    let error = client
        .fetch_status(&Endpoint::new("127.0.0.1", 9))
        .await
        .unwrap_err();

    assert!(matches!(error, ClientError::Transport(_)));
    assert!(!error.is_forbidden());
}

#[tokio::test]
async fn test_send_command_escapes_slash() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/goform/formiPhoneAppDirect.xml?SISAT%2FCBL")
        .with_status(200)
        .create_async()
        .await;

    let client = StatusClient::new();
    client
        .send_command(&endpoint_for(&server), &Command::SelectInput("SAT/CBL".into()))
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_power_command() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/goform/formiPhoneAppPower.xml?1+PowerStandby")
        .with_status(200)
        .create_async()
        .await;

    let client = StatusClient::new();
    client
        .send_command(&endpoint_for(&server), &Command::PowerStandby)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_send_command_failure_is_surfaced() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/goform/formiPhoneAppDirect.xml?MUON")
        .with_status(403)
        .create_async()
        .await;

    let client = StatusClient::new();
    let result = client
        .send_command(&endpoint_for(&server), &Command::MuteOn)
        .await;

    assert!(matches!(result, Err(ClientError::Forbidden(_))));
}
