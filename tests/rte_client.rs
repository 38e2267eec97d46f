//! End-to-end client tests against a fake controller on loopback

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use urd_rte::{
    Config, ConnectionState, FaultPolicy, MessageStream, Packet, RealtimeMessage, RteClient, VariableValue,
};

const ROBOT_STATE: u8 = 16;
const ROBOT_MESSAGE: u8 = 20;
const PROGRAM_STATE: u8 = 25;

fn version_packet(major: u8, minor: u8) -> Vec<u8> {
    let project = b"URControl";
    let mut payload = Vec::new();
    payload.extend_from_slice(&1_700_000_000u64.to_be_bytes());
    payload.push(0xfe);
    payload.push(3);
    payload.push(project.len() as u8);
    payload.extend_from_slice(project);
    payload.push(major);
    payload.push(minor);
    payload.extend_from_slice(&0i32.to_be_bytes());
    payload.extend_from_slice(&42i32.to_be_bytes());
    Packet::encode(ROBOT_STATE, &payload).as_bytes().to_vec()
}

fn program_state_packet(subtype: u8, start: u16, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&5u64.to_be_bytes());
    payload.push(subtype);
    payload.extend_from_slice(&start.to_be_bytes());
    payload.extend_from_slice(body);
    Packet::encode(PROGRAM_STATE, &payload).as_bytes().to_vec()
}

fn comm_packet(code: i32, argument: i32, level: i32) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&5u64.to_be_bytes());
    payload.push(10);
    payload.push(6);
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(&argument.to_be_bytes());
    payload.extend_from_slice(&level.to_be_bytes());
    Packet::encode(ROBOT_MESSAGE, &payload).as_bytes().to_vec()
}

fn config(port: u16) -> Config {
    let yaml = format!(
        "controller:\n  host: 127.0.0.1\n  port: {}\nconnection:\n  retry_delay_ms: 20\n  retry_max_delay_ms: 50\n  idle_timeout_ms: 5000\nmonitor:\n  ignored_fault_codes: [\"C4A\\\\d+\"]\n",
        port
    );
    Config::from_yaml(&yaml).unwrap()
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn next_message(stream: &mut MessageStream) -> RealtimeMessage {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for message")
        .expect("message stream closed")
}

async fn next_data_package(stream: &mut MessageStream) -> urd_rte::DataPackageMessage {
    loop {
        if let RealtimeMessage::DataPackage(package) = next_message(stream).await {
            return package;
        }
    }
}

async fn write_split(server: &mut TcpStream, bytes: &[u8]) {
    // deliberately misaligned with packet boundaries
    for chunk in bytes.chunks(7) {
        server.write_all(chunk).await.unwrap();
        server.flush().await.unwrap();
    }
}

#[tokio::test]
async fn test_global_variables_over_tcp() {
    let (listener, port) = listener().await;
    let mut client = RteClient::from_config(&config(port));
    let mut stream = client.connect().await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    let mut bytes = version_packet(5, 11);
    bytes.extend(program_state_packet(0, 0, b"speed\nmode\n"));
    let mut update = vec![16];
    update.extend_from_slice(&1.5f32.to_be_bytes());
    update.push(b'\n');
    update.extend([13, 1, b'\n']);
    bytes.extend(program_state_packet(1, 0, &update));
    write_split(&mut server, &bytes).await;

    assert_eq!(
        next_message(&mut stream).await,
        RealtimeMessage::ConnectionState {
            state: ConnectionState::Connected
        }
    );
    match next_message(&mut stream).await {
        RealtimeMessage::Version(version) => {
            assert_eq!(version.project_name, "URControl");
            assert_eq!((version.major, version.minor, version.build), (5, 11, 42));
        }
        other => panic!("expected version, got {:?}", other),
    }

    let names_only = next_data_package(&mut stream).await;
    assert_eq!(names_only.names, vec!["speed", "mode"]);
    assert!(names_only.variables.is_empty());

    let package = next_data_package(&mut stream).await;
    assert_eq!(package.variables["speed"], VariableValue::Float(1.5));
    assert_eq!(package.variables["mode"], VariableValue::Bool(true));

    client.send_script("textmsg(\"from test\")").unwrap();
    let mut received = vec![0u8; 21];
    server.read_exact(&mut received).await.unwrap();
    assert_eq!(received, b"textmsg(\"from test\")\n".to_vec());

    client.disconnect().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_captures_fresh_version() {
    let (listener, port) = listener().await;
    let mut client = RteClient::from_config(&config(port));
    let mut stream = client.connect().await.unwrap();

    let (mut first, _) = listener.accept().await.unwrap();
    let mut bytes = version_packet(3, 2);
    // a torn packet the next socket must never see
    bytes.extend(&version_packet(3, 2)[..6]);
    first.write_all(&bytes).await.unwrap();

    match next_message(&mut stream).await {
        RealtimeMessage::ConnectionState { state } => assert_eq!(state, ConnectionState::Connected),
        other => panic!("expected state, got {:?}", other),
    }
    assert!(matches!(next_message(&mut stream).await, RealtimeMessage::Version(_)));
    drop(first);

    let (mut second, _) = listener.accept().await.unwrap();
    second.write_all(&version_packet(5, 11)).await.unwrap();

    let version = loop {
        if let RealtimeMessage::Version(version) = next_message(&mut stream).await {
            break version;
        }
    };
    assert_eq!((version.major, version.minor), (5, 11));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_fault_messages_reach_policy() {
    let (listener, port) = listener().await;
    let config = config(port);
    let policy = FaultPolicy::from_config(&config.monitor).unwrap();
    let mut client = RteClient::from_config(&config);
    let mut stream = client.connect().await.unwrap();
    let (mut server, _) = listener.accept().await.unwrap();

    let mut bytes = version_packet(5, 11);
    bytes.extend(comm_packet(100, 2, 2));
    bytes.extend(comm_packet(210, 3, 4));
    server.write_all(&bytes).await.unwrap();

    let fault = loop {
        let message = next_message(&mut stream).await;
        if let Some(fault) = policy.check(&message) {
            break fault;
        }
    };
    assert_eq!(fault.code.as_deref(), Some("210A3"));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_script_sent_right_after_connect_is_delivered() {
    let (listener, port) = listener().await;
    let mut client = RteClient::from_config(&config(port));
    let _stream = client.connect().await.unwrap();
    client.send_script("textmsg(\"x\")").unwrap();

    let (mut server, _) = listener.accept().await.unwrap();
    let mut received = vec![0u8; 13];
    tokio::time::timeout(Duration::from_millis(1500), server.read_exact(&mut received))
        .await
        .expect("script queued before the socket came up was lost")
        .unwrap();
    assert_eq!(received, b"textmsg(\"x\")\n".to_vec());

    client.disconnect().await.unwrap();
}
