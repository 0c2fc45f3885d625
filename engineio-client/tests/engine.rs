//! Engine-level tests against a scripted server on a localhost socket.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as b64;
use base64::Engine as _;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use engineio_client::{Config, Engine, Error, Packet, ProtocolVersion};

fn config(version: ProtocolVersion) -> Config {
    Config::new(version)
        .with_persistent(false)
        .with_timeout(Duration::from_secs(2))
        .with_wait(Duration::ZERO)
}

async fn read_head(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await.unwrap() == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8(buf).unwrap()
}

fn ok_response(body: &str, extra_headers: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=UTF-8\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        body.len(),
        extra_headers,
        body
    )
}

fn accept_key(head: &str) -> String {
    let key = head
        .lines()
        .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
        .expect("upgrade request without a websocket key")
        .trim();
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11");
    b64.encode(sha1.finalize())
}

fn switch_response(head: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept_key(head)
    )
}

/// Read one masked client frame, returning `(opcode, payload)`.
async fn read_client_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await.unwrap();
    let opcode = head[0] & 0x0F;
    assert_eq!(head[1] & 0x80, 0x80, "client frames must be masked");
    let len = match head[1] & 0x7F {
        126 => {
            let mut ext = [0u8; 2];
            stream.read_exact(&mut ext).await.unwrap();
            u16::from_be_bytes(ext) as usize
        }
        127 => {
            let mut ext = [0u8; 8];
            stream.read_exact(&mut ext).await.unwrap();
            u64::from_be_bytes(ext) as usize
        }
        n => n as usize,
    };
    let mut key = [0u8; 4];
    stream.read_exact(&mut key).await.unwrap();
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.unwrap();
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
    (opcode, payload)
}

fn server_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 126);
    let mut out = vec![0x80 | opcode, payload.len() as u8];
    out.extend_from_slice(payload);
    out
}

const HANDSHAKE_BODY: &str = r#"0{"sid":"AAA","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

#[tokio::test]
async fn handshake_upgrade_and_traffic() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // Handshake poll.
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.starts_with("GET /socket.io/?EIO=4&transport=polling&t="));
        assert!(head.contains("Connection: close\r\n"));
        stream
            .write_all(ok_response(HANDSHAKE_BODY, "Set-Cookie: io=AAA; Path=/\r\n").as_bytes())
            .await
            .unwrap();

        // Websocket upgrade.
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.contains("transport=websocket"));
        assert!(head.contains("sid=AAA"));
        assert!(head.contains("Upgrade: websocket\r\n"));
        assert!(head.contains("Connection: Upgrade\r\n"));
        assert!(head.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(head.contains("Origin: *\r\n"));
        // The handshake cookie came back, attributes stripped.
        assert!(head.contains("Cookie: io=AAA\r\n"));
        stream
            .write_all(switch_response(&head).as_bytes())
            .await
            .unwrap();

        // First frame after the 101 is the UPGRADE packet.
        let (opcode, payload) = read_client_frame(&mut stream).await;
        assert_eq!(opcode, 0x1);
        assert_eq!(payload, b"5");

        // One application message from the client.
        let (opcode, payload) = read_client_frame(&mut stream).await;
        assert_eq!(opcode, 0x1);
        assert_eq!(payload, b"42[\"x\",1]");

        // Heartbeat: server pings, client pongs.
        stream.write_all(&server_frame(0x1, b"2")).await.unwrap();
        let (_, payload) = read_client_frame(&mut stream).await;
        assert_eq!(payload, b"3");

        // And one message for the client to receive.
        stream
            .write_all(&server_frame(0x1, b"42[\"pushed\",null]"))
            .await
            .unwrap();
    });

    let mut engine = Engine::new(
        &format!("http://{addr}"),
        config(ProtocolVersion::V4),
    )
    .unwrap();

    engine.handshake().await.unwrap();
    {
        let session = engine.session().unwrap();
        assert_eq!(session.sid, "AAA");
        assert_eq!(session.ping_interval, Duration::from_secs(25));
        assert_eq!(session.timeout(), Duration::from_secs(45));
        assert_eq!(session.max_payload, Some(1000000));
    }

    engine.upgrade().await.unwrap();
    assert!(engine.is_connected());

    let written = engine.send_message("2[\"x\",1]").await.unwrap();
    assert_eq!(written, 6 + "42[\"x\",1]".len());

    // The server ping surfaces as a packet; answering is the caller's job.
    let packet = loop {
        if let Some(packet) = engine.recv().await.unwrap() {
            break packet;
        }
    };
    assert_eq!(packet, Packet::Ping);
    engine.pong().await.unwrap();

    let packet = loop {
        if let Some(packet) = engine.recv().await.unwrap() {
            break packet;
        }
    };
    assert_eq!(packet, Packet::Message("2[\"pushed\",null]".to_string()));

    server.await.unwrap();
}

#[tokio::test]
async fn handshake_requires_a_websocket_upgrade() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_head(&mut stream).await;
        let body = r#"0{"sid":"AAA","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
        stream
            .write_all(ok_response(body, "").as_bytes())
            .await
            .unwrap();
    });

    let mut engine = Engine::new(
        &format!("http://{addr}"),
        config(ProtocolVersion::V4),
    )
    .unwrap();
    assert!(matches!(
        engine.handshake().await,
        Err(Error::UnsupportedTransport(_))
    ));
}

#[tokio::test]
async fn handshake_rejects_non_200_answers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_head(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
    });

    let mut engine = Engine::new(
        &format!("http://{addr}"),
        config(ProtocolVersion::V4),
    )
    .unwrap();
    assert!(matches!(
        engine.handshake().await,
        Err(Error::ServerConnectionFailure(_))
    ));
}

#[tokio::test]
async fn persistent_polling_reuses_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        // A single connection serves both requests.
        let (mut stream, _) = listener.accept().await.unwrap();

        let head = read_head(&mut stream).await;
        assert!(head.contains("Connection: keep-alive\r\n"));
        let body = HANDSHAKE_BODY;
        stream
            .write_all(
                format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let head = read_head(&mut stream).await;
        assert!(head.contains("sid=AAA"));
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\n6")
            .await
            .unwrap();
    });

    let mut engine = Engine::new(
        &format!("http://{addr}"),
        config(ProtocolVersion::V4).with_persistent(true),
    )
    .unwrap();
    engine.handshake().await.unwrap();
    assert_eq!(engine.poll().await.unwrap(), vec![Packet::Noop]);

    server.await.unwrap();
}

#[tokio::test]
async fn v2_upgrade_drains_the_gratuitous_connect_and_pings() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.contains("EIO=2&transport=polling"));
        let open = r#"0{"sid":"CCC","upgrades":["websocket"],"pingInterval":100,"pingTimeout":500}"#;
        let body = format!("{}:{}", open.chars().count(), open);
        stream
            .write_all(ok_response(&body, "").as_bytes())
            .await
            .unwrap();

        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.contains("EIO=2&transport=websocket"));
        stream
            .write_all(switch_response(&head).as_bytes())
            .await
            .unwrap();

        let (_, payload) = read_client_frame(&mut stream).await;
        assert_eq!(payload, b"5");
        // The v2 server pushes a connect message right after the upgrade.
        stream.write_all(&server_frame(0x1, b"40")).await.unwrap();

        // The next frame is the heartbeat ping, not the stale connect.
        let (_, payload) = read_client_frame(&mut stream).await;
        assert_eq!(payload, b"2");
    });

    let mut engine = Engine::new(
        &format!("http://{addr}"),
        config(ProtocolVersion::V2),
    )
    .unwrap();
    engine.handshake().await.unwrap();
    engine.upgrade().await.unwrap();

    // The gratuitous `40` was consumed by the upgrade; after one quiet ping
    // interval the opportunistic heartbeat fires.
    tokio::time::sleep(Duration::from_millis(150)).await;
    engine.keep_alive().await.unwrap();

    server.await.unwrap();
}

#[tokio::test]
async fn v3_handshake_reads_the_length_prefixed_body() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        assert!(head.contains("EIO=3&transport=polling"));
        assert!(head.contains("b64=1"));
        let open = r#"0{"sid":"BBB","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#;
        let body = format!("{}:{}2:40", open.chars().count(), open);
        stream
            .write_all(ok_response(&body, "").as_bytes())
            .await
            .unwrap();
    });

    let mut engine = Engine::new(
        &format!("http://{addr}"),
        config(ProtocolVersion::V3).with_b64(true),
    )
    .unwrap();
    engine.handshake().await.unwrap();
    let session = engine.session().unwrap();
    assert_eq!(session.sid, "BBB");
    assert_eq!(session.ping_timeout, Duration::from_secs(5));
}
