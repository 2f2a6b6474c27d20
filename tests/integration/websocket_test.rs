// tests/integration/websocket_test.rs

use super::test_helpers::{TestServer, fast_config, wait_until};
use bytes::Bytes;
use netmux::config::{EngineConfig, NetworkMode};
use netmux::connection::TransportKind;
use netmux::core::Message;
use netmux::core::protocol::{pack_websocket, unpack_websocket};
use netmux::{Context, task};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tungstenite::{Message as WsMessage, WebSocket};

fn ws_echo_server(kinds: Arc<Mutex<Vec<TransportKind>>>) -> TestServer {
    ws_echo_server_with(fast_config(), kinds)
}

fn ws_echo_server_with(config: EngineConfig, kinds: Arc<Mutex<Vec<TransportKind>>>) -> TestServer {
    TestServer::start_with(config, NetworkMode::WebSocket, 0, move |engine| {
        engine.on_conn_start(move |conn| kinds.lock().push(conn.transport()));
        engine.fallback(&[task(|ctx: &mut Context| {
            let _ = ctx.reply(ctx.msg_id(), ctx.payload().clone());
        })]);
    })
}

fn ws_connect(server: &TestServer) -> WebSocket<TcpStream> {
    let stream = server.connect();
    let url = format!("ws://{}/", server.addr);
    let (ws, _response) = tungstenite::client(url, stream).unwrap();
    ws
}

#[test]
fn test_binary_echo_round_trip() {
    let kinds: Arc<Mutex<Vec<TransportKind>>> = Arc::default();
    let server = ws_echo_server(Arc::clone(&kinds));
    let mut ws = ws_connect(&server);

    let frame = pack_websocket(&Message::new(12, Bytes::from_static(b"over websocket")));
    ws.send(WsMessage::binary(frame)).unwrap();

    match ws.read().unwrap() {
        WsMessage::Binary(data) => {
            let msg = unpack_websocket(data).unwrap();
            assert_eq!(msg.id(), 12);
            assert_eq!(msg.data().as_ref(), b"over websocket");
        }
        other => panic!("expected a binary frame, got {other:?}"),
    }
    assert!(wait_until(Duration::from_secs(2), || {
        *kinds.lock() == vec![TransportKind::WebSocket]
    }));
}

#[test]
fn test_ping_is_answered() {
    let server = ws_echo_server(Arc::default());
    let mut ws = ws_connect(&server);

    ws.send(WsMessage::Ping(Bytes::from_static(b"beat"))).unwrap();
    match ws.read().unwrap() {
        WsMessage::Pong(data) => assert_eq!(data.as_ref(), b"beat"),
        other => panic!("expected a pong, got {other:?}"),
    }
}

#[test]
fn test_short_binary_frame_closes_the_connection() {
    let server = ws_echo_server(Arc::default());
    let mut ws = ws_connect(&server);
    assert!(server.wait_for_conns(1));

    ws.send(WsMessage::binary(vec![1u8, 2])).unwrap();

    loop {
        match ws.read() {
            Ok(WsMessage::Close(_)) => continue,
            Ok(other) => panic!("expected the connection to close, got {other:?}"),
            Err(tungstenite::Error::Io(e)) => {
                assert!(!matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));
                break;
            }
            Err(_) => break,
        }
    }
    assert!(server.wait_for_conns(0));
}

#[test]
fn test_client_close_deregisters() {
    let server = ws_echo_server(Arc::default());
    let mut ws = ws_connect(&server);
    assert!(server.wait_for_conns(1));

    ws.close(None).unwrap();
    // Drive the closing handshake until the server side goes away.
    while ws.read().is_ok() {}
    assert!(server.wait_for_conns(0));
}

#[test]
fn test_burst_larger_than_read_budget_is_fully_echoed() {
    let config = EngineConfig {
        read_attempts: 4,
        ..fast_config()
    };
    let server = ws_echo_server_with(config, Arc::default());
    let mut ws = ws_connect(&server);

    // Queued client-side and flushed once, so the frames arrive together.
    for seq in 0..20u32 {
        let frame = pack_websocket(&Message::new(seq, Bytes::new()));
        ws.write(WsMessage::binary(frame)).unwrap();
    }
    ws.flush().unwrap();

    for seq in 0..20u32 {
        match ws.read().unwrap() {
            WsMessage::Binary(data) => assert_eq!(unpack_websocket(data).unwrap().id(), seq),
            other => panic!("expected a binary frame, got {other:?}"),
        }
    }
}

#[test]
fn test_replies_are_not_held_back_by_idle_reads() {
    let read_timeout = Duration::from_millis(1000);
    let config = EngineConfig {
        read_timeout_ms: read_timeout.as_millis() as u64,
        ..fast_config()
    };
    let server = ws_echo_server_with(config, Arc::default());
    let mut ws = ws_connect(&server);

    for seq in 0..30u32 {
        let started = Instant::now();
        let frame = pack_websocket(&Message::new(seq, Bytes::from_static(b"tick")));
        ws.send(WsMessage::binary(frame)).unwrap();
        match ws.read().unwrap() {
            WsMessage::Binary(data) => assert_eq!(unpack_websocket(data).unwrap().id(), seq),
            other => panic!("expected a binary frame, got {other:?}"),
        }
        let elapsed = started.elapsed();
        assert!(
            elapsed < read_timeout / 2,
            "round trip {seq} took {elapsed:?}"
        );
    }
}
