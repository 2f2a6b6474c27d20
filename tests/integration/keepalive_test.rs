// tests/integration/keepalive_test.rs

use super::test_helpers::{TestServer, fast_config, wait_until, write_frame};
use netmux::config::EngineConfig;
use netmux::connection::ConnState;
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_silent_connection_is_reported_after_two_intervals() {
    let config = EngineConfig {
        health_check_interval_ms: 100,
        ..fast_config()
    };
    let reported: Arc<Mutex<Vec<(u64, Instant)>>> = Arc::default();
    let sink = Arc::clone(&reported);
    let server: TestServer = TestServer::start(config, move |engine| {
        engine.on_conn_not_active(move |conn| sink.lock().push((conn.id(), Instant::now())));
    });

    let started = Instant::now();
    let _client = server.connect();
    assert!(server.wait_for_conns(1));

    assert!(wait_until(Duration::from_secs(3), || !reported.lock().is_empty()));
    let (id, at) = reported.lock()[0];
    assert!(at.duration_since(started) >= Duration::from_millis(100));

    let conn = server.engine.get_conn(id).unwrap();
    assert_eq!(conn.state(), ConnState::NotActive);
    // Reported once, not on every tick.
    thread::sleep(Duration::from_millis(250));
    assert_eq!(reported.lock().len(), 1);
}

#[test]
fn test_chatty_connection_is_never_reported() {
    let config = EngineConfig {
        health_check_interval_ms: 200,
        ..fast_config()
    };
    let reported: Arc<Mutex<Vec<u64>>> = Arc::default();
    let sink = Arc::clone(&reported);
    let server: TestServer = TestServer::start(config, move |engine| {
        engine.on_conn_not_active(move |conn| sink.lock().push(conn.id()));
    });

    let mut client = server.connect();
    assert!(server.wait_for_conns(1));
    let deadline = Instant::now() + Duration::from_millis(1000);
    while Instant::now() < deadline {
        write_frame(&mut client, 1, b"ping");
        thread::sleep(Duration::from_millis(20));
    }

    assert!(reported.lock().is_empty());
}

#[test]
fn test_not_active_hook_can_close_the_connection() {
    let config = EngineConfig {
        health_check_interval_ms: 50,
        ..fast_config()
    };
    let stopped: Arc<Mutex<Vec<u64>>> = Arc::default();
    let sink = Arc::clone(&stopped);
    let server: TestServer = TestServer::start(config, move |engine| {
        engine.on_conn_not_active(|conn| conn.stop());
        engine.on_conn_stop(move |conn| sink.lock().push(conn.id()));
    });

    let mut client = server.connect();
    assert!(server.wait_for_conns(1));

    let mut buf = [0u8; 4];
    assert_eq!(client.read(&mut buf).unwrap(), 0);
    assert!(server.wait_for_conns(0));
    assert!(wait_until(Duration::from_secs(2), || stopped.lock().len() == 1));
}
