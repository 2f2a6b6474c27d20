// tests/integration/lifecycle_test.rs

use super::test_helpers::{
    TestServer, fast_config, read_frame, socket_pair, wait_until, write_frame,
};
use netmux::config::NetworkMode;
use netmux::connection::SignalKind;
use netmux::core::NetError;
use netmux::{Context, task};
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::time::Duration;

type Events = Arc<Mutex<Vec<(u64, SignalKind)>>>;

fn recording_server(events: &Events) -> TestServer {
    let on_start = Arc::clone(events);
    let on_stop = Arc::clone(events);
    TestServer::start(fast_config(), move |engine| {
        engine.on_conn_start(move |conn| on_start.lock().push((conn.id(), SignalKind::Start)));
        engine.on_conn_stop(move |conn| on_stop.lock().push((conn.id(), SignalKind::Stop)));
    })
}

fn expect_closed(client: &mut std::net::TcpStream) {
    let mut buf = [0u8; 8];
    match client.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert!(!matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)),
    }
}

#[test]
fn test_start_fires_before_stop() {
    let events = Events::default();
    let server = recording_server(&events);

    let client = server.connect();
    assert!(server.wait_for_conns(1));
    drop(client);
    assert!(server.wait_for_conns(0));
    assert!(wait_until(Duration::from_secs(2), || events.lock().len() == 2));

    let events = events.lock();
    assert_eq!(events[0].1, SignalKind::Start);
    assert_eq!(events[1].1, SignalKind::Stop);
    assert_eq!(events[0].0, events[1].0);
}

#[test]
fn test_engine_stop_closes_every_connection() {
    let events = Events::default();
    let server = recording_server(&events);

    let mut clients = vec![server.connect(), server.connect(), server.connect()];
    assert!(server.wait_for_conns(3));
    assert!(wait_until(Duration::from_secs(2), || events.lock().len() == 3));

    server.engine.stop();
    assert!(!server.engine.is_running());
    assert_eq!(server.engine.conn_count(), 0);

    // Stop hooks have all run by the time `stop` returns.
    let stops = events
        .lock()
        .iter()
        .filter(|(_, kind)| *kind == SignalKind::Stop)
        .count();
    assert_eq!(stops, 3);

    for client in clients.iter_mut() {
        expect_closed(client);
    }

    // A second stop is a no-op.
    server.engine.stop();
}

#[test]
fn test_admit_after_stop_is_refused() {
    let server: TestServer = TestServer::start(fast_config(), |_| {});
    server.engine.stop();

    let (stream, _client) = socket_pair();
    assert!(matches!(
        server.engine.admit_tcp(stream),
        Err(NetError::EngineStopped)
    ));
}

#[test]
fn test_del_conn_fires_stop_once() {
    let events = Events::default();
    let server = recording_server(&events);
    let mut client = server.connect();
    assert!(server.wait_for_conns(1));
    assert!(wait_until(Duration::from_secs(2), || events.lock().len() == 1));

    let id = events.lock()[0].0;
    server.engine.del_conn(id).unwrap();
    let _ = server.engine.del_conn(id);
    expect_closed(&mut client);

    assert!(wait_until(Duration::from_secs(2), || events.lock().len() == 2));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(events.lock().len(), 2);
    assert!(server.engine.get_conn(id).is_none());
}

#[test]
fn test_connection_limit_refuses_extra_clients() {
    let server: TestServer = TestServer::start_with(fast_config(), NetworkMode::Tcp, 1, |engine| {
        engine.fallback(&[task(|ctx: &mut Context| {
            let _ = ctx.reply(ctx.msg_id(), ctx.payload().clone());
        })]);
    });

    let mut first = server.connect();
    assert!(server.wait_for_conns(1));

    let mut second = server.connect();
    expect_closed(&mut second);
    assert_eq!(server.engine.conn_count(), 1);

    write_frame(&mut first, 1, b"still here");
    assert_eq!(read_frame(&mut first).data().as_ref(), b"still here");
}

#[test]
fn test_connection_limit_counts_pending_handshakes() {
    let server: TestServer = TestServer::start_with(fast_config(), NetworkMode::WebSocket, 2, |_| {});

    // Every socket is accepted before any of them completes its upgrade.
    let clients: Vec<_> = (0..6).map(|_| server.connect()).collect();
    std::thread::sleep(Duration::from_millis(200));

    let url = format!("ws://{}/", server.addr);
    let upgraded: Vec<_> = clients
        .into_iter()
        .filter_map(|stream| tungstenite::client(url.as_str(), stream).ok())
        .collect();

    assert_eq!(upgraded.len(), 2);
    assert!(server.wait_for_conns(2));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(server.engine.conn_count(), 2);
}

#[test]
fn test_admissions_racing_stop_are_all_closed() {
    let server: TestServer = TestServer::start(fast_config(), |_| {});
    let (streams, clients): (Vec<_>, Vec<_>) = (0..64).map(|_| socket_pair()).unzip();

    let engine = Arc::clone(&server.engine);
    let admitter = std::thread::spawn(move || {
        streams
            .into_iter()
            .filter_map(|stream| engine.admit_tcp(stream).ok())
            .collect::<Vec<_>>()
    });
    std::thread::sleep(Duration::from_millis(1));
    server.engine.stop();

    let admitted = admitter.join().unwrap();
    assert_eq!(server.engine.conn_count(), 0);
    assert!(admitted.iter().all(|conn| conn.is_closed()));
    drop(clients);
}

#[derive(Default)]
struct Session {
    seen: u32,
}

#[test]
fn test_property_tracks_state_per_connection() {
    let server: TestServer<Session> = TestServer::start(fast_config(), |engine| {
        engine.regist(
            1,
            &[task(|ctx: &mut Context<Session>| {
                let seen = {
                    let mut session = ctx.connection().property_mut();
                    session.seen += 1;
                    session.seen
                };
                let _ = ctx.reply(1, seen.to_be_bytes().to_vec());
            })],
        );
    });

    let mut first = server.connect();
    for expected in 1..=3u32 {
        write_frame(&mut first, 1, b"");
        assert_eq!(read_frame(&mut first).data().as_ref(), &expected.to_be_bytes());
    }

    let mut second = server.connect();
    write_frame(&mut second, 1, b"");
    assert_eq!(read_frame(&mut second).data().as_ref(), &1u32.to_be_bytes());
}
