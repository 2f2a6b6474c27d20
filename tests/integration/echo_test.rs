// tests/integration/echo_test.rs

use super::test_helpers::{TestServer, fast_config, read_frame, write_frame};
use netmux::{Context, task};
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::Duration;

fn echo_server() -> TestServer {
    TestServer::start(fast_config(), |engine| {
        engine.fallback(&[task(|ctx: &mut Context| {
            let _ = ctx.reply(ctx.msg_id(), ctx.payload().clone());
        })]);
    })
}

#[test]
fn test_echo_round_trip_is_byte_exact() {
    let server = echo_server();
    let mut client = server.connect();

    client
        .write_all(&[0, 0, 0, 5, 0, 0, 0, 1, b'h', b'e', b'l', b'l', b'o'])
        .unwrap();

    let mut reply = [0u8; 13];
    client.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, &[0, 0, 0, 5, 0, 0, 0, 1, b'h', b'e', b'l', b'l', b'o']);
}

#[test]
fn test_empty_payload_is_echoed() {
    let server = echo_server();
    let mut client = server.connect();
    write_frame(&mut client, 77, b"");
    let msg = read_frame(&mut client);
    assert_eq!(msg.id(), 77);
    assert!(msg.is_empty());
}

#[test]
fn test_registered_route_wins_over_fallback() {
    let server: TestServer = TestServer::start(fast_config(), |engine| {
        engine.regist(
            2,
            &[task(|ctx: &mut Context| {
                let _ = ctx.reply(200, b"routed".to_vec());
            })],
        );
        engine.fallback(&[task(|ctx: &mut Context| {
            let _ = ctx.reply(ctx.msg_id(), ctx.payload().clone());
        })]);
    });
    let mut client = server.connect();

    write_frame(&mut client, 2, b"ignored");
    let routed = read_frame(&mut client);
    assert_eq!(routed.id(), 200);
    assert_eq!(routed.data().as_ref(), b"routed");

    write_frame(&mut client, 3, b"echo");
    let echoed = read_frame(&mut client);
    assert_eq!(echoed.id(), 3);
    assert_eq!(echoed.data().as_ref(), b"echo");
}

#[test]
fn test_unrouted_message_gets_no_reply() {
    let server: TestServer = TestServer::start(fast_config(), |engine| {
        engine.regist(
            1,
            &[task(|ctx: &mut Context| {
                let _ = ctx.reply(1, b"ok".to_vec());
            })],
        );
    });
    let mut client = server.connect();
    client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();

    write_frame(&mut client, 9, b"nobody home");
    let mut buf = [0u8; 1];
    let err = client.read(&mut buf).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut));

    // The connection is still usable.
    client
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write_frame(&mut client, 1, b"");
    assert_eq!(read_frame(&mut client).data().as_ref(), b"ok");
}

#[test]
fn test_frame_split_across_pauses() {
    let server = echo_server();
    let mut client = server.connect();
    client.set_nodelay(true).unwrap();

    let frame = [0u8, 0, 0, 3, 0, 0, 0, 4, b'a', b'b', b'c'];
    client.write_all(&frame[..3]).unwrap();
    thread::sleep(Duration::from_millis(60));
    client.write_all(&frame[3..9]).unwrap();
    thread::sleep(Duration::from_millis(60));
    client.write_all(&frame[9..]).unwrap();

    let msg = read_frame(&mut client);
    assert_eq!(msg.id(), 4);
    assert_eq!(msg.data().as_ref(), b"abc");
}

#[test]
fn test_oversized_frame_closes_the_connection() {
    let config = netmux::config::EngineConfig {
        max_packet_size: 16,
        ..fast_config()
    };
    let server = TestServer::<()>::start(config, |_| {});
    let mut client = server.connect();
    assert!(server.wait_for_conns(1));

    write_frame(&mut client, 1, &[0u8; 64]);
    let mut buf = [0u8; 8];
    // Either a clean EOF or a reset, never a reply.
    match client.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert!(!matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)),
    }
    assert!(server.wait_for_conns(0));
}
