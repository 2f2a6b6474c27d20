// tests/integration/ordering_test.rs

use super::test_helpers::{TestServer, fast_config, read_frame, write_frame};
use netmux::{Context, task};
use std::io::Write;
use std::thread;

fn sequence_server() -> TestServer {
    TestServer::start(fast_config(), |engine| {
        engine.fallback(&[task(|ctx: &mut Context| {
            let _ = ctx.reply(ctx.msg_id(), ctx.payload().clone());
        })]);
    })
}

#[test]
fn test_replies_follow_request_order() {
    let server = sequence_server();
    let mut client = server.connect();

    // Written as one burst so several frames share each read.
    let mut burst = Vec::new();
    for seq in 0..200u32 {
        burst.extend_from_slice(&netmux::core::protocol::pack_tcp(&netmux::Message::new(
            seq,
            seq.to_be_bytes().to_vec(),
        ))
        .unwrap());
    }
    client.write_all(&burst).unwrap();

    for seq in 0..200u32 {
        let msg = read_frame(&mut client);
        assert_eq!(msg.id(), seq);
        assert_eq!(msg.data().as_ref(), &seq.to_be_bytes());
    }
}

#[test]
fn test_order_holds_per_connection_under_concurrency() {
    let server = sequence_server();
    let addr = server.addr;

    let clients: Vec<_> = (0..4u32)
        .map(|c| {
            let mut client = server.connect();
            thread::spawn(move || {
                for seq in 0..100u32 {
                    write_frame(&mut client, c * 1000 + seq, b"");
                }
                for seq in 0..100u32 {
                    assert_eq!(read_frame(&mut client).id(), c * 1000 + seq, "client {c} via {addr}");
                }
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }
}

#[test]
fn test_middleware_runs_before_every_handler() {
    let server: TestServer = TestServer::start(fast_config(), |engine| {
        engine.middleware(&[task(|ctx: &mut Context| {
            if ctx.payload().is_empty() {
                let _ = ctx.reply(0, b"rejected".to_vec());
                ctx.abort();
            }
            ctx.next();
        })]);
        engine.regist(
            5,
            &[task(|ctx: &mut Context| {
                let _ = ctx.reply(5, ctx.payload().clone());
            })],
        );
    });
    let mut client = server.connect();

    write_frame(&mut client, 5, b"");
    let rejected = read_frame(&mut client);
    assert_eq!(rejected.id(), 0);
    assert_eq!(rejected.data().as_ref(), b"rejected");

    write_frame(&mut client, 5, b"fine");
    let accepted = read_frame(&mut client);
    assert_eq!(accepted.id(), 5);
    assert_eq!(accepted.data().as_ref(), b"fine");
}
