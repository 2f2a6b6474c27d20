// tests/integration/metrics_test.rs

use super::test_helpers::{TestServer, fast_config};
use netmux::server::run_metrics_server;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn scrape(port: u16) -> Option<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).ok()?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .ok()?;
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .ok()?;
    let mut response = String::new();
    stream.read_to_string(&mut response).ok()?;
    Some(response)
}

#[test]
fn test_metrics_endpoint_reports_connections() {
    let server: TestServer = TestServer::start(fast_config(), |_| {});
    let port = free_port();
    server.runtime().spawn(run_metrics_server(
        Arc::clone(&server.engine),
        port,
        server.engine.subscribe_shutdown(),
    ));

    let _client = server.connect();
    assert!(server.wait_for_conns(1));

    let mut response = None;
    for _ in 0..50 {
        response = scrape(port);
        if response.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    let response = response.expect("metrics server answered");
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("netmux_connected_clients"));
    assert!(response.contains("netmux_connections_accepted_total"));
}
