// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use netmux::Engine;
use netmux::config::{EngineConfig, NetworkMode};
use netmux::core::Message;
use netmux::core::protocol::{pack_tcp, unpack_tcp};
use netmux::server::Gateway;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Sets up minimal tracing for tests. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_test_writer()
        .try_init();
}

/// An engine configuration with short deadlines so tests stay fast.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        read_timeout_ms: 20,
        epoll_timeout_ms: 20,
        dispatcher_queues: 2,
        task_queues: 2,
        signal_queues: 2,
        shard_count: 4,
        health_check_interval_ms: 60_000,
        ..EngineConfig::default()
    }
}

/// A running engine with a gateway on an ephemeral localhost port.
/// Dropping it stops the engine.
pub struct TestServer<P: Default + Send + Sync + 'static = ()> {
    pub engine: Arc<Engine<P>>,
    pub addr: SocketAddr,
    runtime: Runtime,
}

impl<P: Default + Send + Sync + 'static> TestServer<P> {
    /// Starts a TCP server. `setup` registers routes and hooks before start.
    pub fn start(config: EngineConfig, setup: impl FnOnce(&Engine<P>)) -> Self {
        Self::start_with(config, NetworkMode::Tcp, 0, setup)
    }

    pub fn start_with(
        config: EngineConfig,
        mode: NetworkMode,
        max_conns: usize,
        setup: impl FnOnce(&Engine<P>),
    ) -> Self {
        init_tracing();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let engine = Arc::new(Engine::new(config, runtime.handle().clone()).unwrap());
        setup(&engine);
        engine.start().unwrap();

        let gateway = runtime
            .block_on(Gateway::bind(
                "127.0.0.1:0",
                Arc::clone(&engine),
                mode,
                max_conns,
                Duration::from_secs(2),
            ))
            .unwrap();
        let addr = gateway.local_addr().unwrap();
        runtime.spawn(gateway.run());

        Self {
            engine,
            addr,
            runtime,
        }
    }

    /// Opens a client socket with a generous read deadline.
    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    /// Waits until the engine has exactly `n` registered connections.
    pub fn wait_for_conns(&self, n: usize) -> bool {
        wait_until(Duration::from_secs(5), || self.engine.conn_count() == n)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

impl<P: Default + Send + Sync + 'static> Drop for TestServer<P> {
    fn drop(&mut self) {
        self.engine.stop();
    }
}

/// Polls `cond` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn write_frame(stream: &mut TcpStream, id: u32, payload: &[u8]) {
    let frame = pack_tcp(&Message::new(id, Bytes::copy_from_slice(payload))).unwrap();
    stream.write_all(&frame).unwrap();
}

pub fn read_frame(stream: &mut TcpStream) -> Message {
    unpack_tcp(stream).unwrap()
}

/// A connected localhost pair that bypasses the gateway: (server side, client side).
pub fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (server, client)
}
