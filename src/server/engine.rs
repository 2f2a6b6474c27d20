// src/server/engine.rs

//! The engine ties the connection manager, the task pipeline, and the
//! keepalive sweepers together and exposes the registration and lifecycle API.

use super::conn_mgr::ConnMgr;
use super::hooks::ConnHook;
use super::keepalive::KeepAliveMgr;
use crate::config::EngineConfig;
use crate::connection::{ConnOptions, Connection, SignalKind, Transport, WsStream};
use crate::core::pipeline::{Router, RouterGroup, Task, TaskFlow, TaskFunc, TaskMgr};
use crate::core::{NetError, Result};
use parking_lot::Mutex;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;
use tungstenite::WebSocket;

/// A running (or ready to run) server core.
///
/// `P` is the per-connection property type; every admitted connection starts
/// with `P::default()`.
///
/// The reactor, read workers, task workers, and signal workers are OS
/// threads. The keepalive sweepers run on the tokio runtime given to
/// [`Engine::new`]. [`Engine::admit`] and [`Engine::stop`] block, so async
/// callers should go through `spawn_blocking`.
pub struct Engine<P = ()> {
    config: EngineConfig,
    runtime: Handle,
    conn_mgr: Arc<ConnMgr<P>>,
    task_mgr: Arc<TaskMgr<P>>,
    keepalive: KeepAliveMgr<P>,
    shutdown_tx: broadcast::Sender<()>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl<P: Default + Send + Sync + 'static> Engine<P> {
    pub fn new(config: EngineConfig, runtime: Handle) -> Result<Self> {
        config.validate()?;
        let conn_mgr = Arc::new(ConnMgr::new(&config)?);
        let keepalive = KeepAliveMgr::new(Arc::clone(&conn_mgr), config.health_check_interval());
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            task_mgr: Arc::new(TaskMgr::new(&config)),
            conn_mgr,
            keepalive,
            shutdown_tx,
            background_tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            runtime,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn conn_mgr(&self) -> &Arc<ConnMgr<P>> {
        &self.conn_mgr
    }

    pub fn task_mgr(&self) -> &Arc<TaskMgr<P>> {
        &self.task_mgr
    }

    pub fn router(&self) -> &Arc<Router<P>> {
        self.task_mgr.router()
    }

    // --- Registration ---

    pub fn regist(&self, msg_id: u32, tasks: &[TaskFunc<P>]) {
        self.task_mgr.regist(msg_id, tasks);
    }

    pub fn regist_flow(&self, msg_id: u32, flow: Arc<dyn TaskFlow<P>>) {
        self.task_mgr.regist_flow(msg_id, flow);
    }

    pub fn regist_stateful(&self, msg_id: u32, tasks: Vec<Task<P>>) {
        self.task_mgr.regist_stateful(msg_id, tasks);
    }

    pub fn group(&self, tasks: &[TaskFunc<P>]) -> RouterGroup<P> {
        self.task_mgr.group(tasks)
    }

    pub fn middleware(&self, tasks: &[TaskFunc<P>]) {
        self.task_mgr.middleware(tasks);
    }

    pub fn fallback(&self, tasks: &[TaskFunc<P>]) {
        self.task_mgr.fallback(tasks);
    }

    pub fn on_conn_start<F>(&self, f: F)
    where
        F: Fn(&Arc<Connection<P>>) + Send + Sync + 'static,
    {
        self.set_hook(SignalKind::Start, Arc::new(f));
    }

    pub fn on_conn_stop<F>(&self, f: F)
    where
        F: Fn(&Arc<Connection<P>>) + Send + Sync + 'static,
    {
        self.set_hook(SignalKind::Stop, Arc::new(f));
    }

    pub fn on_conn_not_active<F>(&self, f: F)
    where
        F: Fn(&Arc<Connection<P>>) + Send + Sync + 'static,
    {
        self.set_hook(SignalKind::NotActive, Arc::new(f));
    }

    fn set_hook(&self, kind: SignalKind, hook: ConnHook<P>) {
        self.conn_mgr.hooks().set(kind, Some(hook));
    }

    // --- Lifecycle ---

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts the task workers, the connection manager, and the keepalive
    /// sweepers. Calling it on a running engine does nothing.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.task_mgr.start()?;
        self.conn_mgr.start()?;
        let tasks = self.keepalive.start(&self.runtime, &self.shutdown_tx);
        self.background_tasks.lock().extend(tasks);
        info!("Engine started.");
        Ok(())
    }

    /// Stops everything: keepalive sweepers, reactor, read workers, every
    /// connection (each gets its Stop signal), and the epoll instance. Task
    /// workers exit once the last connection is released.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        info!("Engine stopping.");
        // No receivers simply means nothing is listening any more.
        let _ = self.shutdown_tx.send(());
        for task in self.background_tasks.lock().drain(..) {
            task.abort();
        }
        self.conn_mgr.stop();
        self.task_mgr.stop();
        info!("Engine stopped.");
    }

    /// A receiver that fires when the engine stops. Gateways select on it.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    // --- Connections ---

    /// Wraps `transport` in a connection and registers it.
    pub fn admit(&self, transport: Transport) -> Result<Arc<Connection<P>>> {
        self.admit_with(transport, P::default())
    }

    /// Like [`Engine::admit`], with an explicit initial property.
    pub fn admit_with(&self, transport: Transport, property: P) -> Result<Arc<Connection<P>>> {
        if !self.is_running() {
            return Err(NetError::EngineStopped);
        }
        let id = transport.raw_fd() as u64;
        let task_queue = self.task_mgr.sender(id)?;
        let conn = Arc::new(Connection::new(
            transport,
            ConnOptions::from(&self.config),
            task_queue,
            property,
        )?);
        self.conn_mgr.add(Arc::clone(&conn))?;
        Ok(conn)
    }

    pub fn admit_tcp(&self, stream: TcpStream) -> Result<Arc<Connection<P>>> {
        self.admit(Transport::tcp(stream))
    }

    pub fn admit_websocket(&self, ws: WebSocket<WsStream>) -> Result<Arc<Connection<P>>> {
        self.admit(Transport::websocket(ws))
    }

    pub fn get_conn(&self, id: u64) -> Option<Arc<Connection<P>>> {
        self.conn_mgr.get(id)
    }

    /// Deregisters and closes a connection. Blocks while the signal queue is full.
    pub fn del_conn(&self, id: u64) -> Result<()> {
        self.conn_mgr.del(id)
    }

    pub fn conn_count(&self) -> usize {
        self.conn_mgr.count()
    }
}
