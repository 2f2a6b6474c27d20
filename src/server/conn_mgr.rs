// src/server/conn_mgr.rs

//! The connection manager: owns the epoll instance, the connection
//! registry, the lifecycle signal queues, and the reactor thread.

use super::dispatcher::Dispatcher;
use super::hooks::Hooks;
use super::poller::{Events, Poller};
use super::wait_group::WaitGroup;
use crate::config::EngineConfig;
use crate::connection::{ConnSignal, Connection, SignalKind};
use crate::core::registry::ShardedRegistry;
use crate::core::worker_pool::WorkerPool;
use crate::core::{NetError, Result, metrics};
use parking_lot::{Mutex, RwLock};
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub type ConnRegistry<P> = ShardedRegistry<Arc<Connection<P>>>;

pub struct ConnMgr<P = ()> {
    config: EngineConfig,
    poller: Poller,
    registry: ConnRegistry<P>,
    signals: WorkerPool<ConnSignal<P>>,
    hooks: Arc<Hooks<P>>,
    dispatcher: Dispatcher<P>,
    running: AtomicBool,
    /// Held shared by `add` and exclusively while `stop` flips `running`,
    /// so no registration can land after shutdown has snapshotted the registry.
    admission: RwLock<()>,
    reactor: Mutex<Option<JoinHandle<()>>>,
}

impl<P: Send + Sync + 'static> ConnMgr<P> {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            poller: Poller::new()?,
            registry: ShardedRegistry::new(config.shard_count),
            signals: WorkerPool::new(
                "signal",
                config.signal_queues,
                config.signal_queue_len,
                config.workers_per_signal_queue,
            ),
            hooks: Arc::new(Hooks::default()),
            dispatcher: Dispatcher::new(config),
            running: AtomicBool::new(false),
            admission: RwLock::new(()),
            reactor: Mutex::new(None),
        })
    }

    pub fn hooks(&self) -> &Hooks<P> {
        &self.hooks
    }

    pub fn registry(&self) -> &ConnRegistry<P> {
        &self.registry
    }

    pub fn get(&self, id: u64) -> Option<Arc<Connection<P>>> {
        self.registry.get(id)
    }

    pub fn count(&self) -> usize {
        self.registry.count()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registers a connection and starts watching it for input.
    ///
    /// Start is queued before the socket is armed, so no Stop for the same
    /// id can be queued ahead of it. If arming fails the registration is
    /// rolled back and the connection is stopped. Once `stop` has begun,
    /// registration fails with `EngineStopped`.
    pub fn add(&self, conn: Arc<Connection<P>>) -> Result<()> {
        let _admission = self.admission.read();
        if !self.is_running() {
            return Err(NetError::EngineStopped);
        }

        let id = conn.id();
        if !self.registry.insert_new(id, Arc::clone(&conn)) {
            return Err(NetError::AlreadyRegistered(id));
        }
        metrics::CONNECTED_CLIENTS.inc();

        if let Err(e) = self.push_signal(Arc::clone(&conn), SignalKind::Start) {
            self.rollback(&conn);
            return Err(e);
        }

        if let Err(e) = self.poller.add(id as RawFd, id) {
            error!("Failed to watch connection {}: {}", id, e);
            self.rollback(&conn);
            if let Err(e) = self.push_signal(Arc::clone(&conn), SignalKind::Stop) {
                debug!("Stop signal for connection {} not queued: {}", id, e);
            }
            return Err(e.into());
        }

        metrics::CONNECTIONS_ACCEPTED_TOTAL.inc();
        debug!(
            "Connection {} registered ({} from {:?}).",
            id,
            conn.transport(),
            conn.remote_addr()
        );
        Ok(())
    }

    fn rollback(&self, conn: &Arc<Connection<P>>) {
        if self.registry.remove(conn.id()).is_some() {
            metrics::CONNECTED_CLIENTS.dec();
        }
        conn.stop();
    }

    /// Deregisters a connection and closes it.
    ///
    /// Safe to call more than once and from several threads: only the call
    /// that removes the registry entry queues the Stop signal.
    pub fn del(&self, id: u64) -> Result<()> {
        let conn = self.registry.get(id);
        if conn.is_none() {
            warn!("Deregistering unknown connection {}.", id);
        }

        let unwatched = self.poller.delete(id as RawFd);

        if let Some(conn) = conn {
            if let Some(removed) = self.registry.remove(id) {
                metrics::CONNECTED_CLIENTS.dec();
                if let Err(e) = self.push_signal(removed, SignalKind::Stop) {
                    debug!("Stop signal for connection {} not queued: {}", id, e);
                }
            }
            conn.stop();
        }

        unwatched.map_err(NetError::from)
    }

    /// Queues a lifecycle signal on the queue owned by the connection's id.
    /// Blocks while that queue is full.
    pub fn push_signal(&self, conn: Arc<Connection<P>>, kind: SignalKind) -> Result<()> {
        let id = conn.id();
        self.signals.submit(id, ConnSignal::new(conn, kind))
    }

    /// Async counterpart of [`ConnMgr::push_signal`].
    pub async fn push_signal_async(&self, conn: Arc<Connection<P>>, kind: SignalKind) -> Result<()> {
        let id = conn.id();
        self.signals
            .submit_async(id, ConnSignal::new(conn, kind))
            .await
    }

    pub fn signal_queue_index(&self, conn_id: u64) -> usize {
        self.signals.queue_index(conn_id)
    }

    /// Starts the signal workers, the read workers, and the reactor thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let hooks = Arc::clone(&self.hooks);
        self.signals.start(move |signal| hooks.dispatch(signal))?;
        self.dispatcher.start(Arc::clone(self))?;

        let mgr = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("reactor".into())
            .spawn(move || mgr.reactor_loop())?;
        *self.reactor.lock() = Some(handle);
        info!(
            "Reactor started with {} shards, {} ready queues, {} signal queues.",
            self.registry.shard_count(),
            self.config.dispatcher_queues,
            self.config.signal_queues
        );
        Ok(())
    }

    fn reactor_loop(&self) {
        let mut events = Events::with_capacity(self.config.epoll_event_size);
        let batch = WaitGroup::new();
        let timeout = i32::try_from(self.config.epoll_timeout_ms).unwrap_or(i32::MAX);
        let idle = self.config.reactor_idle_sleep();

        while self.is_running() {
            let n = match self.poller.wait(&mut events, timeout) {
                Ok(n) => n,
                Err(e) => {
                    if !self.is_running() {
                        break;
                    }
                    error!("epoll wait failed: {}", e);
                    thread::sleep(idle);
                    continue;
                }
            };

            if n == 0 {
                thread::sleep(idle);
                continue;
            }

            for ready in events.iter() {
                let id = ready.token;
                if ready.is_hangup() {
                    if let Err(e) = self.del(id) {
                        debug!("Deregistering hung-up connection {} returned: {}", id, e);
                    }
                    continue;
                }

                match self.registry.get(id) {
                    Some(conn) => {
                        if let Err(e) = self.dispatcher.commit(conn, batch.add()) {
                            warn!("Could not dispatch connection {}: {}", id, e);
                        }
                    }
                    None => debug!("Readiness for unknown connection {}.", id),
                }
            }

            batch.wait();
        }
        info!("Reactor stopped.");
    }

    /// Stops the reactor and the read workers, deregisters (and closes) every
    /// connection, drains the signal queues, and closes the epoll instance.
    ///
    /// Blocks until the threads have exited; must not be called from a hook
    /// or a read worker.
    pub fn stop(&self) {
        {
            let _admission = self.admission.write();
            if !self.running.swap(false, Ordering::AcqRel) {
                return;
            }
        }

        if let Some(handle) = self.reactor.lock().take()
            && handle.join().is_err()
        {
            error!("The reactor thread panicked.");
        }
        self.dispatcher.stop();

        let ids = self.registry.ids();
        info!("Closing {} connections.", ids.len());
        for id in ids {
            if let Err(e) = self.del(id) {
                debug!("Deregistering connection {} on shutdown returned: {}", id, e);
            }
        }

        self.signals.close();
        self.signals.join();
        self.poller.close();
    }
}
