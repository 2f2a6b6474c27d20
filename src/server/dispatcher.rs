// src/server/dispatcher.rs

//! Hands ready connections to a pool of read workers.

use super::conn_mgr::ConnMgr;
use super::wait_group::WaitGuard;
use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::core::worker_pool::WorkerPool;
use crate::core::{NetError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// A ready connection plus the reactor's batch guard. The guard is released
/// only after the read cycle (and any resulting deregistration) is done.
pub struct Dispatch<P = ()> {
    conn: Arc<Connection<P>>,
    _guard: WaitGuard,
}

pub struct Dispatcher<P = ()> {
    pool: WorkerPool<Dispatch<P>>,
}

impl<P: Send + Sync + 'static> Dispatcher<P> {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            pool: WorkerPool::new(
                "dispatch",
                config.dispatcher_queues,
                config.dispatcher_queue_len,
                config.workers_per_dispatcher_queue,
            ),
        }
    }

    /// Queues `conn` for reading. Blocks while its ready queue is full.
    pub fn commit(&self, conn: Arc<Connection<P>>, guard: WaitGuard) -> Result<()> {
        let id = conn.id();
        self.pool.submit(
            id,
            Dispatch {
                conn,
                _guard: guard,
            },
        )
    }

    pub fn queue_index(&self, conn_id: u64) -> usize {
        self.pool.queue_index(conn_id)
    }

    pub fn start(&self, conn_mgr: Arc<ConnMgr<P>>) -> Result<()> {
        self.pool.start(move |dispatch| Self::read(&conn_mgr, dispatch))
    }

    fn read(conn_mgr: &ConnMgr<P>, dispatch: Dispatch<P>) {
        let conn = &dispatch.conn;
        let Err(e) = conn.batch_commit() else {
            return;
        };

        match e {
            NetError::PeerClosed(_) | NetError::Closed(_) => {
                debug!("Connection {} finished: {}", conn.id(), e)
            }
            _ => warn!("Read from connection {} failed: {}", conn.id(), e),
        }
        if let Err(e) = conn_mgr.del(conn.id()) {
            debug!("Deregistering connection {} returned: {}", conn.id(), e);
        }
    }

    /// Closes the ready queues and waits for the read workers to exit.
    pub fn stop(&self) {
        self.pool.close();
        self.pool.join();
    }
}
