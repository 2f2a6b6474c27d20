// src/server/keepalive.rs

//! Per-shard liveness sweeps.
//!
//! Every shard gets its own ticking task. A tick moves `Active` connections
//! to `Inspect` and `Inspect` connections to `NotActive`, raising a
//! NotActive signal for the latter. Any inbound traffic in between moves the
//! connection back to `Active`, so a peer is only reported after staying
//! silent for two full intervals.

use super::conn_mgr::ConnMgr;
use crate::connection::{Aging, Connection, SignalKind};
use crate::core::metrics;
use crate::core::registry::Shard;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

pub struct KeepAliveMgr<P = ()> {
    conn_mgr: Arc<ConnMgr<P>>,
    interval: Duration,
}

impl<P: Send + Sync + 'static> KeepAliveMgr<P> {
    pub fn new(conn_mgr: Arc<ConnMgr<P>>, interval: Duration) -> Self {
        Self { conn_mgr, interval }
    }

    /// Spawns one sweeper per registry shard on `runtime`. Each stops when
    /// `shutdown_tx` fires.
    pub fn start(
        &self,
        runtime: &Handle,
        shutdown_tx: &broadcast::Sender<()>,
    ) -> Vec<JoinHandle<()>> {
        let shards = self.conn_mgr.registry().shards();
        info!(
            "Keepalive started: {} sweepers, interval {:?}.",
            shards.len(),
            self.interval
        );
        shards
            .iter()
            .enumerate()
            .map(|(index, shard)| {
                runtime.spawn(Self::run(
                    Arc::clone(&self.conn_mgr),
                    Arc::clone(shard),
                    index,
                    self.interval,
                    shutdown_tx.subscribe(),
                ))
            })
            .collect()
    }

    async fn run(
        conn_mgr: Arc<ConnMgr<P>>,
        shard: Arc<Shard<Arc<Connection<P>>>>,
        index: usize,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        // The first tick comes one full period after start, never at once.
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for conn in sweep(&shard) {
                        debug!("Connection {} is not active.", conn.id());
                        if let Err(e) = conn_mgr.push_signal_async(conn, SignalKind::NotActive).await {
                            debug!("NotActive signal dropped: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
        debug!("Keepalive sweeper for shard {} stopped.", index);
    }
}

/// Applies one tick to every connection in `shard` and returns the ones that
/// were just demoted to `NotActive`. The shard's read lock is held only for
/// the scan; signals are raised by the caller afterwards.
pub fn sweep<P>(shard: &Shard<Arc<Connection<P>>>) -> Vec<Arc<Connection<P>>> {
    let mut demoted = Vec::new();
    shard.for_each(|_, conn| {
        if conn.age() == Aging::Demoted {
            demoted.push(Arc::clone(conn));
        }
    });
    metrics::CONNECTIONS_DEMOTED_TOTAL.inc_by(demoted.len() as f64);
    demoted
}
