// src/server/mod.rs

use crate::config::Config;
use crate::core::pipeline::{Context, task};
use anyhow::{Context as _, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};

mod conn_mgr;
mod dispatcher;
mod engine;
mod gateway;
mod hooks;
mod keepalive;
mod metrics_server;
mod poller;
mod wait_group;

pub use conn_mgr::{ConnMgr, ConnRegistry};
pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use gateway::{Gateway, upgrade};
pub use hooks::{ConnHook, Hooks};
pub use keepalive::{KeepAliveMgr, sweep};
pub use metrics_server::run_metrics_server;
pub use poller::{Events, Poller, Readiness};
pub use wait_group::{WaitGroup, WaitGuard};

/// Runs the stock echo server until SIGINT or SIGTERM: every message is sent
/// back unchanged, and lifecycle events are logged.
pub async fn run(config: Config) -> Result<()> {
    let engine: Arc<Engine> = Arc::new(
        Engine::new(config.engine.clone(), Handle::current())
            .context("Failed to create the engine")?,
    );

    engine.fallback(&[task(|ctx: &mut Context| {
        if let Err(e) = ctx.reply(ctx.msg_id(), ctx.payload().clone()) {
            warn!("Echo to connection {} failed: {}", ctx.connection().id(), e);
        }
    })]);
    engine.on_conn_start(|conn| {
        info!("Connection {} started ({:?}).", conn.id(), conn.remote_addr());
    });
    engine.on_conn_stop(|conn| {
        info!("Connection {} stopped.", conn.id());
    });
    engine.on_conn_not_active(|conn| {
        info!("Connection {} went quiet; closing it.", conn.id());
        // The hang-up that follows makes the reactor deregister it.
        conn.stop();
    });

    engine.start().context("Failed to start the engine")?;
    let gateway = Gateway::from_config(&config, Arc::clone(&engine))
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    let mut gateway_task = tokio::spawn(gateway.run());

    if config.metrics.enabled {
        tokio::spawn(run_metrics_server(
            Arc::clone(&engine),
            config.metrics.port,
            engine.subscribe_shutdown(),
        ));
    }

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    tokio::select! {
        _ = sigint.recv() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
        res = &mut gateway_task => warn!("Gateway exited unexpectedly: {:?}", res),
    }

    let stopping = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || stopping.stop())
        .await
        .context("Engine shutdown panicked")?;
    if !gateway_task.is_finished() {
        let _ = gateway_task.await;
    }

    info!("Server shutdown complete.");
    Ok(())
}
