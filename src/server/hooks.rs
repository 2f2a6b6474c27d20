// src/server/hooks.rs

//! User callbacks for connection lifecycle signals.

use crate::connection::{ConnSignal, Connection, SignalKind};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// A lifecycle callback. It runs on a signal worker thread.
pub type ConnHook<P = ()> = Arc<dyn Fn(&Arc<Connection<P>>) + Send + Sync>;

pub struct Hooks<P = ()> {
    on_start: RwLock<Option<ConnHook<P>>>,
    on_stop: RwLock<Option<ConnHook<P>>>,
    on_not_active: RwLock<Option<ConnHook<P>>>,
}

impl<P> Default for Hooks<P> {
    fn default() -> Self {
        Self {
            on_start: RwLock::new(None),
            on_stop: RwLock::new(None),
            on_not_active: RwLock::new(None),
        }
    }
}

impl<P> Hooks<P> {
    fn slot(&self, kind: SignalKind) -> &RwLock<Option<ConnHook<P>>> {
        match kind {
            SignalKind::Start => &self.on_start,
            SignalKind::Stop => &self.on_stop,
            SignalKind::NotActive => &self.on_not_active,
        }
    }

    /// Installs (or with `None`, removes) the callback for `kind`.
    pub fn set(&self, kind: SignalKind, hook: Option<ConnHook<P>>) {
        *self.slot(kind).write() = hook;
    }

    pub fn is_set(&self, kind: SignalKind) -> bool {
        self.slot(kind).read().is_some()
    }

    /// Runs the callback matching the signal. The hook is cloned out first so
    /// it can re-register hooks without deadlocking.
    pub fn dispatch(&self, signal: ConnSignal<P>) {
        let hook = self.slot(signal.kind).read().clone();
        match hook {
            Some(hook) => hook(&signal.conn),
            None => debug!(
                "No {} hook registered; connection {}.",
                signal.kind,
                signal.conn.id()
            ),
        }
    }
}
