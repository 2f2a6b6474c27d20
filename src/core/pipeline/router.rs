// src/core/pipeline/router.rs

use super::{FlowInstance, SharedFlow, TaskFlow, TaskFunc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps message ids to their task flows.
///
/// Registration normally happens before the engine starts, but the maps are
/// lock-protected so flows can also be added while requests are flowing.
pub struct Router<P = ()> {
    flows: RwLock<HashMap<u32, Arc<dyn TaskFlow<P>>>>,
    fallback: RwLock<Option<Arc<dyn TaskFlow<P>>>>,
}

impl<P: 'static> Default for Router<P> {
    fn default() -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
            fallback: RwLock::new(None),
        }
    }
}

impl<P: 'static> Router<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `tasks` to the flow of `msg_id`, creating the flow if needed.
    /// The previous flow object is replaced, never mutated.
    pub fn regist(&self, msg_id: u32, tasks: &[TaskFunc<P>]) {
        let mut flows = self.flows.write();
        let flow = match flows.get(&msg_id) {
            Some(existing) => existing.append(tasks),
            None => Arc::new(SharedFlow::new(tasks.to_vec())),
        };
        flows.insert(msg_id, flow);
    }

    /// Installs `flow` for `msg_id`, replacing whatever was registered.
    pub fn regist_flow(&self, msg_id: u32, flow: Arc<dyn TaskFlow<P>>) {
        self.flows.write().insert(msg_id, flow);
    }

    /// Sets the flow used for ids that have no flow of their own.
    pub fn set_fallback(&self, flow: Option<Arc<dyn TaskFlow<P>>>) {
        *self.fallback.write() = flow;
    }

    /// The flow for `msg_id`, forked for a single execution. `None` means the
    /// id is unknown and no fallback is installed.
    pub fn task_flow(&self, msg_id: u32) -> Option<FlowInstance<P>> {
        let flow = self
            .flows
            .read()
            .get(&msg_id)
            .cloned()
            .or_else(|| self.fallback.read().clone())?;
        Some(flow.fork())
    }

    pub fn contains(&self, msg_id: u32) -> bool {
        self.flows.read().contains_key(&msg_id)
    }

    /// Number of handlers registered for `msg_id`, or 0 if none.
    pub fn flow_len(&self, msg_id: u32) -> usize {
        self.flows.read().get(&msg_id).map_or(0, |f| f.len())
    }

    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }
}
