// src/core/pipeline/router_group.rs

use super::{Router, SharedFlow, StatefulFlow, Task, TaskFlow, TaskFunc};
use std::sync::Arc;

/// A view over a [`Router`] with a base chain that is prepended to every
/// flow registered through it. Groups nest: a child starts from its
/// parent's base and never changes the parent.
pub struct RouterGroup<P = ()> {
    router: Arc<Router<P>>,
    base: Vec<TaskFunc<P>>,
}

impl<P> Clone for RouterGroup<P> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            base: self.base.clone(),
        }
    }
}

impl<P: 'static> RouterGroup<P> {
    pub fn new(router: Arc<Router<P>>) -> Self {
        Self {
            router,
            base: Vec::new(),
        }
    }

    pub fn router(&self) -> &Arc<Router<P>> {
        &self.router
    }

    /// The chain this group prepends.
    pub fn base(&self) -> &[TaskFunc<P>] {
        &self.base
    }

    /// Derives a child group whose base is this group's base plus `tasks`.
    pub fn group(&self, tasks: &[TaskFunc<P>]) -> RouterGroup<P> {
        RouterGroup {
            router: Arc::clone(&self.router),
            base: self.chain(tasks),
        }
    }

    /// Extends this group's base. Only flows registered afterwards see it.
    pub fn middleware(&mut self, tasks: &[TaskFunc<P>]) -> &mut Self {
        self.base.extend(tasks.iter().cloned());
        self
    }

    /// Registers `tasks` for `msg_id` behind this group's base chain.
    pub fn regist(&self, msg_id: u32, tasks: &[TaskFunc<P>]) {
        self.router.regist(msg_id, &self.chain(tasks));
    }

    /// Installs a prebuilt flow as is; the base chain is not applied.
    pub fn regist_flow(&self, msg_id: u32, flow: Arc<dyn TaskFlow<P>>) {
        self.router.regist_flow(msg_id, flow);
    }

    /// Registers a flow with stateful steps behind this group's base chain.
    /// Every request gets its own fork of the stateful steps.
    pub fn regist_stateful(&self, msg_id: u32, tasks: Vec<Task<P>>) {
        let mut template: Vec<Task<P>> = self.base.iter().cloned().map(Task::Shared).collect();
        template.extend(tasks);
        self.router.regist_flow(msg_id, Arc::new(StatefulFlow::new(template)));
    }

    /// Installs the flow that handles ids with no registration, behind this
    /// group's base chain.
    pub fn fallback(&self, tasks: &[TaskFunc<P>]) {
        let flow = Arc::new(SharedFlow::new(self.chain(tasks)));
        self.router.set_fallback(Some(flow));
    }

    fn chain(&self, tasks: &[TaskFunc<P>]) -> Vec<TaskFunc<P>> {
        let mut combined = Vec::with_capacity(self.base.len() + tasks.len());
        combined.extend(self.base.iter().cloned());
        combined.extend(tasks.iter().cloned());
        combined
    }
}
