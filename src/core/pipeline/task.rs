// src/core/pipeline/task.rs

//! Handler steps and the flows that chain them.
//!
//! A `SharedFlow` is an immutable list of stateless handlers that every
//! request shares. A `StatefulFlow` is a template whose stateful steps are
//! forked into a private copy for each request, so per-request handler state
//! never leaks between requests.

use super::Context;
use std::sync::Arc;

/// A stateless handler step. Cloning is a reference-count bump.
pub type TaskFunc<P = ()> = Arc<dyn Fn(&mut Context<P>) + Send + Sync>;

/// Wraps a closure as a [`TaskFunc`].
pub fn task<P, F>(f: F) -> TaskFunc<P>
where
    P: 'static,
    F: Fn(&mut Context<P>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A handler step that carries mutable state. The flow keeps one template
/// instance and hands each request its own `fork`.
pub trait StatefulTask<P>: Send + Sync {
    fn execute(&mut self, ctx: &mut Context<P>);
    fn fork(&self) -> Box<dyn StatefulTask<P>>;
}

impl<P, F> StatefulTask<P> for F
where
    P: 'static,
    F: FnMut(&mut Context<P>) + Clone + Send + Sync + 'static,
{
    fn execute(&mut self, ctx: &mut Context<P>) {
        self(ctx)
    }

    fn fork(&self) -> Box<dyn StatefulTask<P>> {
        Box::new(self.clone())
    }
}

/// One step of a flow.
pub enum Task<P = ()> {
    Shared(TaskFunc<P>),
    Stateful(Box<dyn StatefulTask<P>>),
}

impl<P: 'static> Task<P> {
    /// Wraps a cloneable closure as a stateful step.
    pub fn stateful<F>(f: F) -> Self
    where
        F: FnMut(&mut Context<P>) + Clone + Send + Sync + 'static,
    {
        Task::Stateful(Box::new(f))
    }

    pub fn custom<T: StatefulTask<P> + 'static>(t: T) -> Self {
        Task::Stateful(Box::new(t))
    }

    fn fork(&self) -> Self {
        match self {
            Task::Shared(f) => Task::Shared(Arc::clone(f)),
            Task::Stateful(t) => Task::Stateful(t.fork()),
        }
    }

    pub(super) fn run(&mut self, ctx: &mut Context<P>) {
        match self {
            Task::Shared(f) => f(ctx),
            Task::Stateful(t) => t.execute(ctx),
        }
    }
}

impl<P> From<TaskFunc<P>> for Task<P> {
    fn from(f: TaskFunc<P>) -> Self {
        Task::Shared(f)
    }
}

/// The per-request copy of a flow that a [`Context`] walks.
pub enum FlowInstance<P = ()> {
    Shared(Arc<[TaskFunc<P>]>),
    /// Private steps. A slot is `None` only while its step is executing.
    Owned(Vec<Option<Task<P>>>),
}

impl<P> FlowInstance<P> {
    pub fn len(&self) -> usize {
        match self {
            FlowInstance::Shared(tasks) => tasks.len(),
            FlowInstance::Owned(tasks) => tasks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An ordered handler chain bound to a message id.
pub trait TaskFlow<P>: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produces the instance one request executes.
    fn fork(&self) -> FlowInstance<P>;

    /// Returns a new flow with `tasks` appended. `self` is left untouched,
    /// so a chain can be shared and extended at the same time.
    fn append(&self, tasks: &[TaskFunc<P>]) -> Arc<dyn TaskFlow<P>>;
}

/// A chain of stateless handlers shared by every request.
pub struct SharedFlow<P = ()> {
    tasks: Arc<[TaskFunc<P>]>,
}

impl<P> SharedFlow<P> {
    pub fn new(tasks: Vec<TaskFunc<P>>) -> Self {
        Self {
            tasks: tasks.into(),
        }
    }

    pub fn tasks(&self) -> &[TaskFunc<P>] {
        &self.tasks
    }
}

impl<P> Clone for SharedFlow<P> {
    fn clone(&self) -> Self {
        Self {
            tasks: Arc::clone(&self.tasks),
        }
    }
}

impl<P: 'static> TaskFlow<P> for SharedFlow<P> {
    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn fork(&self) -> FlowInstance<P> {
        FlowInstance::Shared(Arc::clone(&self.tasks))
    }

    fn append(&self, tasks: &[TaskFunc<P>]) -> Arc<dyn TaskFlow<P>> {
        let mut combined = Vec::with_capacity(self.tasks.len() + tasks.len());
        combined.extend(self.tasks.iter().cloned());
        combined.extend(tasks.iter().cloned());
        Arc::new(SharedFlow::new(combined))
    }
}

/// A chain that may contain stateful steps. Each `fork` clones the stateful
/// steps from the template and shares the stateless ones.
pub struct StatefulFlow<P = ()> {
    template: Vec<Task<P>>,
}

impl<P: 'static> StatefulFlow<P> {
    pub fn new(template: Vec<Task<P>>) -> Self {
        Self { template }
    }
}

impl<P: 'static> TaskFlow<P> for StatefulFlow<P> {
    fn len(&self) -> usize {
        self.template.len()
    }

    fn fork(&self) -> FlowInstance<P> {
        FlowInstance::Owned(self.template.iter().map(|t| Some(t.fork())).collect())
    }

    fn append(&self, tasks: &[TaskFunc<P>]) -> Arc<dyn TaskFlow<P>> {
        let mut template: Vec<Task<P>> = self.template.iter().map(Task::fork).collect();
        template.extend(tasks.iter().cloned().map(Task::Shared));
        Arc::new(StatefulFlow::new(template))
    }
}
