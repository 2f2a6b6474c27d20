// src/core/pipeline/task_mgr.rs

use super::{Context, Request, Router, RouterGroup, Task, TaskFlow, TaskFunc};
use crate::config::EngineConfig;
use crate::core::worker_pool::WorkerPool;
use crate::core::{Result, metrics};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Owns the router and the task queues. Requests are queued by connection
/// id, so one connection's requests always share a queue.
pub struct TaskMgr<P = ()> {
    router: Arc<Router<P>>,
    root: RwLock<RouterGroup<P>>,
    pool: WorkerPool<Request<P>>,
}

impl<P: Send + Sync + 'static> TaskMgr<P> {
    pub fn new(config: &EngineConfig) -> Self {
        let router = Arc::new(Router::new());
        Self {
            root: RwLock::new(RouterGroup::new(Arc::clone(&router))),
            router,
            pool: WorkerPool::new(
                "task",
                config.task_queues,
                config.task_queue_len,
                config.workers_per_task_queue,
            ),
        }
    }

    pub fn router(&self) -> &Arc<Router<P>> {
        &self.router
    }

    /// A child of the root group. See [`RouterGroup::group`].
    pub fn group(&self, tasks: &[TaskFunc<P>]) -> RouterGroup<P> {
        self.root.read().group(tasks)
    }

    /// Adds global middleware to every flow registered from now on.
    pub fn middleware(&self, tasks: &[TaskFunc<P>]) {
        self.root.write().middleware(tasks);
    }

    pub fn regist(&self, msg_id: u32, tasks: &[TaskFunc<P>]) {
        self.root.read().regist(msg_id, tasks);
    }

    pub fn regist_flow(&self, msg_id: u32, flow: Arc<dyn TaskFlow<P>>) {
        self.root.read().regist_flow(msg_id, flow);
    }

    pub fn regist_stateful(&self, msg_id: u32, tasks: Vec<Task<P>>) {
        self.root.read().regist_stateful(msg_id, tasks);
    }

    pub fn fallback(&self, tasks: &[TaskFunc<P>]) {
        self.root.read().fallback(tasks);
    }

    /// The sender of the queue that serves connection `conn_id`.
    pub fn sender(&self, conn_id: u64) -> Result<mpsc::Sender<Request<P>>> {
        self.pool.sender(conn_id)
    }

    pub fn queue_index(&self, conn_id: u64) -> usize {
        self.pool.queue_index(conn_id)
    }

    /// Queues a request directly, blocking while its queue is full.
    pub fn submit(&self, request: Request<P>) -> Result<()> {
        let conn_id = request.conn_id();
        self.pool.submit(conn_id, request)
    }

    pub fn start(&self) -> Result<()> {
        let router = Arc::clone(&self.router);
        self.pool.start(move |request| Self::handle(&router, request))
    }

    /// Runs one request through its flow. An id with no flow (and no
    /// fallback) consumes the request without doing anything.
    pub fn handle(router: &Router<P>, request: Request<P>) {
        let Some(flow) = router.task_flow(request.msg_id()) else {
            debug!(
                "No task flow for message {} from connection {}; dropping it.",
                request.msg_id(),
                request.conn_id()
            );
            return;
        };

        let mut ctx = Context::new(request, flow);
        ctx.next();
        metrics::REQUESTS_PROCESSED_TOTAL.inc();
    }

    /// Closes the task queues. Workers drain what is queued and exit once no
    /// connection holds a queue sender any more.
    pub fn stop(&self) {
        self.pool.close();
    }
}
