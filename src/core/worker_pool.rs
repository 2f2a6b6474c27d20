// src/core/worker_pool.rs

//! A fixed set of bounded queues, each drained by its own group of OS threads.
//!
//! Items are routed to a queue by `key % queue_count`, so every item that
//! shares a key lands in the same queue and is dequeued in FIFO order.
//! Producers block while the selected queue is full. The pool shuts down by
//! dropping its senders; workers exit once their queue is closed and drained.
//! A panicking handler is logged and its worker keeps serving the queue.

use crate::core::{NetError, Result};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, error};

pub struct WorkerPool<T> {
    name: &'static str,
    senders: RwLock<Option<Vec<mpsc::Sender<T>>>>,
    receivers: Mutex<Option<Vec<mpsc::Receiver<T>>>>,
    workers_per_queue: usize,
    handles: Mutex<Vec<JoinHandle<()>>>,
    queue_count: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(
        name: &'static str,
        queue_count: usize,
        queue_len: usize,
        workers_per_queue: usize,
    ) -> Self {
        let queue_count = queue_count.max(1);
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..queue_count)
            .map(|_| mpsc::channel(queue_len.max(1)))
            .unzip();

        Self {
            name,
            senders: RwLock::new(Some(senders)),
            receivers: Mutex::new(Some(receivers)),
            workers_per_queue: workers_per_queue.max(1),
            handles: Mutex::new(Vec::new()),
            queue_count,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn queue_count(&self) -> usize {
        self.queue_count
    }

    pub fn queue_index(&self, key: u64) -> usize {
        (key % self.queue_count as u64) as usize
    }

    /// A clone of the sender for the queue that owns `key`.
    pub fn sender(&self, key: u64) -> Result<mpsc::Sender<T>> {
        let senders = self.senders.read();
        senders
            .as_ref()
            .map(|s| s[self.queue_index(key)].clone())
            .ok_or(NetError::EngineStopped)
    }

    /// Enqueues `item`, blocking the calling thread while the queue is full.
    /// Must not be called from inside an async context.
    pub fn submit(&self, key: u64, item: T) -> Result<()> {
        let tx = self.sender(key)?;
        tx.blocking_send(item).map_err(|_| NetError::EngineStopped)
    }

    /// Async counterpart of [`WorkerPool::submit`] for callers running on the runtime.
    pub async fn submit_async(&self, key: u64, item: T) -> Result<()> {
        let tx = self.sender(key)?;
        tx.send(item).await.map_err(|_| NetError::EngineStopped)
    }

    /// Spawns `workers_per_queue` named threads per queue, each running
    /// `handler` on every dequeued item. Can only be done once.
    pub fn start<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let Some(receivers) = self.receivers.lock().take() else {
            return Err(NetError::EngineStopped);
        };

        let handler = Arc::new(handler);
        let mut handles = self.handles.lock();
        for (queue, rx) in receivers.into_iter().enumerate() {
            let rx = Arc::new(Mutex::new(rx));
            for worker in 0..self.workers_per_queue {
                let rx = rx.clone();
                let handler = handler.clone();
                let name = self.name;
                let spawned = thread::Builder::new()
                    .name(format!("{name}-{queue}-{worker}"))
                    .spawn(move || {
                        loop {
                            // One worker at a time waits on the queue; the
                            // lock is released before the item is handled.
                            let next = rx.lock().blocking_recv();
                            match next {
                                Some(item) => {
                                    let run = panic::catch_unwind(AssertUnwindSafe(|| handler(item)));
                                    if run.is_err() {
                                        error!("A {name} worker {queue}-{worker} handler panicked.");
                                    }
                                }
                                None => break,
                            }
                        }
                        debug!("{name} worker {queue}-{worker} exiting.");
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        error!("Failed to spawn {name} worker {queue}-{worker}: {e}");
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(())
    }

    /// Drops the pool's senders. Workers finish what is queued and exit once
    /// every other clone of their sender is gone.
    pub fn close(&self) {
        self.senders.write().take();
    }

    pub fn is_closed(&self) -> bool {
        self.senders.read().is_none()
    }

    /// Waits for every worker thread to exit. Only call this after `close`,
    /// and only when no other sender clones can outlive the pool.
    pub fn join(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                error!("A {} worker panicked.", self.name);
            }
        }
    }
}
