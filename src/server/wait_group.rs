// src/server/wait_group.rs

//! A counter the reactor waits on until every connection it dispatched in
//! one batch has finished its read cycle.
//!
//! epoll is level-triggered here, so returning to `epoll_wait` while a
//! dispatched connection still has unread bytes would report it again and
//! hand it to a second worker. Waiting for the batch closes that window.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    pending: Mutex<usize>,
    done: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one unit of work. The returned guard marks it finished when
    /// dropped, on every exit path including panics.
    pub fn add(&self) -> WaitGuard {
        *self.inner.pending.lock() += 1;
        WaitGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Blocks until every outstanding guard has been dropped.
    pub fn wait(&self) {
        let mut pending = self.inner.pending.lock();
        while *pending > 0 {
            self.inner.done.wait(&mut pending);
        }
    }

    pub fn pending(&self) -> usize {
        *self.inner.pending.lock()
    }
}

#[derive(Debug)]
pub struct WaitGuard {
    inner: Arc<Inner>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut pending = self.inner.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.inner.done.notify_all();
        }
    }
}
