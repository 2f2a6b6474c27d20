// src/core/pipeline/context.rs

use super::{FlowInstance, Request};
use crate::connection::Connection;
use crate::core::{Message, Result};
use bytes::Bytes;
use std::sync::Arc;

/// Cursor value that places a context past the end of any flow.
pub const ABORT_INDEX: isize = isize::MAX / 2;

/// Execution state of one request travelling through its flow.
///
/// Handlers run in order only as far as each one calls [`Context::next`];
/// a handler that returns without calling it ends the chain there, and one
/// that calls [`Context::abort`] ends it for every handler after it.
pub struct Context<P = ()> {
    request: Request<P>,
    flow: FlowInstance<P>,
    index: isize,
}

impl<P: 'static> Context<P> {
    pub fn new(request: Request<P>, flow: FlowInstance<P>) -> Self {
        Self {
            request,
            flow,
            index: -1,
        }
    }

    /// Runs the next handler in the chain, if there is one.
    pub fn next(&mut self) {
        self.index = self.index.saturating_add(1);
        if let Ok(i) = usize::try_from(self.index)
            && i < self.flow.len()
        {
            self.execute(i);
            self.index = self.index.saturating_add(1);
        }
    }

    fn execute(&mut self, i: usize) {
        if let FlowInstance::Shared(tasks) = &self.flow {
            let f = Arc::clone(&tasks[i]);
            f(self);
            return;
        }

        let taken = match &mut self.flow {
            FlowInstance::Owned(tasks) => tasks[i].take(),
            FlowInstance::Shared(_) => None,
        };
        if let Some(mut step) = taken {
            step.run(self);
            if let FlowInstance::Owned(tasks) = &mut self.flow {
                tasks[i] = Some(step);
            }
        }
    }

    /// Stops the chain; no handler after the current one will run.
    pub fn abort(&mut self) {
        self.index = ABORT_INDEX;
    }

    pub fn is_aborted(&self) -> bool {
        self.index >= ABORT_INDEX
    }

    pub fn request(&self) -> &Request<P> {
        &self.request
    }

    pub fn connection(&self) -> &Arc<Connection<P>> {
        self.request.connection()
    }

    pub fn message(&self) -> &Message {
        self.request.message()
    }

    pub fn msg_id(&self) -> u32 {
        self.request.msg_id()
    }

    pub fn payload(&self) -> &Bytes {
        self.request.payload()
    }

    /// Sends a message back on the originating connection.
    pub fn reply(&self, msg_id: u32, payload: impl Into<Bytes>) -> Result<()> {
        self.request.connection().send_msg(msg_id, payload)
    }
}
