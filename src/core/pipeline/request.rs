// src/core/pipeline/request.rs

use crate::connection::Connection;
use crate::core::Message;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// A decoded message paired with the connection it arrived on.
pub struct Request<P = ()> {
    conn: Arc<Connection<P>>,
    msg: Message,
}

impl<P> Request<P> {
    pub fn new(conn: Arc<Connection<P>>, msg: Message) -> Self {
        Self { conn, msg }
    }

    pub fn connection(&self) -> &Arc<Connection<P>> {
        &self.conn
    }

    pub fn message(&self) -> &Message {
        &self.msg
    }

    /// The id of the originating connection, used for queue selection.
    pub fn conn_id(&self) -> u64 {
        self.conn.id()
    }

    pub fn msg_id(&self) -> u32 {
        self.msg.id()
    }

    pub fn payload(&self) -> &Bytes {
        self.msg.data()
    }

    pub fn into_parts(self) -> (Arc<Connection<P>>, Message) {
        (self.conn, self.msg)
    }
}

impl<P> Clone for Request<P> {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            msg: self.msg.clone(),
        }
    }
}

impl<P> fmt::Debug for Request<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("conn_id", &self.conn.id())
            .field("msg", &self.msg)
            .finish()
    }
}
