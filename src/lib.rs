// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;
pub mod server;

// Re-export
pub use crate::connection::Connection;
pub use crate::core::pipeline::{Context, task};
pub use crate::core::{Message, NetError};
pub use crate::server::Engine;
