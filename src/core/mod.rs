// src/core/mod.rs

//! Building blocks shared by the connection layer and the engine: errors,
//! wire framing, the sharded registry, the request pipeline, and metrics.

pub mod errors;
pub mod metrics;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod worker_pool;

pub use errors::{NetError, Result};
pub use protocol::Message;
