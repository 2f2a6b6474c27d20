// src/core/pipeline/mod.rs

//! The request pipeline: message ids are mapped to ordered handler chains
//! (task flows), and each decoded request runs through its chain under an
//! explicit cursor (`Context`) that handlers advance or abort.

mod context;
mod request;
mod router;
mod router_group;
mod task;
mod task_mgr;

pub use context::{ABORT_INDEX, Context};
pub use request::Request;
pub use router::Router;
pub use router_group::RouterGroup;
pub use task::{
    FlowInstance, SharedFlow, StatefulFlow, StatefulTask, Task, TaskFlow, TaskFunc, task,
};
pub use task_mgr::TaskMgr;
