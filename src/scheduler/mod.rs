//! Task scheduling: worker pools and the priority task pool

pub mod worker;
pub mod pool;

pub use worker::{PendingResult, WorkerPool};
pub use pool::{Completion, TaskPool};
