//! Consumer engine: bounded pool, per-message worker, queue dispatcher, and
//! the producer that feeds the queue.

pub mod dispatcher;
pub mod failure;
pub mod pool;
pub mod producer;
pub mod worker;

pub use dispatcher::{Dispatcher, DrainReport};
pub use failure::{Stage, TaskLabel, WorkerFailure};
pub use pool::{FailureSink, WorkerPool};
pub use producer::{EnqueueReport, Producer};
pub use worker::{Collaborators, Outcome, Worker, WorkerOptions};
