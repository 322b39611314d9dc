mod queue;
mod worker;

pub use queue::{QueueStatus, enqueue_task, queue_status};
pub use worker::QueueWorkerPool;
