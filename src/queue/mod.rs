//! Bounded work queue decoupling discovery from fetching
//!
//! Producers push [`WorkItem`]s with the non-blocking [`WorkQueue::try_enqueue`];
//! a full queue is a backpressure signal, never an error. Workers pull items with
//! a blocking, timed, or non-blocking dequeue.

mod work_queue;

pub use work_queue::{QueueStats, WorkItem, WorkQueue, DEFAULT_QUEUE_CAPACITY};
