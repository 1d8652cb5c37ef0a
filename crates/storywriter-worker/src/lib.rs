//! Background execution of LLM calls.
//!
//! Every generation and token-count request goes through one [`TaskQueue`],
//! which runs tasks strictly one at a time, in enqueue order, on a single
//! background task. Results travel back over a channel as [`Completion`]s and
//! are applied by the context that owns the document, through its
//! [`ResultSink`] implementation.
//!
//! # Main types
//!
//! - [`Task`]: One queued request bound to a backend handle and a sink target.
//! - [`Completion`]: A finished task's output, consumed exactly once by `deliver`.
//! - [`ResultSink`]: Implemented by whatever owns the fields results land in.
//! - [`TaskQueue`]: The single-consumer FIFO queue.

/// Queued units of work and their results.
pub mod task;
/// The single-consumer FIFO queue.
pub mod task_queue;

pub use task::{Completion, ResultSink, Task, TaskKind, TaskOutput};
pub use task_queue::{Completions, TaskQueue};
