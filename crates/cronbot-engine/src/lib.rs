//! cronbot-engine: task scheduling and job execution.
//!
//! The `Scheduler` owns the durable job/task store behind one exclusive lock
//! and drives the periodic due-task scan; `executor` runs job subprocesses
//! and renders operator-facing reports; `notify` is the boundary the chat
//! transport implements to deliver them.

pub mod executor;
pub mod notify;
pub mod scheduler;

pub use notify::{MessageFormat, Notifier};
pub use scheduler::Scheduler;
