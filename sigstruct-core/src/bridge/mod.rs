//! Async bridge.
//!
//! Feeds struct cells from futures and streams. A field declared with
//! [`Unwrap`] starts at its initial value; a tracked effect then spawns a
//! task on the runtime's [`Scheduler`] that writes each result into the
//! cell. Failures are stored as [`Value::Error`](crate::Value::Error).

mod drain;
mod scheduler;
mod source;

pub use scheduler::{Scheduler, TaskHandle, TokioScheduler};
pub use source::{AsyncSource, Item, Transform, Unwrap, ValueFuture, ValueStream};

pub(crate) use drain::start;
