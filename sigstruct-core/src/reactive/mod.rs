//! Reactive primitives.
//!
//! - [`Signal`]: a cell holding a value.
//! - [`Memo`]: a cached derivation, recomputed lazily when read.
//! - [`Effect`]: a reaction, re-run after its sources change.
//! - [`Runtime`]: owns the graph and coordinates batches.
//!
//! ```rust,ignore
//! let rt = Runtime::new();
//! let count = rt.cell(1);
//!
//! let c = count.clone();
//! let doubled = rt.derive(move || c.get() * 2);
//!
//! rt.batch(|| {
//!     count.set(2);
//!     count.set(3);
//! });
//! assert_eq!(doubled.get(), Ok(6));
//! ```

mod batch;
mod context;
mod effect;
mod memo;
mod runtime;
mod signal;

pub use context::ReactiveContext;
pub use effect::{dispose, Cleanup, Dispose, Effect};
pub use memo::Memo;
pub use runtime::{Runtime, RuntimeBuilder};
pub use signal::{Equality, Signal};

pub(crate) use batch::InitTask;
