//! Sigstruct Core
//!
//! This crate provides a fine-grained reactive state engine. It implements:
//!
//! - Reactive primitives (cells, derivations, reactions) with automatic
//!   dependency tracking
//! - Glitch-free propagation through a dependency graph
//! - Batched writes with deferred reactions
//! - Reactive structs built from shapes, with computed fields, actions,
//!   aliases, bound fields and path mirrors
//! - An async bridge feeding struct fields from futures and streams
//!
//! Everything is single-threaded. A [`Runtime`] owns the graph, the tracking
//! stack and the batch queue; independent runtimes never interact.
//!
//! # Architecture
//!
//! - `graph`: dependency graph and dirty-state propagation
//! - `reactive`: runtime, cells, derivations, reactions, batches
//! - `structure`: shapes, props and reactive structs
//! - `bridge`: async sources and the scheduler that drains them
//! - `value`: the dynamic value type struct fields hold
//!
//! # Example
//!
//! ```rust,ignore
//! use sigstruct_core::Runtime;
//!
//! let rt = Runtime::new();
//! let count = rt.cell(0);
//!
//! let c = count.clone();
//! let doubled = rt.derive(move || c.get() * 2);
//!
//! let (c, d) = (count.clone(), doubled.clone());
//! let _logger = rt.react(move || {
//!     println!("Count: {}, Doubled: {:?}", c.get(), d.get());
//! });
//!
//! count.set(5);
//! // Reaction runs again, prints: "Count: 5, Doubled: Ok(10)"
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod structure;
pub mod value;

pub use bridge::{AsyncSource, Scheduler, TaskHandle, TokioScheduler, Unwrap};
pub use config::RuntimeConfig;
pub use error::{BoxError, Error, Result};
pub use reactive::{
    dispose, Cleanup, Dispose, Effect, Equality, Memo, Runtime, RuntimeBuilder, Signal,
};
pub use structure::{
    Action, AliasTarget, Computed, EffectDecl, Field, FieldDecl, PathRef, Prop, Props, Shape,
    Source, Struct,
};
pub use value::{Object, Value};
