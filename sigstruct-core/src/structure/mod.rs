//! Reactive structs.
//!
//! A struct is built from a [`Shape`] (or a plain object value) by
//! [`Runtime::structure`](crate::Runtime::structure). Each declared key
//! becomes one of:
//!
//! - a cell, for plain values;
//! - a derivation, for computed fields and flag views;
//! - a shared store, for bound fields and aliases;
//! - an action or a start-up reaction, which are not fields.
//!
//! ```rust,ignore
//! let rt = Runtime::new();
//! let shape = Shape::builder("Counter")
//!     .value("count", 0)
//!     .computed("double", Computed::new(|s| {
//!         Ok(Value::from(s.get("count")?.as_i64().unwrap_or(0) * 2))
//!     }))
//!     .build();
//!
//! let counter = rt.structure(&shape, Props::new().with("count", 2))?;
//! assert_eq!(counter.get("double")?, Value::from(4));
//! ```

mod decl;
mod field;
mod handle;
mod mirror;
mod props;
mod shape;
mod transform;

pub use decl::{Action, AliasTarget, Computed, EffectDecl, FieldDecl, PathRef};
pub use field::Field;
pub use handle::Struct;
pub use props::{Prop, Props};
pub use shape::{Schema, Shape, ShapeBuilder};
pub use transform::Source;
