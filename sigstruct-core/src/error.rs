//! Error types.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors propagate
//! synchronously to the caller of `get`/`set`/`structure`; there is no global
//! error channel. The two dependency sentinels are the only variants that are
//! ever swallowed, and only by nullable getters.

use std::rc::Rc;

/// Boxed error produced by an asynchronous source.
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A struct was requested from something that is not an object.
    #[error("invalid input type: expected an object, got {0}")]
    InvalidInput(&'static str),

    /// An alias points at a field that does not exist (or only at other
    /// aliases that never resolve).
    #[error("alias target not found: `{alias}` refers to `{target}`, which has no field")]
    AliasTargetNotFound { alias: String, target: String },

    /// An async-unwrap marker carries a source that cannot be drained.
    #[error("unsupported async source type: {0}")]
    UnsupportedAsyncSource(String),

    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    /// A write hit a derivation that was declared without a setter.
    #[error("`{0}` is read-only")]
    ReadOnly(String),

    /// A declared effect was started a second time.
    #[error("effect `{0}` cannot be invoked more than once")]
    EffectAlreadyStarted(String),

    #[error("effect has been disposed")]
    Disposed,

    /// A derivation read itself while computing.
    #[error("cyclic read of derivation #{0}")]
    Cycle(u64),

    /// The struct behind a weak owner reference is gone.
    #[error("struct has been dropped")]
    StructDropped,

    /// Sentinel: a required upstream value is `null`/`undefined`.
    #[error("missing dependency `{0}`")]
    MissingDependency(String),

    /// Sentinel: a required upstream flag is falsy.
    #[error("dependency `{0}` is not set")]
    FalseDependency(String),

    /// Raised by user getters, setters, and actions.
    #[error("{0}")]
    Custom(Rc<str>),
}

impl Error {
    pub fn custom(message: impl AsRef<str>) -> Self {
        Self::Custom(Rc::from(message.as_ref()))
    }

    /// Whether this is one of the sentinels a nullable getter turns into
    /// `Value::Undefined`.
    pub fn is_dependency_sentinel(&self) -> bool {
        matches!(self, Self::MissingDependency(_) | Self::FalseDependency(_))
    }
}
