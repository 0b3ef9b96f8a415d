//! Backing stores of struct fields.

use std::fmt;

use crate::error::Result;
use crate::graph::NodeId;
use crate::reactive::{Memo, Signal};
use crate::value::Value;

/// The cell or derivation behind one struct field.
///
/// Cloning shares the store. Two fields that are [`Field::ptr_eq`] are the
/// same source of truth, which is what aliasing and binding produce.
#[derive(Clone)]
pub enum Field {
    Cell(Signal<Value>),
    Derived(Memo<Value>),
}

impl Field {
    /// Read the value, tracking the read.
    pub fn get(&self) -> Result<Value> {
        match self {
            Self::Cell(signal) => Ok(signal.get()),
            Self::Derived(memo) => memo.get(),
        }
    }

    pub fn get_untracked(&self) -> Result<Value> {
        match self {
            Self::Cell(signal) => Ok(signal.get_untracked()),
            Self::Derived(memo) => memo.get_untracked(),
        }
    }

    /// Write the value. Derivations route it to their setter.
    pub fn set(&self, value: Value) -> Result<()> {
        match self {
            Self::Cell(signal) => {
                signal.set(value);
                Ok(())
            }
            Self::Derived(memo) => memo.set(value),
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Self::Cell(signal) => signal.id(),
            Self::Derived(memo) => memo.id(),
        }
    }

    pub fn is_writable(&self) -> bool {
        match self {
            Self::Cell(_) => true,
            Self::Derived(memo) => memo.is_writable(),
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Derived(_))
    }

    pub fn ptr_eq(&self, other: &Field) -> bool {
        match (self, other) {
            (Self::Cell(a), Self::Cell(b)) => a.ptr_eq(b),
            (Self::Derived(a), Self::Derived(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<Signal<Value>> for Field {
    fn from(signal: Signal<Value>) -> Self {
        Self::Cell(signal)
    }
}

impl From<Memo<Value>> for Field {
    fn from(memo: Memo<Value>) -> Self {
        Self::Derived(memo)
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell(signal) => f.debug_tuple("Cell").field(&signal.id()).finish(),
            Self::Derived(memo) => f.debug_tuple("Derived").field(&memo.id()).finish(),
        }
    }
}
