//! Cells.
//!
//! A [`Signal`] owns a value and a source node in its runtime's graph. Reads
//! inside a derivation or reaction become edges once that computation
//! finishes; accepted writes bump the version and wake everything
//! downstream. The equality policy decides which writes are accepted.
//!
//! Only a weak handle to the runtime is kept. After the runtime is dropped a
//! signal still stores values, it just stops notifying anyone.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use crate::graph::{NodeId, NodeKind};

use super::runtime::{Runtime, RuntimeInner};

/// Decides whether a write is a change.
///
/// The default for [`Runtime::cell`] is `PartialEq`. [`Equality::Never`]
/// treats every write as a change and is the opt-in for re-notifying
/// dependents on equal values.
pub enum Equality<T> {
    /// Every write propagates.
    Never,
    /// Writes propagate when the comparator returns false.
    By(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T: PartialEq + 'static> Equality<T> {
    pub fn partial_eq() -> Self {
        Self::By(Rc::new(|a: &T, b: &T| a == b))
    }
}

impl<T> Equality<T> {
    pub fn by(equals: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::By(Rc::new(equals))
    }

    fn equals(&self, current: &T, next: &T) -> bool {
        match self {
            Self::Never => false,
            Self::By(equals) => equals(current, next),
        }
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Never => Self::Never,
            Self::By(equals) => Self::By(Rc::clone(equals)),
        }
    }
}

impl<T> Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Never"),
            Self::By(_) => f.write_str("By(..)"),
        }
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same cell.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.cell(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies dependents)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    id: NodeId,
    rt: Weak<RuntimeInner>,
    value: RefCell<T>,
    version: Cell<u64>,
    equality: Equality<T>,
}

impl<T: Clone + 'static> Signal<T> {
    pub(crate) fn new_in(rt: &Runtime, value: T, equality: Equality<T>) -> Self {
        let id = NodeId::fresh();
        rt.inner.add_node(id, NodeKind::Source);

        Self {
            inner: Rc::new(SignalInner {
                id,
                rt: Rc::downgrade(&rt.inner),
                value: RefCell::new(value),
                version: Cell::new(0),
                equality,
            }),
        }
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, the read becomes a dependency
    /// of the running memo or effect.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value, tracking the read like [`Signal::get`].
    ///
    /// The signal must not be written from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify dependents if it differs.
    pub fn set(&self, value: T) {
        let unchanged = {
            let current = self.inner.value.borrow();
            self.inner.equality.equals(&current, &value)
        };
        if unchanged {
            return;
        }

        let previous = self.inner.value.replace(value);
        self.inner.version.set(self.inner.version.get() + 1);
        drop(previous);

        if let Some(rt) = self.inner.rt.upgrade() {
            rt.notify_changed(self.inner.id);
        }
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let current = self.inner.value.borrow();
            f(&current)
        };
        self.set(next);
    }

    fn track(&self) {
        if let Some(rt) = self.inner.rt.upgrade() {
            rt.track(self.inner.id);
        }
    }
}

impl<T: 'static> Signal<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Number of accepted writes so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Number of memos and effects that read this signal on their last run.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .rt
            .upgrade()
            .map_or(0, |rt| {
                let count = rt.graph.borrow().observer_count(self.inner.id);
                count
            })
    }

    /// Whether both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Signal<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.release_node(self.id);
        }
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
