//! Derivations.
//!
//! A [`Memo`] caches the result of a computation over other nodes and
//! re-runs it on read, only when it is stale:
//!
//! - `Dirty`: a direct source changed, so recompute;
//! - `MaybeDirty`: something further up changed; refresh the derived
//!   sources first and recompute only if one of them now differs.
//!
//! Nobody reading a memo means it never recomputes. Failures are handed to
//! the reader and leave the memo dirty, so the next read retries. Reading a
//! memo from inside its own computation fails with [`Error::Cycle`].

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::graph::{DirtyState, NodeId, NodeKind};

use super::runtime::{Reactive, Runtime, RuntimeInner};

type Compute<T> = Box<dyn Fn() -> Result<T>>;
pub(crate) type Setter<T> = Box<dyn Fn(T) -> Result<()>>;

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some memos might return the same value even if inputs changed),
/// which is what stops propagation at that memo.
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

struct MemoInner<T> {
    id: NodeId,
    rt: Weak<RuntimeInner>,

    /// The computation function.
    compute: Compute<T>,

    /// Write-back, if the memo is writable.
    setter: Option<Setter<T>>,

    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,

    /// Whether the last computation failed.
    errored: Cell<bool>,

    /// Set while the computation runs, to catch self-reads.
    computing: Cell<bool>,

    compute_count: Cell<usize>,
}

/// Clears the `computing` flag even if the computation panics.
struct Computing<'a>(&'a Cell<bool>);

impl Drop for Computing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new memo in `rt`.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub(crate) fn new_in<F>(rt: &Runtime, compute: F, setter: Option<Setter<T>>) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        let id = NodeId::fresh();
        rt.inner.add_node(id, NodeKind::Derived);

        let inner = Rc::new(MemoInner {
            id,
            rt: Rc::downgrade(&rt.inner),
            compute: Box::new(compute),
            setter,
            value: RefCell::new(None),
            errored: Cell::new(false),
            computing: Cell::new(false),
            compute_count: Cell::new(0),
        });

        rt.inner.register(id, Rc::downgrade(&inner) as Weak<dyn Reactive>);

        Self { inner }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// This is the main entry point for reading a memo's value.
    pub fn get(&self) -> Result<T> {
        let Some(rt) = self.inner.rt.upgrade() else {
            return (self.inner.compute)();
        };

        rt.track(self.inner.id);
        self.inner.refresh(&rt)?;

        self.inner
            .value
            .borrow()
            .clone()
            .ok_or(Error::Cycle(self.inner.id.raw()))
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> Result<T> {
        match self.inner.rt.upgrade() {
            Some(rt) => rt.untrack(|| self.get()),
            None => (self.inner.compute)(),
        }
    }

    /// Write through the memo's setter.
    ///
    /// The setter runs inside a batch, so effects observe all of its writes
    /// at once.
    pub fn set(&self, value: T) -> Result<()> {
        let Some(setter) = &self.inner.setter else {
            return Err(Error::ReadOnly(format!("derivation #{}", self.inner.id.raw())));
        };

        match self.inner.rt.upgrade() {
            Some(rt) => {
                let _batch = rt.begin_batch();
                setter(value)
            }
            None => setter(value),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }
}

impl<T: 'static> Memo<T> {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        self.inner
            .rt
            .upgrade()
            .and_then(|rt| {
                let state = rt.graph.borrow().state(self.inner.id);
                state
            })
            .unwrap_or(DirtyState::Dirty)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// How many times the computation has been invoked.
    pub fn compute_count(&self) -> usize {
        self.inner.compute_count.get()
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner
            .rt
            .upgrade()
            .map_or(0, |rt| {
                let count = rt.graph.borrow().observer_count(self.inner.id);
                count
            })
    }

    pub fn ptr_eq(&self, other: &Memo<T>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> MemoInner<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Bring the cached value up to date.
    fn refresh(&self, rt: &RuntimeInner) -> Result<()> {
        if self.computing.get() {
            return Err(Error::Cycle(self.id.raw()));
        }

        let state = rt.check_sources(self.id);
        if state == DirtyState::Clean && self.value.borrow().is_some() {
            return Ok(());
        }

        self.recompute(rt)
    }

    /// Recompute the memo's value.
    ///
    /// This runs the computation within a reactive context to track
    /// dependencies, and inside a batch so that effects woken by the
    /// result run only once the memo is consistent again.
    fn recompute(&self, rt: &RuntimeInner) -> Result<()> {
        let _batch = rt.begin_batch();

        let result = {
            self.computing.set(true);
            let _computing = Computing(&self.computing);
            let frame = rt.context.enter(Some(self.id));
            let result = (self.compute)();
            let sources = frame.finish();
            rt.graph.borrow_mut().replace_dependencies(self.id, &sources);
            result
        };
        self.compute_count.set(self.compute_count.get() + 1);

        match result {
            Ok(value) => {
                let was_errored = self.errored.replace(false);
                let changed = was_errored || self.value.borrow().as_ref() != Some(&value);

                rt.graph.borrow_mut().mark_clean(self.id);
                if changed {
                    let previous = self.value.replace(Some(value));
                    drop(previous);
                    rt.notify_changed(self.id);
                }
                Ok(())
            }
            Err(err) => {
                rt.graph.borrow_mut().mark_dirty(self.id);
                if !self.errored.replace(true) {
                    rt.notify_changed(self.id);
                }
                Err(err)
            }
        }
    }
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + PartialEq + 'static,
{
    fn update_if_necessary(&self) {
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        if let Err(err) = self.refresh(&rt) {
            // Readers see the error themselves when they pull the value.
            tracing::trace!(memo = self.id.raw(), error = %err, "memo refresh failed");
        }
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.release_node(self.id);
        }
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.borrow())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}
