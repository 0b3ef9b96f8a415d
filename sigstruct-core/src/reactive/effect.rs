//! Reactions.
//!
//! An [`Effect`] re-runs a side-effecting closure whenever something it read
//! last time changes. Runs are deferred to the end of the outermost batch.
//! Unlike memos, effects are owned by the runtime: dropping the handle does
//! not stop them, [`dispose`] does.
//!
//! The closure may return a [`Cleanup`], called untracked before the next
//! run and on disposal. It may also return a `Result`, so a body can use
//! `?` on [`Struct::require`](crate::Struct::require).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::graph::{DirtyState, NodeId, NodeKind};

use super::runtime::{Reactive, Runtime, RuntimeInner};

/// Teardown returned by an effect run.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    fn take(&mut self) -> Cleanup {
        Cleanup(self.0.take())
    }

    fn call(self) {
        if let Some(f) = self.0 {
            f();
        }
    }
}

impl From<()> for Cleanup {
    fn from(_: ()) -> Self {
        Self::none()
    }
}

impl From<Option<Cleanup>> for Cleanup {
    fn from(cleanup: Option<Cleanup>) -> Self {
        cleanup.unwrap_or_default()
    }
}

/// Lets an effect body bail out with `?`.
///
/// A missing or falsy dependency ends the run quietly. What was read up to
/// that point stays tracked, so the effect runs again once it is filled in.
/// Any other error is logged.
impl<C: Into<Cleanup>> From<Result<C>> for Cleanup {
    fn from(result: Result<C>) -> Self {
        match result {
            Ok(cleanup) => cleanup.into(),
            Err(err) if err.is_dependency_sentinel() => {
                tracing::trace!(%err, "effect waiting on dependency");
                Self::none()
            }
            Err(err) => {
                tracing::error!(%err, "effect failed");
                Self::none()
            }
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Cleanup(..)" } else { "Cleanup(None)" })
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Dropping the handle does not stop the effect; call [`Effect::dispose`].
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let count = rt.cell(0);
///
/// let c = count.clone();
/// let effect = rt.react(move || {
///     println!("Count is: {}", c.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

struct EffectInner {
    id: NodeId,
    rt: Weak<RuntimeInner>,

    /// The effect function.
    run: RefCell<Box<dyn FnMut() -> Cleanup>>,

    /// Cleanup returned by the latest run.
    cleanup: RefCell<Cleanup>,

    /// When false, reads during a run are not recorded and the effect
    /// runs exactly once.
    tracked: bool,

    disposed: Cell<bool>,
    running: Cell<bool>,
    run_count: Cell<usize>,
}

impl Effect {
    /// Create an effect in `rt`, running it right away if `start` is set.
    pub(crate) fn new_in<F, C>(rt: &Runtime, run: F, start: bool) -> Self
    where
        F: FnMut() -> C + 'static,
        C: Into<Cleanup>,
    {
        let effect = Self::build(rt, run, true);
        if start {
            effect.execute();
        }
        effect
    }

    /// Create an effect that does not run until [`Effect::run`] is called.
    pub(crate) fn new_lazy<F, C>(rt: &Runtime, run: F, tracked: bool) -> Self
    where
        F: FnMut() -> C + 'static,
        C: Into<Cleanup>,
    {
        Self::build(rt, run, tracked)
    }

    fn build<F, C>(rt: &Runtime, mut run: F, tracked: bool) -> Self
    where
        F: FnMut() -> C + 'static,
        C: Into<Cleanup>,
    {
        let id = NodeId::fresh();
        rt.inner.add_node(id, NodeKind::Effect);

        let inner = Rc::new(EffectInner {
            id,
            rt: Rc::downgrade(&rt.inner),
            run: RefCell::new(Box::new(move || run().into())),
            cleanup: RefCell::new(Cleanup::none()),
            tracked,
            disposed: Cell::new(false),
            running: Cell::new(false),
            run_count: Cell::new(0),
        });

        rt.inner.register(id, Rc::downgrade(&inner) as Weak<dyn Reactive>);
        rt.inner.own(id, inner.clone());

        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the effect now, regardless of whether its dependencies changed.
    pub fn run(&self) -> Result<()> {
        if self.inner.disposed.get() {
            return Err(Error::Disposed);
        }
        self.execute();
        Ok(())
    }

    fn execute(&self) {
        if let Some(rt) = self.inner.rt.upgrade() {
            self.inner.execute(&rt);
        }
    }

    /// Dispose of the effect.
    ///
    /// After disposal the effect will not run again. The pending cleanup
    /// runs once; disposing twice is a no-op.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }

        let owned = inner.rt.upgrade().and_then(|rt| {
            rt.batch.dequeue(inner.id);
            rt.graph.borrow_mut().remove_node(inner.id);
            rt.disown(inner.id)
        });

        // A disposal from inside the run is finished by the run itself.
        if !inner.running.get() {
            let cleanup = inner.cleanup.borrow_mut().take();
            match inner.rt.upgrade() {
                Some(rt) => rt.untrack(|| cleanup.call()),
                None => cleanup.call(),
            }
        }

        tracing::debug!(effect = inner.id.raw(), runs = inner.run_count.get(), "effect disposed");
        drop(owned);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .rt
            .upgrade()
            .map(|rt| {
                let count = rt.graph.borrow().dependencies_of(self.inner.id).len();
                count
            })
            .unwrap_or(0)
    }

    pub fn ptr_eq(&self, other: &Effect) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl EffectInner {
    /// Execute the effect function.
    ///
    /// The run happens inside a batch, so writes it makes are flushed only
    /// after it returns. Writes to its own dependencies do not re-queue it.
    fn execute(&self, rt: &RuntimeInner) {
        if self.disposed.get() || self.running.get() {
            return;
        }
        if !self.tracked && self.run_count.get() > 0 {
            return;
        }

        let _batch = rt.begin_batch();
        self.running.set(true);

        let previous = self.cleanup.borrow_mut().take();
        rt.untrack(|| previous.call());

        let observer = if self.tracked { Some(self.id) } else { None };
        let frame = rt.context.enter(observer);
        let cleanup = {
            let mut run = self.run.borrow_mut();
            (run)()
        };
        let sources = frame.finish();

        self.running.set(false);
        self.run_count.set(self.run_count.get() + 1);

        if self.disposed.get() {
            rt.untrack(|| cleanup.call());
            return;
        }

        {
            let mut graph = rt.graph.borrow_mut();
            graph.replace_dependencies(self.id, &sources);
            graph.mark_clean(self.id);
        }
        *self.cleanup.borrow_mut() = cleanup;
    }
}

impl Reactive for EffectInner {
    fn update_if_necessary(&self) {
        if self.disposed.get() {
            return;
        }
        let Some(rt) = self.rt.upgrade() else {
            return;
        };
        if rt.check_sources(self.id) == DirtyState::Dirty {
            self.execute(&rt);
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.release_node(self.id);
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Anything that owns effects and can stop them.
pub trait Dispose {
    fn dispose(&self);
}

impl Dispose for Effect {
    fn dispose(&self) {
        Effect::dispose(self);
    }
}

impl Dispose for [Effect] {
    fn dispose(&self) {
        for effect in self {
            effect.dispose();
        }
    }
}

impl Dispose for Vec<Effect> {
    fn dispose(&self) {
        self.as_slice().dispose();
    }
}

/// Dispose a single effect, a list of effects, or a struct.
pub fn dispose<D: Dispose + ?Sized>(target: &D) {
    target.dispose();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn effect_runs_on_creation() {
        let rt = Runtime::new();
        let (run_count, run_count_clone) = counter();

        let _effect = rt.react(move || {
            run_count_clone.set(run_count_clone.get() + 1);
        });

        // Effect should have run once on creation
        assert_eq!(run_count.get(), 1);
    }

    #[test]
    fn lazy_effect_waits_for_run() {
        let rt = Runtime::new();
        let (run_count, run_count_clone) = counter();

        let effect = Effect::new_lazy(
            &rt,
            move || run_count_clone.set(run_count_clone.get() + 1),
            true,
        );

        assert_eq!(run_count.get(), 0);
        assert_eq!(effect.run_count(), 0);

        effect.run().unwrap();
        assert_eq!(run_count.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_on_change_only() {
        let rt = Runtime::new();
        let count = rt.cell(0);
        let (seen, seen_clone) = counter();

        let c = count.clone();
        let effect = rt.react(move || {
            c.get();
            seen_clone.set(seen_clone.get() + 1);
        });
        assert_eq!(seen.get(), 1);
        assert_eq!(effect.dependency_count(), 1);

        count.set(1);
        assert_eq!(seen.get(), 2);

        count.set(1);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn cleanup_runs_before_rerun_and_on_dispose() {
        let rt = Runtime::new();
        let count = rt.cell(0);
        let (cleanups, cleanups_clone) = counter();

        let c = count.clone();
        let effect = rt.react(move || {
            c.get();
            let cleanups = cleanups_clone.clone();
            Cleanup::new(move || cleanups.set(cleanups.get() + 1))
        });
        assert_eq!(cleanups.get(), 0);

        count.set(1);
        assert_eq!(cleanups.get(), 1);

        effect.dispose();
        assert_eq!(cleanups.get(), 2);

        effect.dispose();
        assert_eq!(cleanups.get(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let rt = Runtime::new();
        let count = rt.cell(0);
        let (seen, seen_clone) = counter();

        let c = count.clone();
        let effect = rt.react(move || {
            c.get();
            seen_clone.set(seen_clone.get() + 1);
        });

        dispose(&effect);
        assert!(effect.is_disposed());
        assert_eq!(count.subscriber_count(), 0);

        count.set(5);
        assert_eq!(seen.get(), 1);
        assert_eq!(effect.run(), Err(Error::Disposed));
    }

    #[test]
    fn self_write_does_not_retrigger() {
        let rt = Runtime::new();
        let count = rt.cell(0);

        let c = count.clone();
        let effect = rt.react(move || {
            let v = c.get();
            if v < 10 {
                c.set(v + 1);
            }
        });

        assert_eq!(effect.run_count(), 1);
        assert_eq!(count.get(), 1);

        count.set(5);
        assert_eq!(effect.run_count(), 2);
        assert_eq!(count.get(), 6);
    }

    #[test]
    fn effect_kept_alive_by_runtime() {
        let rt = Runtime::new();
        let count = rt.cell(0);
        let (seen, seen_clone) = counter();

        let c = count.clone();
        drop(rt.react(move || {
            c.get();
            seen_clone.set(seen_clone.get() + 1);
        }));

        count.set(1);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn dispose_list() {
        let rt = Runtime::new();
        let effects: Vec<Effect> = (0..3).map(|_| rt.react(|| {})).collect();

        dispose(&effects);
        assert!(effects.iter().all(Effect::is_disposed));
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn untracked_effect_runs_once() {
        let rt = Runtime::new();
        let count = rt.cell(0);
        let (seen, seen_clone) = counter();

        let c = count.clone();
        let effect = Effect::new_lazy(
            &rt,
            move || {
                c.get();
                seen_clone.set(seen_clone.get() + 1);
            },
            false,
        );
        effect.run().unwrap();
        assert_eq!(effect.dependency_count(), 0);

        count.set(3);
        assert_eq!(seen.get(), 1);
    }
}
