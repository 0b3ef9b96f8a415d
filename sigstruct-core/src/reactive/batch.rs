//! Batch coordinator.
//!
//! Writes always apply immediately and mark the graph dirty immediately.
//! What a batch defers is the *running* of effects: they are queued while the
//! batch depth is above zero and flushed once the outermost batch closes.
//!
//! Two queues are drained on flush, in this order:
//!
//! - the init queue, holding start-up tasks of freshly built structs, so a
//!   struct built inside an enclosing batch never runs its own effects while
//!   the enclosing batch can still observe it half-initialized;
//! - the pending set, holding effects whose sources changed, in the order
//!   they were first enqueued. An effect is queued at most once.
//!
//! Effects that write during the flush enqueue more work, which is drained
//! before the flush returns.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use indexmap::IndexSet;

use crate::graph::NodeId;

use super::runtime::RuntimeInner;

/// A deferred start-up task, queued by the struct transformer.
pub(crate) type InitTask = Box<dyn FnOnce()>;

#[derive(Default)]
pub(crate) struct BatchState {
    depth: Cell<usize>,
    flushing: Cell<bool>,
    pending: RefCell<IndexSet<NodeId>>,
    init: RefCell<VecDeque<InitTask>>,
}

/// RAII guard for one level of batching.
///
/// Dropping the outermost guard flushes. If the batch is unwinding from a
/// panic, the depth is restored but nothing is flushed.
pub(crate) struct BatchGuard<'a> {
    runtime: &'a RuntimeInner,
}

/// Resets the `flushing` flag even if an effect panics mid-flush.
struct FlushGuard<'a>(&'a Cell<bool>);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl BatchState {
    pub(crate) fn depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn enqueue(&self, effects: impl IntoIterator<Item = NodeId>) {
        self.pending.borrow_mut().extend(effects);
    }

    pub(crate) fn dequeue(&self, effect: NodeId) {
        self.pending.borrow_mut().shift_remove(&effect);
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn push_init(&self, task: InitTask) {
        self.init.borrow_mut().push_back(task);
    }

    #[cfg(test)]
    pub(crate) fn init_len(&self) -> usize {
        self.init.borrow().len()
    }
}

impl RuntimeInner {
    pub(crate) fn begin_batch(&self) -> BatchGuard<'_> {
        self.batch.depth.set(self.batch.depth.get() + 1);
        BatchGuard { runtime: self }
    }

    /// Drain the init queue and the pending effects to a fixed point.
    ///
    /// Re-entrant calls (an effect writing during the flush) return
    /// immediately; the outer loop picks up whatever they queued.
    pub(crate) fn flush(&self) {
        if self.batch.flushing.replace(true) {
            return;
        }
        let _flushing = FlushGuard(&self.batch.flushing);

        let limit = self.config.max_flush_iterations;
        let mut iterations = 0usize;

        loop {
            let init = self.batch.init.borrow_mut().pop_front();
            if let Some(task) = init {
                task();
                continue;
            }

            let next = self.batch.pending.borrow_mut().shift_remove_index(0);
            let Some(effect_id) = next else {
                break;
            };

            iterations += 1;
            if iterations > limit {
                let dropped = self.batch.pending.borrow().len() + 1;
                tracing::error!(
                    limit,
                    dropped,
                    "effects kept re-triggering each other; dropping the rest of the flush"
                );
                self.batch.pending.borrow_mut().clear();
                break;
            }

            if let Some(reactive) = self.reactive(effect_id) {
                tracing::trace!(effect = effect_id.raw(), "flushing effect");
                reactive.update_if_necessary();
            }
        }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let batch = &self.runtime.batch;
        let depth = batch.depth.get().saturating_sub(1);
        batch.depth.set(depth);

        if depth == 0 && !std::thread::panicking() {
            self.runtime.flush();
        }
    }
}
