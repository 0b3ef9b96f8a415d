//! Tracking frames.
//!
//! Running a memo or effect pushes a frame naming it as the observer. Reads
//! made while that frame is on top are collected; when the computation
//! ends the frame is popped and its sources become the node's new edges.
//! `untrack` pushes a frame with no observer, which swallows reads.

use std::cell::RefCell;

use crate::graph::{NodeId, Sources};

#[derive(Debug)]
struct Frame {
    /// The computation being tracked, or `None` for an untracked scope.
    observer: Option<NodeId>,
    sources: Sources,
}

/// Per-runtime stack of active tracking frames.
#[derive(Debug, Default)]
pub struct ReactiveContext {
    frames: RefCell<Vec<Frame>>,
}

/// Guard that pops the frame when dropped.
///
/// This ensures the stack is properly maintained even if the computation
/// panics. Use [`ContextGuard::finish`] to pop and collect the sources.
pub(crate) struct ContextGuard<'a> {
    context: &'a ReactiveContext,
    observer: Option<NodeId>,
    done: bool,
}

impl ReactiveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a new frame for `observer`.
    ///
    /// While this frame is on top, reads are recorded as its sources.
    pub(crate) fn enter(&self, observer: Option<NodeId>) -> ContextGuard<'_> {
        self.frames.borrow_mut().push(Frame {
            observer,
            sources: Sources::new(),
        });

        ContextGuard {
            context: self,
            observer,
            done: false,
        }
    }

    /// Check whether reads are currently being recorded.
    pub fn is_tracking(&self) -> bool {
        self.frames
            .borrow()
            .last()
            .is_some_and(|frame| frame.observer.is_some())
    }

    /// The node currently being computed, if any.
    pub fn current_observer(&self) -> Option<NodeId> {
        self.frames.borrow().last().and_then(|frame| frame.observer)
    }

    /// Record a read of `source` in the innermost frame.
    pub fn track(&self, source: NodeId) {
        let mut frames = self.frames.borrow_mut();
        if let Some(frame) = frames.last_mut() {
            if frame.observer.is_some() && !frame.sources.contains(&source) {
                frame.sources.push(source);
            }
        }
    }

    /// Depth of the frame stack.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    fn pop(&self, observer: Option<NodeId>) -> Sources {
        let popped = self.frames.borrow_mut().pop();
        match popped {
            Some(frame) => {
                debug_assert_eq!(
                    frame.observer, observer,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    observer, frame.observer
                );
                frame.sources
            }
            None => Sources::new(),
        }
    }
}

impl ContextGuard<'_> {
    /// Pop the frame and return the sources read while it was active.
    pub(crate) fn finish(mut self) -> Sources {
        self.done = true;
        self.context.pop(self.observer)
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.context.pop(self.observer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let context = ReactiveContext::new();
        let id = NodeId::fresh();

        assert!(!context.is_tracking());
        assert!(context.current_observer().is_none());

        {
            let _guard = context.enter(Some(id));

            assert!(context.is_tracking());
            assert_eq!(context.current_observer(), Some(id));
        }

        // Frame should be cleaned up after drop
        assert!(!context.is_tracking());
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn context_collects_sources_once() {
        let context = ReactiveContext::new();
        let guard = context.enter(Some(NodeId::fresh()));

        let (a, b) = (NodeId::fresh(), NodeId::fresh());
        context.track(a);
        context.track(b);
        context.track(a);

        assert_eq!(guard.finish().as_slice(), &[a, b]);
    }

    #[test]
    fn nested_contexts() {
        let context = ReactiveContext::new();
        let outer = NodeId::fresh();
        let inner = NodeId::fresh();
        let (s1, s2) = (NodeId::fresh(), NodeId::fresh());

        let outer_guard = context.enter(Some(outer));
        context.track(s1);
        {
            let inner_guard = context.enter(Some(inner));
            assert_eq!(context.current_observer(), Some(inner));
            context.track(s2);
            assert_eq!(inner_guard.finish().as_slice(), &[s2]);
        }

        // After inner frame pops, outer is current and kept its own reads
        assert_eq!(context.current_observer(), Some(outer));
        assert_eq!(outer_guard.finish().as_slice(), &[s1]);
    }

    #[test]
    fn untracked_frame_drops_reads() {
        let context = ReactiveContext::new();
        let outer_guard = context.enter(Some(NodeId::fresh()));

        {
            let untracked = context.enter(None);
            assert!(!context.is_tracking());
            context.track(NodeId::fresh());
            assert!(untracked.finish().is_empty());
        }

        assert!(outer_guard.finish().is_empty());
    }
}
