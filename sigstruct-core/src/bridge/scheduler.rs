//! Where bridge tasks run.

use futures_util::future::LocalBoxFuture;

/// Spawns the tasks that drain async sources into cells.
///
/// Tasks are `!Send`: they hold handles into a single-threaded runtime.
pub trait Scheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) -> TaskHandle;
}

/// Lets the owner of a spawned task stop it early.
#[derive(Default)]
pub struct TaskHandle {
    abort: Option<Box<dyn FnOnce()>>,
}

impl TaskHandle {
    pub fn new(abort: impl FnOnce() + 'static) -> Self {
        Self {
            abort: Some(Box::new(abort)),
        }
    }

    /// A handle that cannot abort anything.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn abort(mut self) {
        if let Some(abort) = self.abort.take() {
            abort();
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("abortable", &self.abort.is_some())
            .finish()
    }
}

/// Spawns onto the current [`tokio::task::LocalSet`].
///
/// Building a struct with async fields outside a `LocalSet` panics, the
/// same way `tokio::task::spawn_local` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn spawn(&self, task: LocalBoxFuture<'static, ()>) -> TaskHandle {
        let handle = tokio::task::spawn_local(task);
        TaskHandle::new(move || handle.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn abort_runs_once() {
        let aborted = Rc::new(Cell::new(0));
        let seen = Rc::clone(&aborted);
        TaskHandle::new(move || seen.set(seen.get() + 1)).abort();
        assert_eq!(aborted.get(), 1);

        TaskHandle::detached().abort();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tokio_scheduler_aborts() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let finished = Rc::new(Cell::new(false));
                let flag = Rc::clone(&finished);
                let handle = TokioScheduler.spawn(
                    async move {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        flag.set(true);
                    }
                    .boxed_local(),
                );
                handle.abort();
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                assert!(!finished.get());
            })
            .await;
    }
}
