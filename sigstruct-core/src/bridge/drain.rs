use std::cell::Cell;
use std::rc::Rc;

use futures_util::{FutureExt, StreamExt};

use crate::reactive::{Cleanup, Effect, Signal};
use crate::structure::Struct;
use crate::value::Value;

use super::source::{Item, Job, Pending, Transform};

/// Drive `cell` from `pending` for as long as the struct lives.
///
/// The bridge is a tracked effect registered under `key`. Each run starts
/// the source and spawns a task that writes its results into the cell. When
/// the effect re-runs or is disposed, the previous task is cancelled, and
/// anything it produces afterwards is dropped.
pub(crate) fn start(this: &Struct, key: &str, cell: Signal<Value>, pending: Pending) {
    let scheduler = this.runtime().scheduler();
    let field = key.to_owned();

    let bridge = Effect::new_lazy(
        this.runtime(),
        move || {
            let Some(job) = pending.start() else {
                return Cleanup::none();
            };

            let cancelled = Rc::new(Cell::new(false));
            let task = drain(
                job,
                cell.clone(),
                pending.transform.clone(),
                Rc::clone(&cancelled),
                field.clone(),
            );
            let handle = scheduler.spawn(task.boxed_local());

            Cleanup::new(move || {
                cancelled.set(true);
                handle.abort();
            })
        },
        true,
    );

    this.inner
        .effects
        .borrow_mut()
        .insert(key.to_owned(), bridge.clone());

    tracing::debug!(shape = this.shape_name(), field = key, "async bridge started");
    if let Err(err) = bridge.run() {
        tracing::warn!(field = key, error = %err, "async bridge did not start");
    }
}

async fn drain(
    job: Job,
    cell: Signal<Value>,
    transform: Option<Transform>,
    cancelled: Rc<Cell<bool>>,
    field: String,
) {
    match job {
        Job::Future(future) => {
            let item = future.await;
            deliver(&cell, transform.as_ref(), &cancelled, &field, item);
        }
        Job::Stream(mut stream) => {
            while let Some(item) = stream.next().await {
                if cancelled.get() {
                    break;
                }
                deliver(&cell, transform.as_ref(), &cancelled, &field, item);
            }
            tracing::trace!(field = %field, "async source exhausted");
        }
    }
}

fn deliver(
    cell: &Signal<Value>,
    transform: Option<&Transform>,
    cancelled: &Cell<bool>,
    field: &str,
    item: Item,
) {
    if cancelled.get() {
        tracing::trace!(field, "dropping result of cancelled source");
        return;
    }

    let value = match item {
        Ok(value) => match transform {
            Some(transform) => transform(value),
            None => value,
        },
        Err(err) => {
            tracing::debug!(field, error = %err, "async source failed");
            Value::Error(Rc::from(err))
        }
    };
    cell.set(value);
}
