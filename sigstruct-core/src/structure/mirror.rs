//! Lazily resolved path bindings.
//!
//! A `From` field starts out `undefined`. At start-up an effect walks the
//! path, reading through structs with tracking, so it re-runs whenever an
//! intermediate field changes. Once the terminal resolves the walker
//! disposes itself and:
//!
//! - if the terminal is a field of a struct, two mirror effects keep that
//!   field and ours equal in both directions;
//! - if it is plain data, the value is copied once.

use crate::reactive::Effect;
use crate::value::Value;

use super::decl::PathRef;
use super::field::Field;
use super::handle::Struct;

enum Resolved {
    Field(Field),
    Value(Value),
}

impl Struct {
    pub(crate) fn start_mirror(&self, key: &str, path: PathRef) {
        let weak = self.downgrade();
        let walker_key = key.to_owned();

        let walker = Effect::new_lazy(
            self.runtime(),
            move || {
                if let Ok(this) = Struct::from_weak(&weak) {
                    this.walk(&walker_key, &path);
                }
            },
            true,
        );
        self.inner
            .effects
            .borrow_mut()
            .insert(key.to_owned(), walker.clone());

        tracing::debug!(shape = self.shape_name(), field = key, "waiting for mirror path");
        if let Err(err) = walker.run() {
            tracing::warn!(field = key, error = %err, "mirror walker did not start");
        }
    }

    fn walk(&self, key: &str, path: &PathRef) {
        let Some(resolved) = resolve(path) else {
            return;
        };

        // The walker is done once the path resolves.
        let walker = self.inner.effects.borrow_mut().shift_remove(key);
        if let Some(walker) = walker {
            walker.dispose();
        }

        match resolved {
            Resolved::Field(target) => self.link(key, target),
            Resolved::Value(value) => {
                if let Err(err) = self.set(key, value) {
                    tracing::warn!(field = key, error = %err, "mirror copy failed");
                }
            }
        }
    }

    /// Keep `key` and `target` equal in both directions.
    ///
    /// The target-to-field direction starts first, so the field takes the
    /// target's value; the other direction then writes back an equal value,
    /// which is a no-op.
    fn link(&self, key: &str, target: Field) {
        let Some(mine) = self.field(key) else {
            return;
        };
        tracing::debug!(shape = self.shape_name(), field = key, "mirror linked");

        let (from, to) = (target.clone(), mine.clone());
        let inbound = Effect::new_lazy(
            self.runtime(),
            move || match from.get() {
                Ok(value) => {
                    if let Err(err) = to.set(value) {
                        tracing::warn!(error = %err, "mirror write failed");
                    }
                }
                Err(err) => tracing::debug!(error = %err, "mirror source unavailable"),
            },
            true,
        );

        let outbound = Effect::new_lazy(
            self.runtime(),
            move || match mine.get() {
                Ok(value) => {
                    if let Err(err) = target.set(value) {
                        tracing::warn!(error = %err, "mirror write-back failed");
                    }
                }
                Err(err) => tracing::debug!(error = %err, "mirror field unavailable"),
            },
            true,
        );

        self.inner
            .links
            .borrow_mut()
            .extend([inbound.clone(), outbound.clone()]);

        for effect in [inbound, outbound] {
            if let Err(err) = effect.run() {
                tracing::warn!(field = key, error = %err, "mirror effect did not start");
            }
        }
    }
}

/// Walk `path` from its root. `None` while any step is still missing.
fn resolve(path: &PathRef) -> Option<Resolved> {
    let Some((last, init)) = path.path.split_last() else {
        return present(path.root.clone()).map(Resolved::Value);
    };

    let mut current = path.root.clone();
    for segment in init {
        current = present(step(&current, segment)?)?;
    }

    match &current {
        Value::Struct(s) => s.field(last).map(Resolved::Field),
        Value::Object(map) => map.get(last).cloned().and_then(present).map(Resolved::Value),
        _ => None,
    }
}

fn step(current: &Value, segment: &str) -> Option<Value> {
    match current {
        Value::Struct(s) => s.get(segment).ok(),
        Value::Object(map) => map.get(segment).cloned(),
        _ => None,
    }
}

fn present(value: Value) -> Option<Value> {
    if value.is_nullish() {
        None
    } else {
        Some(value)
    }
}
