//! Turning a shape or a plain object into a [`Struct`].
//!
//! Construction runs in one batch:
//!
//! 1. every schema entry is declared in order, with `Bind` overrides taking
//!    the place of the declared store;
//! 2. aliases within the struct are resolved, transitively;
//! 3. the remaining overrides are merged in;
//! 4. start-up tasks (declared reactions, mirrors, async bridges) are
//!    queued on the runtime and run when the outermost batch closes.
//!
//! Nothing is queued if any step fails.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bridge;
use crate::error::{Error, Result};
use crate::reactive::{InitTask, Runtime};
use crate::value::Value;

use super::decl::{AliasTarget, Computed, FieldDecl};
use super::field::Field;
use super::handle::{Struct, StructInner};
use super::props::{Prop, Props};
use super::shape::{Schema, Shape, PASSTHROUGH_PREFIX};

/// Anything a struct can be built from.
pub enum Source {
    Shape(Shape),
    /// Must be an object (or a struct, which is returned as is).
    Value(Value),
    Struct(Struct),
}

impl From<Shape> for Source {
    fn from(shape: Shape) -> Self {
        Self::Shape(shape)
    }
}

impl From<&Shape> for Source {
    fn from(shape: &Shape) -> Self {
        Self::Shape(shape.clone())
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<serde_json::Value> for Source {
    fn from(json: serde_json::Value) -> Self {
        Self::Value(json.into())
    }
}

impl From<Struct> for Source {
    fn from(s: Struct) -> Self {
        Self::Struct(s)
    }
}

impl From<&Struct> for Source {
    fn from(s: &Struct) -> Self {
        Self::Struct(s.clone())
    }
}

impl Runtime {
    /// Build a struct from `source`, applying `props` on top.
    ///
    /// An existing struct is returned unchanged, after merging `props`
    /// into it if there are any.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if `source` is a value other than an object
    /// - [`Error::AliasTargetNotFound`] if an alias never resolves
    /// - [`Error::UnsupportedAsyncSource`] if an async iterable was already
    ///   consumed by an earlier construction
    /// - [`Error::UnknownField`] if `props` names a key the struct lacks
    pub fn structure(&self, source: impl Into<Source>, props: Props) -> Result<Struct> {
        let schema = match source.into() {
            Source::Struct(existing) | Source::Value(Value::Struct(existing)) => {
                if !props.is_empty() {
                    existing.merge(props)?;
                }
                return Ok(existing);
            }
            Source::Shape(shape) => shape.schema(),
            Source::Value(Value::Object(object)) => Rc::new(Schema::from_object(object)),
            Source::Value(other) => return Err(Error::InvalidInput(other.type_name())),
        };

        let span = tracing::debug_span!("structure", shape = schema.name());
        let _enter = span.enter();

        self.batch(|| Builder::new(self, &schema, props).build())
    }
}

struct Builder<'a> {
    rt: &'a Runtime,
    schema: &'a Schema,
    props: Props,
    this: Struct,
    aliases: Vec<(String, String)>,
    init: Vec<InitTask>,
}

impl<'a> Builder<'a> {
    fn new(rt: &'a Runtime, schema: &'a Schema, props: Props) -> Self {
        let this = Struct {
            inner: Rc::new(StructInner {
                rt: rt.clone(),
                shape: schema.name().to_owned(),
                fields: RefCell::default(),
                plain: RefCell::default(),
                actions: RefCell::default(),
                effect_decls: RefCell::default(),
                effects: RefCell::default(),
                links: RefCell::default(),
                aliases: RefCell::default(),
            }),
        };

        Self {
            rt,
            schema,
            props,
            this,
            aliases: Vec::new(),
            init: Vec::new(),
        }
    }

    fn build(mut self) -> Result<Struct> {
        let schema = self.schema;
        for (key, decl) in schema.entries() {
            if key.starts_with(PASSTHROUGH_PREFIX) {
                self.declare_passthrough(key, decl);
                continue;
            }
            if let Some(field) = self.props.take_bind(key) {
                self.install(key, field);
                continue;
            }
            self.declare(key, decl)?;
        }

        self.resolve_aliases()?;

        let Builder {
            rt,
            props,
            this,
            init,
            ..
        } = self;

        for (key, prop) in props.into_entries() {
            let value = match prop {
                Prop::Value(value) => value,
                Prop::Bind(field) => field.get_untracked()?,
            };
            this.merge_value(&key, value)?;
        }

        tracing::debug!(
            fields = this.inner.fields.borrow().len(),
            startup = init.len(),
            "struct built"
        );
        for task in init {
            rt.inner.batch.push_init(task);
        }
        Ok(this)
    }

    fn install(&self, key: &str, field: Field) {
        self.this.inner.fields.borrow_mut().insert(key.to_owned(), field);
    }

    fn declare_passthrough(&self, key: &str, decl: &FieldDecl) {
        match decl {
            FieldDecl::Plain(value) => {
                self.this
                    .inner
                    .plain
                    .borrow_mut()
                    .insert(key.to_owned(), value.clone());
            }
            FieldDecl::Action(action) => {
                self.this
                    .inner
                    .actions
                    .borrow_mut()
                    .insert(key.to_owned(), action.clone());
            }
            other => {
                tracing::warn!(key, kind = other.kind_name(), "passthrough key is not a value or action; skipping");
            }
        }
    }

    fn declare(&mut self, key: &str, decl: &FieldDecl) -> Result<()> {
        match decl {
            FieldDecl::Plain(value) => {
                self.install(key, Field::Cell(self.rt.cell(value.clone())));
            }
            FieldDecl::Bound(field) => self.install(key, field.clone()),
            FieldDecl::Computed(computed) => {
                let field = self.computed(computed);
                self.install(key, field);
            }
            FieldDecl::Action(action) => {
                self.this
                    .inner
                    .actions
                    .borrow_mut()
                    .insert(key.to_owned(), action.clone());
            }
            FieldDecl::Effect(effect) => {
                self.this
                    .inner
                    .effect_decls
                    .borrow_mut()
                    .insert(key.to_owned(), effect.clone());
                self.init.push(self.start_effect_task(key));
            }
            FieldDecl::Alias {
                target: AliasTarget::This,
                key: target,
            } => self.aliases.push((key.to_owned(), target.clone())),
            FieldDecl::Alias {
                target: AliasTarget::Struct(other),
                key: target,
            } => {
                let field = other.field(target).ok_or_else(|| Error::AliasTargetNotFound {
                    alias: key.to_owned(),
                    target: target.clone(),
                })?;
                self.install(key, field);
                self.this
                    .inner
                    .aliases
                    .borrow_mut()
                    .insert(key.to_owned(), target.clone());
            }
            FieldDecl::From(path) => {
                self.install(key, Field::Cell(self.rt.cell(Value::Undefined)));

                let weak = self.this.downgrade();
                let (key, path) = (key.to_owned(), path.clone());
                self.init.push(Box::new(move || {
                    if let Ok(this) = Struct::from_weak(&weak) {
                        this.start_mirror(&key, path);
                    }
                }));
            }
            FieldDecl::Unwrap(unwrap) => {
                let pending = unwrap.prepare(key)?;
                let cell = self.rt.cell(unwrap.initial.clone());
                self.install(key, Field::Cell(cell.clone()));

                let weak = self.this.downgrade();
                let key = key.to_owned();
                self.init.push(Box::new(move || {
                    if let Ok(this) = Struct::from_weak(&weak) {
                        bridge::start(&this, &key, cell, pending);
                    }
                }));
            }
            FieldDecl::Flag { source, mask } => {
                let field = self.flag(source, *mask);
                self.install(key, field);
            }
        }
        Ok(())
    }

    fn computed(&self, computed: &Computed) -> Field {
        let weak = self.this.downgrade();
        let get = Rc::clone(&computed.get);
        let (nullable, keep) = (computed.nullable, computed.keep);
        let last = RefCell::new(Value::Undefined);

        let compute = move || -> Result<Value> {
            let this = Struct::from_weak(&weak)?;
            match get(&this) {
                Ok(value) => {
                    if keep {
                        *last.borrow_mut() = value.clone();
                    }
                    Ok(value)
                }
                Err(err) if nullable && err.is_dependency_sentinel() => {
                    tracing::trace!(error = %err, "nullable getter suppressed missing dependency");
                    Ok(if keep {
                        last.borrow().clone()
                    } else {
                        Value::Undefined
                    })
                }
                Err(err) => Err(err),
            }
        };

        match &computed.set {
            Some(set) => {
                let weak = self.this.downgrade();
                let set = Rc::clone(set);
                Field::Derived(self.rt.derive_with_setter(compute, move |value| {
                    set(&Struct::from_weak(&weak)?, value)
                }))
            }
            None => Field::Derived(self.rt.try_derive(compute)),
        }
    }

    fn flag(&self, source: &str, mask: i64) -> Field {
        let (weak_get, weak_set) = (self.this.downgrade(), self.this.downgrade());
        let (source_get, source_set) = (source.to_owned(), source.to_owned());

        let memo = self.rt.derive_with_setter(
            move || {
                let this = Struct::from_weak(&weak_get)?;
                let bits = this.get(&source_get)?.as_i64().unwrap_or(0);
                Ok(Value::Bool(bits & mask != 0))
            },
            move |on: Value| {
                let this = Struct::from_weak(&weak_set)?;
                let bits = this.get_untracked(&source_set)?.as_i64().unwrap_or(0);
                let next = if on.is_truthy() { bits | mask } else { bits & !mask };
                this.set(&source_set, Value::Int(next))
            },
        );
        Field::Derived(memo)
    }

    fn start_effect_task(&self, key: &str) -> InitTask {
        let weak = self.this.downgrade();
        let key = key.to_owned();
        Box::new(move || {
            let Ok(this) = Struct::from_weak(&weak) else {
                return;
            };
            if let Err(err) = this.start_effect(&key) {
                tracing::warn!(shape = this.shape_name(), effect = %key, error = %err, "effect failed to start");
            }
        })
    }

    /// Point every alias at its target's store. Aliases of aliases resolve
    /// over several rounds; a round without progress means a missing
    /// target or a cycle.
    fn resolve_aliases(&mut self) -> Result<()> {
        let mut pending = std::mem::take(&mut self.aliases);

        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|(alias, target)| match self.this.field(target) {
                Some(field) => {
                    self.this.inner.fields.borrow_mut().insert(alias.clone(), field);
                    self.this
                        .inner
                        .aliases
                        .borrow_mut()
                        .insert(alias.clone(), target.clone());
                    false
                }
                None => true,
            });

            if pending.len() == before {
                let (alias, target) = pending.swap_remove(0);
                return Err(Error::AliasTargetNotFound { alias, target });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object;
    use crate::structure::{Action, Computed, EffectDecl};
    use std::cell::Cell;

    #[test]
    fn object_source_becomes_cells() {
        let rt = Runtime::new();
        let s = rt
            .structure(object! { "a" => 1, "b" => "x" }, Props::new())
            .unwrap();

        assert_eq!(s.keys(), ["a", "b"]);
        assert_eq!(s.get("a"), Ok(Value::from(1)));
        s.set("a", 2).unwrap();
        assert_eq!(s.get("a"), Ok(Value::from(2)));
        assert_eq!(s.shape_name(), "Object");
    }

    #[test]
    fn scalar_source_is_rejected() {
        let rt = Runtime::new();
        assert_eq!(
            rt.structure(Value::from(3), Props::new()).unwrap_err(),
            Error::InvalidInput("int")
        );
    }

    #[test]
    fn existing_struct_is_returned_as_is() {
        let rt = Runtime::new();
        let s = rt.structure(object! { "a" => 1 }, Props::new()).unwrap();

        let same = rt.structure(&s, Props::new()).unwrap();
        assert!(same.ptr_eq(&s));

        let merged = rt.structure(&s, Props::new().with("a", 5)).unwrap();
        assert!(merged.ptr_eq(&s));
        assert_eq!(s.get("a"), Ok(Value::from(5)));
    }

    #[test]
    fn passthrough_keys_are_not_reactive() {
        let rt = Runtime::new();
        let shape = Shape::builder("Hidden")
            .value("_secret", 1)
            .value("open", 2)
            .action("_helper", Action::new(|s, _| s.get("_secret")))
            .build();
        let s = rt.structure(&shape, Props::new().with("_secret", 7)).unwrap();

        assert_eq!(s.keys(), ["open"]);
        assert!(s.field("_secret").is_none());
        assert_eq!(s.get("_secret"), Ok(Value::from(7)));
        assert_eq!(s.call("_helper", &[]), Ok(Value::from(7)));
    }

    #[test]
    fn unknown_prop_fails() {
        let rt = Runtime::new();
        let err = rt
            .structure(object! { "a" => 1 }, Props::new().with("b", 2))
            .unwrap_err();
        assert_eq!(err, Error::UnknownField("b".into()));
    }

    #[test]
    fn failed_build_queues_no_startup() {
        let rt = Runtime::new();
        let started = Rc::new(Cell::new(false));
        let flag = started.clone();

        let shape = Shape::builder("Broken")
            .effect("fx", EffectDecl::new(move |_| flag.set(true)))
            .alias("z", "missing")
            .build();

        assert!(matches!(
            rt.structure(&shape, Props::new()),
            Err(Error::AliasTargetNotFound { .. })
        ));
        assert!(!started.get());
        assert_eq!(rt.inner.batch.init_len(), 0);
    }

    #[test]
    fn bind_replaces_computed_declaration() {
        let rt = Runtime::new();
        let shape = Shape::builder("C")
            .computed("x", Computed::new(|_| Ok(Value::from(1))))
            .build();

        let external = rt.cell(Value::from(10));
        let s = rt
            .structure(&shape, Props::new().bind("x", external.clone()))
            .unwrap();

        assert!(s.field("x").unwrap().ptr_eq(&Field::Cell(external.clone())));
        s.set("x", 11).unwrap();
        assert_eq!(external.get(), Value::from(11));
    }
}
