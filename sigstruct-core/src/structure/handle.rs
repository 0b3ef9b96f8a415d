//! The struct handle.
//!
//! A [`Struct`] owns a fixed, ordered map from field name to backing store,
//! plus the non-reactive passthrough storage, the actions, and the effects
//! started for it. Cloning the handle shares the struct; identity is the
//! pointer.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::reactive::{Dispose, Effect, Runtime};
use crate::value::Value;

use super::decl::{Action, EffectDecl};
use super::field::Field;
use super::props::{Prop, Props};
use super::shape::PASSTHROUGH_PREFIX;

#[derive(Clone)]
pub struct Struct {
    pub(crate) inner: Rc<StructInner>,
}

pub(crate) struct StructInner {
    pub(crate) rt: Runtime,
    pub(crate) shape: String,

    /// Reactive fields, in declaration order. Fixed once built.
    pub(crate) fields: RefCell<IndexMap<String, Field>>,

    /// `_`-prefixed values, stored as-is.
    pub(crate) plain: RefCell<IndexMap<String, Value>>,

    pub(crate) actions: RefCell<IndexMap<String, Action>>,

    /// Declared reactions, startable once each.
    pub(crate) effect_decls: RefCell<IndexMap<String, EffectDecl>>,

    /// Effects started for this struct, by declaration key.
    pub(crate) effects: RefCell<IndexMap<String, Effect>>,

    /// Effects created by resolved mirrors.
    pub(crate) links: RefCell<Vec<Effect>>,

    /// Alias key to target key.
    pub(crate) aliases: RefCell<IndexMap<String, String>>,
}

impl Struct {
    pub(crate) fn from_weak(weak: &Weak<StructInner>) -> Result<Self> {
        weak.upgrade()
            .map(|inner| Self { inner })
            .ok_or(Error::StructDropped)
    }

    pub(crate) fn downgrade(&self) -> Weak<StructInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.rt
    }

    pub fn shape_name(&self) -> &str {
        &self.inner.shape
    }

    /// Whether both handles refer to the same struct.
    pub fn ptr_eq(&self, other: &Struct) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The backing store of `key`, for binding it into another struct.
    pub fn field(&self, key: &str) -> Option<Field> {
        self.inner.fields.borrow().get(key).cloned()
    }

    /// Reactive field names, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.fields.borrow().keys().cloned().collect()
    }

    /// Whether `key` is a field, passthrough value, or action.
    pub fn has(&self, key: &str) -> bool {
        self.inner.fields.borrow().contains_key(key)
            || self.inner.plain.borrow().contains_key(key)
            || self.inner.actions.borrow().contains_key(key)
    }

    /// The key `alias` was declared to share, if it is an alias.
    pub fn alias_target(&self, alias: &str) -> Option<String> {
        self.inner.aliases.borrow().get(alias).cloned()
    }

    /// Read a field, tracking the read.
    pub fn get(&self, key: &str) -> Result<Value> {
        match self.field(key) {
            Some(field) => field.get(),
            None => self.get_passthrough(key),
        }
    }

    pub fn get_untracked(&self, key: &str) -> Result<Value> {
        match self.field(key) {
            Some(field) => field.get_untracked(),
            None => self.get_passthrough(key),
        }
    }

    fn get_passthrough(&self, key: &str) -> Result<Value> {
        if let Some(value) = self.inner.plain.borrow().get(key) {
            return Ok(value.clone());
        }
        if self.inner.rt.config().strict_reads {
            Err(Error::UnknownField(key.to_owned()))
        } else {
            Ok(Value::Undefined)
        }
    }

    /// Read a field that must be present.
    ///
    /// A `null` or `undefined` value fails with
    /// [`Error::MissingDependency`], which a nullable getter turns back into
    /// `undefined`.
    pub fn require(&self, key: &str) -> Result<Value> {
        let value = self.get(key)?;
        if value.is_nullish() {
            return Err(Error::MissingDependency(key.to_owned()));
        }
        Ok(value)
    }

    /// Read a field that must be truthy, failing with
    /// [`Error::FalseDependency`] otherwise.
    pub fn require_truthy(&self, key: &str) -> Result<Value> {
        let value = self.get(key)?;
        if !value.is_truthy() {
            return Err(Error::FalseDependency(key.to_owned()));
        }
        Ok(value)
    }

    /// Write a field.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        match self.field(key) {
            Some(field) => field.set(value).map_err(|err| match err {
                Error::ReadOnly(_) => Error::ReadOnly(key.to_owned()),
                other => other,
            }),
            None => {
                if key.starts_with(PASSTHROUGH_PREFIX) {
                    self.inner.plain.borrow_mut().insert(key.to_owned(), value);
                    Ok(())
                } else {
                    Err(Error::UnknownField(key.to_owned()))
                }
            }
        }
    }

    /// Write a field from its current (untracked) value.
    pub fn update(&self, key: &str, f: impl FnOnce(&Value) -> Value) -> Result<()> {
        let current = self.get_untracked(key)?;
        self.set(key, f(&current))
    }

    /// Call an action.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let action = self
            .inner
            .actions
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAction(name.to_owned()))?;

        if action.batched {
            self.inner.rt.batch(|| (action.run)(self, args))
        } else {
            (action.run)(self, args)
        }
    }

    /// Start the reaction declared under `key`.
    ///
    /// Construction starts every declared reaction once; starting one again
    /// fails with [`Error::EffectAlreadyStarted`].
    pub fn start_effect(&self, key: &str) -> Result<Effect> {
        let decl = self
            .inner
            .effect_decls
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::UnknownField(key.to_owned()))?;

        if self.inner.effects.borrow().contains_key(key) {
            return Err(Error::EffectAlreadyStarted(key.to_owned()));
        }

        let weak = self.downgrade();
        let run = decl.run;
        let effect = Effect::new_lazy(
            &self.inner.rt,
            move || match Struct::from_weak(&weak) {
                Ok(this) => run(&this),
                Err(_) => Default::default(),
            },
            decl.tracked,
        );
        self.inner
            .effects
            .borrow_mut()
            .insert(key.to_owned(), effect.clone());

        tracing::debug!(shape = %self.inner.shape, effect = key, "starting effect");
        effect.run()?;
        Ok(effect)
    }

    /// The effect registered under `key`, if it has been started.
    pub fn effect(&self, key: &str) -> Option<Effect> {
        self.inner.effects.borrow().get(key).cloned()
    }

    /// Every effect this struct owns.
    pub fn effects(&self) -> Vec<Effect> {
        let mut effects: Vec<Effect> = self.inner.effects.borrow().values().cloned().collect();
        effects.extend(self.inner.links.borrow().iter().cloned());
        effects
    }

    /// Apply overrides to an already built struct.
    ///
    /// Plain values are written through their fields, objects deep-merged
    /// into object values. A bound field contributes its current value;
    /// the backing store of a built struct never changes.
    pub fn merge(&self, props: Props) -> Result<()> {
        self.inner.rt.batch(|| {
            for (key, prop) in props.into_entries() {
                let value = match prop {
                    Prop::Value(value) => value,
                    Prop::Bind(field) => field.get_untracked()?,
                };
                self.merge_value(&key, value)?;
            }
            Ok(())
        })
    }

    pub(crate) fn merge_value(&self, key: &str, value: Value) -> Result<()> {
        let current = match self.field(key) {
            Some(field) => field.get_untracked().ok(),
            None => self.inner.plain.borrow().get(key).cloned(),
        };

        match current {
            Some(mut merged @ Value::Object(_)) if matches!(value, Value::Object(_)) => {
                merged.deep_merge(value);
                self.set(key, merged)
            }
            _ => self.set(key, value),
        }
    }

    /// Untracked JSON view of every field.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(Value::Struct(self.clone())).unwrap_or(serde_json::Value::Null)
    }

    /// Dispose every effect of this struct.
    pub fn dispose(&self) {
        for effect in self.effects() {
            effect.dispose();
        }
    }
}

impl Dispose for Struct {
    fn dispose(&self) {
        Struct::dispose(self);
    }
}

impl Drop for StructInner {
    fn drop(&mut self) {
        // The effects only hold a weak handle, so they cannot run anymore.
        let effects: Vec<Effect> = self
            .effects
            .get_mut()
            .values()
            .cloned()
            .chain(self.links.get_mut().drain(..))
            .collect();
        for effect in effects {
            effect.dispose();
        }
    }
}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Struct")
            .field("shape", &self.inner.shape)
            .field("fields", &self.keys())
            .field("effects", &self.inner.effects.borrow().len())
            .finish()
    }
}
