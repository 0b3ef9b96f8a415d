//! Shapes and their flattened schemas.
//!
//! A [`Shape`] is a named list of declarations with an optional parent.
//! Building a struct needs the flattened view: every key from the root of
//! the inheritance chain down, with the most derived declaration winning.
//! That view is computed on first use and cached on the shape, so the chain
//! is walked once per shape rather than once per struct.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bridge::Unwrap;
use crate::value::{Object, Value};

use super::decl::{Action, Computed, EffectDecl, FieldDecl, PathRef};
use super::field::Field;
use super::handle::Struct;

/// Keys that never become fields.
pub(crate) const DENYLIST: &[&str] = &["constructor", "__proto__"];

/// Keys with this prefix are stored on the struct without reactivity.
pub(crate) const PASSTHROUGH_PREFIX: char = '_';

pub(crate) fn is_denied(key: &str) -> bool {
    DENYLIST.contains(&key)
}

/// A named, possibly inherited struct declaration.
///
/// Cloning is cheap and clones share the cached schema.
#[derive(Clone)]
pub struct Shape {
    inner: Rc<ShapeInner>,
}

struct ShapeInner {
    name: String,
    parent: Option<Shape>,
    decls: Vec<(String, FieldDecl)>,
    schema: OnceCell<Rc<Schema>>,
}

/// The flattened declarations of a shape, in declaration order.
#[derive(Debug)]
pub struct Schema {
    name: String,
    entries: IndexMap<String, FieldDecl>,
}

/// Builder for [`Shape`].
pub struct ShapeBuilder {
    name: String,
    parent: Option<Shape>,
    decls: Vec<(String, FieldDecl)>,
}

impl Shape {
    pub fn builder(name: impl Into<String>) -> ShapeBuilder {
        ShapeBuilder {
            name: name.into(),
            parent: None,
            decls: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Shape> {
        self.inner.parent.as_ref()
    }

    /// The flattened schema, computed once per shape.
    pub fn schema(&self) -> Rc<Schema> {
        Rc::clone(self.inner.schema.get_or_init(|| Rc::new(Schema::flatten(self))))
    }

    pub fn ptr_eq(&self, other: &Shape) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("name", &self.inner.name)
            .field("parent", &self.inner.parent.as_ref().map(Shape::name))
            .field("decls", &self.inner.decls.len())
            .finish()
    }
}

impl ShapeBuilder {
    /// Inherit every declaration of `parent`. Keys declared here win.
    pub fn extends(mut self, parent: &Shape) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Declare `key` with any declaration kind.
    pub fn field(mut self, key: impl Into<String>, decl: impl Into<FieldDecl>) -> Self {
        self.decls.push((key.into(), decl.into()));
        self
    }

    /// Declare a plain field.
    pub fn value(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(key, FieldDecl::Plain(value.into()))
    }

    /// Declare a field backed by an existing cell or derivation.
    pub fn bind(self, key: impl Into<String>, field: impl Into<Field>) -> Self {
        self.field(key, FieldDecl::Bound(field.into()))
    }

    pub fn computed(self, key: impl Into<String>, computed: Computed) -> Self {
        self.field(key, computed)
    }

    pub fn action(self, key: impl Into<String>, action: Action) -> Self {
        self.field(key, action)
    }

    pub fn effect(self, key: impl Into<String>, effect: EffectDecl) -> Self {
        self.field(key, effect)
    }

    pub fn alias(self, key: impl Into<String>, target: impl Into<String>) -> Self {
        self.field(key, FieldDecl::alias(target))
    }

    pub fn alias_of(self, key: impl Into<String>, of: &Struct, target: impl Into<String>) -> Self {
        self.field(key, FieldDecl::alias_of(of, target))
    }

    pub fn mirror_from(self, key: impl Into<String>, path: PathRef) -> Self {
        self.field(key, FieldDecl::mirror_from(path))
    }

    pub fn unwrap(self, key: impl Into<String>, unwrap: Unwrap) -> Self {
        self.field(key, FieldDecl::unwrap(unwrap))
    }

    pub fn flag(self, key: impl Into<String>, source: impl Into<String>, mask: i64) -> Self {
        self.field(key, FieldDecl::flag(source, mask))
    }

    pub fn build(self) -> Shape {
        Shape {
            inner: Rc::new(ShapeInner {
                name: self.name,
                parent: self.parent,
                decls: self.decls,
                schema: OnceCell::new(),
            }),
        }
    }
}

impl Schema {
    fn flatten(shape: &Shape) -> Self {
        let mut chain = Vec::new();
        let mut current = Some(shape);
        while let Some(shape) = current {
            chain.push(shape);
            current = shape.parent();
        }

        let mut entries = IndexMap::new();
        for shape in chain.into_iter().rev() {
            for (key, decl) in &shape.inner.decls {
                if is_denied(key) {
                    tracing::warn!(shape = shape.name(), key = %key, "skipping reserved key");
                    continue;
                }
                entries.insert(key.clone(), decl.clone());
            }
        }

        tracing::trace!(shape = shape.name(), fields = entries.len(), "schema flattened");
        Self {
            name: shape.name().to_owned(),
            entries,
        }
    }

    /// Schema of a plain object: every entry is a plain field.
    pub(crate) fn from_object(object: Object) -> Self {
        let entries = object
            .into_iter()
            .filter(|(key, _)| {
                let denied = is_denied(key);
                if denied {
                    tracing::warn!(key = %key, "skipping reserved key");
                }
                !denied
            })
            .map(|(key, value)| (key, FieldDecl::Plain(value)))
            .collect();

        Self {
            name: "Object".to_owned(),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FieldDecl> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &FieldDecl)> {
        self.entries.iter()
    }
}
