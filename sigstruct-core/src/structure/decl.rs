//! Field declarations.
//!
//! A shape is a list of `(key, FieldDecl)` pairs. The declaration kind is
//! decided once, when the shape is written, so the transformer only has to
//! match on it.

use std::fmt;
use std::rc::Rc;

use crate::bridge::Unwrap;
use crate::error::Result;
use crate::reactive::{Cleanup, Memo, Signal};
use crate::value::Value;

use super::field::Field;
use super::handle::Struct;

pub(crate) type GetFn = Rc<dyn Fn(&Struct) -> Result<Value>>;
pub(crate) type SetFn = Rc<dyn Fn(&Struct, Value) -> Result<()>>;
pub(crate) type ActionFn = Rc<dyn Fn(&Struct, &[Value]) -> Result<Value>>;
pub(crate) type EffectFn = Rc<dyn Fn(&Struct) -> Cleanup>;

/// How one key of a shape becomes part of a struct.
#[derive(Clone)]
pub enum FieldDecl {
    /// A new cell seeded with the value.
    Plain(Value),
    /// An existing cell or derivation, shared with whoever else holds it.
    Bound(Field),
    /// A derivation over the struct's other fields.
    Computed(Computed),
    /// A method, callable through [`Struct::call`].
    Action(Action),
    /// A reaction, started once the struct is fully built.
    Effect(EffectDecl),
    /// The same backing store as another field.
    Alias { target: AliasTarget, key: String },
    /// A field bound lazily to a path on another object graph.
    From(PathRef),
    /// A cell fed by an async source.
    Unwrap(Unwrap),
    /// A boolean view of the bits `mask` of the integer field `source`.
    Flag { source: String, mask: i64 },
}

impl FieldDecl {
    /// Alias another field of the same struct.
    pub fn alias(key: impl Into<String>) -> Self {
        Self::Alias {
            target: AliasTarget::This,
            key: key.into(),
        }
    }

    /// Alias a field of another, already built struct.
    pub fn alias_of(target: &Struct, key: impl Into<String>) -> Self {
        Self::Alias {
            target: AliasTarget::Struct(target.clone()),
            key: key.into(),
        }
    }

    /// Bind to `root.a.b.c`, resolving once the path is populated.
    pub fn mirror_from(path: PathRef) -> Self {
        Self::From(path)
    }

    pub fn unwrap(unwrap: Unwrap) -> Self {
        Self::Unwrap(unwrap)
    }

    pub fn flag(source: impl Into<String>, mask: i64) -> Self {
        Self::Flag {
            source: source.into(),
            mask,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Self::Plain(_) => "plain",
            Self::Bound(_) => "bound",
            Self::Computed(_) => "computed",
            Self::Action(_) => "action",
            Self::Effect(_) => "effect",
            Self::Alias { .. } => "alias",
            Self::From(_) => "from",
            Self::Unwrap(_) => "unwrap",
            Self::Flag { .. } => "flag",
        }
    }
}

impl fmt::Debug for FieldDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Alias { target, key } => f
                .debug_struct("Alias")
                .field("target", target)
                .field("key", key)
                .finish(),
            Self::Flag { source, mask } => f
                .debug_struct("Flag")
                .field("source", source)
                .field("mask", mask)
                .finish(),
            other => f.write_str(other.kind_name()),
        }
    }
}

impl From<Value> for FieldDecl {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

impl From<Field> for FieldDecl {
    fn from(field: Field) -> Self {
        Self::Bound(field)
    }
}

impl From<Signal<Value>> for FieldDecl {
    fn from(signal: Signal<Value>) -> Self {
        Self::Bound(Field::Cell(signal))
    }
}

impl From<Memo<Value>> for FieldDecl {
    fn from(memo: Memo<Value>) -> Self {
        Self::Bound(Field::Derived(memo))
    }
}

impl From<Computed> for FieldDecl {
    fn from(computed: Computed) -> Self {
        Self::Computed(computed)
    }
}

impl From<Action> for FieldDecl {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

impl From<EffectDecl> for FieldDecl {
    fn from(effect: EffectDecl) -> Self {
        Self::Effect(effect)
    }
}

impl From<PathRef> for FieldDecl {
    fn from(path: PathRef) -> Self {
        Self::From(path)
    }
}

impl From<Unwrap> for FieldDecl {
    fn from(unwrap: Unwrap) -> Self {
        Self::Unwrap(unwrap)
    }
}

/// Where an alias looks for its target.
#[derive(Clone)]
pub enum AliasTarget {
    /// The struct being built. Resolved after every other field exists.
    This,
    Struct(Struct),
}

impl fmt::Debug for AliasTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::This => f.write_str("This"),
            Self::Struct(s) => write!(f, "Struct({})", s.shape_name()),
        }
    }
}

/// A derived field.
///
/// ```rust,ignore
/// let full = Computed::new(|s| {
///     let first = s.require("first")?;
///     let last = s.require("last")?;
///     Ok(format!("{} {}", first.as_str().unwrap_or(""), last.as_str().unwrap_or("")).into())
/// })
/// .nullable();
/// ```
#[derive(Clone)]
pub struct Computed {
    pub(crate) get: GetFn,
    pub(crate) set: Option<SetFn>,
    pub(crate) nullable: bool,
    pub(crate) keep: bool,
}

impl Computed {
    pub fn new(get: impl Fn(&Struct) -> Result<Value> + 'static) -> Self {
        Self {
            get: Rc::new(get),
            set: None,
            nullable: false,
            keep: false,
        }
    }

    /// Make the field writable through `set`.
    pub fn with_setter(mut self, set: impl Fn(&Struct, Value) -> Result<()> + 'static) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    /// A missing dependency reads as `Undefined` instead of failing.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Like [`Computed::nullable`], but a missing dependency keeps the last
    /// value that was computed successfully.
    pub fn keep(mut self) -> Self {
        self.nullable = true;
        self.keep = true;
        self
    }
}

/// A method on a struct.
#[derive(Clone)]
pub struct Action {
    pub(crate) run: ActionFn,
    pub(crate) batched: bool,
}

impl Action {
    pub fn new(run: impl Fn(&Struct, &[Value]) -> Result<Value> + 'static) -> Self {
        Self {
            run: Rc::new(run),
            batched: false,
        }
    }

    /// An action whose body runs inside a batch, so its writes are
    /// observed by effects all at once.
    pub fn batched(run: impl Fn(&Struct, &[Value]) -> Result<Value> + 'static) -> Self {
        Self {
            run: Rc::new(run),
            batched: true,
        }
    }
}

/// A reaction declared on a shape.
#[derive(Clone)]
pub struct EffectDecl {
    pub(crate) run: EffectFn,
    pub(crate) tracked: bool,
}

impl EffectDecl {
    pub fn new<C>(run: impl Fn(&Struct) -> C + 'static) -> Self
    where
        C: Into<Cleanup>,
    {
        Self {
            run: Rc::new(move |s| run(s).into()),
            tracked: true,
        }
    }

    /// A reaction that runs once at start-up and tracks nothing.
    pub fn init<C>(run: impl Fn(&Struct) -> C + 'static) -> Self
    where
        C: Into<Cleanup>,
    {
        Self {
            run: Rc::new(move |s| run(s).into()),
            tracked: false,
        }
    }
}

/// A path into another object graph: `root.path[0].path[1]...`.
#[derive(Clone, Debug)]
pub struct PathRef {
    pub(crate) root: Value,
    pub(crate) path: Vec<String>,
}

impl PathRef {
    pub fn new(root: impl Into<Value>) -> Self {
        Self {
            root: root.into(),
            path: Vec::new(),
        }
    }

    /// Parse a dotted path such as `"user.address.city"`.
    pub fn parse(root: impl Into<Value>, path: &str) -> Self {
        Self {
            root: root.into(),
            path: path
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.path.push(key.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.path
    }
}
