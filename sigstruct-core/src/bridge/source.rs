//! Async sources and the unwrap marker.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use futures_util::stream::{LocalBoxStream, Stream};
use futures_util::{FutureExt, StreamExt};

use crate::error::{BoxError, Error, Result};
use crate::value::Value;

/// One result produced by an async source.
pub type Item = std::result::Result<Value, BoxError>;

pub type ValueFuture = LocalBoxFuture<'static, Item>;
pub type ValueStream = LocalBoxStream<'static, Item>;

/// Maps every successful item before it is written to the cell.
pub type Transform = Rc<dyn Fn(Value) -> Value>;

/// Something that produces values asynchronously.
#[derive(Clone)]
pub enum AsyncSource {
    /// Called on every run of the bridge; its future's output is written once.
    Future(Rc<dyn Fn() -> ValueFuture>),
    /// Called on every run of the bridge; every item is written.
    Generator(Rc<dyn Fn() -> ValueStream>),
    /// A single stream. The first struct built from it consumes it.
    Iterable(Rc<RefCell<Option<ValueStream>>>),
}

impl AsyncSource {
    /// A function returning a future.
    pub fn future<F, Fut, T, E>(factory: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + 'static,
        T: Into<Value>,
        E: Into<BoxError>,
    {
        Self::Future(Rc::new(move || {
            factory()
                .map(|result| result.map(Into::into).map_err(Into::into))
                .boxed_local()
        }))
    }

    /// A function returning a stream.
    pub fn generator<F, S, T, E>(factory: F) -> Self
    where
        F: Fn() -> S + 'static,
        S: Stream<Item = std::result::Result<T, E>> + 'static,
        T: Into<Value>,
        E: Into<BoxError>,
    {
        Self::Generator(Rc::new(move || {
            factory()
                .map(|result| result.map(Into::into).map_err(Into::into))
                .boxed_local()
        }))
    }

    /// A stream that can be drained only once.
    pub fn iterable<S, T, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<T, E>> + 'static,
        T: Into<Value>,
        E: Into<BoxError>,
    {
        let stream = stream
            .map(|result| result.map(Into::into).map_err(Into::into))
            .boxed_local();
        Self::Iterable(Rc::new(RefCell::new(Some(stream))))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Future(_) => "future",
            Self::Generator(_) => "generator",
            Self::Iterable(_) => "iterable",
        }
    }
}

impl fmt::Debug for AsyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncSource::{}", self.kind_name())
    }
}

/// Field marker: feed a cell from an async source.
///
/// ```rust,ignore
/// let shape = Shape::builder("User")
///     .unwrap("profile", Unwrap::new(AsyncSource::future(fetch_profile)).initial(Value::Null))
///     .build();
/// ```
#[derive(Clone)]
pub struct Unwrap {
    pub(crate) source: AsyncSource,
    pub(crate) transform: Option<Transform>,
    pub(crate) initial: Value,
}

impl Unwrap {
    pub fn new(source: AsyncSource) -> Self {
        Self {
            source,
            transform: None,
            initial: Value::Undefined,
        }
    }

    /// Value of the cell until the source produces something.
    pub fn initial(mut self, initial: impl Into<Value>) -> Self {
        self.initial = initial.into();
        self
    }

    pub fn transform(mut self, transform: impl Fn(Value) -> Value + 'static) -> Self {
        self.transform = Some(Rc::new(transform));
        self
    }

    /// Claim what one struct needs to drive this source.
    ///
    /// Iterables are taken here, so a second struct built from the same
    /// marker fails at construction instead of silently never updating.
    pub(crate) fn prepare(&self, key: &str) -> Result<Pending> {
        let producer = match &self.source {
            AsyncSource::Future(factory) => Producer::Future(Rc::clone(factory)),
            AsyncSource::Generator(factory) => Producer::Generator(Rc::clone(factory)),
            AsyncSource::Iterable(slot) => {
                let stream = slot.borrow_mut().take().ok_or_else(|| {
                    Error::UnsupportedAsyncSource(format!(
                        "iterable for `{key}` was already consumed"
                    ))
                })?;
                Producer::Once(RefCell::new(Some(stream)))
            }
        };

        Ok(Pending {
            producer,
            transform: self.transform.clone(),
        })
    }
}

impl fmt::Debug for Unwrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unwrap")
            .field("source", &self.source)
            .field("transform", &self.transform.is_some())
            .field("initial", &self.initial)
            .finish()
    }
}

pub(crate) enum Producer {
    Future(Rc<dyn Fn() -> ValueFuture>),
    Generator(Rc<dyn Fn() -> ValueStream>),
    Once(RefCell<Option<ValueStream>>),
}

/// A source claimed by one struct field.
pub(crate) struct Pending {
    producer: Producer,
    pub(crate) transform: Option<Transform>,
}

/// The work one bridge run hands to the scheduler.
pub(crate) enum Job {
    Future(ValueFuture),
    Stream(ValueStream),
}

impl Pending {
    /// Start the source. Called inside the bridge effect, so whatever the
    /// factory reads becomes a dependency of the bridge.
    pub(crate) fn start(&self) -> Option<Job> {
        match &self.producer {
            Producer::Future(factory) => Some(Job::Future(factory())),
            Producer::Generator(factory) => Some(Job::Stream(factory())),
            Producer::Once(slot) => slot.borrow_mut().take().map(Job::Stream),
        }
    }
}
