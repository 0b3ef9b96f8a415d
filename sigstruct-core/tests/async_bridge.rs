//! Integration Tests for the Async Bridge
//!
//! Every test drives struct fields from futures and streams on a
//! current-thread tokio runtime inside a `LocalSet`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures_util::stream;
use sigstruct_core::{AsyncSource, BoxError, Error, Props, Runtime, Shape, Struct, Unwrap, Value};
use tokio::task::LocalSet;
use tokio::time::sleep;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Record every value `key` takes, starting with the current one.
fn history(rt: &Runtime, s: &Struct, key: &'static str) -> Rc<RefCell<Vec<Value>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (s, log) = (s.clone(), seen.clone());
    let _effect = rt.react(move || {
        if let Ok(value) = s.get(key) {
            log.borrow_mut().push(value);
        }
    });
    seen
}

/// A resolved future lands in the field, through the transform.
#[tokio::test(flavor = "current_thread")]
async fn future_result_is_written_to_field() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let shape = Shape::builder("Profile")
                .unwrap(
                    "name",
                    Unwrap::new(AsyncSource::future(|| async {
                        sleep(ms(5)).await;
                        Ok::<_, BoxError>("ada")
                    }))
                    .initial(Value::Null)
                    .transform(|v| Value::from(v.as_str().unwrap_or_default().to_uppercase())),
                )
                .build();

            let s = rt.structure(&shape, Props::new()).unwrap();
            assert_eq!(s.get("name"), Ok(Value::Null));

            sleep(ms(30)).await;
            assert_eq!(s.get("name"), Ok(Value::from("ADA")));
        })
        .await;
}

/// A failing source stores the error as a value instead of raising it.
#[tokio::test(flavor = "current_thread")]
async fn failed_future_becomes_error_value() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let shape = Shape::builder("Remote")
                .unwrap(
                    "data",
                    Unwrap::new(AsyncSource::future(|| async {
                        Err::<i64, BoxError>("connection refused".into())
                    })),
                )
                .build();

            let s = rt.structure(&shape, Props::new()).unwrap();
            sleep(ms(10)).await;

            let data = s.get("data").unwrap();
            assert!(data.is_error());
            assert_eq!(
                data.as_error().map(ToString::to_string).as_deref(),
                Some("connection refused")
            );
        })
        .await;
}

/// Every item of a generator is written, in order.
#[tokio::test(flavor = "current_thread")]
async fn generator_items_are_written_in_order() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let shape = Shape::builder("Ticker")
                .unwrap(
                    "tick",
                    Unwrap::new(AsyncSource::generator(|| {
                        stream::unfold(0i64, |n| async move {
                            if n >= 3 {
                                return None;
                            }
                            sleep(ms(2)).await;
                            Some((Ok::<_, BoxError>(n), n + 1))
                        })
                    }))
                    .initial(-1),
                )
                .build();

            let s = rt.structure(&shape, Props::new()).unwrap();
            let seen = history(&rt, &s, "tick");

            sleep(ms(50)).await;
            assert_eq!(
                *seen.borrow(),
                vec![Value::from(-1), Value::from(0), Value::from(1), Value::from(2)]
            );
        })
        .await;
}

/// When something the factory read changes, the running source is
/// cancelled and its late result never reaches the field.
#[tokio::test(flavor = "current_thread")]
async fn rerun_cancels_stale_source() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let query = rt.cell(0i64);

            let q = query.clone();
            let shape = Shape::builder("Search")
                .unwrap(
                    "result",
                    Unwrap::new(AsyncSource::future(move || {
                        let n = q.get();
                        async move {
                            // The first request is the slow one
                            sleep(ms(if n == 0 { 40 } else { 5 })).await;
                            Ok::<_, BoxError>(n)
                        }
                    }))
                    .initial(Value::Null),
                )
                .build();

            let s = rt.structure(&shape, Props::new()).unwrap();
            let seen = history(&rt, &s, "result");

            query.set(1);
            sleep(ms(80)).await;

            assert_eq!(*seen.borrow(), vec![Value::Null, Value::from(1)]);
            assert_eq!(s.effect("result").map(|e| e.run_count()), Some(2));
        })
        .await;
}

/// Disposing the struct stops a running stream.
#[tokio::test(flavor = "current_thread")]
async fn dispose_stops_stream() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let shape = Shape::builder("Clock")
                .unwrap(
                    "now",
                    Unwrap::new(AsyncSource::generator(|| {
                        stream::unfold(0i64, |n| async move {
                            sleep(ms(5)).await;
                            Some((Ok::<_, BoxError>(n), n + 1))
                        })
                    }))
                    .initial(0),
                )
                .build();

            let s = rt.structure(&shape, Props::new()).unwrap();
            sleep(ms(22)).await;
            s.dispose();

            let frozen = s.get("now").unwrap();
            sleep(ms(30)).await;
            assert_eq!(s.get("now").unwrap(), frozen);
        })
        .await;
}

/// An iterable can feed only the first struct built from it.
#[tokio::test(flavor = "current_thread")]
async fn drained_iterable_is_rejected() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let items = stream::iter(vec![Ok::<_, BoxError>("a"), Ok("b")]);
            let shape = Shape::builder("Once")
                .unwrap("item", Unwrap::new(AsyncSource::iterable(items)))
                .build();

            let first = rt.structure(&shape, Props::new()).unwrap();
            sleep(ms(10)).await;
            assert_eq!(first.get("item"), Ok(Value::from("b")));

            assert!(matches!(
                rt.structure(&shape, Props::new()),
                Err(Error::UnsupportedAsyncSource(_))
            ));
        })
        .await;
}

/// Async fields start with the rest of the start-up work: not before the
/// enclosing batch closes.
#[tokio::test(flavor = "current_thread")]
async fn bridge_starts_after_enclosing_batch() {
    LocalSet::new()
        .run_until(async {
            let rt = Runtime::new();
            let shape = Shape::builder("Lazy")
                .unwrap(
                    "value",
                    Unwrap::new(AsyncSource::future(|| async { Ok::<_, BoxError>(1) })),
                )
                .build();

            let s = rt.batch(|| {
                let s = rt.structure(&shape, Props::new()).unwrap();
                assert!(s.effect("value").is_none());
                s
            });
            assert!(s.effect("value").is_some());

            sleep(ms(10)).await;
            assert_eq!(s.get("value"), Ok(Value::from(1)));
        })
        .await;
}
