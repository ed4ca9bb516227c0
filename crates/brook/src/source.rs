//! Streams driven by the tokio runtime: timers, futures and async streams.
//!
//! Each subscription spawns its own task on the current runtime and aborts it
//! on cancellation. Subscribing outside a runtime yields a `NoRuntime` error
//! followed by the end of the stream.

use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::BrookError;
use crate::stream::{Emitter, Event, Stream};
use crate::subscription::Subscription;

fn runtime_for<T>(emitter: &Emitter<T>) -> Option<Handle> {
    match Handle::try_current() {
        Ok(handle) => Some(handle),
        Err(_) => {
            emitter.error(BrookError::NoRuntime);
            emitter.end();
            None
        }
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Drive a `futures::Stream` on the runtime, one fresh stream per subscriber.
    pub fn from_async<S, F>(make: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        S: futures::Stream<Item = T> + Send + 'static,
    {
        Self::new(move |emitter| {
            let Some(runtime) = runtime_for(&emitter) else {
                return Subscription::empty();
            };
            let mut source = Box::pin(make());
            let task = runtime.spawn(async move {
                while let Some(value) = source.next().await {
                    if !emitter.emit(value) {
                        return;
                    }
                }
                emitter.end();
            });
            Subscription::new(move || task.abort())
        })
    }

    /// Run a fallible future and emit its outcome, then end.
    pub fn from_future<F, Fut>(make: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::new(move |emitter| {
            let Some(runtime) = runtime_for(&emitter) else {
                return Subscription::empty();
            };
            let pending = make();
            let task = runtime.spawn(async move {
                match pending.await {
                    Ok(value) => {
                        emitter.emit(value);
                    }
                    Err(error) => emitter.error(error),
                }
                emitter.end();
            });
            Subscription::new(move || task.abort())
        })
    }

    /// Re-emit every event `by` later, keeping the original order.
    pub fn delay(&self, by: Duration) -> Self {
        let source = self.clone();
        Self::new(move |emitter| {
            let Some(runtime) = runtime_for(&emitter) else {
                return Subscription::empty();
            };
            let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Event<T>)>();
            let task = runtime.spawn(async move {
                while let Some((due, event)) = rx.recv().await {
                    tokio::time::sleep_until(due).await;
                    match event {
                        Event::Value(value) => {
                            emitter.emit(value);
                        }
                        Event::Error(error) => emitter.error(error),
                        Event::End => {
                            emitter.end();
                            return;
                        }
                    }
                }
            });
            let upstream = source.subscribe(move |event| {
                // The receiver only goes away once the subscription is torn down.
                let _ = tx.send((Instant::now() + by, event));
            });
            Subscription::new(move || {
                drop(upstream);
                task.abort();
            })
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    /// Emit `value` once after `after`, then end.
    pub fn later(after: Duration, value: T) -> Self {
        Self::from_future(move || {
            let value = value.clone();
            async move {
                tokio::time::sleep(after).await;
                Ok(value)
            }
        })
    }
}

impl Stream<u64> {
    /// Emit 0, 1, 2, ... every `period`, starting one period from subscription.
    pub fn interval(period: Duration) -> Self {
        Self::from_async(move || {
            let ticker = tokio::time::interval_at(Instant::now() + period, period);
            futures::stream::unfold((ticker, 0u64), |(mut ticker, tick)| async move {
                ticker.tick().await;
                Some((tick, (ticker, tick + 1)))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn record<T: Send + 'static>(stream: &Stream<T>) -> (Arc<Mutex<Vec<Event<T>>>>, Subscription) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let sub = stream.subscribe(move |event| sink.lock().unwrap().push(event));
        (events, sub)
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test]
    async fn test_later_emits_after_delay() {
        let (events, _sub) = record(&Stream::later(Duration::from_millis(10), 7u32));
        assert!(events.lock().unwrap().is_empty());

        settle(60).await;
        let events = events.lock().unwrap();
        assert!(matches!(events[0], Event::Value(7)));
        assert!(matches!(events[1], Event::End));
    }

    #[tokio::test]
    async fn test_from_future_reports_errors() {
        let stream = Stream::<u32>::from_future(|| async { Err(anyhow::anyhow!("upstream down")) });
        let (events, _sub) = record(&stream);

        settle(30).await;
        let events = events.lock().unwrap();
        match &events[0] {
            Event::Error(error) => assert_eq!(error.to_string(), "upstream down"),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(matches!(events[1], Event::End));
    }

    #[tokio::test]
    async fn test_from_async_drains_the_stream() {
        let stream = Stream::from_async(|| futures::stream::iter(vec![1u32, 2, 3]));
        let (events, _sub) = record(&stream);

        settle(30).await;
        let values: Vec<u32> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Value(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_delay_preserves_order() {
        let stream = Stream::sequence(vec![1u32, 2, 3, 4]).delay(Duration::from_millis(5));
        let (events, _sub) = record(&stream);
        assert!(events.lock().unwrap().is_empty());

        settle(60).await;
        let values: Vec<u32> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::Value(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_interval_stops_after_cancel() {
        let (events, sub) = record(&Stream::interval(Duration::from_millis(5)).take(100));
        settle(40).await;
        sub.unsubscribe();
        let seen = events.lock().unwrap().len();
        assert!(seen >= 1);

        settle(40).await;
        assert_eq!(events.lock().unwrap().len(), seen);
    }

    #[test]
    fn test_async_source_without_runtime_fails_fast() {
        let (events, _sub) = record(&Stream::later(Duration::from_millis(1), 1u32));
        let events = events.lock().unwrap();
        assert!(matches!(events[0], Event::Error(_)));
        assert!(matches!(events[1], Event::End));
    }
}
