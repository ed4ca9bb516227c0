//! Push-based streams.
//!
//! A [`Stream`] is a cold producer: every call to [`Stream::subscribe`] runs
//! the producer again with a fresh [`Emitter`]. Events are delivered
//! synchronously on whatever thread the producer emits from.
//!
//! `Error` events are not terminal. `End` is, and an emitter ignores
//! everything after it, as it does after the subscriber cancels.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::broadcast::lock;
use crate::error::StreamError;
use crate::subscription::Subscription;

/// One notification from a stream.
#[derive(Debug, Clone)]
pub enum Event<T> {
    Value(T),
    Error(StreamError),
    End,
}

impl<T> Event<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Event::Value(value) => Some(value),
            _ => None,
        }
    }
}

type ObserverFn<T> = dyn Fn(Event<T>) + Send + Sync;

/// Producer-side handle for pushing events to one subscriber.
pub struct Emitter<T> {
    observer: Arc<ObserverFn<T>>,
    closed: Arc<AtomicBool>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            observer: self.observer.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<T> Emitter<T> {
    /// Push a value. Returns false once the subscriber is gone or the stream ended.
    pub fn emit(&self, value: T) -> bool {
        if self.is_closed() {
            return false;
        }
        (self.observer)(Event::Value(value));
        true
    }

    pub fn error(&self, error: impl Into<StreamError>) {
        if !self.is_closed() {
            (self.observer)(Event::Error(error.into()));
        }
    }

    pub fn end(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            (self.observer)(Event::End);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn forward(&self, event: Event<T>) {
        match event {
            Event::Value(value) => {
                self.emit(value);
            }
            Event::Error(error) => self.error(error),
            Event::End => self.end(),
        }
    }
}

type Producer<T> = dyn Fn(Emitter<T>) -> Subscription + Send + Sync;

/// A cold, push-based stream of values.
pub struct Stream<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stream")
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Build a stream from a producer.
    ///
    /// The producer runs once per subscriber and returns the teardown for
    /// whatever it started.
    pub fn new(producer: impl Fn(Emitter<T>) -> Subscription + Send + Sync + 'static) -> Self {
        Self {
            producer: Arc::new(producer),
        }
    }

    pub fn subscribe(&self, observer: impl Fn(Event<T>) + Send + Sync + 'static) -> Subscription {
        let closed = Arc::new(AtomicBool::new(false));
        let emitter = Emitter {
            observer: Arc::new(observer),
            closed: closed.clone(),
        };
        let upstream = (self.producer)(emitter);
        Subscription::new(move || {
            closed.store(true, Ordering::Release);
            drop(upstream);
        })
    }

    /// Subscribe to values only, ignoring errors and the end.
    pub fn on_value(&self, on_value: impl Fn(T) + Send + Sync + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let Event::Value(value) = event {
                on_value(value);
            }
        })
    }

    pub fn never() -> Self {
        Self::new(|_| Subscription::empty())
    }

    pub fn empty() -> Self {
        Self::new(|emitter| {
            emitter.end();
            Subscription::empty()
        })
    }

    /// Emit a single error, then end.
    pub fn error(error: impl Into<StreamError>) -> Self {
        let error = error.into();
        Self::new(move |emitter| {
            emitter.error(error.clone());
            emitter.end();
            Subscription::empty()
        })
    }

    /// Interleave several streams. Ends when all of them have ended.
    pub fn merge(streams: impl IntoIterator<Item = Stream<T>>) -> Self {
        let streams: Vec<Stream<T>> = streams.into_iter().collect();
        Self::new(move |emitter| {
            if streams.is_empty() {
                emitter.end();
                return Subscription::empty();
            }

            let remaining = Arc::new(AtomicUsize::new(streams.len()));
            let subscriptions = streams
                .iter()
                .map(|stream| {
                    let emitter = emitter.clone();
                    let remaining = remaining.clone();
                    stream.subscribe(move |event| match event {
                        Event::End => {
                            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                                emitter.end();
                            }
                        }
                        other => emitter.forward(other),
                    })
                })
                .collect();
            Subscription::all(subscriptions)
        })
    }

    fn operator<U: Send + 'static>(
        &self,
        on_value: impl Fn(T, &Emitter<U>) + Send + Sync + 'static,
    ) -> Stream<U> {
        let source = self.clone();
        let on_value = Arc::new(on_value);
        Stream::new(move |emitter: Emitter<U>| {
            let on_value = on_value.clone();
            source.subscribe(move |event| match event {
                Event::Value(value) => on_value(value, &emitter),
                Event::Error(error) => emitter.error(error),
                Event::End => emitter.end(),
            })
        })
    }

    pub fn map<U: Send + 'static>(&self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Stream<U> {
        self.operator(move |value, emitter| {
            emitter.emit(f(value));
        })
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.operator(move |value, emitter| {
            if predicate(&value) {
                emitter.emit(value);
            }
        })
    }

    pub fn filter_map<U: Send + 'static>(
        &self,
        f: impl Fn(T) -> Option<U> + Send + Sync + 'static,
    ) -> Stream<U> {
        self.operator(move |value, emitter| {
            if let Some(mapped) = f(value) {
                emitter.emit(mapped);
            }
        })
    }

    /// Run a side effect on every value and pass it through.
    pub fn inspect(&self, f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.operator(move |value, emitter| {
            f(&value);
            emitter.emit(value);
        })
    }

    /// Emit at most `count` values, then end.
    pub fn take(&self, count: usize) -> Self {
        let source = self.clone();
        Self::new(move |emitter| {
            if count == 0 {
                emitter.end();
                return Subscription::empty();
            }
            let seen = AtomicUsize::new(0);
            source.subscribe(move |event| match event {
                Event::Value(value) => {
                    let n = seen.fetch_add(1, Ordering::AcqRel) + 1;
                    if n <= count {
                        emitter.emit(value);
                    }
                    if n == count {
                        emitter.end();
                    }
                }
                other => emitter.forward(other),
            })
        })
    }

    /// Pair every value with the most recent value of `other`.
    ///
    /// Values arriving before `other` has emitted anything are dropped.
    pub fn with_latest_from<S>(&self, other: &Stream<S>) -> Stream<(T, S)>
    where
        S: Clone + Send + Sync + 'static,
    {
        let source = self.clone();
        let other = other.clone();
        Stream::new(move |emitter| {
            let latest: Arc<Mutex<Option<S>>> = Arc::new(Mutex::new(None));
            let sampler = {
                let latest = latest.clone();
                other.on_value(move |value| *lock(&latest) = Some(value))
            };
            let main = source.subscribe(move |event| match event {
                Event::Value(value) => {
                    let current = lock(&latest).clone();
                    if let Some(sample) = current {
                        emitter.emit((value, sample));
                    }
                }
                Event::Error(error) => emitter.error(error),
                Event::End => emitter.end(),
            });
            Subscription::all(vec![main, sampler])
        })
    }

    /// Map every value to a stream and merge the results.
    ///
    /// Ends once the source and every inner stream have ended.
    pub fn flat_map<U: Send + 'static>(
        &self,
        f: impl Fn(T) -> Stream<U> + Send + Sync + 'static,
    ) -> Stream<U> {
        let source = self.clone();
        let f = Arc::new(f);
        Stream::new(move |emitter: Emitter<U>| {
            let state = Arc::new(Mutex::new(FlatMapState::default()));
            let f = f.clone();
            let outer = {
                let state = state.clone();
                let emitter = emitter.clone();
                source.subscribe(move |event| match event {
                    Event::Value(value) => {
                        let id = lock(&state).open();
                        let inner = f(value).subscribe({
                            let state = state.clone();
                            let emitter = emitter.clone();
                            move |event| match event {
                                Event::End => {
                                    let (closed, finished) = lock(&state).close(id);
                                    drop(closed);
                                    if finished {
                                        emitter.end();
                                    }
                                }
                                other => emitter.forward(other),
                            }
                        });
                        // An inner stream that already ended has no slot left to hold it.
                        let leftover = lock(&state).attach(id, inner);
                        drop(leftover);
                    }
                    Event::Error(error) => emitter.error(error),
                    Event::End => {
                        let finished = lock(&state).finish_outer();
                        if finished {
                            emitter.end();
                        }
                    }
                })
            };
            Subscription::new(move || {
                drop(outer);
                let inner = std::mem::take(&mut lock(&state).inner);
                drop(inner);
            })
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    /// Emit one value, then end.
    pub fn once(value: T) -> Self {
        Self::new(move |emitter| {
            emitter.emit(value.clone());
            emitter.end();
            Subscription::empty()
        })
    }

    pub fn sequence(values: impl IntoIterator<Item = T>) -> Self {
        let values: Vec<T> = values.into_iter().collect();
        Self::new(move |emitter| {
            for value in &values {
                if !emitter.emit(value.clone()) {
                    break;
                }
            }
            emitter.end();
            Subscription::empty()
        })
    }
}

#[derive(Default)]
struct FlatMapState {
    inner: HashMap<u64, Option<Subscription>>,
    next_id: u64,
    outer_done: bool,
}

impl FlatMapState {
    fn open(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.inner.insert(id, None);
        id
    }

    fn attach(&mut self, id: u64, subscription: Subscription) -> Option<Subscription> {
        match self.inner.get_mut(&id) {
            Some(slot) => {
                *slot = Some(subscription);
                None
            }
            None => Some(subscription),
        }
    }

    fn close(&mut self, id: u64) -> (Option<Subscription>, bool) {
        let closed = self.inner.remove(&id).flatten();
        (closed, self.outer_done && self.inner.is_empty())
    }

    fn finish_outer(&mut self) -> bool {
        self.outer_done = true;
        self.inner.is_empty()
    }
}
