//! The action multiplexer.
//!
//! A [`Pool`] is a hot broadcast that any number of source streams can be
//! plugged into at any time. Every value reaching the pool, whether pushed
//! directly or forwarded from a plugged source, is delivered to all current
//! subscribers in a single global order (see [`crate::broadcast`]).
//!
//! A source that errors is reported to the pool's [`FaultSink`] and unplugged.
//! A source that ends is unplugged quietly. The pool itself never ends.
//!
//! One thread delivers at a time. Sends from other threads wait for the
//! delivery in progress; sends from the delivering thread are queued.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::ReentrantMutex;
use tracing::debug;

use crate::broadcast::Broadcast;
use crate::error::{FaultKind, FaultSink, SystemFault};
use crate::stream::{Event, Stream};
use crate::subscription::Subscription;

/// Identifies one plugged source within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

struct Plugged {
    label: Arc<str>,
    // Held only to keep the source subscribed.
    _subscription: Subscription,
}

struct PoolInner<T> {
    // Held by the delivering thread; re-entered by its callbacks.
    gate: ReentrantMutex<()>,
    broadcast: Arc<Broadcast<T>>,
    sources: DashMap<SourceId, Plugged>,
    next_source: AtomicU64,
    faults: FaultSink,
}

impl<T: Send + 'static> PoolInner<T> {
    fn send(&self, value: T) {
        let _gate = self.gate.lock();
        self.broadcast.send(value);
    }
}

impl<T> PoolInner<T> {
    fn unplug(&self, id: SourceId) -> bool {
        // Dropping the subscription may re-enter the pool; do it outside the map.
        let removed = self.sources.remove(&id);
        let found = removed.is_some();
        if let Some((_, plugged)) = removed {
            debug!(source = %id, label = %plugged.label, "source unplugged");
        }
        found
    }
}

/// Multiplexed broadcast of values from an open set of sources.
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("sources", &self.inner.sources.len())
            .finish()
    }
}

/// Non-owning pool handle, for sources that feed back into their own pool.
pub struct WeakPool<T>(Weak<PoolInner<T>>);

impl<T> Clone for WeakPool<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> WeakPool<T> {
    pub fn upgrade(&self) -> Option<Pool<T>> {
        self.0.upgrade().map(|inner| Pool { inner })
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> Pool<T> {
    /// An empty pool that reports source failures through `tracing`.
    pub fn new() -> Self {
        Self::with_fault_sink(FaultSink::default())
    }

    pub fn with_fault_sink(faults: FaultSink) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                gate: ReentrantMutex::new(()),
                broadcast: Broadcast::new(),
                sources: DashMap::new(),
                next_source: AtomicU64::new(0),
                faults,
            }),
        }
    }

    /// Deliver a value to every current subscriber.
    pub fn push(&self, value: T) {
        self.inner.send(value);
    }

    /// Compute a value and deliver it, ahead of anything sent while
    /// `produce` runs. Nothing is delivered when `produce` fails.
    ///
    /// Other threads' sends wait until `produce` and the delivery are done,
    /// so values are delivered in the order they were produced.
    pub fn push_with<E>(&self, produce: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let _gate = self.inner.gate.lock();
        let reservation = self.inner.broadcast.reserve();
        let produced = produce();
        reservation.fill(produced.as_ref().ok().cloned());
        produced
    }

    /// Run `task` after every delivery already in progress or queued.
    /// Runs immediately when the pool is idle.
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        let _gate = self.inner.gate.lock();
        self.inner.broadcast.defer(task);
    }

    /// A handle that does not keep the pool alive.
    pub fn downgrade(&self) -> WeakPool<T> {
        WeakPool(Arc::downgrade(&self.inner))
    }

    /// Forward everything `source` emits into the pool.
    pub fn plug(&self, source: Stream<T>) -> SourceId {
        let pool = Arc::downgrade(&self.inner);
        self.plug_with("source", source, move |_, value| {
            if let Some(inner) = pool.upgrade() {
                inner.send(value);
            }
        })
    }

    /// Plug `source` with a custom route for its values.
    ///
    /// `route` receives the id of the plugged source with every value.
    /// Errors and the end of `source` get the usual treatment: the source is
    /// unplugged, and errors are reported as a fault labelled `label`.
    pub fn plug_with<U: Send + 'static>(
        &self,
        label: impl Into<Arc<str>>,
        source: Stream<U>,
        route: impl Fn(SourceId, U) + Send + Sync + 'static,
    ) -> SourceId {
        let id = SourceId(self.inner.next_source.fetch_add(1, Ordering::Relaxed));
        let label: Arc<str> = label.into();
        let dead = Arc::new(AtomicBool::new(false));

        let subscription = {
            let pool: Weak<PoolInner<T>> = Arc::downgrade(&self.inner);
            let label = label.clone();
            let dead = dead.clone();
            source.subscribe(move |event| match event {
                Event::Value(value) => route(id, value),
                Event::Error(error) => {
                    dead.store(true, Ordering::Release);
                    if let Some(inner) = pool.upgrade() {
                        inner.faults.report(&SystemFault {
                            source: id,
                            system: label.clone(),
                            kind: FaultKind::Stream(error),
                        });
                        inner.unplug(id);
                    }
                }
                Event::End => {
                    dead.store(true, Ordering::Release);
                    if let Some(inner) = pool.upgrade() {
                        inner.unplug(id);
                    }
                }
            })
        };

        debug!(source = %id, label = %label, "source plugged");
        self.inner.sources.insert(
            id,
            Plugged {
                label,
                _subscription: subscription,
            },
        );
        // A source can fail or finish during subscribe, before it was registered.
        if dead.load(Ordering::Acquire) {
            self.inner.unplug(id);
        }
        id
    }

    /// Stop forwarding a source. Returns false if it was not plugged.
    pub fn unplug(&self, id: SourceId) -> bool {
        self.inner.unplug(id)
    }

    pub fn is_plugged(&self, id: SourceId) -> bool {
        self.inner.sources.contains_key(&id)
    }

    pub fn source_count(&self) -> usize {
        self.inner.sources.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.broadcast.len()
    }

    /// Receive every value delivered from now on.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.inner.broadcast.add(Arc::new(observer))
    }

    /// Read-only view of the pool as a stream that never ends.
    pub fn stream(&self) -> Stream<T> {
        let pool = Arc::downgrade(&self.inner);
        Stream::new(move |emitter| match pool.upgrade() {
            Some(inner) => inner.broadcast.add(Arc::new(move |value: &T| {
                emitter.emit(value.clone());
            })),
            None => Subscription::empty(),
        })
    }
}
