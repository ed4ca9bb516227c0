//! Trampolined fan-out shared by the pool and the store's listener list.
//!
//! Values are queued and delivered one at a time to a snapshot of the
//! subscribers taken when that value's delivery starts. A value sent while a
//! delivery is running (re-entrantly, or from another thread) waits in the
//! queue, so every subscriber sees the same global order.
//!
//! Deferred tasks share the same queue: a task queued during a delivery runs
//! after that delivery has reached every subscriber.
//!
//! A [`Reservation`] holds a place in the queue for a value that is still
//! being computed. Anything queued while it is open is delivered after it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smallvec::SmallVec;

use crate::subscription::Subscription;

/// Lock a mutex, recovering the guard if a subscriber panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slot<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

type Task = Box<dyn FnOnce() + Send>;

enum Item<T> {
    Value(T),
    Task(Task),
    Reserved(u64),
}

struct Queue<T> {
    pending: VecDeque<Item<T>>,
    draining: bool,
    next_ticket: u64,
}

pub(crate) struct Broadcast<T> {
    slots: Mutex<Vec<Slot<T>>>,
    queue: Mutex<Queue<T>>,
    next_id: AtomicU64,
}

impl<T: Send + 'static> Broadcast<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(Vec::new()),
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                draining: false,
                next_ticket: 0,
            }),
            next_id: AtomicU64::new(0),
        })
    }

    /// Register a callback for every value whose delivery starts from now on.
    pub(crate) fn add(self: &Arc<Self>, callback: Callback<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        lock(&self.slots).push(Slot {
            id,
            active: active.clone(),
            callback,
        });

        let weak = Arc::downgrade(self);
        Subscription::new(move || {
            active.store(false, Ordering::Release);
            if let Some(broadcast) = weak.upgrade() {
                // Take the slot out before dropping it: its callback may own
                // subscriptions whose teardown comes back here.
                let removed = {
                    let mut slots = lock(&broadcast.slots);
                    slots
                        .iter()
                        .position(|slot| slot.id == id)
                        .map(|index| slots.remove(index))
                };
                drop(removed);
            }
        })
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Queue a value. Returns true when the caller now owns the drain loop
    /// and must call [`Broadcast::drain`].
    pub(crate) fn enqueue(&self, value: T) -> bool {
        self.enqueue_item(Item::Value(value))
    }

    fn enqueue_item(&self, item: Item<T>) -> bool {
        let mut queue = lock(&self.queue);
        queue.pending.push_back(item);
        if queue.draining {
            return false;
        }
        queue.draining = true;
        true
    }

    /// Deliver queued values until the queue is empty.
    pub(crate) fn drain(&self) {
        let _guard = DrainGuard(&self.queue);
        loop {
            let next = {
                let mut queue = lock(&self.queue);
                match queue.pending.pop_front() {
                    Some(Item::Value(value)) => value,
                    Some(Item::Task(task)) => {
                        drop(queue);
                        task();
                        continue;
                    }
                    // Whoever fills the slot picks the delivery up again.
                    Some(Item::Reserved(ticket)) => {
                        queue.pending.push_front(Item::Reserved(ticket));
                        queue.draining = false;
                        return;
                    }
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            let targets: SmallVec<[(Arc<AtomicBool>, Callback<T>); 4]> = lock(&self.slots)
                .iter()
                .map(|slot| (slot.active.clone(), slot.callback.clone()))
                .collect();

            for (active, callback) in targets {
                if active.load(Ordering::Acquire) {
                    callback(&next);
                }
            }
        }
    }

    pub(crate) fn send(&self, value: T) {
        if self.enqueue(value) {
            self.drain();
        }
    }

    /// Run `task` once the queue is idle: now if nothing is being delivered,
    /// otherwise after everything queued ahead of it.
    pub(crate) fn defer(&self, task: impl FnOnce() + Send + 'static) {
        if self.enqueue_item(Item::Task(Box::new(task))) {
            self.drain();
        }
    }
}

impl<T: Send + 'static> Broadcast<T> {
    /// Hold the next place in the queue. Values and tasks queued before the
    /// reservation is filled are delivered after it.
    pub(crate) fn reserve(&self) -> Reservation<'_, T> {
        let mut queue = lock(&self.queue);
        let ticket = queue.next_ticket;
        queue.next_ticket += 1;
        queue.pending.push_back(Item::Reserved(ticket));
        let owns_drain = !queue.draining;
        queue.draining = true;
        Reservation {
            broadcast: self,
            ticket,
            owns_drain,
            open: true,
        }
    }

    /// Replace the reserved slot with `value`, or drop it. Returns true when
    /// the caller must drain.
    fn settle(&self, ticket: u64, value: Option<T>, owns_drain: bool) -> bool {
        let mut queue = lock(&self.queue);
        let slot = queue
            .pending
            .iter()
            .position(|item| matches!(item, Item::Reserved(t) if *t == ticket));
        if let Some(index) = slot {
            match value {
                Some(value) => queue.pending[index] = Item::Value(value),
                None => {
                    queue.pending.remove(index);
                }
            }
        }
        let drain = owns_drain || !queue.draining;
        queue.draining = true;
        drain
    }
}

/// A place in a [`Broadcast`] queue, see [`Broadcast::reserve`].
pub(crate) struct Reservation<'a, T: Send + 'static> {
    broadcast: &'a Broadcast<T>,
    ticket: u64,
    owns_drain: bool,
    open: bool,
}

impl<T: Send + 'static> Reservation<'_, T> {
    /// Deliver `value` in the reserved place, or give the place up on `None`.
    pub(crate) fn fill(mut self, value: Option<T>) {
        self.open = false;
        if self.broadcast.settle(self.ticket, value, self.owns_drain) {
            self.broadcast.drain();
        }
    }
}

impl<T: Send + 'static> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        // Unwinding out of the producer: give the slot up without delivering.
        let mut queue = lock(&self.broadcast.queue);
        let ticket = self.ticket;
        queue
            .pending
            .retain(|item| !matches!(item, Item::Reserved(t) if *t == ticket));
        if self.owns_drain {
            queue.draining = false;
        }
    }
}

/// Releases drain ownership if a callback unwinds, so later sends still deliver.
struct DrainGuard<'a, T>(&'a Mutex<Queue<T>>);

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).draining = false;
        }
    }
}
