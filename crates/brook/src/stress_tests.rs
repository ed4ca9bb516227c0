//! Concurrency stress tests.
//!
//! Many threads dispatch into one enhanced store at once. Whatever order the
//! actions end up in, every observer must agree on it, it must be the order
//! the reducer saw, and nothing may be lost.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::{Enhancer, FaultSink, Store, Stream, TaggedAction};

const THREADS: usize = 8;
const PER_THREAD: usize = 200;

fn counter(count: &i64, action: &TaggedAction) -> anyhow::Result<i64> {
    Ok(match action.kind() {
        "INC" => count + 1,
        "DOUBLE_INC" => count + 2,
        _ => *count,
    })
}

fn tagged(thread: usize, seq: usize) -> TaggedAction {
    TaggedAction::new("INC").with("thread", thread as u64).with("seq", seq as u64)
}

fn key(action: &TaggedAction) -> (u64, u64) {
    let field = |name| action.get(name).and_then(|v| v.as_u64()).unwrap_or(u64::MAX);
    (field("thread"), field("seq"))
}

#[test]
fn test_concurrent_dispatch_single_timeline() {
    let enhancer = Enhancer::builder()
        .with_named_system("noop", |_: Stream<TaggedAction>, _: Stream<i64>| {
            Stream::<TaggedAction>::never()
        })
        .build();
    let store = Store::enhanced(counter, None, enhancer);
    let actions = store.actions().unwrap();

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let _a = {
        let seen = first.clone();
        actions.on_value(move |a| seen.lock().unwrap().push(key(&a)))
    };
    let _b = {
        let seen = second.clone();
        actions.on_value(move |a| seen.lock().unwrap().push(key(&a)))
    };

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    store.dispatch(tagged(t, seq)).unwrap();
                    if fastrand::u8(..) < 8 {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let first = first.lock().unwrap().clone();
    let second = second.lock().unwrap().clone();
    assert_eq!(first.len(), THREADS * PER_THREAD);
    assert_eq!(first, second, "observers disagree on action order");
    assert_eq!(store.state(), (THREADS * PER_THREAD) as i64);

    // Per-thread order survives interleaving.
    for t in 0..THREADS as u64 {
        let seqs: Vec<u64> = first.iter().filter(|(th, _)| *th == t).map(|(_, s)| *s).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "thread {t} reordered");
    }
}

#[test]
fn test_state_listeners_agree() {
    let store: Store<i64, TaggedAction> = Store::new(counter, None);
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let _a = {
        let seen = first.clone();
        store.subscribe(move |s| seen.lock().unwrap().push(*s))
    };
    let _b = {
        let seen = second.clone();
        store.subscribe(move |s| seen.lock().unwrap().push(*s))
    };

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    store.dispatch(tagged(t, seq)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let first = first.lock().unwrap().clone();
    assert_eq!(first, *second.lock().unwrap());
    // Snapshots are published in reduction order.
    let expected: Vec<i64> = (1..=(THREADS * PER_THREAD) as i64).collect();
    assert_eq!(first, expected);
}

#[test]
fn test_feedback_under_contention() {
    // Every INC produces a DOUBLE_INC; the total must account for both.
    let doubler = |actions: Stream<TaggedAction>, _: Stream<i64>| {
        actions.filter(|a| a.is("INC")).map(|_| TaggedAction::new("DOUBLE_INC"))
    };
    let faults = Arc::new(AtomicUsize::new(0));
    let sink = {
        let faults = faults.clone();
        FaultSink::new(move |_| {
            faults.fetch_add(1, Ordering::Relaxed);
        })
    };
    let enhancer = Enhancer::builder()
        .with_named_system("doubler", doubler)
        .with_fault_sink(sink)
        .build();
    let store = Store::enhanced(counter, None, enhancer);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    store.dispatch(tagged(t, seq)).unwrap();
                    if fastrand::bool() {
                        thread::sleep(Duration::from_micros(fastrand::u64(0..20)));
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.state(), (THREADS * PER_THREAD * 3) as i64);
    assert_eq!(faults.load(Ordering::Relaxed), 0);
}

#[test]
fn test_delivery_order_matches_reduction_order() {
    let reduced = Arc::new(Mutex::new(Vec::new()));
    let reducer = {
        let reduced = reduced.clone();
        move |count: &i64, action: &TaggedAction| -> anyhow::Result<i64> {
            reduced.lock().unwrap().push(key(action));
            counter(count, action)
        }
    };
    let enhancer = Enhancer::builder()
        .with_named_system("noop", |_: Stream<TaggedAction>, _: Stream<i64>| {
            Stream::<TaggedAction>::never()
        })
        .build();
    let store = Store::enhanced(reducer, None, enhancer);
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let _observer = {
        let delivered = delivered.clone();
        store.actions().unwrap().on_value(move |a| delivered.lock().unwrap().push(key(&a)))
    };

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                for seq in 0..PER_THREAD {
                    store.dispatch(tagged(t, seq)).unwrap();
                    if fastrand::u8(..) < 8 {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let reduced = reduced.lock().unwrap().clone();
    assert_eq!(reduced.len(), THREADS * PER_THREAD);
    assert_eq!(*delivered.lock().unwrap(), reduced, "delivered out of reduction order");
}
