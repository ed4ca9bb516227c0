//! Testing utilities for Brook stores and systems.
//!
//! - [`Recorder`] captures everything a stream emits
//! - [`counter_reducer`] is a small reducer over [`TaggedAction`]s
//! - [`recording_system`] is a system that records what it observes
//!
//! ```ignore
//! let recorder = Recorder::record(&store.actions().unwrap());
//! store.dispatch(inc())?;
//! recorder.wait_for(2, Duration::from_secs(1)).await?;
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use brook::{Stream, StreamError, Subscription, TaggedAction};

// ============================================================================
// Recorder
// ============================================================================

/// One observed stream event.
#[derive(Debug, Clone)]
pub enum Recorded<T> {
    Value(T),
    Error(String),
    End,
}

/// Captures the events of the streams it records. Cheap to clone; clones
/// share the same log.
pub struct Recorder<T> {
    log: Arc<Mutex<Vec<Recorded<T>>>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            log: self.log.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder").field("log", &*lock(&self.log)).finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder already subscribed to `stream`.
    pub fn record(stream: &Stream<T>) -> Self {
        let recorder = Self::new();
        recorder.attach(stream);
        recorder
    }

    /// Subscribe to `stream` for as long as this recorder lives.
    pub fn attach(&self, stream: &Stream<T>) {
        let log = self.log.clone();
        let subscription = stream.subscribe(move |event| {
            let entry = match event {
                brook::Event::Value(value) => Recorded::Value(value),
                brook::Event::Error(error) => Recorded::Error(error.to_string()),
                brook::Event::End => Recorded::End,
            };
            lock(&log).push(entry);
        });
        lock(&self.subscriptions).push(subscription);
    }

    /// Record a value directly, e.g. from a store listener.
    pub fn push(&self, value: T) {
        lock(&self.log).push(Recorded::Value(value));
    }

    /// A listener that records every value it is called with.
    pub fn observer(&self) -> impl Fn(&T) + Send + Sync + 'static
    where
        T: Sync,
    {
        let log = self.log.clone();
        move |value: &T| lock(&log).push(Recorded::Value(value.clone()))
    }

    pub fn events(&self) -> Vec<Recorded<T>> {
        lock(&self.log).clone()
    }

    pub fn values(&self) -> Vec<T> {
        lock(&self.log)
            .iter()
            .filter_map(|event| match event {
                Recorded::Value(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.log)
            .iter()
            .filter_map(|event| match event {
                Recorded::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn ended(&self) -> bool {
        lock(&self.log).iter().any(|event| matches!(event, Recorded::End))
    }

    /// Stop recording. Already recorded events stay.
    pub fn detach(&self) {
        lock(&self.subscriptions).clear();
    }

    /// Wait until at least `count` values were recorded.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> anyhow::Result<Vec<T>> {
        let waited = tokio::time::timeout(timeout, async {
            loop {
                let values = self.values();
                if values.len() >= count {
                    return values;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await;
        waited.map_err(|_| {
            anyhow::anyhow!(
                "timed out after {timeout:?} waiting for {count} values, got {}",
                self.values().len()
            )
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// `INC` adds one (or `by`), `DEC` subtracts one, `BOOM` fails, anything
/// else leaves the count alone.
pub fn counter_reducer(count: &i64, action: &TaggedAction) -> anyhow::Result<i64> {
    match action.kind() {
        "INC" => {
            let by = action.get("by").and_then(|v| v.as_i64()).unwrap_or(1);
            Ok(count + by)
        }
        "DEC" => Ok(count - 1),
        "BOOM" => anyhow::bail!("reducer rejected BOOM"),
        _ => Ok(*count),
    }
}

pub fn action(kind: &str) -> TaggedAction {
    TaggedAction::new(kind)
}

pub fn inc() -> TaggedAction {
    action("INC")
}

/// A system that emits nothing and records every action and state it sees,
/// in the order it sees them.
pub fn recording_system<S>(
    seen: Recorder<Observed<S>>,
) -> impl Fn(Stream<TaggedAction>, Stream<S>) -> Stream<TaggedAction> + Send + Sync + 'static
where
    S: Clone + Send + Sync + 'static,
{
    move |actions: Stream<TaggedAction>, states: Stream<S>| {
        seen.attach(&actions.map(Observed::Action));
        seen.attach(&states.map(Observed::State));
        Stream::never()
    }
}

/// What a [`recording_system`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<S> {
    Action(TaggedAction),
    State(S),
}

/// A stream that fails once with `message`.
pub fn failing<T: Send + 'static>(message: &'static str) -> Stream<T> {
    Stream::error(StreamError::msg(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_reducer() {
        assert_eq!(counter_reducer(&1, &inc()).unwrap(), 2);
        assert_eq!(counter_reducer(&1, &inc().with("by", 5)).unwrap(), 6);
        assert_eq!(counter_reducer(&1, &action("DEC")).unwrap(), 0);
        assert!(counter_reducer(&1, &action("BOOM")).is_err());
        assert_eq!(counter_reducer(&7, &action("OTHER")).unwrap(), 7);
    }

    #[test]
    fn test_recorder_captures_values_errors_and_end() {
        let recorder = Recorder::record(&Stream::sequence([1, 2]));
        assert_eq!(recorder.values(), vec![1, 2]);
        assert!(recorder.ended());

        let failed: Recorder<u32> = Recorder::record(&failing("bad"));
        assert_eq!(failed.errors(), vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let recorder: Recorder<u32> = Recorder::record(&Stream::never());
        let result = recorder.wait_for(1, Duration::from_millis(20)).await;
        assert!(result.is_err());
    }
}
