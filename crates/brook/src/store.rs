//! The reducer-driven store and the enhancer seam around it.
//!
//! A [`Store`] is a handle of three shared entry points (dispatch, read
//! state, subscribe) plus an optional read-only view of dispatched actions.
//! Enhancers receive the next [`StoreCreator`] and return a wrapped one,
//! usually swapping the dispatch entry point of the store it builds.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::action::{Action, State};
use crate::broadcast::{lock, Broadcast};
use crate::error::BrookError;
use crate::stream::Stream;
use crate::subscription::Subscription;

/// Pure state transition. Failures are returned to the dispatch caller.
///
/// Implemented for closures `Fn(&S, &A) -> anyhow::Result<S>`.
pub trait Reducer<S, A>: Send + Sync + 'static {
    fn reduce(&self, state: &S, action: &A) -> anyhow::Result<S>;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(&S, &A) -> anyhow::Result<S> + Send + Sync + 'static,
{
    fn reduce(&self, state: &S, action: &A) -> anyhow::Result<S> {
        self(state, action)
    }
}

pub type SharedReducer<S, A> = Arc<dyn Reducer<S, A>>;

/// A store's dispatch entry point.
pub type Dispatch<A> = Arc<dyn Fn(A) -> Result<A, BrookError> + Send + Sync>;

/// Called with the new state after every successful dispatch.
pub type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Builds a store from a reducer, optional preloaded state and an optional
/// further enhancer.
pub type StoreCreator<S, A> = Arc<
    dyn Fn(SharedReducer<S, A>, Option<S>, Option<Arc<dyn StoreEnhancer<S, A>>>) -> Store<S, A>
        + Send
        + Sync,
>;

/// Wraps store creation.
///
/// Implemented for closures `Fn(StoreCreator) -> StoreCreator`.
pub trait StoreEnhancer<S, A>: Send + Sync + 'static {
    fn enhance(&self, next: StoreCreator<S, A>) -> StoreCreator<S, A>;
}

impl<S, A, F> StoreEnhancer<S, A> for F
where
    F: Fn(StoreCreator<S, A>) -> StoreCreator<S, A> + Send + Sync + 'static,
{
    fn enhance(&self, next: StoreCreator<S, A>) -> StoreCreator<S, A> {
        self(next)
    }
}

/// Handle to a store. Cheap to clone; clones share the same state.
pub struct Store<S, A> {
    dispatch: Dispatch<A>,
    get_state: Arc<dyn Fn() -> S + Send + Sync>,
    subscribe: Arc<dyn Fn(Listener<S>) -> Subscription + Send + Sync>,
    actions: Option<Stream<A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            dispatch: self.dispatch.clone(),
            get_state: self.get_state.clone(),
            subscribe: self.subscribe.clone(),
            actions: self.actions.clone(),
        }
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("enhanced", &self.actions.is_some())
            .finish()
    }
}

impl<S: State, A: Action> Store<S, A> {
    /// A plain store with no enhancer.
    pub fn new(reducer: impl Reducer<S, A>, preloaded: Option<S>) -> Self {
        create_store(Arc::new(reducer), preloaded, None)
    }

    pub fn enhanced(
        reducer: impl Reducer<S, A>,
        preloaded: Option<S>,
        enhancer: impl StoreEnhancer<S, A>,
    ) -> Self {
        create_store(Arc::new(reducer), preloaded, Some(Arc::new(enhancer)))
    }

    /// Apply an action. Synchronous; returns the dispatched action.
    pub fn dispatch(&self, action: A) -> Result<A, BrookError> {
        (self.dispatch)(action)
    }

    pub fn state(&self) -> S {
        (self.get_state)()
    }

    /// Call `listener` with the new state after every successful dispatch.
    pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> Subscription {
        (self.subscribe)(Arc::new(listener))
    }

    /// State snapshots as a stream, one per change, starting with the next change.
    pub fn states(&self) -> Stream<S> {
        let subscribe = self.subscribe.clone();
        Stream::new(move |emitter| {
            subscribe(Arc::new(move |state: &S| {
                emitter.emit(state.clone());
            }))
        })
    }

    /// Every dispatched action, if the store was built with the system enhancer.
    pub fn actions(&self) -> Option<Stream<A>> {
        self.actions.clone()
    }

    pub fn dispatcher(&self) -> Dispatch<A> {
        self.dispatch.clone()
    }

    /// The same store with its dispatch entry point replaced.
    pub fn with_dispatch(mut self, dispatch: Dispatch<A>) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_actions(mut self, actions: Stream<A>) -> Self {
        self.actions = Some(actions);
        self
    }
}

/// Create a store, letting `enhancer` wrap creation when given.
pub fn create_store<S: State, A: Action>(
    reducer: SharedReducer<S, A>,
    preloaded: Option<S>,
    enhancer: Option<Arc<dyn StoreEnhancer<S, A>>>,
) -> Store<S, A> {
    match enhancer {
        Some(enhancer) => (enhancer.enhance(base_creator()))(reducer, preloaded, None),
        None => base_store(reducer, preloaded.unwrap_or_default()),
    }
}

/// [`create_store`] as a [`StoreCreator`], the innermost link of every chain.
pub fn base_creator<S: State, A: Action>() -> StoreCreator<S, A> {
    Arc::new(
        |reducer: SharedReducer<S, A>,
         preloaded: Option<S>,
         enhancer: Option<Arc<dyn StoreEnhancer<S, A>>>| {
            create_store(reducer, preloaded, enhancer)
        },
    )
}

/// Chain enhancers. The first one is outermost, so its dispatch runs first.
pub fn compose<S: State, A: Action>(
    enhancers: Vec<Arc<dyn StoreEnhancer<S, A>>>,
) -> Arc<dyn StoreEnhancer<S, A>> {
    Arc::new(Composed(enhancers))
}

impl<S: State, A: Action> StoreEnhancer<S, A> for Arc<dyn StoreEnhancer<S, A>> {
    fn enhance(&self, next: StoreCreator<S, A>) -> StoreCreator<S, A> {
        (**self).enhance(next)
    }
}

struct Composed<S, A>(Vec<Arc<dyn StoreEnhancer<S, A>>>);

impl<S: State, A: Action> StoreEnhancer<S, A> for Composed<S, A> {
    fn enhance(&self, next: StoreCreator<S, A>) -> StoreCreator<S, A> {
        self.0
            .iter()
            .rev()
            .fold(next, |next, enhancer| enhancer.enhance(next))
    }
}

struct Core<S, A> {
    reducer: SharedReducer<S, A>,
    state: Mutex<S>,
    listeners: Arc<Broadcast<S>>,
}

fn base_store<S: State, A: Action>(reducer: SharedReducer<S, A>, initial: S) -> Store<S, A> {
    let core = Arc::new(Core {
        reducer,
        state: Mutex::new(initial),
        listeners: Broadcast::new(),
    });

    let dispatch: Dispatch<A> = {
        let core = core.clone();
        Arc::new(move |action: A| -> Result<A, BrookError> {
            // Queue the snapshot before releasing the state so listeners see
            // states in the order the reducer produced them.
            let owns_drain = {
                let mut state = lock(&core.state);
                let next = core
                    .reducer
                    .reduce(&state, &action)
                    .map_err(|source| BrookError::Reducer {
                        action: format!("{action:?}"),
                        source,
                    })?;
                *state = next.clone();
                core.listeners.enqueue(next)
            };
            if owns_drain {
                core.listeners.drain();
            }
            Ok(action)
        })
    };

    let get_state = {
        let core = core.clone();
        Arc::new(move || lock(&core.state).clone())
    };

    let subscribe = Arc::new(move |listener: Listener<S>| core.listeners.add(listener));

    Store {
        dispatch,
        get_state,
        subscribe,
        actions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Add(i64),
        Fail,
    }

    fn counter(state: &i64, op: &Op) -> anyhow::Result<i64> {
        match op {
            Op::Add(n) => Ok(state + n),
            Op::Fail => bail!("refused"),
        }
    }

    fn record_states(store: &Store<i64, Op>) -> (Arc<Mutex<Vec<i64>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = store.subscribe(move |s| sink.lock().unwrap().push(*s));
        (seen, sub)
    }

    #[test]
    fn test_dispatch_applies_reducer_and_returns_action() {
        let store = Store::new(counter, None);
        assert_eq!(store.dispatch(Op::Add(2)).unwrap(), Op::Add(2));
        assert_eq!(store.state(), 2);
    }

    #[test]
    fn test_preloaded_state_is_used() {
        let store = Store::new(counter, Some(40));
        store.dispatch(Op::Add(2)).unwrap();
        assert_eq!(store.state(), 42);
    }

    #[test]
    fn test_reducer_error_reaches_caller_and_keeps_state() {
        let store = Store::new(counter, Some(5));
        let (seen, _sub) = record_states(&store);

        let err = store.dispatch(Op::Fail).unwrap_err();
        assert!(matches!(err, BrookError::Reducer { .. }));
        assert_eq!(err.to_string(), "reducer failed on action Fail: refused");
        assert_eq!(store.state(), 5);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_listeners_see_states_in_reducer_order_under_reentrancy() {
        let store = Store::new(counter, None);
        let inner = store.clone();
        let _first = store.subscribe(move |s| {
            if *s == 1 {
                inner.dispatch(Op::Add(10)).unwrap();
            }
        });
        let (seen, _sub) = record_states(&store);

        store.dispatch(Op::Add(1)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 11]);
        assert_eq!(store.state(), 11);
    }

    #[test]
    fn test_state_stream_starts_at_next_change() {
        let store = Store::new(counter, Some(7));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store.states().on_value(move |s| sink.lock().unwrap().push(s));

        store.dispatch(Op::Add(1)).unwrap();
        store.dispatch(Op::Add(1)).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![8, 9]);
    }

    #[test]
    fn test_plain_store_has_no_action_stream() {
        let store = Store::new(counter, None);
        assert!(store.actions().is_none());
    }

    fn tagging(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn StoreEnhancer<i64, Op>> {
        Arc::new(move |next: StoreCreator<i64, Op>| -> StoreCreator<i64, Op> {
            let log = log.clone();
            Arc::new(
                move |reducer: SharedReducer<i64, Op>,
                      preloaded: Option<i64>,
                      further: Option<Arc<dyn StoreEnhancer<i64, Op>>>| {
                    let store = next(reducer, preloaded, further);
                    let original = store.dispatcher();
                    let log = log.clone();
                    store.with_dispatch(Arc::new(move |op: Op| {
                        log.lock().unwrap().push(tag.to_string());
                        original(op)
                    }))
                },
            )
        })
    }

    #[test]
    fn test_compose_runs_first_enhancer_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let enhancer = compose(vec![tagging("outer", log.clone()), tagging("inner", log.clone())]);
        let store = create_store(Arc::new(counter), None, Some(enhancer));

        store.dispatch(Op::Add(1)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
        assert_eq!(store.state(), 1);
    }

    #[test]
    fn test_further_enhancer_is_forwarded_by_creators() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let creator = tagging("outer", log.clone()).enhance(base_creator());
        let store = creator(Arc::new(counter), Some(1), Some(tagging("further", log.clone())));

        store.dispatch(Op::Add(1)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["outer", "further"]);
        assert_eq!(store.state(), 2);
    }
}
