//! The system enhancer: wires systems into a feedback loop around dispatch.
//!
//! ```text
//! caller ──► dispatch ──► original dispatch (reducer, listeners)
//!               │                      │
//!               │ push result          └──► state stream ───┐
//!               ▼                                           │
//!             Pool ──► System A.run(actions, states) ◄──────┤
//!               │                  │                        │
//!               ├────► System B.run(actions, states) ◄──────┘
//!               │                  │
//!               │    produced actions (plugged sources)
//!               │                  │
//!               └──────────────────┴──► dispatch (again)
//! ```
//!
//! Every action that goes through the enhanced dispatch, including the ones
//! systems produce, reaches every system. A produced action is dispatched
//! once the action it was derived from has been delivered to every
//! subscriber of the pool, so all systems observe the state as of that
//! action. This holds for actions derived from state snapshots too: the
//! reducer runs while the pool holds a place for the action being
//! dispatched.
//!
//! Nothing here detects cycles: a system that answers its own output with
//! more output loops until it stops doing so.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::action::{Action, State};
use crate::error::{BrookError, FaultKind, FaultSink, SystemFault};
use crate::pool::Pool;
use crate::store::{Dispatch, SharedReducer, Store, StoreCreator, StoreEnhancer};
use crate::stream::Stream;

/// A reactive unit: observes dispatched actions and state snapshots, and
/// returns a stream of actions to dispatch.
///
/// `run` is called once, when the store is created. Any state a system keeps
/// must come from the streams it is given.
///
/// Implemented for closures `Fn(Stream<A>, Stream<S>) -> Stream<A>`.
pub trait System<S, A>: Send + Sync + 'static {
    fn run(&self, actions: Stream<A>, states: Stream<S>) -> Stream<A>;
}

impl<S, A, F> System<S, A> for F
where
    F: Fn(Stream<A>, Stream<S>) -> Stream<A> + Send + Sync + 'static,
{
    fn run(&self, actions: Stream<A>, states: Stream<S>) -> Stream<A> {
        self(actions, states)
    }
}

struct Registered<S, A> {
    name: Arc<str>,
    system: Arc<dyn System<S, A>>,
}

impl<S, A> Clone for Registered<S, A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            system: self.system.clone(),
        }
    }
}

/// Store enhancer that runs a fixed set of systems against every store it creates.
pub struct Enhancer<S, A> {
    systems: Vec<Registered<S, A>>,
    faults: FaultSink,
}

impl<S, A> fmt::Debug for Enhancer<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.systems.iter().map(|s| &*s.name).collect();
        f.debug_struct("Enhancer").field("systems", &names).finish()
    }
}

impl<S: State, A: Action> Enhancer<S, A> {
    pub fn builder() -> EnhancerBuilder<S, A> {
        EnhancerBuilder::new()
    }

    /// Systems in registration order.
    pub fn system_names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| &*s.name)
    }

    fn wire(&self, store: Store<S, A>) -> Store<S, A> {
        let original = store.dispatcher();
        let pool = Pool::with_fault_sink(self.faults.clone());
        let states = store.states();

        let dispatch: Dispatch<A> = {
            let pool = pool.clone();
            // Reduce and deliver as one step: actions caused while the reducer
            // runs (state-driven systems) queue behind this one, and other
            // threads cannot reduce in between.
            Arc::new(move |action: A| -> Result<A, BrookError> {
                pool.push_with(|| -> Result<A, BrookError> {
                    let result = original(action)?;
                    trace!(action = ?result, "action dispatched");
                    Ok(result)
                })
            })
        };

        for entry in &self.systems {
            let output = entry.system.run(pool.stream(), states.clone());
            // Weak handles, so the pool's own sources keep neither the pool
            // nor the store's dispatch alive.
            let dispatch = Arc::downgrade(&dispatch);
            let weak_pool = pool.downgrade();
            let faults = self.faults.clone();
            let name = entry.name.clone();
            let id = pool.plug_with(entry.name.clone(), output, move |source, action: A| {
                let Some(pool) = weak_pool.upgrade() else {
                    return;
                };
                let dispatch = dispatch.clone();
                let faults = faults.clone();
                let name = name.clone();
                // Produced actions wait until the action that caused them has
                // reached every subscriber.
                pool.defer(move || {
                    let Some(dispatch) = dispatch.upgrade() else {
                        return;
                    };
                    if let Err(error) = dispatch(action) {
                        faults.report(&SystemFault {
                            source,
                            system: name,
                            kind: FaultKind::Dispatch(Arc::new(error)),
                        });
                    }
                });
            });
            debug!(system = %entry.name, source = %id, "system plugged");
        }

        store.with_dispatch(dispatch).with_actions(pool.stream())
    }
}

impl<S: State, A: Action> StoreEnhancer<S, A> for Enhancer<S, A> {
    fn enhance(&self, next: StoreCreator<S, A>) -> StoreCreator<S, A> {
        let enhancer = Enhancer {
            systems: self.systems.clone(),
            faults: self.faults.clone(),
        };
        Arc::new(
            move |reducer: SharedReducer<S, A>,
                  preloaded: Option<S>,
                  further: Option<Arc<dyn StoreEnhancer<S, A>>>| {
                let store = next(reducer, preloaded, further);
                enhancer.wire(store)
            },
        )
    }
}

/// Builder for [`Enhancer`].
pub struct EnhancerBuilder<S, A> {
    systems: Vec<Registered<S, A>>,
    faults: FaultSink,
}

impl<S: State, A: Action> Default for EnhancerBuilder<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, A: Action> EnhancerBuilder<S, A> {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            faults: FaultSink::default(),
        }
    }

    /// Register a system, named after its type.
    pub fn with_system<Sys: System<S, A>>(self, system: Sys) -> Self {
        self.with_named_system(type_name::<Sys>(), system)
    }

    /// Register a system under a name used in logs and fault reports.
    pub fn with_named_system(
        mut self,
        name: impl Into<Arc<str>>,
        system: impl System<S, A>,
    ) -> Self {
        self.systems.push(Registered {
            name: name.into(),
            system: Arc::new(system),
        });
        self
    }

    /// Where system faults go. Defaults to `tracing` at error level.
    pub fn with_fault_sink(mut self, faults: FaultSink) -> Self {
        self.faults = faults;
        self
    }

    pub fn build(self) -> Enhancer<S, A> {
        Enhancer {
            systems: self.systems,
            faults: self.faults,
        }
    }
}
