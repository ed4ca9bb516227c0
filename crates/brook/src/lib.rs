//! # Brook
//!
//! A reactive side-effect layer for reducer-driven stores.
//!
//! ## Core Concepts
//!
//! A store holds state and changes it only through a pure [`Reducer`].
//! Brook adds **systems**: reactive units that observe every dispatched
//! action and every state snapshot, and answer with actions of their own.
//! - [`Store`] = State (reduced synchronously, one action at a time)
//! - [`System`] = Reaction (derives new actions from actions and state)
//! - [`Stream`] = Flow (push-based, cold, cancelled by dropping the subscription)
//!
//! The key principle: **everything is an action**. Side effects never touch
//! state directly; they dispatch, and the reducer decides.
//!
//! ## Architecture
//!
//! ```text
//! caller / root UI
//!     │
//!     ▼ dispatch()
//! Enhanced dispatch ──► reducer ──► state listeners ──► states stream
//!     │                                                      │
//!     ▼ push(action)                                         │
//! Pool ─────────────────────────────────┐                    │
//!     │                                 │                    │
//!     ├─► System A.run(actions, states) ◄────────────────────┤
//!     │         │                       │                    │
//!     └─► System B.run(actions, states) ◄────────────────────┘
//!               │                       │
//!               └─► produced actions ───┴──► dispatch (again)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Dispatch is synchronous** - the reducer has run when dispatch returns
//! 2. **One timeline** - every subscriber sees actions in the same order
//! 3. **State before reaction** - systems see the state produced by an action
//!    before they react to it
//! 4. **Derived actions follow their cause** - an action a system produces is
//!    dispatched after the causing action reached every system
//! 5. **Isolation** - a failing system is unplugged, the others keep running
//!
//! ## Guarantees
//!
//! - **In-memory only**: nothing is persisted or replayed
//! - **No replay**: a late subscriber sees only actions dispatched after it subscribed
//! - **No cycle detection**: a system that feeds on its own output loops
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use brook::{Enhancer, Store, Stream, TaggedAction};
//!
//! fn reducer(count: &i64, action: &TaggedAction) -> anyhow::Result<i64> {
//!     Ok(match action.kind() {
//!         "INC" => count + 1,
//!         _ => *count,
//!     })
//! }
//!
//! // Every PING produces an INC half a second later.
//! let ponger = |actions: Stream<TaggedAction>, _states: Stream<i64>| {
//!     actions
//!         .filter(|a| a.is("PING"))
//!         .map(|_| TaggedAction::new("INC"))
//!         .delay(Duration::from_millis(500))
//! };
//!
//! let enhancer = Enhancer::builder().with_named_system("ponger", ponger).build();
//! let store = Store::enhanced(reducer, None, enhancer);
//!
//! store.dispatch(TaggedAction::new("PING"))?;
//! ```
//!
//! ## What This Is Not
//!
//! Brook is **not**:
//! - A UI framework
//! - A general-purpose reactive streams library
//! - A scheduler or job system
//!
//! Brook **is**:
//! > A store enhancer where systems observe, react, and dispatch.

// Core modules
mod action;
mod bootstrap;
mod broadcast;
mod enhancer;
mod error;
mod logger;
mod pool;
mod source;
mod store;
mod stream;
mod subscription;

// Markup attribute naming
pub mod attributes;

// Testing utilities are in the separate brook-testing crate

// Stress tests (test-only)
#[cfg(test)]
mod stress_tests;

// Re-export stream types
pub use stream::{Emitter, Event, Stream};
pub use subscription::Subscription;

// Re-export pool types
pub use pool::{Pool, SourceId, WeakPool};

// Re-export store types
pub use store::{
    base_creator, compose, create_store, Dispatch, Listener, Reducer, SharedReducer, Store,
    StoreCreator, StoreEnhancer,
};

// Re-export enhancer types
pub use enhancer::{Enhancer, EnhancerBuilder, System};

// Re-export devtools
pub use logger::{ActionLogger, DEVTOOLS_TARGET};

// Re-export action types
pub use action::{Action, Init, State, TaggedAction, INIT};

// Re-export error types
pub use error::{BrookError, FaultKind, FaultSink, StreamError, SystemFault};

// Re-export bootstrap types
pub use bootstrap::{Bootstrap, BootstrapConfig, Mounted, Root};
