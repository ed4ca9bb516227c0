//! Mounting an app: store, root component and the init action.
//!
//! [`Bootstrap::mount`] builds the enhanced store, hands it to the root,
//! feeds the root's output back into dispatch, and only then schedules the
//! init action on the tokio runtime. The init action therefore always runs
//! through a fully wired feedback loop.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::action::{Action, Init, State};
use crate::error::BrookError;
use crate::logger::{ActionLogger, DEVTOOLS_TARGET};
use crate::store::{compose, create_store, Reducer, SharedReducer, Store, StoreEnhancer};
use crate::stream::{Event, Stream};
use crate::subscription::Subscription;

/// Bootstrap options.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Log every dispatched action and every root output under `brook::devtools`.
    pub devtools: bool,
    /// Name used in devtools output.
    pub app_name: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl BootstrapConfig {
    pub fn development() -> Self {
        Self {
            devtools: true,
            app_name: "App".to_string(),
        }
    }

    pub fn production() -> Self {
        Self {
            devtools: false,
            app_name: "App".to_string(),
        }
    }
}

/// The root of the UI tree. Given the element to mount into and the store,
/// returns the actions the UI produces.
///
/// Implemented for closures `Fn(E, &Store<S, A>) -> Stream<A>`.
pub trait Root<S, A, E>: Send + Sync + 'static {
    fn mount(&self, element: E, store: &Store<S, A>) -> Stream<A>;
}

impl<S, A, E, F> Root<S, A, E> for F
where
    F: Fn(E, &Store<S, A>) -> Stream<A> + Send + Sync + 'static,
{
    fn mount(&self, element: E, store: &Store<S, A>) -> Stream<A> {
        self(element, store)
    }
}

/// Everything needed to mount an app, possibly many times.
pub struct Bootstrap<S, A, E> {
    reducer: SharedReducer<S, A>,
    enhancer: Option<Arc<dyn StoreEnhancer<S, A>>>,
    root: Arc<dyn Root<S, A, E>>,
    config: BootstrapConfig,
}

impl<S, A, E> fmt::Debug for Bootstrap<S, A, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("enhanced", &self.enhancer.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl<S, A, E> Bootstrap<S, A, E>
where
    S: State,
    A: Action + From<Init>,
    E: 'static,
{
    pub fn new(reducer: impl Reducer<S, A>, root: impl Root<S, A, E>) -> Self {
        Self {
            reducer: Arc::new(reducer),
            enhancer: None,
            root: Arc::new(root),
            config: BootstrapConfig::default(),
        }
    }

    pub fn with_enhancer(mut self, enhancer: impl StoreEnhancer<S, A>) -> Self {
        self.enhancer = Some(Arc::new(enhancer));
        self
    }

    pub fn with_config(mut self, config: BootstrapConfig) -> Self {
        self.config = config;
        self
    }

    /// Mount the app into `element`, optionally from a preloaded state.
    ///
    /// Must be called from within a tokio runtime, which runs the init dispatch.
    pub fn mount(&self, element: E, state: Option<S>) -> Result<Mounted<S, A>, BrookError> {
        let runtime = Handle::try_current().map_err(|_| BrookError::NoRuntime)?;

        let store = create_store(self.reducer.clone(), state, self.enhancer_chain());

        let mut app = self.root.mount(element, &store);
        if self.config.devtools {
            let name = self.config.app_name.clone();
            app = app.inspect(move |action| {
                debug!(target: DEVTOOLS_TARGET, root = %name, action = ?action, "root output");
            });
        }

        let subscription = {
            let store = store.clone();
            app.subscribe(move |event| match event {
                Event::Value(action) => {
                    if let Err(error) = store.dispatch(action) {
                        warn!(%error, "root action rejected");
                    }
                }
                Event::Error(error) => error!(%error, "root stream error"),
                Event::End => debug!("root stream ended"),
            })
        };

        let init = {
            let store = store.clone();
            runtime.spawn(async move {
                // Never dispatch inside mount, even on a multi-threaded runtime.
                tokio::task::yield_now().await;
                store.dispatch(A::from(Init))
            })
        };
        debug!(app = %self.config.app_name, "app mounted");

        Ok(Mounted {
            store,
            _root: subscription,
            init: Some(init),
        })
    }

    fn enhancer_chain(&self) -> Option<Arc<dyn StoreEnhancer<S, A>>> {
        if !self.config.devtools {
            return self.enhancer.clone();
        }
        let logger: Arc<dyn StoreEnhancer<S, A>> =
            Arc::new(ActionLogger::labelled(self.config.app_name.clone()));
        Some(match &self.enhancer {
            Some(enhancer) => compose(vec![enhancer.clone(), logger]),
            None => logger,
        })
    }
}

/// A mounted app. Dropping it stops feeding the root's output into the store.
pub struct Mounted<S, A> {
    store: Store<S, A>,
    _root: Subscription,
    init: Option<JoinHandle<Result<A, BrookError>>>,
}

impl<S, A> fmt::Debug for Mounted<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounted")
            .field("initialized", &self.init.is_none())
            .finish()
    }
}

impl<S: State, A: Action> Mounted<S, A> {
    pub fn store(&self) -> &Store<S, A> {
        &self.store
    }

    /// Wait for the init action to go through dispatch.
    ///
    /// Returns the init dispatch's error, if any. Later calls return `Ok`.
    pub async fn initialized(&mut self) -> Result<(), BrookError> {
        if let Some(init) = self.init.take() {
            init.await??;
        }
        Ok(())
    }

    /// Stop the root's output and cancel the init action if it has not run.
    pub fn unmount(mut self) {
        if let Some(init) = self.init.take() {
            init.abort();
        }
    }
}
