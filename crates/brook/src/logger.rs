//! Development-time action logging.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::action::{Action, State};
use crate::error::BrookError;
use crate::store::{SharedReducer, StoreCreator, StoreEnhancer};

/// Target used for everything the logger emits, so it can be filtered on its own.
pub const DEVTOOLS_TARGET: &str = "brook::devtools";

/// Store enhancer that logs each dispatched action and how long the
/// reducer took, plus any reducer failure.
#[derive(Debug, Clone, Default)]
pub struct ActionLogger {
    label: Option<String>,
}

impl ActionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every log line with `label`, e.g. the app name.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

impl<S: State, A: Action> StoreEnhancer<S, A> for ActionLogger {
    fn enhance(&self, next: StoreCreator<S, A>) -> StoreCreator<S, A> {
        let label: Arc<str> = Arc::from(self.label.as_deref().unwrap_or("store"));
        Arc::new(
            move |reducer: SharedReducer<S, A>,
                  preloaded: Option<S>,
                  further: Option<Arc<dyn StoreEnhancer<S, A>>>| {
                let store = next(reducer, preloaded, further);
                let original = store.dispatcher();
                let label = label.clone();
                store.with_dispatch(Arc::new(move |action: A| -> Result<A, BrookError> {
                    let started = Instant::now();
                    match original(action) {
                        Ok(action) => {
                            debug!(
                                target: DEVTOOLS_TARGET,
                                store = %label,
                                action = ?action,
                                elapsed_us = started.elapsed().as_micros() as u64,
                                "dispatch"
                            );
                            Ok(action)
                        }
                        Err(error) => {
                            warn!(
                                target: DEVTOOLS_TARGET,
                                store = %label,
                                %error,
                                "dispatch failed"
                            );
                            Err(error)
                        }
                    }
                }))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn test_logger_is_transparent_to_dispatch() {
        let store = Store::enhanced(
            |s: &u32, n: &u32| -> anyhow::Result<u32> { Ok(s + n) },
            None,
            ActionLogger::labelled("counter"),
        );
        assert_eq!(store.dispatch(3).unwrap(), 3);
        assert_eq!(store.state(), 3);
    }

    #[test]
    fn test_logger_passes_reducer_errors_through() {
        let store = Store::enhanced(
            |_: &u32, _: &u32| -> anyhow::Result<u32> { anyhow::bail!("nope") },
            Some(1),
            ActionLogger::new(),
        );
        assert!(matches!(store.dispatch(1), Err(BrookError::Reducer { .. })));
        assert_eq!(store.state(), 1);
    }
}
