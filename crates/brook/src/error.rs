//! Error types and the fault boundary for misbehaving systems.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::pool::SourceId;

/// Errors surfaced by stores, streams and the bootstrap layer.
#[derive(Debug, Error)]
pub enum BrookError {
    /// The reducer refused an action. Returned to the caller of `dispatch`.
    #[error("reducer failed on action {action}: {source}")]
    Reducer {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    /// A tokio-backed source or the bootstrap was used outside a runtime.
    #[error("no tokio runtime is available on this thread")]
    NoRuntime,

    /// A DOM event name outside the supported set.
    #[error("unknown DOM event: {0}")]
    UnknownEvent(String),

    /// The scheduled init dispatch never ran to completion.
    #[error("init action task did not complete: {0}")]
    InitAborted(#[from] tokio::task::JoinError),
}

/// Error carried on a stream's error channel.
///
/// Cheap to clone so hot sources can hand the same error to every observer.
#[derive(Clone)]
pub struct StreamError(Arc<anyhow::Error>);

impl StreamError {
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Debug for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl From<anyhow::Error> for StreamError {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

impl From<BrookError> for StreamError {
    fn from(error: BrookError) -> Self {
        Self(Arc::new(error.into()))
    }
}

/// What went wrong inside a plugged system.
#[derive(Debug, Clone)]
pub enum FaultKind {
    /// The system's output stream signalled an error. The source was unplugged.
    Stream(StreamError),
    /// An action the system produced was rejected by the reducer. The source stays plugged.
    Dispatch(Arc<BrookError>),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::Stream(error) => write!(f, "stream error: {error}"),
            FaultKind::Dispatch(error) => write!(f, "dispatch error: {error}"),
        }
    }
}

/// A system malfunction, reported to a [`FaultSink`] instead of to dispatch callers.
#[derive(Debug, Clone)]
pub struct SystemFault {
    pub source: SourceId,
    pub system: Arc<str>,
    pub kind: FaultKind,
}

impl SystemFault {
    /// True when the fault caused the source to be unplugged.
    pub fn unplugged(&self) -> bool {
        matches!(self.kind, FaultKind::Stream(_))
    }
}

/// Observability boundary for system malfunctions.
///
/// The default sink logs through `tracing`; tests and hosts can install their own.
#[derive(Clone)]
pub struct FaultSink(Arc<dyn Fn(&SystemFault) + Send + Sync>);

impl FaultSink {
    pub fn new(report: impl Fn(&SystemFault) + Send + Sync + 'static) -> Self {
        Self(Arc::new(report))
    }

    /// Logs every fault at error level.
    pub fn tracing() -> Self {
        Self::new(|fault| {
            tracing::error!(
                source = %fault.source,
                system = %fault.system,
                unplugged = fault.unplugged(),
                "system fault: {}",
                fault.kind
            );
        })
    }

    pub fn report(&self, fault: &SystemFault) {
        (self.0)(fault)
    }
}

impl Default for FaultSink {
    fn default() -> Self {
        Self::tracing()
    }
}

impl fmt::Debug for FaultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FaultSink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_keeps_message_across_clones() {
        let error = StreamError::msg("socket closed");
        let copy = error.clone();
        assert_eq!(copy.to_string(), "socket closed");
        assert_eq!(error.inner().to_string(), "socket closed");
    }

    #[test]
    fn test_reducer_error_names_the_action() {
        let error = BrookError::Reducer {
            action: "Inc".to_string(),
            source: anyhow::anyhow!("overflow"),
        };
        assert_eq!(error.to_string(), "reducer failed on action Inc: overflow");
    }

    #[test]
    fn test_only_stream_faults_unplug() {
        let stream = SystemFault {
            source: SourceId::new(1),
            system: Arc::from("ticker"),
            kind: FaultKind::Stream(StreamError::msg("boom")),
        };
        let dispatch = SystemFault {
            kind: FaultKind::Dispatch(Arc::new(BrookError::NoRuntime)),
            ..stream.clone()
        };
        assert!(stream.unplugged());
        assert!(!dispatch.unplugged());
    }
}
