use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::configuration::Endpoint;
use crate::pool::PoolState;

/// Error returned when the pool cannot hand out a connection.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// The pool is not accepting work: it was never started or it is shutting down.
    ///
    /// Never retried internally.
    #[error("The connection pool for {endpoint} is not active (state: {state})")]
    NotActive { endpoint: Endpoint, state: PoolState },
    /// No idle connection became available within the checkout timeout.
    ///
    /// The pool does not retry on your behalf, but it is safe to try again later.
    #[error("Timeout after {}s waiting for a connection to {endpoint}", .waited.as_secs())]
    Timeout { endpoint: Endpoint, waited: Duration },
    /// The pool was configured with values it cannot operate with.
    #[error("Invalid connection pool configuration: {0}")]
    InvalidArgument(String),
}

impl PoolError {
    /// `true` if the caller may retry the same operation at a later time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// The failure delivered to a command through its [`Rendezvous`](crate::Rendezvous).
///
/// The underlying error is shared: a fatal failure is handed to the in-flight command
/// and recorded as the pool's terminal error at the same time.
#[derive(Clone)]
pub struct CommandError(Arc<anyhow::Error>);

impl CommandError {
    /// The underlying error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Attempt to downcast the underlying error to a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl From<anyhow::Error> for CommandError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        Self(Arc::new(err.into()))
    }
}

impl fmt::Debug for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&**self.0)
    }
}
