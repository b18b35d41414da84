//! The capability set a connection type must provide to be pooled.
mod tcp;

pub use tcp::{TcpCommand, TcpConnectionManager};

use crate::configuration::Endpoint;

/// `ConnectionManager` teaches a [`Pool`](crate::Pool) how to create, check and dispose of
/// connections of a given kind, and which commands are safe to replay.
///
/// The pool itself never looks inside a connection or a command: everything
/// protocol-specific lives behind this trait.
///
/// # Implementers
///
/// A single manager is shared by every pool a [`PoolFactory`](crate::PoolFactory) builds,
/// hence `create` receives the endpoint it should connect to.
#[async_trait::async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    /// The live connection handed out to callers.
    type Connection: Send + 'static;
    /// The unit of work callers submit through a [`Rendezvous`](crate::Rendezvous).
    type Command: Send + Sync + 'static;
    /// What a successfully executed command produces.
    type Response: Send + 'static;

    /// Establish a new connection to `endpoint`.
    ///
    /// Failures count towards the pool's session failure budget.
    async fn create(&self, endpoint: &Endpoint) -> Result<Self::Connection, anyhow::Error>;

    /// Check that an idle connection is still usable before handing it out.
    ///
    /// Returning `false` discards the connection and frees its slot.
    async fn validate(&self, connection: &mut Self::Connection) -> bool;

    /// Dispose of a connection the pool no longer wants.
    fn close(&self, connection: Self::Connection) {
        drop(connection);
    }

    /// `true` if `command` can be executed again on a fresh connection after a failure
    /// without duplicating side effects.
    fn is_replayable(&self, command: &Self::Command) -> bool;
}
