use std::sync::Arc;

use super::connection::{ConnectionKey, Pooled};
use super::{CommandError, PoolInner, RendezvousOf};
use crate::manager::ConnectionManager;

/// A live connection bound to the [`Rendezvous`](crate::Rendezvous) of the command using it.
///
/// A handle is the only way to reach a pooled connection. Once the command has been executed,
/// hand the connection back with one of:
/// - [`complete`](ConnectionHandle::complete), to deliver the response and check the
///   connection in;
/// - [`release`](ConnectionHandle::release), to check the connection in without touching the
///   rendezvous (e.g. after a cancellation);
/// - [`fail`](ConnectionHandle::fail), if the connection broke while executing the command.
///
/// Dropping a handle is equivalent to releasing it.
pub struct ConnectionHandle<M: ConnectionManager> {
    // Only `None` once the handle has been consumed.
    pooled: Option<Pooled<M::Connection>>,
    rendezvous: Arc<RendezvousOf<M>>,
    pool: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> ConnectionHandle<M> {
    pub(super) fn new(
        pooled: Pooled<M::Connection>,
        rendezvous: Arc<RendezvousOf<M>>,
        pool: Arc<PoolInner<M>>,
    ) -> Self {
        Self {
            pooled: Some(pooled),
            rendezvous,
            pool,
        }
    }

    /// The identity of the connection, used to route [`Pool::cancel`](crate::Pool::cancel) and
    /// friends to this handle's command.
    pub fn key(&self) -> ConnectionKey {
        self.pooled().key
    }

    pub fn connection(&self) -> &M::Connection {
        &self.pooled().connection
    }

    pub fn connection_mut(&mut self) -> &mut M::Connection {
        match &mut self.pooled {
            Some(pooled) => &mut pooled.connection,
            None => unreachable!("the connection is only taken when the handle is consumed"),
        }
    }

    pub fn rendezvous(&self) -> &Arc<RendezvousOf<M>> {
        &self.rendezvous
    }

    pub fn command(&self) -> &M::Command {
        self.rendezvous.command()
    }

    /// How many commands the connection has served, this one included.
    pub fn uses(&self) -> usize {
        self.pooled().uses
    }

    /// Deliver `response` to the waiting caller and check the connection in.
    ///
    /// Returns `false` if the rendezvous had already been settled (e.g. cancelled), in which
    /// case the response is dropped.
    pub fn complete(mut self, response: M::Response) -> bool {
        let delivered = self.rendezvous.set_result(response);
        if let Some(pooled) = self.pooled.take() {
            self.pool.check_in(pooled);
        }
        delivered
    }

    /// Check the connection in, leaving the rendezvous as it is.
    pub fn release(mut self) {
        if let Some(pooled) = self.pooled.take() {
            self.pool.check_in(pooled);
        }
    }

    /// The connection failed while executing the command.
    ///
    /// The connection is discarded and counted as a session failure. The command is
    /// resubmitted if it is replayable, otherwise `err` is delivered to the waiting caller.
    pub fn fail(mut self, err: impl Into<CommandError>) {
        if let Some(pooled) = self.pooled.take() {
            self.pool.connection_failed(pooled, err.into());
        }
    }

    fn pooled(&self) -> &Pooled<M::Connection> {
        match &self.pooled {
            Some(pooled) => pooled,
            None => unreachable!("the connection is only taken when the handle is consumed"),
        }
    }
}

impl<M: ConnectionManager> Drop for ConnectionHandle<M> {
    fn drop(&mut self) {
        if let Some(pooled) = self.pooled.take() {
            self.pool.check_in(pooled);
        }
    }
}

impl<M: ConnectionManager> std::fmt::Debug for ConnectionHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.pooled.as_ref().map(|pooled| pooled.key))
            .field("rendezvous", &self.rendezvous.id())
            .field("endpoint", &self.pool.endpoint)
            .finish()
    }
}
