//! `rendezvous-pool` is a bounded connection pool for talking to a remote endpoint over a
//! limited number of connections, built on top of [`tokio`].
//!
//! Every unit of work is a command wrapped in a [`Rendezvous`]: the caller submits it to a
//! [`Pool`], receives a [`ConnectionHandle`] to execute it on, and awaits the outcome on the
//! rendezvous. The pool takes care of:
//! - bounding the number of open connections and discarding stale ones;
//! - retiring connections after a configurable number of uses;
//! - counting connection-level failures and shutting down an unhealthy endpoint's pool;
//! - resubmitting replayable commands whose connection died mid-flight.
//!
//! The pool is protocol-agnostic: plug in your own connection type by implementing
//! [`ConnectionManager`], or use the provided [`TcpConnectionManager`].
//!
//! [`Pool`] and [`PoolFactory`] are the best starting points to learn more about what
//! `rendezvous-pool` provides and how to leverage it.

pub mod configuration;
pub mod factory;
pub mod manager;
pub mod pool;
pub mod rendezvous;
pub mod resubmit;

pub use configuration::{Endpoint, PoolSettings};
pub use factory::PoolFactory;
pub use manager::{ConnectionManager, TcpCommand, TcpConnectionManager};
pub use pool::{
    CommandError, ConnectionHandle, ConnectionKey, Pool, PoolBuilder, PoolError, PoolState,
    PoolStatus, RendezvousOf,
};
pub use rendezvous::{Rendezvous, RendezvousError};
pub use resubmit::ResubmitQueue;
