//! One pool per endpoint, and the lifecycle of all of them.
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::info;

use crate::configuration::{Endpoint, PoolSettings};
use crate::manager::ConnectionManager;
use crate::pool::{Pool, PoolBuilder, PoolError};

/// `PoolFactory` hands out one [`Pool`] per distinct [`Endpoint`], all sharing the same
/// [`ConnectionManager`] and [`PoolSettings`].
///
/// Pools are started as soon as they are created. A pool that shut down (e.g. after too
/// many session failures) is replaced by a fresh one the next time its endpoint is requested.
///
/// [`PoolSettings::max_connections`] caps the connections open across all of the factory's
/// pools, while [`PoolSettings::max_connections_per_host`], when set, caps each pool. A pool
/// that needs a connection while the global cap is reached waits for another pool to close
/// one: idle connections are only closed when they are retired or their pool shuts down.
///
/// # Example
///
/// ```rust
/// use rendezvous_pool::{PoolFactory, PoolSettings, PoolState, TcpConnectionManager};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let factory = PoolFactory::new(TcpConnectionManager::new(), PoolSettings::default())?;
///
/// let pool = factory.create("tcp://localhost:7000".parse()?)?;
/// assert_eq!(PoolState::Active, pool.state());
///
/// factory.shutdown_all();
/// factory.await_termination().await;
/// # Ok(())
/// # }
/// ```
pub struct PoolFactory<M: ConnectionManager> {
    manager: Arc<M>,
    settings: PoolSettings,
    /// One permit per connection open across every pool.
    all_connections: Arc<Semaphore>,
    pools: DashMap<Endpoint, Pool<M>>,
}

impl<M: ConnectionManager> PoolFactory<M> {
    /// Fails with [`PoolError::InvalidArgument`] if `settings` are not usable.
    pub fn new(manager: M, settings: PoolSettings) -> Result<Self, PoolError> {
        settings.validate()?;
        Ok(Self {
            manager: Arc::new(manager),
            all_connections: Arc::new(Semaphore::new(settings.max_connections)),
            settings,
            pools: DashMap::new(),
        })
    }

    /// Get the pool for `endpoint`, building and starting it if needed.
    pub fn create(&self, endpoint: Endpoint) -> Result<Pool<M>, PoolError> {
        match self.pools.entry(endpoint) {
            Entry::Occupied(mut entry) => {
                if !entry.get().state().is_terminal() {
                    return Ok(entry.get().clone());
                }
                let pool = self.build(entry.key().clone())?;
                entry.insert(pool.clone());
                Ok(pool)
            }
            Entry::Vacant(entry) => {
                let pool = self.build(entry.key().clone())?;
                entry.insert(pool.clone());
                Ok(pool)
            }
        }
    }

    /// The pool for `endpoint`, if one was created.
    pub fn get(&self, endpoint: &Endpoint) -> Option<Pool<M>> {
        self.pools.get(endpoint).map(|pool| pool.value().clone())
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.pools.iter().map(|pool| pool.key().clone()).collect()
    }

    /// Start every pool that has not been started yet.
    pub fn start_all(&self) {
        for pool in self.pools.iter() {
            pool.value().start();
        }
    }

    /// Shut every pool down. Calling it more than once is harmless.
    pub fn shutdown_all(&self) {
        info!(pools = self.pools.len(), "Shutting down all connection pools");
        for pool in self.pools.iter() {
            pool.value().shutdown();
        }
    }

    /// Resolves once every pool created so far is terminated.
    pub async fn await_termination(&self) {
        let pools: Vec<Pool<M>> = self.pools.iter().map(|pool| pool.value().clone()).collect();
        join_all(pools.iter().map(|pool| pool.await_termination())).await;
    }

    fn build(&self, endpoint: Endpoint) -> Result<Pool<M>, PoolError> {
        let pool = PoolBuilder::new(endpoint, Arc::clone(&self.manager))
            .settings(self.settings.clone())
            .shared_connections(Arc::clone(&self.all_connections))
            .build()?;
        pool.start();
        Ok(pool)
    }
}
