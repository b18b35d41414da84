//! A bounded pool of connections to a single remote [`Endpoint`].
//!
//! The pool provides a few key guarantees:
//! - No more than `max_connections` connections are open at the same time.
//! - Broken or stale connections are never handed out: they are disposed of and replaced
//!   on-demand.
//! - A connection serves at most `max_connection_reuse` commands before being retired.
//! - After `max_session_failures` connection-level failures, the pool shuts itself down.
//! - Commands that fail mid-flight are resubmitted if, and only if, they are replayable.
//!
//! ```rust,no_run
//! use rendezvous_pool::{Endpoint, Pool, Rendezvous, TcpCommand, TcpConnectionManager};
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! // Function for asyncness.
//! async fn example() -> anyhow::Result<()> {
//!     let endpoint: Endpoint = "tcp://localhost:7000".parse()?;
//!     let pool = Pool::builder(endpoint, TcpConnectionManager::new())
//!         .max_connections(4)
//!         .build()?;
//!     pool.start();
//!
//!     let rendezvous = Rendezvous::new(TcpCommand::replayable(b"PING\n".to_vec()));
//!     let mut handle = pool.get_handle(rendezvous.clone()).await?;
//!
//!     let payload = handle.command().payload.clone();
//!     handle.connection_mut().write_all(&payload).await?;
//!     let mut response = vec![0; 5];
//!     match handle.connection_mut().read_exact(&mut response).await {
//!         Ok(_) => {
//!             handle.complete(response);
//!         }
//!         Err(e) => handle.fail(e),
//!     }
//!
//!     let response = rendezvous.wait().await?;
//!     Ok(())
//! }
//! ```
mod connection;
mod error;
mod handle;

pub use connection::ConnectionKey;
pub use error::{CommandError, PoolError};
pub use handle::ConnectionHandle;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::configuration::{Endpoint, PoolSettings};
use crate::manager::ConnectionManager;
use crate::rendezvous::Rendezvous;
use crate::resubmit::ResubmitQueue;
use connection::{IdleQueue, Pooled, Slot};

/// The [`Rendezvous`] type matching the commands and responses of a [`ConnectionManager`].
pub type RendezvousOf<M> =
    Rendezvous<<M as ConnectionManager>::Command, <M as ConnectionManager>::Response>;

/// Lifecycle of a [`Pool`].
///
/// States only move forward: `Inactive` → `Active` → `ShuttingDown` → `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Built, but not started yet.
    Inactive,
    /// Serving checkouts.
    Active,
    /// No new checkouts; waiting for checked-out connections to come back.
    ShuttingDown,
    /// Every connection has been closed.
    Terminated,
}

impl PoolState {
    /// `true` once the pool has started shutting down.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Active => write!(f, "active"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// A point-in-time snapshot of a [`Pool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub state: PoolState,
    pub max_connections: usize,
    /// Connections currently open or being opened, idle or checked out.
    pub open: usize,
    pub idle: usize,
    /// Callers blocked waiting for a connection.
    pub waiting: usize,
    pub session_failures: usize,
    pub hit_bottom: bool,
}

/// `Pool` mediates access to a bounded number of connections to one [`Endpoint`].
///
/// Callers obtain a [`ConnectionHandle`] for a [`Rendezvous`] with [`Pool::get_handle`],
/// execute the command on the handle's connection and then
/// [complete](ConnectionHandle::complete), [release](ConnectionHandle::release) or
/// [fail](ConnectionHandle::fail) the handle.
///
/// `Pool` is cheap to clone: clones share the same connections.
/// Two pools are equal if they target the same endpoint.
///
/// # How do I build a `Pool`?
///
/// The starting point is [`Pool::builder`], or a [`PoolFactory`](crate::PoolFactory) if you
/// talk to more than one endpoint.
/// A freshly built pool is [`PoolState::Inactive`]: call [`Pool::start`] before using it.
pub struct Pool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

struct PoolInner<M: ConnectionManager> {
    endpoint: Endpoint,
    manager: Arc<M>,
    max_connections: usize,
    max_connection_reuse: usize,
    max_session_failures: usize,
    checkout_timeout: Duration,
    /// One permit per connection that may be open at the same time.
    all_connections: Arc<Semaphore>,
    /// The limit shared with the other pools of a [`PoolFactory`](crate::PoolFactory).
    shared_connections: Option<Arc<Semaphore>>,
    available: IdleQueue<M::Connection>,
    /// Input only: the pool never reads from this queue.
    resubmit_queue: mpsc::Sender<Arc<RendezvousOf<M>>>,
    /// Handed over to whoever drains resubmissions.
    resubmissions: Mutex<Option<mpsc::Receiver<Arc<RendezvousOf<M>>>>>,
    /// Which command is using which connection right now.
    handles: DashMap<ConnectionKey, Arc<RendezvousOf<M>>>,
    current_session_failures: AtomicUsize,
    hit_bottom: AtomicBool,
    waiters: AtomicUsize,
    /// Connections being opened.
    pending: AtomicUsize,
    state: watch::Sender<PoolState>,
    fatal_error: Mutex<Option<CommandError>>,
}

impl<M: ConnectionManager> Pool<M> {
    /// Start building a [`Pool`] for `endpoint`, using `manager` to open connections.
    pub fn builder(endpoint: Endpoint, manager: M) -> PoolBuilder<M> {
        PoolBuilder::new(endpoint, Arc::new(manager))
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Start serving checkouts. Has no effect unless the pool is [`PoolState::Inactive`].
    pub fn start(&self) {
        let started = self.inner.state.send_if_modified(|state| {
            if *state == PoolState::Inactive {
                *state = PoolState::Active;
                true
            } else {
                false
            }
        });
        if started {
            info!(endpoint = %self.inner.endpoint, "Connection pool started");
        }
    }

    /// Stop accepting new work and close every idle connection.
    ///
    /// Callers blocked on a checkout fail with [`PoolError::NotActive`]. Checked-out
    /// connections are closed when they come back; the pool is
    /// [`PoolState::Terminated`] once all of them have.
    ///
    /// Calling `shutdown` more than once is harmless.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn state(&self) -> PoolState {
        self.inner.state()
    }

    /// Resolves once the pool is [`PoolState::Terminated`].
    pub async fn await_termination(&self) {
        self.inner
            .wait_for_state(|state| state == PoolState::Terminated)
            .await;
    }

    /// Check out a connection and bind it to `rendezvous`.
    ///
    /// Fails immediately with [`PoolError::NotActive`] if the pool is not active, or with
    /// [`PoolError::Timeout`] if no connection became available within the checkout
    /// timeout. A rendezvous that has already been settled (e.g. cancelled) is rejected with
    /// [`PoolError::InvalidArgument`].
    ///
    /// A rendezvous must not be handed to `get_handle` again while a handle bound to it is
    /// still alive: one command uses at most one connection at a time.
    #[tracing::instrument(
        name = "pool_get_handle",
        skip_all,
        fields(endpoint = %self.inner.endpoint, rendezvous = %rendezvous.id())
    )]
    pub async fn get_handle(
        &self,
        rendezvous: Arc<RendezvousOf<M>>,
    ) -> Result<ConnectionHandle<M>, PoolError> {
        self.inner.ensure_active()?;
        if rendezvous.is_done() {
            return Err(PoolError::InvalidArgument(format!(
                "rendezvous {} has already been settled",
                rendezvous.id()
            )));
        }
        let pooled = self.inner.get_connection().await?;
        self.inner
            .handles
            .insert(pooled.key, Arc::clone(&rendezvous));
        Ok(ConnectionHandle::new(
            pooled,
            rendezvous,
            Arc::clone(&self.inner),
        ))
    }

    /// Cancel the command currently using connection `key`.
    ///
    /// The connection stays checked out: releasing it is up to whoever holds the handle.
    /// Returns `false` if no pending command is bound to `key`.
    pub fn cancel(&self, key: ConnectionKey) -> bool {
        match self.inner.lookup(key) {
            Some(rendezvous) => rendezvous.cancel(),
            None => false,
        }
    }

    /// Deliver `err` as the terminal failure of the command using connection `key`.
    ///
    /// Returns `false` if no pending command is bound to `key`.
    pub fn set_response_exception(&self, err: impl Into<CommandError>, key: ConnectionKey) -> bool {
        self.inner.set_response_exception(err.into(), key)
    }

    /// Route a failure of connection `key`: replayable commands are queued for resubmission,
    /// everything else receives `err` as a terminal failure.
    ///
    /// A replayable command also receives `err` when it cannot be queued: the pool is not
    /// active, the queue is full, or nobody has taken it with [`Pool::resubmissions`] (or the
    /// taker dropped it). Nothing would ever retry it otherwise.
    pub fn resubmit_if_replayable(&self, key: ConnectionKey, err: impl Into<CommandError>) {
        self.inner.resubmit_if_replayable(key, err.into());
    }

    /// Fail the command using connection `key`, record `err` as the pool's terminal error
    /// and shut the pool down.
    pub fn fatal_exception(&self, err: impl Into<CommandError>, key: ConnectionKey) {
        self.inner.fatal_exception(err.into(), key);
    }

    /// The error that caused the pool to shut itself down, if any.
    pub fn fatal_error(&self) -> Option<CommandError> {
        self.inner.lock_fatal_error().clone()
    }

    /// Connection-level failures observed since the pool was built.
    pub fn session_failures(&self) -> usize {
        self.inner.current_session_failures.load(Ordering::SeqCst)
    }

    /// `true` if the pool has been saturated at least once.
    pub fn hit_bottom(&self) -> bool {
        self.inner.hit_bottom.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PoolStatus {
        let inner = &self.inner;
        PoolStatus {
            state: inner.state(),
            max_connections: inner.max_connections,
            open: inner.max_connections - inner.all_connections.available_permits(),
            idle: inner.available.len(),
            waiting: inner.waiters.load(Ordering::SeqCst),
            session_failures: inner.current_session_failures.load(Ordering::SeqCst),
            hit_bottom: inner.hit_bottom.load(Ordering::Acquire),
        }
    }

    /// Take the receiving end of the resubmit queue.
    ///
    /// Returns `None` if it has already been taken. Until it is taken, replayable commands
    /// are failed rather than resubmitted: nobody would pick them up.
    pub fn resubmissions(&self) -> Option<ResubmitQueue<M::Command, M::Response>> {
        self.inner
            .resubmissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(ResubmitQueue::new)
    }
}

impl<M: ConnectionManager> PoolInner<M> {
    fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    fn is_active(&self) -> bool {
        self.state() == PoolState::Active
    }

    fn not_active(&self) -> PoolError {
        PoolError::NotActive {
            endpoint: self.endpoint.clone(),
            state: self.state(),
        }
    }

    fn ensure_active(&self) -> Result<(), PoolError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(self.not_active())
        }
    }

    async fn get_connection(self: &Arc<Self>) -> Result<Pooled<M::Connection>, PoolError> {
        // Retries after an unusable connection share the deadline of the original call.
        let deadline = Instant::now() + self.checkout_timeout;
        loop {
            self.ensure_active()?;
            self.latch_hit_bottom();
            trace!(
                "Blocking up to {}s for a connection to {}",
                self.checkout_timeout.as_secs(),
                self.endpoint
            );
            let mut pooled = self.wait_for_idle(deadline).await?;
            if self.manager.validate(&mut pooled.connection).await {
                pooled.uses += 1;
                return Ok(pooled);
            }
            debug!(
                connection = %pooled.key,
                "Connection unusable for endpoint {}", self.endpoint
            );
            self.discard(pooled);
        }
    }

    fn latch_hit_bottom(&self) {
        if self.hit_bottom.load(Ordering::Acquire) {
            return;
        }
        if self.available.is_empty()
            && !self.has_free_slot()
            && self
                .hit_bottom
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            warn!(endpoint = %self.endpoint, "saturated connection pool");
        }
    }

    fn has_free_slot(&self) -> bool {
        self.all_connections.available_permits() > 0
            && self
                .shared_connections
                .as_ref()
                .map_or(true, |shared| shared.available_permits() > 0)
    }

    async fn wait_for_idle(
        self: &Arc<Self>,
        deadline: Instant,
    ) -> Result<Pooled<M::Connection>, PoolError> {
        let _waiting = Waiting::register(&self.waiters);
        self.replenish();
        match timeout_at(deadline, self.available.pop()).await {
            Ok(Ok(pooled)) => Ok(pooled),
            Ok(Err(_closed)) => Err(self.not_active()),
            Err(_elapsed) => Err(PoolError::Timeout {
                endpoint: self.endpoint.clone(),
                waited: self.checkout_timeout,
            }),
        }
    }

    /// Open connections for waiting callers that neither an idle connection nor a pending
    /// creation will serve, as long as permits allow.
    fn replenish(self: &Arc<Self>) {
        // Check-ins may happen outside of a runtime, e.g. a handle dropped on a plain thread.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        while self.is_active()
            && self.waiters.load(Ordering::SeqCst)
                > self.available.len() + self.pending.load(Ordering::SeqCst)
        {
            let Ok(permit) = Arc::clone(&self.all_connections).try_acquire_owned() else {
                break;
            };
            self.pending.fetch_add(1, Ordering::SeqCst);
            runtime.spawn(Arc::clone(self).create_connection(permit));
        }
    }

    async fn create_connection(self: Arc<Self>, local: OwnedSemaphorePermit) {
        match self.reserve_slot(local).await {
            Some(slot) => self.open_connection(slot).await,
            None => trace!("Gave up waiting for room to connect to {}", self.endpoint),
        }
        self.pending.fetch_sub(1, Ordering::SeqCst);
        self.replenish();
        self.maybe_terminate();
    }

    /// Complete `local` with a permit from the shared limit, if there is one.
    ///
    /// Waits for another pool to give a connection back, unless this pool stops being active
    /// first.
    async fn reserve_slot(&self, local: OwnedSemaphorePermit) -> Option<Slot> {
        let Some(shared) = &self.shared_connections else {
            return Some(Slot::new(local, None));
        };
        if let Ok(permit) = Arc::clone(shared).try_acquire_owned() {
            return Some(Slot::new(local, Some(permit)));
        }
        trace!("Waiting for another pool to free a connection slot");
        tokio::select! {
            permit = Arc::clone(shared).acquire_owned() => {
                permit.ok().map(|permit| Slot::new(local, Some(permit)))
            }
            _ = self.wait_for_state(|state| state != PoolState::Active) => None,
        }
    }

    async fn open_connection(&self, slot: Slot) {
        match self.manager.create(&self.endpoint).await {
            Ok(connection) => {
                let pooled = Pooled::new(connection, slot);
                debug!(connection = %pooled.key, "Opened a new connection to {}", self.endpoint);
                if let Err(pooled) = self.available.push(pooled) {
                    self.manager.close(pooled.connection);
                }
            }
            Err(e) => {
                drop(slot);
                warn!(error = ?e, "Failed to open a connection to {}", self.endpoint);
                if self.record_session_failure() {
                    self.record_fatal(e.into());
                }
            }
        }
    }

    /// Put a connection back after use, or dispose of it if it has served its purpose.
    fn check_in(self: &Arc<Self>, pooled: Pooled<M::Connection>) {
        self.handles.remove(&pooled.key);
        if !self.is_active() {
            self.discard(pooled);
        } else if pooled.uses >= self.max_connection_reuse {
            debug!(
                connection = %pooled.key,
                uses = pooled.uses,
                "Retiring connection to {}", self.endpoint
            );
            self.discard(pooled);
        } else if let Err(pooled) = self.available.push(pooled) {
            self.discard(pooled);
        }
    }

    /// A connection died while executing a command.
    fn connection_failed(self: &Arc<Self>, pooled: Pooled<M::Connection>, err: CommandError) {
        let key = pooled.key;
        if self.record_session_failure() {
            self.fatal_exception(err, key);
        } else {
            self.resubmit_if_replayable(key, err);
        }
        self.handles.remove(&key);
        self.discard(pooled);
    }

    fn discard(self: &Arc<Self>, pooled: Pooled<M::Connection>) {
        let Pooled {
            key,
            connection,
            slot,
            ..
        } = pooled;
        trace!(connection = %key, "Closing connection to {}", self.endpoint);
        self.manager.close(connection);
        drop(slot);
        self.replenish();
        self.maybe_terminate();
    }

    /// Returns `true` if this failure exhausted the session failure budget.
    fn record_session_failure(&self) -> bool {
        let failures = self.current_session_failures.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            failures,
            max_session_failures = self.max_session_failures,
            "Session failure on {}", self.endpoint
        );
        failures == self.max_session_failures
    }

    fn lookup(&self, key: ConnectionKey) -> Option<Arc<RendezvousOf<M>>> {
        self.handles.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    fn set_response_exception(&self, err: CommandError, key: ConnectionKey) -> bool {
        match self.lookup(key) {
            Some(rendezvous) => self.set_exception_on_command(err, &rendezvous),
            None => {
                debug!(connection = %key, "No command bound to the connection");
                false
            }
        }
    }

    fn set_exception_on_command(&self, err: CommandError, rendezvous: &RendezvousOf<M>) -> bool {
        warn!(
            rendezvous = %rendezvous.id(),
            error = %err,
            "Exception processing command against {}", self.endpoint
        );
        rendezvous.set_exception(err)
    }

    fn resubmit_if_replayable(&self, key: ConnectionKey, err: CommandError) {
        let Some(rendezvous) = self.lookup(key) else {
            return;
        };
        if !self.manager.is_replayable(rendezvous.command()) {
            self.set_exception_on_command(err, &rendezvous);
            return;
        }
        if !self.is_active() {
            debug!(rendezvous = %rendezvous.id(), "Not resubmitting, the pool is not active");
            self.set_exception_on_command(err, &rendezvous);
            return;
        }
        if self.has_no_resubmit_consumer() {
            debug!(rendezvous = %rendezvous.id(), "Not resubmitting, nobody drains the resubmit queue");
            self.set_exception_on_command(err, &rendezvous);
            return;
        }

        info!(rendezvous = %rendezvous.id(), "resubmitting command to {}", self.endpoint);
        if let Err(e) = self.resubmit_queue.try_send(rendezvous) {
            let rendezvous = e.into_inner();
            warn!(rendezvous = %rendezvous.id(), "The resubmit queue is full or closed");
            self.set_exception_on_command(err, &rendezvous);
        }
    }

    fn has_no_resubmit_consumer(&self) -> bool {
        self.resubmissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn fatal_exception(&self, err: CommandError, key: ConnectionKey) {
        self.set_response_exception(err.clone(), key);
        self.record_fatal(err);
    }

    fn record_fatal(&self, err: CommandError) {
        error!(
            error = %err,
            "Fatal failure, shutting down the connection pool for {}", self.endpoint
        );
        *self.lock_fatal_error() = Some(err);
        self.shutdown();
    }

    fn lock_fatal_error(&self) -> std::sync::MutexGuard<'_, Option<CommandError>> {
        self.fatal_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn shutdown(&self) {
        let initiated = self.state.send_if_modified(|state| match state {
            PoolState::Inactive | PoolState::Active => {
                *state = PoolState::ShuttingDown;
                true
            }
            PoolState::ShuttingDown | PoolState::Terminated => false,
        });
        if !initiated {
            return;
        }
        info!(endpoint = %self.endpoint, "Shutting down connection pool");
        for pooled in self.available.close() {
            self.manager.close(pooled.connection);
        }
        self.maybe_terminate();
    }

    /// Resolves once the lifecycle state satisfies `reached`.
    async fn wait_for_state(&self, reached: impl Fn(PoolState) -> bool) {
        let mut state = self.state.subscribe();
        loop {
            if reached(*state.borrow_and_update()) {
                return;
            }
            if state.changed().await.is_err() {
                return;
            }
        }
    }

    fn maybe_terminate(&self) {
        // Every open, idle or pending connection holds a permit.
        if self.all_connections.available_permits() < self.max_connections {
            return;
        }
        let terminated = self.state.send_if_modified(|state| {
            if *state == PoolState::ShuttingDown {
                *state = PoolState::Terminated;
                true
            } else {
                false
            }
        });
        if terminated {
            info!(endpoint = %self.endpoint, "Connection pool terminated");
        }
    }
}

/// Counts a caller as waiting for a connection until dropped.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn register(waiters: &'a AtomicUsize) -> Self {
        waiters.fetch_add(1, Ordering::SeqCst);
        Self(waiters)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<M: ConnectionManager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionManager> PartialEq for Pool<M> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.endpoint == other.inner.endpoint
    }
}

impl<M: ConnectionManager> Eq for Pool<M> {}

impl<M: ConnectionManager> Hash for Pool<M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.endpoint.hash(state);
    }
}

impl<M: ConnectionManager> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("endpoint", &self.inner.endpoint)
            .field("status", &self.status())
            .finish()
    }
}

/// A builder for [`Pool`].
///
/// Use [`Pool::builder`] as entrypoint.
pub struct PoolBuilder<M: ConnectionManager> {
    endpoint: Endpoint,
    manager: Arc<M>,
    settings: PoolSettings,
    checkout_timeout: Duration,
    shared_connections: Option<Arc<Semaphore>>,
}

impl<M: ConnectionManager> PoolBuilder<M> {
    pub(crate) fn new(endpoint: Endpoint, manager: Arc<M>) -> Self {
        let settings = PoolSettings::default();
        Self {
            endpoint,
            manager,
            checkout_timeout: settings.checkout_timeout(),
            settings,
            shared_connections: None,
        }
    }

    /// Count this pool's connections against `limit` too, on top of its own maximum.
    #[must_use]
    pub(crate) fn shared_connections(mut self, limit: Arc<Semaphore>) -> Self {
        self.shared_connections = Some(limit);
        self
    }

    /// Take every limit from `settings`, replacing anything set so far.
    #[must_use]
    pub fn settings(mut self, settings: PoolSettings) -> Self {
        self.checkout_timeout = settings.checkout_timeout();
        self.settings = settings;
        self
    }

    /// The maximum number of connections open at the same time.
    /// Defaults to 20 if left unspecified.
    #[must_use]
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.settings.max_connections = max_connections;
        self.settings.max_connections_per_host = None;
        self
    }

    /// How many commands a connection serves before it is retired.
    /// Defaults to 75 if left unspecified.
    #[must_use]
    pub fn max_connection_reuse(mut self, max_connection_reuse: usize) -> Self {
        self.settings.max_connection_reuse = max_connection_reuse;
        self
    }

    /// How many connection-level failures are tolerated before the pool shuts down.
    /// Defaults to 2 if left unspecified.
    #[must_use]
    pub fn max_session_failures(mut self, max_session_failures: usize) -> Self {
        self.settings.max_session_failures = max_session_failures;
        self
    }

    /// How long a checkout waits for an idle connection.
    /// Defaults to 5 seconds if left unspecified.
    #[must_use]
    pub fn checkout_timeout(mut self, checkout_timeout: Duration) -> Self {
        self.checkout_timeout = checkout_timeout;
        self
    }

    /// How many replayable commands can wait for re-dispatch at the same time.
    /// Defaults to 64 if left unspecified.
    #[must_use]
    pub fn resubmit_queue_capacity(mut self, capacity: usize) -> Self {
        self.settings.resubmit_queue_capacity = capacity;
        self
    }

    /// Finalise the builder and get an inactive [`Pool`].
    ///
    /// Fails with [`PoolError::InvalidArgument`] if any limit is zero.
    pub fn build(self) -> Result<Pool<M>, PoolError> {
        self.settings.validate()?;
        let max_connections = self.settings.effective_max_connections();
        let (resubmit_queue, resubmissions) =
            mpsc::channel(self.settings.resubmit_queue_capacity);
        let (state, _) = watch::channel(PoolState::Inactive);

        Ok(Pool {
            inner: Arc::new(PoolInner {
                endpoint: self.endpoint,
                manager: self.manager,
                max_connections,
                max_connection_reuse: self.settings.max_connection_reuse,
                max_session_failures: self.settings.max_session_failures,
                checkout_timeout: self.checkout_timeout,
                all_connections: Arc::new(Semaphore::new(max_connections)),
                shared_connections: self.shared_connections,
                available: IdleQueue::new(),
                resubmit_queue,
                resubmissions: Mutex::new(Some(resubmissions)),
                handles: DashMap::new(),
                current_session_failures: AtomicUsize::new(0),
                hit_bottom: AtomicBool::new(false),
                waiters: AtomicUsize::new(0),
                pending: AtomicUsize::new(0),
                state,
                fatal_error: Mutex::new(None),
            }),
        })
    }
}
