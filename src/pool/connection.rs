//! Bookkeeping for connections owned by the pool.
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

/// Identity token assigned to every connection when it is opened.
///
/// The pool routes out-of-band events (failures, cancellations) from a connection back to the
/// command currently using it through this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey(Uuid);

impl ConnectionKey {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The room a connection takes up: one permit from its own pool and, when pools share a
/// global limit, one from the shared semaphore as well.
///
/// Dropping a `Slot` gives both permits back.
pub(crate) struct Slot {
    _local: OwnedSemaphorePermit,
    _shared: Option<OwnedSemaphorePermit>,
}

impl Slot {
    pub(crate) fn new(local: OwnedSemaphorePermit, shared: Option<OwnedSemaphorePermit>) -> Self {
        Self {
            _local: local,
            _shared: shared,
        }
    }
}

/// A live connection together with the slot it occupies.
///
/// Dropping a `Pooled` gives the slot back.
pub(crate) struct Pooled<C> {
    pub(crate) key: ConnectionKey,
    pub(crate) connection: C,
    /// How many times the connection has been checked out.
    pub(crate) uses: usize,
    pub(crate) slot: Slot,
}

impl<C> Pooled<C> {
    pub(crate) fn new(connection: C, slot: Slot) -> Self {
        Self {
            key: ConnectionKey::new(),
            connection,
            uses: 0,
            slot,
        }
    }
}

/// The queue was closed while waiting on it.
#[derive(Debug)]
pub(crate) struct Closed;

struct Entries<C> {
    queue: VecDeque<Pooled<C>>,
    closed: bool,
}

/// Idle, checked-in connections waiting to be handed out.
///
/// `ready` holds exactly one permit per queued entry: check-in pushes then adds a permit,
/// checkout takes a permit then pops, so an entry is never visible to two callers.
pub(crate) struct IdleQueue<C> {
    entries: Mutex<Entries<C>>,
    ready: Semaphore,
}

impl<C> IdleQueue<C> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Entries {
                queue: VecDeque::new(),
                closed: false,
            }),
            ready: Semaphore::new(0),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a connection. Hands it back if the queue has been closed.
    pub(crate) fn push(&self, pooled: Pooled<C>) -> Result<(), Pooled<C>> {
        let mut entries = self.lock();
        if entries.closed {
            return Err(pooled);
        }
        entries.queue.push_back(pooled);
        self.ready.add_permits(1);
        Ok(())
    }

    /// Wait for a queued connection, first come first served.
    pub(crate) async fn pop(&self) -> Result<Pooled<C>, Closed> {
        let permit = self.ready.acquire().await.map_err(|_| Closed)?;
        permit.forget();
        self.lock().queue.pop_front().ok_or(Closed)
    }

    /// Stop accepting connections, wake every waiter and hand back what was queued.
    pub(crate) fn close(&self) -> Vec<Pooled<C>> {
        let mut entries = self.lock();
        entries.closed = true;
        self.ready.close();
        entries.queue.drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Entries<C>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
