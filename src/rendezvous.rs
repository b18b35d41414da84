//! The completion point between a submitted command and its outcome.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;
use uuid::Uuid;

use crate::pool::CommandError;

/// Error returned when awaiting a [`Rendezvous`] does not yield a response.
#[derive(thiserror::Error, Debug)]
pub enum RendezvousError {
    #[error("The command was cancelled before it completed")]
    Cancelled,
    #[error("The command failed")]
    Failed(#[source] CommandError),
    #[error("The outcome of the command has already been consumed")]
    Consumed,
}

enum Outcome<Res> {
    Pending,
    Succeeded(Res),
    Failed(CommandError),
    Cancelled,
    Consumed,
}

/// `Rendezvous` joins a submitted command to its eventual result, failure or cancellation.
///
/// The caller creates it, hands it to [`Pool::get_handle`](crate::Pool::get_handle) and then
/// awaits [`Rendezvous::wait`]. Whoever drives the command to completion settles it exactly
/// once: later attempts to set a result, a failure or to cancel are ignored and return
/// `false`.
///
/// A rendezvous is never reused. If its command is replayable and the connection fails, the
/// same rendezvous travels through the resubmit queue and is settled by the next attempt.
pub struct Rendezvous<Cmd, Res> {
    id: Uuid,
    command: Cmd,
    outcome: Mutex<Outcome<Res>>,
    cancelled: AtomicBool,
    completed: Notify,
}

impl<Cmd, Res> Rendezvous<Cmd, Res> {
    /// Wrap `command` in a new, pending rendezvous.
    pub fn new(command: Cmd) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            command,
            outcome: Mutex::new(Outcome::Pending),
            cancelled: AtomicBool::new(false),
            completed: Notify::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn command(&self) -> &Cmd {
        &self.command
    }

    /// Deliver the response. Returns `false` if the rendezvous was already settled.
    pub fn set_result(&self, response: Res) -> bool {
        self.settle(Outcome::Succeeded(response))
    }

    /// Deliver a terminal failure. Returns `false` if the rendezvous was already settled.
    pub fn set_exception(&self, err: impl Into<CommandError>) -> bool {
        self.settle(Outcome::Failed(err.into()))
    }

    /// Cancel the command: the waiting caller observes [`RendezvousError::Cancelled`].
    ///
    /// This does not return the connection the command may be holding.
    pub fn cancel(&self) -> bool {
        self.settle(Outcome::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `true` once a result, a failure or a cancellation has been delivered.
    pub fn is_done(&self) -> bool {
        !matches!(*self.lock(), Outcome::Pending)
    }

    /// Wait until the rendezvous is settled and take its outcome.
    ///
    /// The response can only be taken once; subsequent calls return
    /// [`RendezvousError::Consumed`]. Cancellation is reported every time.
    pub async fn wait(&self) -> Result<Res, RendezvousError> {
        loop {
            let notified = self.completed.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a concurrent settle cannot slip
            // between the check and the await.
            notified.as_mut().enable();

            if let Some(outcome) = self.take_outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn settle(&self, outcome: Outcome<Res>) -> bool {
        let mut slot = self.lock();
        if !matches!(*slot, Outcome::Pending) {
            return false;
        }
        // Visible before any waiter can observe the cancellation.
        if matches!(outcome, Outcome::Cancelled) {
            self.cancelled.store(true, Ordering::Release);
        }
        *slot = outcome;
        drop(slot);
        self.completed.notify_waiters();
        true
    }

    fn take_outcome(&self) -> Option<Result<Res, RendezvousError>> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Outcome::Consumed) {
            Outcome::Pending => {
                *slot = Outcome::Pending;
                None
            }
            Outcome::Cancelled => {
                *slot = Outcome::Cancelled;
                Some(Err(RendezvousError::Cancelled))
            }
            Outcome::Succeeded(response) => Some(Ok(response)),
            Outcome::Failed(err) => Some(Err(RendezvousError::Failed(err))),
            Outcome::Consumed => Some(Err(RendezvousError::Consumed)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Outcome<Res>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<Cmd: std::fmt::Debug, Res> std::fmt::Debug for Rendezvous<Cmd, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
