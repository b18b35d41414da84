//! Re-dispatching replayable commands whose connection died mid-flight.
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use futures_util::{stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::rendezvous::Rendezvous;

/// The receiving end of a pool's resubmit queue.
///
/// The pool only ever writes to the queue: something outside of it has to take the
/// commands out and submit them again, usually through
/// [`ResubmitQueue::run_until_shutdown`]. Get one with
/// [`Pool::resubmissions`](crate::Pool::resubmissions).
///
/// Commands still queued when the queue is shut down or dropped are failed, so their callers
/// never wait forever. Once it is gone, the pool fails replayable commands instead of
/// queueing them.
pub struct ResubmitQueue<Cmd, Res> {
    receiver: mpsc::Receiver<Arc<Rendezvous<Cmd, Res>>>,
}

impl<Cmd, Res> ResubmitQueue<Cmd, Res>
where
    Cmd: Send + Sync + 'static,
    Res: Send + 'static,
{
    pub(crate) fn new(receiver: mpsc::Receiver<Arc<Rendezvous<Cmd, Res>>>) -> Self {
        Self { receiver }
    }

    /// Wait for the next command to resubmit.
    ///
    /// Returns `None` once the pool has been dropped and the queue is empty.
    pub async fn recv(&mut self) -> Option<Arc<Rendezvous<Cmd, Res>>> {
        self.receiver.recv().await
    }

    /// Take the next command to resubmit, if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<Rendezvous<Cmd, Res>>> {
        self.receiver.try_recv().ok()
    }

    /// Hand every resubmitted command to `dispatch`, each on its own task, until `shutdown`
    /// resolves or the pool goes away.
    ///
    /// Commands settled while they were waiting in the queue (e.g. cancelled) are skipped.
    /// On shutdown, commands that were not picked up yet are failed. In-flight dispatches are
    /// awaited before returning.
    #[tracing::instrument(skip_all, name = "resubmit_run")]
    pub async fn run_until_shutdown<F, Fut>(
        mut self,
        shutdown: impl Future<Output = ()>,
        mut dispatch: F,
    ) where
        F: FnMut(Arc<Rendezvous<Cmd, Res>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = FuturesUnordered::new();

        let shutdown = shutdown.fuse();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Prefer shutting down over picking up more work.
                biased;

                _ = &mut shutdown => {
                    info!("resubmit queue received shutdown event");
                    self.abandon_queued();
                    break;
                }

                _ = in_flight.next(), if !in_flight.is_empty() => {}

                next = self.receiver.recv() => {
                    match next {
                        None => break,
                        Some(rendezvous) if rendezvous.is_done() => {
                            debug!(rendezvous = %rendezvous.id(), "Skipping a command settled while queued");
                        }
                        Some(rendezvous) => {
                            debug!(rendezvous = %rendezvous.id(), "Re-dispatching command");
                            in_flight.push(tokio::spawn(dispatch(rendezvous)));
                        }
                    }
                }
            }
        }

        while in_flight.next().await.is_some() {}
    }
}

impl<Cmd, Res> ResubmitQueue<Cmd, Res> {
    /// Stop accepting commands and fail those still queued.
    fn abandon_queued(&mut self) {
        self.receiver.close();
        while let Ok(rendezvous) = self.receiver.try_recv() {
            if rendezvous.set_exception(anyhow!(
                "The resubmit queue shut down before the command could be retried"
            )) {
                warn!(rendezvous = %rendezvous.id(), "Failed a command left in the resubmit queue");
            }
        }
    }
}

impl<Cmd, Res> Drop for ResubmitQueue<Cmd, Res> {
    fn drop(&mut self) {
        self.abandon_queued();
    }
}
