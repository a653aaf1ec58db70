//! Completion handle returned for every submitted task.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use super::PoolError;

pub(crate) type Outcome<R> = Result<R, PoolError>;

/// Future resolving to the outcome of one submitted task.
///
/// Handles are independent of each other: awaiting one never blocks the
/// pool, and dropping one only discards that task's result.
#[derive(Debug)]
#[must_use = "dropping a task handle discards the task's result"]
pub struct TaskHandle<R> {
    id: u64,
    rx: oneshot::Receiver<Outcome<R>>,
}

impl<R> TaskHandle<R> {
    pub(crate) fn new(id: u64, rx: oneshot::Receiver<Outcome<R>>) -> Self {
        Self { id, rx }
    }

    /// Create a handle that is already settled with `outcome`.
    pub(crate) fn settled(id: u64, outcome: Outcome<R>) -> Self {
        let (tx, rx) = oneshot::channel();
        // The receiver is alive right here, so this cannot fail.
        let _ = tx.send(outcome);
        Self { id, rx }
    }

    /// Pool-wide id of the task, increasing in submission order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the outcome if the task has already settled.
    ///
    /// Returns `None` while the task is still queued or running. Once an
    /// outcome has been taken, later calls and polls report
    /// [`PoolError::Terminated`].
    pub fn try_outcome(&mut self) -> Option<Outcome<R>> {
        match self.rx.try_recv() {
            Ok(Some(outcome)) => Some(outcome),
            Ok(None) => None,
            Err(oneshot::Canceled) => Some(Err(PoolError::Terminated)),
        }
    }
}

impl<R> Future for TaskHandle<R> {
    type Output = Outcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The pool released the task without settling it.
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(PoolError::Terminated)),
            Poll::Pending => Poll::Pending,
        }
    }
}
