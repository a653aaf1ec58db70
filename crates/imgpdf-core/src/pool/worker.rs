//! The worker contract and the per-assignment reply channel.

use std::fmt;
use std::sync::Weak;

use super::{MaybeSendSync, WorkerError};

/// An opaque concurrent executor managed by a [`WorkerPool`](super::WorkerPool).
///
/// The pool only tracks whether a worker is idle or busy. Everything about
/// how the payload runs is up to the implementation.
pub trait Worker<T, R>: MaybeSendSync {
    /// Hand one payload to the worker.
    ///
    /// Must return without waiting for the work to finish. The worker reports
    /// the outcome through `reply`, either from another thread/event later on
    /// or synchronously before returning.
    fn send(&self, input: T, reply: Reply<R>);

    /// Release the worker's resources. Called once per worker by
    /// `WorkerPool::terminate`, but must tolerate repeated calls.
    fn stop(&self);
}

/// Receiving side of a worker report, implemented by the scheduler.
pub(crate) trait Completion<R>: MaybeSendSync {
    fn complete(&self, worker: usize, task: u64, outcome: Result<R, WorkerError>);

    /// A reply for this assignment was dropped without reporting.
    fn abandoned(&self, worker: usize, task: u64);
}

/// One-shot channel through which a worker reports the outcome of a task.
///
/// Reporting consumes the reply, so a single assignment cannot be reported
/// twice. Dropping a reply without reporting leaves the task pending and the
/// worker busy.
#[must_use = "a task only completes when its reply is reported"]
pub struct Reply<R> {
    worker: usize,
    task: u64,
    pool: Weak<dyn Completion<R>>,
    reported: bool,
}

impl<R> Reply<R> {
    pub(crate) fn new(worker: usize, task: u64, pool: Weak<dyn Completion<R>>) -> Self {
        Self {
            worker,
            task,
            pool,
            reported: false,
        }
    }

    /// Index of the worker this task was assigned to.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Id of the task being reported, matching [`TaskHandle::id`](super::TaskHandle::id).
    pub fn task_id(&self) -> u64 {
        self.task
    }

    /// Report the outcome of the task.
    pub fn report(mut self, outcome: Result<R, WorkerError>) {
        self.reported = true;
        match self.pool.upgrade() {
            Some(pool) => pool.complete(self.worker, self.task, outcome),
            None => tracing::debug!(
                task = self.task,
                worker = self.worker,
                "pool dropped before the worker reported"
            ),
        }
    }

    /// Report a successful result.
    pub fn resolve(self, value: R) {
        self.report(Ok(value));
    }

    /// Report a failure.
    pub fn reject(self, error: WorkerError) {
        self.report(Err(error));
    }
}

impl<R> Drop for Reply<R> {
    fn drop(&mut self) {
        if self.reported {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.abandoned(self.worker, self.task);
        }
    }
}

impl<R> fmt::Debug for Reply<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("worker", &self.worker)
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}
