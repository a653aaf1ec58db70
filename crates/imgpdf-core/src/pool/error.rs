//! Error types for the worker pool.

use thiserror::Error;

/// Failure reported by a worker for a single task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The task ran and failed.
    #[error("Task failed: {0}")]
    Failed(String),

    /// The task panicked while running on the worker.
    #[error("Worker panicked: {0}")]
    Panicked(String),

    /// The worker was stopped before it could accept the task.
    #[error("Worker is stopped")]
    Stopped,
}

/// Errors surfaced by [`WorkerPool`](super::WorkerPool) and its task handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// A pool was constructed without any workers.
    #[error("A worker pool needs at least one worker")]
    NoWorkers,

    /// A worker could not be started.
    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    /// The assigned worker reported a failure for this task.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// The pool was terminated before the task completed.
    #[error("Worker pool was terminated")]
    Terminated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_is_transparent_in_pool_error() {
        let err = PoolError::from(WorkerError::Failed("bad header".to_string()));
        assert_eq!(err.to_string(), "Task failed: bad header");
        assert_eq!(
            err,
            PoolError::Worker(WorkerError::Failed("bad header".to_string()))
        );
    }

    #[test]
    fn test_pool_error_display() {
        assert_eq!(
            PoolError::NoWorkers.to_string(),
            "A worker pool needs at least one worker"
        );
        assert_eq!(
            PoolError::Terminated.to_string(),
            "Worker pool was terminated"
        );
    }
}
