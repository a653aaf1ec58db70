//! Native workers backed by dedicated OS threads.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use super::{PoolError, Reply, Worker, WorkerError, WorkerPool};

/// The function every thread worker in a pool runs for each task.
pub type Job<T, R> = Arc<dyn Fn(T) -> Result<R, WorkerError> + Send + Sync>;

/// Configuration for a pool of thread workers.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Thread name prefix; threads are named `{prefix}-{index}`.
    pub thread_name: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            thread_name: "imgpdf-worker".to_string(),
        }
    }
}

fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// A worker running tasks on its own thread, one at a time.
pub struct ThreadWorker<T, R> {
    tx: Mutex<Option<Sender<(T, Reply<R>)>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<T, R> ThreadWorker<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Spawn a named thread that runs `job` for every task it is sent.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Spawn` if the OS refuses to create the thread.
    pub fn spawn(name: impl Into<String>, job: Job<T, R>) -> Result<Self, PoolError> {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(name.into())
            .spawn(move || worker_loop(rx, job))
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        })
    }
}

impl<T, R> Worker<T, R> for ThreadWorker<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn send(&self, input: T, reply: Reply<R>) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let refused = match tx.as_ref() {
            Some(tx) => tx
                .send((input, reply))
                .err()
                .map(|mpsc::SendError((_, reply))| reply),
            None => Some(reply),
        };
        // Reported outside the lock: the pool may dispatch back to this worker.
        drop(tx);
        if let Some(reply) = refused {
            reply.reject(WorkerError::Stopped);
        }
    }

    fn stop(&self) {
        // Closing the channel ends the loop once the current task is done.
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            // A job stopping its own worker cannot wait for itself.
            if thread.thread().id() != thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

impl<T, R> Drop for ThreadWorker<T, R> {
    fn drop(&mut self) {
        // Detach rather than join; `stop` is the orderly shutdown path.
        drop(self.tx.lock().unwrap_or_else(PoisonError::into_inner).take());
    }
}

fn worker_loop<T, R>(rx: Receiver<(T, Reply<R>)>, job: Job<T, R>) {
    for (input, reply) in rx {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(input)))
            .unwrap_or_else(|payload| Err(WorkerError::Panicked(panic_message(&*payload))));
        reply.report(outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Build a pool of `config.workers` threads all running `job`.
///
/// # Errors
///
/// Returns `PoolError::NoWorkers` for a zero-sized config and
/// `PoolError::Spawn` if a thread cannot be created.
pub fn spawn_thread_pool<T, R, F>(
    config: &ThreadPoolConfig,
    job: F,
) -> Result<WorkerPool<T, R, ThreadWorker<T, R>>, PoolError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Result<R, WorkerError> + Send + Sync + 'static,
{
    let job: Job<T, R> = Arc::new(job);
    let workers = (0..config.workers)
        .map(|index| {
            ThreadWorker::spawn(format!("{}-{}", config.thread_name, index), job.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;
    WorkerPool::new(workers)
}
