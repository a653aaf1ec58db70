//! The pool itself: task queue, idle set and completion routing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::channel::oneshot;
use serde::Serialize;

use super::handle::Outcome;
use super::worker::Completion;
use super::{MaybeSend, PoolError, Reply, TaskHandle, Worker, WorkerError};

/// A submitted task waiting for a worker.
struct Task<T, R> {
    id: u64,
    input: T,
    done: oneshot::Sender<Outcome<R>>,
}

/// The task a busy worker is currently running.
struct Assignment<R> {
    task: u64,
    done: oneshot::Sender<Outcome<R>>,
}

/// A task paired with a worker, ready to be handed over outside the lock.
struct Dispatch<T, R> {
    worker: usize,
    task: u64,
    input: T,
    reply: Reply<R>,
}

/// Snapshot of the pool's bookkeeping.
///
/// `idle + busy == size` holds for every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Number of workers, fixed for the lifetime of the pool.
    pub size: usize,
    /// Workers with no task assigned.
    pub idle: usize,
    /// Workers currently running a task.
    pub busy: usize,
    /// Tasks waiting for a worker.
    pub queued: usize,
    /// Whether `terminate` has been called.
    pub terminated: bool,
}

struct State<T, R> {
    /// FIFO backlog of tasks not yet dispatched.
    queue: VecDeque<Task<T, R>>,
    /// Free workers, in the order they became free.
    idle: VecDeque<usize>,
    /// Current task per worker; `None` iff the worker is in `idle`.
    assigned: Vec<Option<Assignment<R>>>,
    next_id: u64,
    /// Set while some caller is handing tasks to workers. Nested completions
    /// leave further dispatch to that caller.
    dispatching: bool,
    terminated: bool,
}

impl<T, R> State<T, R> {
    fn new(size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            idle: (0..size).collect(),
            assigned: (0..size).map(|_| None).collect(),
            next_id: 0,
            dispatching: false,
            terminated: false,
        }
    }

    fn next_task_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Pair the oldest queued tasks with idle workers.
    fn take_ready(&mut self, pool: &Weak<dyn Completion<R>>) -> Vec<Dispatch<T, R>> {
        let pairs = self.queue.len().min(self.idle.len());
        let mut ready = Vec::with_capacity(pairs);
        for _ in 0..pairs {
            let (Some(worker), Some(task)) = (self.idle.pop_front(), self.queue.pop_front()) else {
                break;
            };
            self.assigned[worker] = Some(Assignment {
                task: task.id,
                done: task.done,
            });
            ready.push(Dispatch {
                worker,
                task: task.id,
                input: task.input,
                reply: Reply::new(worker, task.id, pool.clone()),
            });
        }
        ready
    }

    /// Return `worker` to the idle set if it is running `task`.
    fn release(&mut self, worker: usize, task: u64) -> Option<oneshot::Sender<Outcome<R>>> {
        let slot = self.assigned.get_mut(worker)?;
        if slot.as_ref().map(|a| a.task) != Some(task) {
            return None;
        }
        let assignment = slot.take()?;
        self.idle.push_back(worker);
        Some(assignment.done)
    }

    fn is_running(&self, worker: usize, task: u64) -> bool {
        matches!(self.assigned.get(worker), Some(Some(a)) if a.task == task)
    }

    fn status(&self) -> PoolStatus {
        let size = self.assigned.len();
        PoolStatus {
            size,
            idle: self.idle.len(),
            busy: size - self.idle.len(),
            queued: self.queue.len(),
            terminated: self.terminated,
        }
    }
}

struct Shared<T, R, W> {
    workers: Box<[W]>,
    state: Mutex<State<T, R>>,
    me: Weak<Self>,
}

impl<T, R, W> Shared<T, R, W>
where
    T: MaybeSend + 'static,
    R: MaybeSend + 'static,
    W: Worker<T, R> + 'static,
{
    fn lock(&self) -> MutexGuard<'_, State<T, R>> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still guards valid bookkeeping.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> Weak<dyn Completion<R>> {
        self.me.clone()
    }

    /// Hand queued tasks to idle workers until one side runs out.
    ///
    /// Only one caller dispatches at a time. A worker reporting from inside
    /// `send` re-enters here, finds the flag set and returns, and the outer
    /// loop picks up the worker it released. Stack depth stays constant no
    /// matter how many tasks settle synchronously.
    fn dispatch(&self) {
        let mut ready = {
            let mut state = self.lock();
            if state.dispatching {
                return;
            }
            let ready = state.take_ready(&self.sink());
            if ready.is_empty() {
                return;
            }
            state.dispatching = true;
            ready
        };

        loop {
            for dispatch in ready {
                tracing::debug!(
                    task = dispatch.task,
                    worker = dispatch.worker,
                    "dispatching task"
                );
                self.workers[dispatch.worker].send(dispatch.input, dispatch.reply);
            }

            let mut state = self.lock();
            ready = state.take_ready(&self.sink());
            if ready.is_empty() {
                // Cleared in the same critical section that saw nothing to
                // do, so no release can slip in between.
                state.dispatching = false;
                return;
            }
        }
    }
}

impl<T, R, W> Completion<R> for Shared<T, R, W>
where
    T: MaybeSend + 'static,
    R: MaybeSend + 'static,
    W: Worker<T, R> + 'static,
{
    fn complete(&self, worker: usize, task: u64, outcome: Result<R, WorkerError>) {
        let Some(done) = self.lock().release(worker, task) else {
            tracing::warn!(
                task,
                worker,
                "ignoring report for a task the pool is not tracking"
            );
            return;
        };

        match &outcome {
            Ok(_) => tracing::debug!(task, worker, "task completed"),
            Err(error) => tracing::debug!(task, worker, %error, "task failed"),
        }
        // The caller may have dropped the handle; the result is discarded then.
        let _ = done.send(outcome.map_err(PoolError::from));

        self.dispatch();
    }

    fn abandoned(&self, worker: usize, task: u64) {
        if self.lock().is_running(worker, task) {
            tracing::warn!(
                task,
                worker,
                "worker dropped its reply without reporting; task will stay pending"
            );
        }
    }
}

/// A fixed set of workers fed from an unbounded FIFO queue.
///
/// Tasks go straight to an idle worker when there is one and wait in the
/// queue otherwise. Whenever a worker reports, it is marked idle, the task's
/// handle is settled, and the oldest queued task is dispatched to it.
///
/// Which idle worker gets the next task is not part of the contract. The
/// current choice is the worker that has been idle the longest.
///
/// Dropping the pool terminates it.
pub struct WorkerPool<T, R, W>
where
    T: MaybeSend + 'static,
    R: MaybeSend + 'static,
    W: Worker<T, R> + 'static,
{
    shared: Arc<Shared<T, R, W>>,
}

impl<T, R, W> WorkerPool<T, R, W>
where
    T: MaybeSend + 'static,
    R: MaybeSend + 'static,
    W: Worker<T, R> + 'static,
{
    /// Create a pool over a fixed, non-empty set of workers.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NoWorkers` if `workers` is empty.
    pub fn new(workers: impl IntoIterator<Item = W>) -> Result<Self, PoolError> {
        let workers: Box<[W]> = workers.into_iter().collect();
        if workers.is_empty() {
            return Err(PoolError::NoWorkers);
        }
        let size = workers.len();
        let shared = Arc::new_cyclic(|me| Shared {
            workers,
            state: Mutex::new(State::new(size)),
            me: me.clone(),
        });
        tracing::debug!(size, "worker pool created");
        Ok(Self { shared })
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.shared.workers.len()
    }

    /// The workers, indexed as in [`Reply::worker`].
    pub fn workers(&self) -> &[W] {
        &self.shared.workers
    }

    /// Submit one task.
    ///
    /// Returns immediately. The handle settles once the assigned worker
    /// reports. After [`terminate`](Self::terminate) the handle is already
    /// rejected with `PoolError::Terminated`.
    pub fn submit(&self, input: T) -> TaskHandle<R> {
        let (id, rx) = {
            let mut state = self.shared.lock();
            let id = state.next_task_id();
            if state.terminated {
                return TaskHandle::settled(id, Err(PoolError::Terminated));
            }
            let (done, rx) = oneshot::channel();
            state.queue.push_back(Task { id, input, done });
            (id, rx)
        };
        self.shared.dispatch();
        TaskHandle::new(id, rx)
    }

    /// Submit every input in order.
    ///
    /// The Nth handle belongs to the Nth input. Handles may settle in any
    /// order.
    pub fn map(&self, inputs: impl IntoIterator<Item = T>) -> Vec<TaskHandle<R>> {
        inputs.into_iter().map(|input| self.submit(input)).collect()
    }

    /// Snapshot of idle/busy workers and queue length.
    pub fn status(&self) -> PoolStatus {
        self.shared.lock().status()
    }

    /// Stop every worker and reject all unfinished tasks.
    ///
    /// Queued and in-flight handles settle with `PoolError::Terminated`.
    /// Reports that arrive afterwards are ignored. Calling this more than
    /// once has no further effect.
    pub fn terminate(&self) {
        let (queued, running) = {
            let mut state = self.shared.lock();
            if state.terminated {
                return;
            }
            state.terminated = true;
            let queued: Vec<_> = state.queue.drain(..).map(|task| task.done).collect();
            let mut running = Vec::new();
            for worker in 0..state.assigned.len() {
                if let Some(assignment) = state.assigned[worker].take() {
                    state.idle.push_back(worker);
                    running.push(assignment.done);
                }
            }
            (queued, running)
        };

        tracing::info!(
            size = self.size(),
            queued = queued.len(),
            running = running.len(),
            "terminating worker pool"
        );
        for worker in self.shared.workers.iter() {
            worker.stop();
        }
        for done in queued.into_iter().chain(running) {
            let _ = done.send(Err(PoolError::Terminated));
        }
    }
}

impl<T, R, W> Drop for WorkerPool<T, R, W>
where
    T: MaybeSend + 'static,
    R: MaybeSend + 'static,
    W: Worker<T, R> + 'static,
{
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Collects every hand-off so the test decides when each task reports.
    type Inbox = Arc<Mutex<Vec<(u32, Reply<u32>)>>>;

    struct ManualWorker {
        inbox: Inbox,
        stops: Arc<AtomicUsize>,
    }

    impl Worker<u32, u32> for ManualWorker {
        fn send(&self, input: u32, reply: Reply<u32>) {
            self.inbox.lock().unwrap().push((input, reply));
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manual_pool(size: usize) -> (WorkerPool<u32, u32, ManualWorker>, Inbox, Arc<AtomicUsize>) {
        let inbox = Inbox::default();
        let stops = Arc::new(AtomicUsize::new(0));
        let workers = (0..size).map(|_| ManualWorker {
            inbox: inbox.clone(),
            stops: stops.clone(),
        });
        (WorkerPool::new(workers).unwrap(), inbox, stops)
    }

    /// Pop the oldest pending hand-off.
    fn next_sent(inbox: &Inbox) -> (u32, Reply<u32>) {
        inbox.lock().unwrap().remove(0)
    }

    fn sent_count(inbox: &Inbox) -> usize {
        inbox.lock().unwrap().len()
    }

    /// Reports synchronously from inside `send`.
    struct DoublingWorker;

    impl Worker<u32, u32> for DoublingWorker {
        fn send(&self, input: u32, reply: Reply<u32>) {
            reply.resolve(input * 2);
        }

        fn stop(&self) {}
    }

    /// Holds tasks until `stopped` is set, then rejects inside `send`.
    struct StoppableWorker {
        held: Inbox,
        stopped: Arc<AtomicBool>,
    }

    impl Worker<u32, u32> for StoppableWorker {
        fn send(&self, input: u32, reply: Reply<u32>) {
            if self.stopped.load(Ordering::SeqCst) {
                reply.reject(WorkerError::Stopped);
            } else {
                self.held.lock().unwrap().push((input, reply));
            }
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    fn assert_capacity(status: PoolStatus) {
        assert_eq!(status.idle + status.busy, status.size);
        assert!(status.busy <= status.size);
    }

    #[test]
    fn test_new_rejects_empty_worker_set() {
        let result = WorkerPool::<u32, u32, DoublingWorker>::new(Vec::new());
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_initial_status_all_idle() {
        let (pool, _, _) = manual_pool(3);
        let status = pool.status();
        assert_eq!(pool.size(), 3);
        assert_eq!(status.idle, 3);
        assert_eq!(status.busy, 0);
        assert_eq!(status.queued, 0);
        assert!(!status.terminated);
    }

    #[test]
    fn test_submit_dispatches_immediately_when_idle() {
        let (pool, inbox, _) = manual_pool(2);
        let _handle = pool.submit(10);

        assert_eq!(sent_count(&inbox), 1);
        let status = pool.status();
        assert_eq!(status.busy, 1);
        assert_eq!(status.queued, 0);
    }

    #[test]
    fn test_synchronous_report_inside_send() {
        let pool = WorkerPool::new([DoublingWorker]).unwrap();
        let handles = pool.map([1, 2, 3]);
        let results: Vec<_> = handles.into_iter().map(block_on).collect();

        assert_eq!(results, vec![Ok(2), Ok(4), Ok(6)]);
        assert_eq!(pool.status().idle, 1);
    }

    #[test]
    fn test_large_backlog_on_rejecting_worker_settles_without_recursion() {
        const TASKS: u32 = 10_000;
        let held = Inbox::default();
        let pool = WorkerPool::new([StoppableWorker {
            held: held.clone(),
            stopped: Arc::new(AtomicBool::new(false)),
        }])
        .unwrap();
        let handles = pool.map(0..TASKS);
        assert_eq!(pool.status().queued, TASKS as usize - 1);

        pool.workers()[0].stop();
        let (input, reply) = next_sent(&held);
        reply.resolve(input);

        let status = pool.status();
        assert_eq!(status.queued, 0);
        assert_eq!(status.idle, 1);

        let results: Vec<_> = handles.into_iter().map(block_on).collect();
        assert_eq!(results[0], Ok(0));
        assert!(results[1..]
            .iter()
            .all(|r| *r == Err(PoolError::Worker(WorkerError::Stopped))));
    }

    #[test]
    fn test_fifo_dispatch_single_worker() {
        let (pool, inbox, _) = manual_pool(1);
        let handles = pool.map([1, 2, 3, 4]);

        let mut started = Vec::new();
        for _ in 0..4 {
            // Only one task may be in flight on a pool of one.
            assert_eq!(sent_count(&inbox), 1);
            let (input, reply) = next_sent(&inbox);
            started.push(input);
            reply.resolve(input);
        }

        assert_eq!(started, vec![1, 2, 3, 4]);
        let results: Vec<_> = handles.into_iter().map(block_on).collect();
        assert_eq!(results, vec![Ok(1), Ok(2), Ok(3), Ok(4)]);
    }

    #[test]
    fn test_backlog_drains_with_bounded_concurrency() {
        let (pool, inbox, _) = manual_pool(2);
        let handles = pool.map([1, 2, 3, 4, 5]);

        let status = pool.status();
        assert_eq!(status.busy, 2);
        assert_eq!(status.queued, 3);
        assert_eq!(sent_count(&inbox), 2);

        let mut completed = 0;
        while completed < 5 {
            assert!(sent_count(&inbox) <= 2);
            assert_capacity(pool.status());
            let (input, reply) = next_sent(&inbox);
            reply.resolve(input * 10);
            completed += 1;
        }

        let status = pool.status();
        assert_eq!(status.idle, 2);
        assert_eq!(status.queued, 0);
        let results: Vec<_> = handles.into_iter().map(block_on).collect();
        assert_eq!(results, vec![Ok(10), Ok(20), Ok(30), Ok(40), Ok(50)]);
    }

    #[test]
    fn test_map_preserves_input_order_under_reversed_completion() {
        let (pool, inbox, _) = manual_pool(3);
        let handles = pool.map([7, 8, 9]);

        let mut sent: Vec<_> = inbox.lock().unwrap().drain(..).collect();
        // Finish the last-submitted task first.
        while let Some((input, reply)) = sent.pop() {
            reply.resolve(input + 100);
        }

        let results: Vec<_> = handles.into_iter().map(block_on).collect();
        assert_eq!(results, vec![Ok(107), Ok(108), Ok(109)]);
    }

    #[test]
    fn test_failure_isolation() {
        let (pool, inbox, _) = manual_pool(1);
        let handles = pool.map([1, 2, 3]);

        let (input, reply) = next_sent(&inbox);
        reply.resolve(input);
        let (_, reply) = next_sent(&inbox);
        reply.reject(WorkerError::Failed("corrupt input".to_string()));
        let (input, reply) = next_sent(&inbox);
        reply.resolve(input);

        let results: Vec<_> = handles.into_iter().map(block_on).collect();
        assert_eq!(results[0], Ok(1));
        assert_eq!(
            results[1],
            Err(PoolError::Worker(WorkerError::Failed(
                "corrupt input".to_string()
            )))
        );
        assert_eq!(results[2], Ok(3));
        assert_eq!(pool.status().idle, 1);
    }

    #[test]
    fn test_handle_ids_follow_submission_order() {
        let (pool, _, _) = manual_pool(1);
        let handles = pool.map([1, 2, 3]);
        let ids: Vec<_> = handles.iter().map(TaskHandle::id).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_reply_carries_assignment() {
        let (pool, inbox, _) = manual_pool(2);
        let first = pool.submit(1);
        let second = pool.submit(2);

        let (_, reply_a) = next_sent(&inbox);
        let (_, reply_b) = next_sent(&inbox);
        assert_eq!(reply_a.task_id(), first.id());
        assert_eq!(reply_b.task_id(), second.id());
        assert_ne!(reply_a.worker(), reply_b.worker());

        reply_a.resolve(0);
        reply_b.resolve(0);
    }

    #[test]
    fn test_dropped_reply_leaves_task_pending() {
        let (pool, inbox, _) = manual_pool(1);
        let mut handle = pool.submit(1);
        let _queued = pool.submit(2);

        let (_, reply) = next_sent(&inbox);
        drop(reply);

        assert_eq!(handle.try_outcome(), None);
        let status = pool.status();
        assert_eq!(status.busy, 1);
        assert_eq!(status.queued, 1);
    }

    #[test]
    fn test_dropped_handle_does_not_stall_pool() {
        let (pool, inbox, _) = manual_pool(1);
        drop(pool.submit(1));
        let second = pool.submit(2);

        let (input, reply) = next_sent(&inbox);
        reply.resolve(input);
        let (input, reply) = next_sent(&inbox);
        reply.resolve(input);

        assert_eq!(block_on(second), Ok(2));
    }

    #[test]
    fn test_terminate_stops_workers_and_rejects_pending() {
        let (pool, inbox, stops) = manual_pool(2);
        let handles = pool.map([1, 2, 3]);

        pool.terminate();
        assert_eq!(stops.load(Ordering::SeqCst), 2);

        let status = pool.status();
        assert!(status.terminated);
        assert_eq!(status.idle, 2);
        assert_eq!(status.queued, 0);

        let results: Vec<_> = handles.into_iter().map(block_on).collect();
        assert!(results.iter().all(|r| *r == Err(PoolError::Terminated)));

        // A late report from a worker that was mid-task is ignored.
        let (input, reply) = next_sent(&inbox);
        reply.resolve(input);
        assert_eq!(pool.status().idle, 2);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let (pool, _, stops) = manual_pool(3);
        pool.terminate();
        pool.terminate();
        assert_eq!(stops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_submit_after_terminate_is_rejected() {
        let (pool, inbox, _) = manual_pool(1);
        pool.terminate();

        let handle = pool.submit(1);
        assert_eq!(block_on(handle), Err(PoolError::Terminated));
        assert_eq!(sent_count(&inbox), 0);
    }

    #[test]
    fn test_drop_terminates_pool() {
        let (pool, _, stops) = manual_pool(2);
        let handle = pool.submit(1);
        drop(pool);

        assert_eq!(stops.load(Ordering::SeqCst), 2);
        assert_eq!(block_on(handle), Err(PoolError::Terminated));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::*;
    use futures::executor::block_on;
    use proptest::prelude::*;

    type Inbox = Arc<Mutex<Vec<(u32, Reply<u32>)>>>;

    struct ManualWorker(Inbox);

    impl Worker<u32, u32> for ManualWorker {
        fn send(&self, input: u32, reply: Reply<u32>) {
            self.0.lock().unwrap().push((input, reply));
        }

        fn stop(&self) {}
    }

    proptest! {
        /// Property: whatever order in-flight tasks finish in, the capacity
        /// invariant holds at every step and every handle gets its own input's
        /// result.
        #[test]
        fn prop_random_completion_order(
            size in 1usize..=4,
            inputs in prop::collection::vec(any::<u32>(), 0..=24),
            picks in prop::collection::vec(any::<prop::sample::Index>(), 24),
        ) {
            let inbox = Inbox::default();
            let pool = WorkerPool::new((0..size).map(|_| ManualWorker(inbox.clone()))).unwrap();
            let handles = pool.map(inputs.iter().copied());

            for pick in picks.iter().take(inputs.len()) {
                let status = pool.status();
                prop_assert_eq!(status.idle + status.busy, size);
                prop_assert!(inbox.lock().unwrap().len() <= size);

                let (input, reply) = {
                    let mut sent = inbox.lock().unwrap();
                    let at = pick.index(sent.len());
                    sent.remove(at)
                };
                reply.resolve(input.wrapping_mul(3));
            }

            let status = pool.status();
            prop_assert_eq!(status.idle, size);
            prop_assert_eq!(status.queued, 0);

            let expected: Vec<_> = inputs.iter().map(|n| Ok(n.wrapping_mul(3))).collect();
            let results: Vec<_> = handles.into_iter().map(block_on).collect();
            prop_assert_eq!(results, expected);
        }

        /// Property: on a single worker, tasks start in submission order.
        #[test]
        fn prop_single_worker_is_fifo(inputs in prop::collection::vec(any::<u32>(), 1..=16)) {
            let inbox = Inbox::default();
            let pool = WorkerPool::new([ManualWorker(inbox.clone())]).unwrap();
            let _handles = pool.map(inputs.iter().copied());

            let mut started = Vec::new();
            for _ in 0..inputs.len() {
                let (input, reply) = inbox.lock().unwrap().remove(0);
                prop_assert!(inbox.lock().unwrap().is_empty());
                started.push(input);
                reply.resolve(input);
            }
            prop_assert_eq!(started, inputs);
        }
    }
}
