//! Bounded worker pool scheduler.
//!
//! This module provides functionality for:
//! - Dispatching an arbitrary stream of tasks across a fixed set of workers
//! - Queuing overflow work in submission order
//! - Returning a future per submitted task so callers can collect results in
//!   input order without blocking
//!
//! # Architecture
//!
//! The pool never executes work itself. Each worker is an opaque executor
//! (a native thread, a browser Web Worker, ...) implementing [`Worker`]. The
//! pool hands a worker one payload together with a [`Reply`], and the worker
//! reports exactly one outcome through that reply when it is done.
//!
//! ```text
//! submit(input) ──► queue ──► dispatch ──► Worker::send(input, reply)
//!                     ▲                              │
//!                     └──── idle set ◄── reply.report(outcome)
//! ```
//!
//! All bookkeeping (queue, idle set, assignments) sits behind one mutex.
//! Payload hand-off and handle resolution happen after the lock is released,
//! so a worker may report synchronously from inside [`Worker::send`].
//!
//! # Examples
//!
//! ```ignore
//! use imgpdf_core::pool::{spawn_thread_pool, ThreadPoolConfig};
//!
//! let pool = spawn_thread_pool(&ThreadPoolConfig::default(), |n: u32| Ok(n * 2))?;
//! let handles = pool.map([1, 2, 3]);
//! let results = futures::executor::block_on(futures::future::join_all(handles));
//! ```

mod error;
mod handle;
mod scheduler;
mod thread;
mod worker;

pub use error::{PoolError, WorkerError};
pub use handle::TaskHandle;
pub use scheduler::{PoolStatus, WorkerPool};
pub use thread::{spawn_thread_pool, ThreadPoolConfig, ThreadWorker};
pub use worker::{Reply, Worker};

/// `Send` on native targets, no bound on `wasm32`.
///
/// Browser workers are single-threaded JS handles that can never be `Send`,
/// while native workers are driven from several threads at once.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSend: Send {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + ?Sized> MaybeSend for T {}

/// `Send` on native targets, no bound on `wasm32`.
#[cfg(target_arch = "wasm32")]
pub trait MaybeSend {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSend for T {}

/// `Send + Sync` on native targets, no bound on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSendSync: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync + ?Sized> MaybeSendSync for T {}

/// `Send + Sync` on native targets, no bound on `wasm32`.
#[cfg(target_arch = "wasm32")]
pub trait MaybeSendSync {}
#[cfg(target_arch = "wasm32")]
impl<T: ?Sized> MaybeSendSync for T {}
