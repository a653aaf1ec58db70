//! imgpdf Core - worker pool and image conversion
//!
//! This crate provides the pieces of the imgpdf pipeline that run off the
//! main thread: a bounded worker pool that fans conversion requests out to a
//! fixed set of workers, and the JPEG conversion job those workers run.
//!
//! # Module Structure
//!
//! - `pool` - Worker pool scheduler, task handles and native thread workers
//! - `convert` - Image-to-JPEG conversion and the native conversion pool

pub mod convert;
pub mod pool;

pub use convert::{
    spawn_convert_pool, to_jpeg, ConvertError, ConvertOptions, ConvertPool, ConvertRequest,
};
pub use pool::{
    PoolError, PoolStatus, Reply, TaskHandle, ThreadPoolConfig, Worker, WorkerError, WorkerPool,
};
