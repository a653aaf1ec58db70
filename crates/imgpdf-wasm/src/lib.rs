//! imgpdf WASM - WebAssembly bindings for the imgpdf conversion pool
//!
//! This crate exposes imgpdf-core to the browser. The same module is loaded
//! on the page, where it drives a pool of Web Workers, and inside each
//! worker, where it performs the conversion.
//!
//! # Module Structure
//!
//! - `convert` - Direct conversion and the worker-side message handler
//! - `message` - Request/response messages between pool and workers
//! - `types` - Options objects accepted from JavaScript
//! - `worker` - `Worker` implementation over `web_sys::Worker` (wasm32 only)
//! - `pool` - `JsConvertPool`, the promise-based pool (wasm32 only)
//!
//! # Usage
//!
//! ```typescript
//! import init, { JsConvertPool } from '@imgpdf/wasm';
//!
//! // Initialize WASM module (must call first)
//! await init();
//!
//! const pool = new JsConvertPool('/convert-worker.js', { size: 4 });
//! const bytes = await Promise.all(files.map((f) => f.arrayBuffer()));
//! const jpegs = await Promise.all(pool.map(bytes));
//! ```

use wasm_bindgen::prelude::*;

mod convert;
pub mod message;
mod types;

#[cfg(target_arch = "wasm32")]
mod pool;
#[cfg(target_arch = "wasm32")]
mod worker;

// Re-export public types
pub use convert::{convert_to_jpeg, start_convert_worker};
pub use types::PoolOptions;

#[cfg(target_arch = "wasm32")]
pub use pool::{JsConvertPool, DEFAULT_POOL_SIZE};
#[cfg(target_arch = "wasm32")]
pub use worker::WebWorker;

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
