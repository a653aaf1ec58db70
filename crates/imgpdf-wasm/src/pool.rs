//! Browser-facing conversion pool.
//!
//! Wraps a core [`WorkerPool`] over [`WebWorker`]s and exposes promises to
//! JavaScript.
//!
//! ```typescript
//! import init, { JsConvertPool } from '@imgpdf/wasm';
//!
//! await init();
//! const pool = new JsConvertPool('/convert-worker.js', { quality: 0.8 });
//! const jpegs = await Promise.all(pool.map(files));
//! pool.terminate();
//! ```

use imgpdf_core::{ConvertOptions, ConvertRequest, TaskHandle, WorkerPool};
use js_sys::{Array, ArrayBuffer, Promise, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::future_to_promise;

use crate::types::{from_js_or_default, to_js_error, PoolOptions};
use crate::worker::WebWorker;

/// Pool size used when `navigator.hardwareConcurrency` is unavailable.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// A fixed set of conversion Web Workers fed from a FIFO queue.
#[wasm_bindgen]
pub struct JsConvertPool {
    pool: WorkerPool<ConvertRequest, Vec<u8>, WebWorker>,
    options: ConvertOptions,
}

#[wasm_bindgen]
impl JsConvertPool {
    /// Start the workers.
    ///
    /// # Arguments
    ///
    /// * `script_url` - URL of the module worker script
    /// * `options` - `{ size?: number, quality?: number }` or `undefined`
    ///
    /// # Errors
    ///
    /// Returns an error if the options are malformed, `size` is 0, or a
    /// worker cannot be started.
    #[wasm_bindgen(constructor)]
    pub fn new(script_url: &str, options: JsValue) -> Result<JsConvertPool, JsValue> {
        let options: PoolOptions = from_js_or_default(options)?;
        let size = options.size.unwrap_or_else(hardware_concurrency);
        let workers = (0..size)
            .map(|_| WebWorker::spawn(script_url))
            .collect::<Result<Vec<_>, _>>()?;
        let pool = WorkerPool::new(workers).map_err(to_js_error)?;
        Ok(JsConvertPool {
            pool,
            options: options.convert_options(),
        })
    }

    /// Number of workers.
    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.pool.size()
    }

    /// Queue one file for conversion.
    ///
    /// Accepts a `Uint8Array` or an `ArrayBuffer`. The promise resolves with
    /// the JPEG bytes and rejects with an error message.
    pub fn submit(&self, file: JsValue) -> Result<Promise, JsValue> {
        let request = ConvertRequest::with_options(read_bytes(&file)?, self.options);
        Ok(to_promise(self.pool.submit(request)))
    }

    /// Queue every file in order and return one promise per file.
    ///
    /// The Nth promise belongs to the Nth file. No file is queued if any
    /// entry is not a `Uint8Array` or `ArrayBuffer`.
    pub fn map(&self, files: Array) -> Result<Array, JsValue> {
        let requests = files
            .iter()
            .map(|file| {
                read_bytes(&file)
                    .map(|bytes| ConvertRequest::with_options(bytes, self.options))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.pool.map(requests).into_iter().map(to_promise).collect())
    }

    /// Current `{ size, idle, busy, queued, terminated }` counts.
    pub fn status(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.pool.status()).map_err(JsValue::from)
    }

    /// Stop every worker. Pending promises reject.
    pub fn terminate(&self) {
        self.pool.terminate();
    }
}

fn to_promise(handle: TaskHandle<Vec<u8>>) -> JsValue {
    future_to_promise(async move {
        let jpeg = handle.await.map_err(to_js_error)?;
        Ok(Uint8Array::from(jpeg.as_slice()).into())
    })
    .into()
}

fn read_bytes(file: &JsValue) -> Result<Vec<u8>, JsValue> {
    if let Some(bytes) = file.dyn_ref::<Uint8Array>() {
        return Ok(bytes.to_vec());
    }
    if let Some(buffer) = file.dyn_ref::<ArrayBuffer>() {
        return Ok(Uint8Array::new(buffer).to_vec());
    }
    Err(JsValue::from_str("expected a Uint8Array or ArrayBuffer"))
}

/// `navigator.hardwareConcurrency`, from a window or a worker scope.
fn hardware_concurrency() -> usize {
    Reflect::get(&js_sys::global(), &JsValue::from_str("navigator"))
        .and_then(|navigator| Reflect::get(&navigator, &JsValue::from_str("hardwareConcurrency")))
        .ok()
        .and_then(|count| count.as_f64())
        .filter(|count| *count >= 1.0)
        .map_or(DEFAULT_POOL_SIZE, |count| count as usize)
}
