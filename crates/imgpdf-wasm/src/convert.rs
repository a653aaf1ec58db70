//! Conversion bindings, used inside the Web Worker.
//!
//! # Functions
//!
//! - [`convert_to_jpeg`] - Convert image bytes to JPEG bytes
//! - [`start_convert_worker`] - Turn the current Web Worker into a pool worker
//!
//! # Example
//!
//! ```typescript
//! // convert-worker.js
//! import init, { start_convert_worker } from '@imgpdf/wasm';
//!
//! await init();
//! start_convert_worker();
//! ```

use crate::message;
use crate::types::{from_js_or_default, to_js_error};
use imgpdf_core::{convert, ConvertOptions};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{console, DedicatedWorkerGlobalScope, MessageEvent};

/// Convert an encoded image (JPEG, PNG, WebP) to JPEG bytes.
///
/// # Arguments
///
/// * `bytes` - The source file bytes as a `Uint8Array`
/// * `options` - `{ quality?: number }` with quality in 0.0-1.0 (default 0.92),
///   or `undefined`
///
/// # Errors
///
/// Returns an error if the options are malformed or the image cannot be
/// decoded or encoded.
#[wasm_bindgen]
pub fn convert_to_jpeg(bytes: &[u8], options: JsValue) -> Result<Vec<u8>, JsValue> {
    let options: ConvertOptions = from_js_or_default(options)?;
    convert::to_jpeg(bytes, &options).map_err(to_js_error)
}

/// Install the conversion message handler on the current worker scope.
///
/// Each incoming request is converted and answered with exactly one
/// response, so the pool always hears back, even on failure.
///
/// # Errors
///
/// Returns an error when not called from a dedicated Web Worker.
#[wasm_bindgen]
pub fn start_convert_worker() -> Result<(), JsValue> {
    let scope: DedicatedWorkerGlobalScope = js_sys::global().dyn_into()?;
    let responder = scope.clone();

    let on_message = Closure::wrap(Box::new(move |event: MessageEvent| {
        let result = message::decode_request(&event.data())
            .and_then(|request| {
                convert::to_jpeg(&request.bytes, &request.options).map_err(to_js_error)
            })
            .map_err(|err| {
                console::error_2(&JsValue::from_str("Failed to convert"), &err);
                message::describe(&err)
            });

        if let Err(err) = responder.post_message(&message::encode_response(result)) {
            console::error_2(&JsValue::from_str("Failed to post conversion result"), &err);
        }
    }) as Box<dyn FnMut(MessageEvent)>);

    scope.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    // The handler lives as long as the worker.
    on_message.forget();
    Ok(())
}
