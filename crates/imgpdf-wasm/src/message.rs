//! Messages exchanged between the pool and its conversion workers.
//!
//! Request (pool → worker): `{ bytes: Uint8Array, quality: number }`.
//!
//! Response (worker → pool): the JPEG as a `Uint8Array` on success, or an
//! error message string on failure.

use imgpdf_core::{ConvertOptions, ConvertRequest, WorkerError};
use js_sys::{Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

const BYTES: &str = "bytes";
const QUALITY: &str = "quality";

/// Build the message posted to a conversion worker. The bytes are copied.
pub fn encode_request(request: &ConvertRequest) -> Result<JsValue, JsValue> {
    let message = Object::new();
    Reflect::set(
        &message,
        &JsValue::from_str(BYTES),
        &Uint8Array::from(request.bytes.as_slice()),
    )?;
    Reflect::set(
        &message,
        &JsValue::from_str(QUALITY),
        &JsValue::from_f64(f64::from(request.options.quality)),
    )?;
    Ok(message.into())
}

/// Parse a request received by a conversion worker.
///
/// A missing or non-numeric `quality` falls back to the default.
pub fn decode_request(data: &JsValue) -> Result<ConvertRequest, JsValue> {
    let bytes = Reflect::get(data, &JsValue::from_str(BYTES))?;
    if !bytes.is_instance_of::<Uint8Array>() {
        return Err(JsValue::from_str("message.bytes must be a Uint8Array"));
    }
    let options = Reflect::get(data, &JsValue::from_str(QUALITY))?
        .as_f64()
        .map(|quality| ConvertOptions::with_quality(quality as f32))
        .unwrap_or_default();
    Ok(ConvertRequest::with_options(
        Uint8Array::new(&bytes).to_vec(),
        options,
    ))
}

/// Build the response a conversion worker posts back.
pub fn encode_response(result: Result<Vec<u8>, String>) -> JsValue {
    match result {
        Ok(jpeg) => Uint8Array::from(jpeg.as_slice()).into(),
        Err(message) => JsValue::from_str(&message),
    }
}

/// Interpret a conversion worker's response.
pub fn decode_response(data: JsValue) -> Result<Vec<u8>, WorkerError> {
    if let Some(jpeg) = data.dyn_ref::<Uint8Array>() {
        return Ok(jpeg.to_vec());
    }
    Err(WorkerError::Failed(data.as_string().unwrap_or_else(|| {
        "worker sent an unexpected message".to_string()
    })))
}

/// Render a thrown JS value as text.
pub(crate) fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}
