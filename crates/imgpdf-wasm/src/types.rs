//! Option types passed in from JavaScript and conversion helpers.

use std::fmt::Display;

use imgpdf_core::ConvertOptions;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

/// Options accepted by the `JsConvertPool` constructor.
///
/// ```typescript
/// new JsConvertPool('/convert-worker.js', { size: 4, quality: 0.8 });
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Number of Web Workers. Defaults to `navigator.hardwareConcurrency`.
    pub size: Option<usize>,
    /// JPEG quality (0.0-1.0) applied to every conversion.
    pub quality: Option<f32>,
}

impl PoolOptions {
    pub fn convert_options(&self) -> ConvertOptions {
        self.quality
            .map(ConvertOptions::with_quality)
            .unwrap_or_default()
    }
}

/// Deserialize an options object, treating `undefined`/`null` as defaults.
pub(crate) fn from_js_or_default<T>(value: JsValue) -> Result<T, JsValue>
where
    T: DeserializeOwned + Default,
{
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(JsValue::from)
}

pub(crate) fn to_js_error(err: impl Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}
