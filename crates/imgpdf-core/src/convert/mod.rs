//! Image-to-JPEG conversion, the job run by every pool worker.
//!
//! This module provides functionality for:
//! - Decoding JPEG, PNG and WebP sources with EXIF orientation applied
//! - Re-encoding them as baseline JPEG at a canvas-style quality (0.0-1.0)
//! - Building a native pool of conversion threads
//!
//! # Architecture
//!
//! Conversion is synchronous and self-contained, so the same entry point
//! serves a native [`ThreadWorker`] and a browser Web Worker running the
//! WASM build.
//!
//! # Examples
//!
//! ```ignore
//! use imgpdf_core::convert::{spawn_convert_pool, ConvertRequest};
//! use imgpdf_core::pool::ThreadPoolConfig;
//!
//! let pool = spawn_convert_pool(&ThreadPoolConfig::default())?;
//! let handles = pool.map(files.into_iter().map(ConvertRequest::new));
//! ```

mod decode;
mod encode;

pub use decode::{decode_image, get_orientation, Orientation};
pub use encode::encode_jpeg;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pool::{spawn_thread_pool, PoolError, ThreadPoolConfig, ThreadWorker, WorkerError, WorkerPool};

/// Quality browsers use for `image/jpeg` when none is given.
pub const DEFAULT_QUALITY: f32 = 0.92;

/// Errors that can occur while converting an image.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The file format is not recognized or supported.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// JPEG encoding failed
    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),
}

impl From<ConvertError> for WorkerError {
    fn from(err: ConvertError) -> Self {
        WorkerError::Failed(err.to_string())
    }
}

/// Conversion settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// JPEG quality from 0.0 to 1.0, as accepted by `canvas.convertToBlob`.
    pub quality: f32,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ConvertOptions {
    pub fn with_quality(quality: f32) -> Self {
        Self { quality }
    }

    /// Encoder quality in 1-100. Out-of-range values are clamped and
    /// non-finite values fall back to the default.
    pub fn jpeg_quality(&self) -> u8 {
        let quality = if self.quality.is_finite() {
            self.quality.clamp(0.0, 1.0)
        } else {
            DEFAULT_QUALITY
        };
        ((quality * 100.0).round() as u8).max(1)
    }
}

/// One image to convert: the pool payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertRequest {
    /// Raw bytes of the source file.
    pub bytes: Vec<u8>,
    pub options: ConvertOptions,
}

impl ConvertRequest {
    /// A request with default options.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            options: ConvertOptions::default(),
        }
    }

    pub fn with_options(bytes: Vec<u8>, options: ConvertOptions) -> Self {
        Self { bytes, options }
    }
}

/// Convert an encoded image to JPEG bytes.
///
/// # Errors
///
/// Fails if the source cannot be decoded or the result cannot be encoded.
pub fn to_jpeg(bytes: &[u8], options: &ConvertOptions) -> Result<Vec<u8>, ConvertError> {
    let img = decode_image(bytes)?;
    encode_jpeg(&img, options.jpeg_quality())
}

/// [`to_jpeg`] shaped as a pool job.
pub fn convert(request: ConvertRequest) -> Result<Vec<u8>, WorkerError> {
    to_jpeg(&request.bytes, &request.options).map_err(WorkerError::from)
}

/// Native pool of conversion threads.
pub type ConvertPool = WorkerPool<ConvertRequest, Vec<u8>, ThreadWorker<ConvertRequest, Vec<u8>>>;

/// Spawn `config.workers` threads running [`convert`].
///
/// # Errors
///
/// Returns `PoolError::NoWorkers` for a zero-sized config and
/// `PoolError::Spawn` if a thread cannot be created.
pub fn spawn_convert_pool(config: &ThreadPoolConfig) -> Result<ConvertPool, PoolError> {
    spawn_thread_pool(config, convert)
}
