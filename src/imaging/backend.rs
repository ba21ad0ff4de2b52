//! Codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the only place pixels are touched. It
//! supports two operations: `identify` (dimensions, for diagnostics) and
//! `encode` (one transcode from memory to memory).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): the `image` crate for
//! decoding and PNG output, libwebp for WebP output.

use super::params::EncodeParams;
use crate::types::ImageFormat;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unsupported format: {0}")]
    Unsupported(ImageFormat),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for codec backends.
///
/// Implementations must be shareable across request threads.
pub trait ImageBackend: Send + Sync {
    /// Read image dimensions without a full decode where possible.
    fn identify(&self, data: &[u8], format: ImageFormat) -> Result<Dimensions, BackendError>;

    /// Decode `params.source` and re-encode it as `params.output_format`.
    fn encode(&self, params: &EncodeParams<'_>) -> Result<Vec<u8>, BackendError>;
}
