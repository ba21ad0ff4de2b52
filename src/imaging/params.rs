//! Parameter types for codec operations.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between the conversion engine in [`operations`](super::operations), which
//! decides what output to ask for, and the [`backend`](super::backend), which
//! does the pixel work. Keeping them separate lets tests swap in a mock
//! backend without touching the decision logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy WebP quality (1–100, default 80). Clamped on construction.
//! - [`EncodeParams`]: One transcode: source bytes and format, output format, quality, lossless flag.

use crate::types::ImageFormat;

/// Quality setting for lossy WebP encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Parameters for a single transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeParams<'a> {
    pub source: &'a [u8],
    pub source_format: ImageFormat,
    pub output_format: ImageFormat,
    pub quality: Quality,
    /// Ignored for PNG output, which is always lossless.
    pub lossless: bool,
}
