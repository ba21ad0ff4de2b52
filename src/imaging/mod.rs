//! Image codec layer.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Decode** | `image` crate (JPEG, PNG, GIF, WebP, BMP) |
//! | **Encode → WebP** | `webp` (libwebp), lossy for JPEG, lossless otherwise |
//! | **Encode → PNG** | `image` crate |
//!
//! The module is split into:
//! - **Parameters**: Data structures describing a transcode
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: The conversion engine, which turns a negotiated request
//!   into an outcome and absorbs codec failures

pub mod backend;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use operations::{ConversionOutcome, Disposition, EncodingSettings, convert};
pub use params::{EncodeParams, Quality};
pub use rust_backend::RustBackend;
