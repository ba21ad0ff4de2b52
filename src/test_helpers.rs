//! Shared test utilities for the webp-relay test suite.
//!
//! Encoded fixtures are produced on the fly with the `image` crate so the
//! repository carries no binary test assets. Each helper returns the complete
//! file bytes for a small solid-colour image.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let root = setup_document_root(&[
//!     ("photo.jpg", jpeg_bytes(16, 16)),
//!     ("disguised.jpg", bmp_bytes(16, 16)),
//! ]);
//! ```

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Encoded fixtures
// =========================================================================

fn rgb(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
    }))
}

fn rgba(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
    }))
}

fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format)
        .unwrap_or_else(|e| panic!("failed to encode {format:?} fixture: {e}"));
    buf.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&rgb(width, height), ImageFormat::Jpeg)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&rgb(width, height), ImageFormat::Png)
}

pub fn gif_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&rgba(width, height), ImageFormat::Gif)
}

/// Two-frame looping GIF: solid red then solid blue, 100 ms each.
pub fn animated_gif_bytes(width: u32, height: u32) -> Vec<u8> {
    let frames = [[255, 0, 0, 255], [0, 0, 255, 255]].map(|colour| {
        Frame::from_parts(
            RgbaImage::from_pixel(width, height, image::Rgba(colour)),
            0,
            0,
            Delay::from_numer_denom_ms(100, 1),
        )
    });
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut buf);
        encoder.set_repeat(Repeat::Infinite).unwrap();
        encoder.encode_frames(frames).unwrap();
    }
    buf
}

pub fn webp_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&rgba(width, height), ImageFormat::WebP)
}

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&rgb(width, height), ImageFormat::Bmp)
}

/// A structurally valid CMYK JPEG header: SOI, a baseline frame header with
/// four components, EOI. Enough for sniffing; never handed to a decoder.
pub fn cmyk_jpeg_bytes() -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8];
    // SOF0, length 20: precision 8, 8x8, 4 components
    data.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x14, 0x08, 0x00, 0x08, 0x00, 0x08, 0x04]);
    for id in 1..=4u8 {
        data.extend_from_slice(&[id, 0x11, 0x00]);
    }
    data.extend_from_slice(&[0xFF, 0xD9]);
    data
}

// =========================================================================
// Document root setup
// =========================================================================

/// Write `files` (relative path, bytes) into a fresh temp directory.
pub fn setup_document_root(files: &[(&str, Vec<u8>)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, bytes) in files {
        write_file(tmp.path(), rel, bytes);
    }
    tmp
}

pub fn write_file(root: &Path, rel: &str, bytes: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
}
