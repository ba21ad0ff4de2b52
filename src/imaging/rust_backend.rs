//! Production codec backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, GIF, WebP, BMP) | `image::load_from_memory_with_format` |
//! | Decode animated GIF | `image::codecs::gif::GifDecoder::into_frames` |
//! | Encode → WebP (lossy and lossless) | `webp::Encoder` (libwebp) |
//! | Encode → animated WebP | `webp::AnimEncoder` (libwebp) |
//! | Encode → PNG | `image::DynamicImage::write_to` |
//!
//! Multi-frame GIFs become animated WebP with every frame kept. Animated WebP
//! sources become a PNG of their first frame.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::EncodeParams;
use crate::types::ImageFormat;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageReader, RgbaImage};
use std::io::Cursor;

/// Backend built on the `image` crate with libwebp for WebP output.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn codec_format(format: ImageFormat) -> Result<image::ImageFormat, BackendError> {
    format
        .codec_format()
        .ok_or(BackendError::Unsupported(format))
}

/// Decode an in-memory image of a known format.
fn load_image(data: &[u8], format: ImageFormat) -> Result<DynamicImage, BackendError> {
    image::load_from_memory_with_format(data, codec_format(format)?).map_err(|e| {
        BackendError::ProcessingFailed(format!("Failed to decode {format}: {e}"))
    })
}

/// Encode as WebP through libwebp. Images without alpha go in as RGB so the
/// lossy encoder does not spend bits on an opaque channel.
fn encode_webp(img: &DynamicImage, lossless: bool, quality: u32) -> Result<Vec<u8>, BackendError> {
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
        encoder.encode_simple(lossless, quality as f32)
    } else {
        let rgb = img.to_rgb8();
        let encoder = webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height());
        encoder.encode_simple(lossless, quality as f32)
    };
    let memory = encoded
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {e:?}")))?;

    Ok(memory.to_vec())
}

/// GIF frame delay used when the file says zero, matching browser playback.
const DEFAULT_FRAME_DELAY_MS: u32 = 100;

/// A fully composited animation frame and its start time in milliseconds.
struct TimedFrame {
    buffer: RgbaImage,
    timestamp: i32,
}

/// Decode every frame of a GIF onto the full canvas.
fn load_gif_frames(data: &[u8]) -> Result<Vec<TimedFrame>, BackendError> {
    let decode_failed =
        |e: image::ImageError| BackendError::ProcessingFailed(format!("Failed to decode GIF: {e}"));
    let frames = GifDecoder::new(Cursor::new(data))
        .map_err(decode_failed)?
        .into_frames()
        .collect_frames()
        .map_err(decode_failed)?;

    let mut start = 0i32;
    Ok(frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay = match numer.checked_div(denom) {
                Some(0) | None => DEFAULT_FRAME_DELAY_MS,
                Some(ms) => ms,
            };
            let timestamp = start;
            start = start.saturating_add(i32::try_from(delay).unwrap_or(i32::MAX));
            TimedFrame {
                buffer: frame.into_buffer(),
                timestamp,
            }
        })
        .collect())
}

fn encode_animated_webp(
    frames: &[TimedFrame],
    lossless: bool,
    quality: u32,
) -> Result<Vec<u8>, BackendError> {
    let Some(first) = frames.first() else {
        return Err(BackendError::ProcessingFailed("GIF has no frames".into()));
    };
    let (width, height) = first.buffer.dimensions();

    let mut config = webp::WebPConfig::new().map_err(|_| {
        BackendError::ProcessingFailed("Failed to initialise WebP encoder config".into())
    })?;
    config.lossless = i32::from(lossless);
    config.quality = quality as f32;

    let mut encoder = webp::AnimEncoder::new(width, height, &config);
    encoder.set_loop_count(0);
    for frame in frames {
        encoder.add_frame(webp::AnimFrame::from_rgba(
            frame.buffer.as_raw(),
            width,
            height,
            frame.timestamp,
        ));
    }
    let memory = encoder.try_encode().map_err(|e| {
        BackendError::ProcessingFailed(format!("Animated WebP encode failed: {e:?}"))
    })?;

    Ok(memory.to_vec())
}

/// GIF to WebP, animated when the source has more than one frame.
fn encode_gif_as_webp(data: &[u8], lossless: bool, quality: u32) -> Result<Vec<u8>, BackendError> {
    let mut frames = load_gif_frames(data)?;
    if frames.len() > 1 {
        return encode_animated_webp(&frames, lossless, quality);
    }
    let Some(frame) = frames.pop() else {
        return Err(BackendError::ProcessingFailed("GIF has no frames".into()));
    };
    encode_webp(&DynamicImage::ImageRgba8(frame.buffer), lossless, quality)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| BackendError::ProcessingFailed(format!("PNG encode failed: {e}")))?;
    Ok(buf.into_inner())
}

impl ImageBackend for RustBackend {
    fn identify(&self, data: &[u8], format: ImageFormat) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::with_format(Cursor::new(data), codec_format(format)?)
            .into_dimensions()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to read dimensions: {e}"))
            })?;
        Ok(Dimensions { width, height })
    }

    fn encode(&self, params: &EncodeParams<'_>) -> Result<Vec<u8>, BackendError> {
        let quality = params.quality.value();
        match (params.source_format, params.output_format) {
            (ImageFormat::Gif, ImageFormat::WebP) => {
                encode_gif_as_webp(params.source, params.lossless, quality)
            }
            (source, ImageFormat::WebP) => {
                encode_webp(&load_image(params.source, source)?, params.lossless, quality)
            }
            (source, ImageFormat::Png) => encode_png(&load_image(params.source, source)?),
            (_, other) => Err(BackendError::Unsupported(other)),
        }
    }
}
