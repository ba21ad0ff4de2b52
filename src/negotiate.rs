//! Format negotiation: what to serve, given what the client accepts and what
//! the bytes really are.
//!
//! Two pieces live here:
//!
//! - The **convertibility matrix** ([`can_convert`]): a fixed, total table of
//!   which `(format, colour mode)` sources may be transcoded to which target.
//! - The **policy** ([`decide`]): picks the cheapest [`TargetFormat`] that
//!   satisfies the client, consulting the matrix before choosing anything
//!   other than passthrough.
//!
//! ```text
//! capable client      JPEG(RGB) / PNG / GIF  → Modern (WebP)
//!                     JPEG(CMYK) / BMP / WebP / unknown → Passthrough
//! non-capable client  WebP                   → LegacyPng
//!                     everything else        → Passthrough
//! ```
//!
//! Both functions are pure. Passthrough is always allowed, so every request
//! ends in a response even when no conversion is possible.

use crate::sniff::Sniffed;
use crate::types::{ColorMode, ImageFormat};
use serde::Serialize;

/// Media type whose presence in `Accept` marks a client as WebP-capable.
pub const MODERN_MEDIA_TYPE: &str = "image/webp";

/// What the client can render, derived once per request from `Accept`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientCapability {
    pub accepts_modern: bool,
}

impl ClientCapability {
    /// Parse an `Accept` header value.
    ///
    /// Capable when any media range is exactly `image/webp` (case-insensitive,
    /// parameters ignored) and not disabled with `q=0`. Wildcards such as
    /// `*/*` or `image/*` do not count: a client that has not named WebP gets
    /// the format it asked for.
    pub fn from_accept(accept: Option<&str>) -> Self {
        let accepts_modern = accept.is_some_and(|value| {
            value.split(',').any(|range| {
                let mut parts = range.split(';');
                let media = parts.next().unwrap_or("").trim();
                media.eq_ignore_ascii_case(MODERN_MEDIA_TYPE) && !parts.any(is_zero_quality)
            })
        });
        Self { accepts_modern }
    }
}

fn is_zero_quality(param: &str) -> bool {
    let Some((key, value)) = param.split_once('=') else {
        return false;
    };
    key.trim().eq_ignore_ascii_case("q") && value.trim().parse::<f32>().is_ok_and(|q| q <= 0.0)
}

/// The output the engine is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFormat {
    /// Transcode to WebP.
    Modern,
    /// Transcode a stored WebP to PNG for clients that cannot render it.
    LegacyPng,
    /// Serve the stored bytes unchanged.
    Passthrough,
}

impl TargetFormat {
    /// The format the output bytes will sniff as, for converting targets.
    pub fn output_format(self) -> Option<ImageFormat> {
        match self {
            Self::Modern => Some(ImageFormat::WebP),
            Self::LegacyPng => Some(ImageFormat::Png),
            Self::Passthrough => None,
        }
    }

    /// Stable tag used in cache keys and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Modern => "modern",
            Self::LegacyPng => "legacy_png",
            Self::Passthrough => "passthrough",
        }
    }
}

/// A stored resource after sniffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub sniffed: Sniffed,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        let sniffed = crate::sniff::sniff(&bytes);
        Self { bytes, sniffed }
    }

    pub fn format(&self) -> ImageFormat {
        self.sniffed.format
    }
}

/// A source paired with the target the policy chose for it.
///
/// Consumed by value by the conversion engine, so a request is converted at
/// most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: SourceImage,
    pub target: TargetFormat,
}

/// The convertibility matrix.
pub fn can_convert(format: ImageFormat, color_mode: ColorMode, target: TargetFormat) -> bool {
    use ImageFormat::*;
    use TargetFormat::*;

    match (format, target) {
        (_, Passthrough) => true,
        (Jpeg, Modern) => color_mode == ColorMode::Rgb,
        (Png | Gif, Modern) => true,
        (WebP, LegacyPng) => true,
        // BMP is only ever passed through; unknown bytes are never decoded
        _ => false,
    }
}

/// Pick the target for `sniffed` given what the client accepts.
pub fn decide_target(capability: ClientCapability, sniffed: Sniffed) -> TargetFormat {
    let preferred = match (capability.accepts_modern, sniffed.format) {
        // Already in the format the client wants
        (true, ImageFormat::WebP) => TargetFormat::Passthrough,
        (true, _) => TargetFormat::Modern,
        (false, ImageFormat::WebP) => TargetFormat::LegacyPng,
        (false, _) => TargetFormat::Passthrough,
    };

    if can_convert(sniffed.format, sniffed.color_mode, preferred) {
        preferred
    } else {
        TargetFormat::Passthrough
    }
}

/// The negotiation policy.
pub fn decide(capability: ClientCapability, source: SourceImage) -> ConversionRequest {
    let target = decide_target(capability, source.sniffed);
    ConversionRequest { source, target }
}
