//! Shared types used across all pipeline stages.
//!
//! Every stage (sniff → negotiate → convert → respond) speaks in terms of
//! [`ImageFormat`] and [`ColorMode`], so they live here rather than in any one
//! stage's module.

use serde::Serialize;
use std::fmt;

/// The true format of a byte sequence, as determined by sniffing.
///
/// Never derived from a file extension or a caller-supplied content-type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Unknown,
}

impl ImageFormat {
    /// Canonical MIME type for this format.
    ///
    /// BMP's aliases and the legacy-mode override are the response layer's
    /// business; see [`crate::response::ResponseMode`].
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
            Self::Bmp => "image/bmp",
            Self::Unknown => OCTET_STREAM,
        }
    }

    /// Matching `image` crate format, if the codec can read it at all.
    pub fn codec_format(self) -> Option<image::ImageFormat> {
        match self {
            Self::Jpeg => Some(image::ImageFormat::Jpeg),
            Self::Png => Some(image::ImageFormat::Png),
            Self::Gif => Some(image::ImageFormat::Gif),
            Self::WebP => Some(image::ImageFormat::WebP),
            Self::Bmp => Some(image::ImageFormat::Bmp),
            Self::Unknown => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Gif => "GIF",
            Self::WebP => "WebP",
            Self::Bmp => "BMP",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Generic binary content type, used whenever the bytes cannot be labelled
/// more precisely.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Colour model of the encoded pixels.
///
/// Only meaningful for JPEG, where CMYK is a legitimate but unconvertible
/// subtype. Every other recognised format reports [`ColorMode::Rgb`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Rgb,
    Cmyk,
    Unknown,
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgb => "RGB",
            Self::Cmyk => "CMYK",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
