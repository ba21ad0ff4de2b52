//! Content sniffing: what the bytes actually are.
//!
//! A stored resource's extension is a claim, not a fact. `photo.jpg` may hold
//! a BMP and `banner.webp` may hold anything at all. Every decision downstream
//! is made from [`sniff`], which looks only at magic signatures in the first
//! bytes of the data.
//!
//! | Format | Signature |
//! |--------|-----------|
//! | JPEG | `FF D8 FF` |
//! | PNG | `89 50 4E 47 0D 0A 1A 0A` |
//! | GIF | `GIF87a` / `GIF89a` |
//! | WebP | `RIFF` + 4-byte size + `WEBP` |
//! | BMP | `BM` |
//!
//! Anything shorter than [`MIN_SNIFF_LEN`] bytes, or matching none of the
//! above, is [`ImageFormat::Unknown`]. That is a classification, not an error.
//!
//! For JPEG the frame header is also read to find the component count, since
//! CMYK JPEGs are valid files that the converter must not be handed.

use crate::types::{ColorMode, ImageFormat};
use serde::Serialize;

/// Below this many bytes nothing is classified.
pub const MIN_SNIFF_LEN: usize = 12;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const GIF87_MAGIC: &[u8] = b"GIF87a";
const GIF89_MAGIC: &[u8] = b"GIF89a";
const RIFF_MAGIC: &[u8] = b"RIFF";
const WEBP_TAG: &[u8] = b"WEBP";
const BMP_MAGIC: &[u8] = b"BM";

/// Result of sniffing a byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sniffed {
    pub format: ImageFormat,
    pub color_mode: ColorMode,
}

impl Sniffed {
    pub const UNKNOWN: Self = Self {
        format: ImageFormat::Unknown,
        color_mode: ColorMode::Unknown,
    };
}

/// Classify `data` by its magic bytes.
///
/// Never panics and never fails: malformed input yields
/// [`Sniffed::UNKNOWN`] or a best-effort colour mode.
pub fn sniff(data: &[u8]) -> Sniffed {
    let format = sniff_format(data);
    let color_mode = match format {
        ImageFormat::Jpeg => jpeg_color_mode(data),
        ImageFormat::Unknown => ColorMode::Unknown,
        _ => ColorMode::Rgb,
    };
    Sniffed { format, color_mode }
}

/// Format-only sniff, used to double-check codec output.
pub fn sniff_format(data: &[u8]) -> ImageFormat {
    if data.len() < MIN_SNIFF_LEN {
        return ImageFormat::Unknown;
    }
    if data.starts_with(JPEG_MAGIC) {
        ImageFormat::Jpeg
    } else if data.starts_with(PNG_MAGIC) {
        ImageFormat::Png
    } else if data.starts_with(GIF87_MAGIC) || data.starts_with(GIF89_MAGIC) {
        ImageFormat::Gif
    } else if data.starts_with(RIFF_MAGIC) && &data[8..12] == WEBP_TAG {
        ImageFormat::WebP
    } else if data.starts_with(BMP_MAGIC) {
        ImageFormat::Bmp
    } else {
        ImageFormat::Unknown
    }
}

// ---------------------------------------------------------------------------
// JPEG frame header
// ---------------------------------------------------------------------------

/// Walk JPEG marker segments up to the first start-of-frame and map its
/// component count to a colour mode.
///
/// Segment layout: `FF <marker> <len:u16 BE> <payload...>` where `len`
/// includes its own two bytes. A SOF payload is
/// `<precision:u8> <height:u16> <width:u16> <components:u8> ...`.
fn jpeg_color_mode(data: &[u8]) -> ColorMode {
    match jpeg_component_count(data) {
        Some(1) | Some(3) => ColorMode::Rgb,
        Some(4) => ColorMode::Cmyk,
        _ => ColorMode::Unknown,
    }
}

fn jpeg_component_count(data: &[u8]) -> Option<u8> {
    // Skip SOI
    let mut pos = 2;

    loop {
        if *data.get(pos)? != 0xFF {
            return None;
        }
        // Fill bytes: any number of 0xFF may precede a marker
        while *data.get(pos + 1)? == 0xFF {
            pos += 1;
        }
        let marker = data[pos + 1];

        // Markers without a length field
        if marker == 0x01 || (0xD0..=0xD8).contains(&marker) {
            pos += 2;
            continue;
        }
        // SOS or EOI before any frame header: nothing to learn
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }

        let len = u16::from_be_bytes([*data.get(pos + 2)?, *data.get(pos + 3)?]) as usize;
        if len < 2 {
            return None;
        }

        if is_start_of_frame(marker) {
            return data.get(pos + 9).copied();
        }

        pos += 2 + len;
    }
}

/// SOF0–SOF15, excluding DHT (C4), JPG (C8) and DAC (CC) which share the range.
fn is_start_of_frame(marker: u8) -> bool {
    (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}
