//! The conversion engine.
//!
//! [`convert`] takes a [`ConversionRequest`] from the negotiation policy and
//! always produces a [`ConversionOutcome`]. It never returns an error: when
//! the codec fails on input the matrix thought convertible, the outcome is a
//! [`Disposition::Fallback`] carrying the original bytes and their sniffed
//! format. Availability beats format fidelity.
//!
//! Codec output is re-sniffed before it is trusted. Bytes that do not sniff as
//! the requested format are treated exactly like a codec failure, so the
//! response layer can label the body from `served` without second-guessing.

use super::backend::ImageBackend;
use super::params::{EncodeParams, Quality};
use crate::negotiate::{ConversionRequest, SourceImage, TargetFormat};
use crate::sniff::sniff_format;
use crate::types::ImageFormat;
use tracing::{debug, warn};

/// Codec settings fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingSettings {
    /// Lossy quality for JPEG sources. PNG and GIF sources encode lossless.
    pub quality: Quality,
    /// Treat WebP output larger than its source as a failed conversion.
    pub reject_larger: bool,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            quality: Quality::default(),
            reject_larger: true,
        }
    }
}

/// How the served bytes came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Transcoded by the codec.
    Converted,
    /// No conversion was attempted.
    Passthrough,
    /// Conversion was attempted and failed; the original bytes are served.
    Fallback(String),
}

/// What the engine hands to the response layer.
///
/// `served` always describes `bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    pub bytes: Vec<u8>,
    pub served: ImageFormat,
    pub disposition: Disposition,
    /// Size of the stored resource, for ratio reporting.
    pub original_len: usize,
}

impl ConversionOutcome {
    pub fn passthrough(source: SourceImage) -> Self {
        Self {
            served: source.format(),
            original_len: source.bytes.len(),
            bytes: source.bytes,
            disposition: Disposition::Passthrough,
        }
    }

    pub fn fallback(source: SourceImage, reason: impl Into<String>) -> Self {
        Self {
            served: source.format(),
            original_len: source.bytes.len(),
            bytes: source.bytes,
            disposition: Disposition::Fallback(reason.into()),
        }
    }

    pub fn converted(bytes: Vec<u8>, served: ImageFormat, original_len: usize) -> Self {
        Self {
            bytes,
            served,
            disposition: Disposition::Converted,
            original_len,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.disposition, Disposition::Fallback(_))
    }
}

/// Codec parameters for converting `source` to `target`.
///
/// Returns `None` for passthrough.
pub fn encode_params<'a>(
    source: &'a SourceImage,
    target: TargetFormat,
    settings: &EncodingSettings,
) -> Option<EncodeParams<'a>> {
    let output_format = target.output_format()?;
    Some(EncodeParams {
        source: &source.bytes,
        source_format: source.format(),
        output_format,
        quality: settings.quality,
        // Photographic sources go lossy; palettes and line art stay exact
        lossless: source.format() != ImageFormat::Jpeg,
    })
}

/// Run a conversion request through the codec.
pub fn convert(
    backend: &impl ImageBackend,
    request: ConversionRequest,
    settings: &EncodingSettings,
) -> ConversionOutcome {
    let ConversionRequest { source, target } = request;

    let Some(params) = encode_params(&source, target, settings) else {
        return ConversionOutcome::passthrough(source);
    };
    let expected = params.output_format;

    let encoded = match backend.encode(&params) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(source = %source.format(), target = %expected, error = %e, "conversion failed, serving original");
            return ConversionOutcome::fallback(source, e.to_string());
        }
    };

    let actual = sniff_format(&encoded);
    if actual != expected {
        warn!(target = %expected, actual = %actual, "codec output does not match target, serving original");
        return ConversionOutcome::fallback(
            source,
            format!("codec produced {actual}, expected {expected}"),
        );
    }

    if settings.reject_larger && target == TargetFormat::Modern && encoded.len() > source.bytes.len()
    {
        debug!(
            original = source.bytes.len(),
            converted = encoded.len(),
            "WebP larger than original, serving original"
        );
        return ConversionOutcome::fallback(source, "WebP larger than original image");
    }

    ConversionOutcome::converted(encoded, expected, source.bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::negotiate::TargetFormat::*;
    use crate::test_helpers::*;

    fn request(bytes: Vec<u8>, target: TargetFormat) -> ConversionRequest {
        ConversionRequest {
            source: SourceImage::new(bytes),
            target,
        }
    }

    fn lenient() -> EncodingSettings {
        EncodingSettings {
            reject_larger: false,
            ..Default::default()
        }
    }

    #[test]
    fn passthrough_returns_original_untouched() {
        let backend = MockBackend::returning(webp_bytes(2, 2));
        let bmp = bmp_bytes(4, 4);

        let outcome = convert(&backend, request(bmp.clone(), Passthrough), &lenient());

        assert_eq!(outcome.bytes, bmp);
        assert_eq!(outcome.served, ImageFormat::Bmp);
        assert_eq!(outcome.disposition, Disposition::Passthrough);
        assert!(!outcome.is_fallback());
        assert!(backend.get_operations().is_empty());
    }

    #[test]
    fn passthrough_of_unknown_bytes_is_unknown() {
        let backend = MockBackend::failing();
        let outcome = convert(
            &backend,
            request(b"plain text, not an image".to_vec(), Passthrough),
            &lenient(),
        );
        assert_eq!(outcome.served, ImageFormat::Unknown);
    }

    #[test]
    fn successful_conversion_is_tagged_with_target() {
        let webp = webp_bytes(2, 2);
        let backend = MockBackend::returning(webp.clone());

        let outcome = convert(&backend, request(png_bytes(8, 8), Modern), &lenient());

        assert_eq!(outcome.bytes, webp);
        assert_eq!(outcome.served, ImageFormat::WebP);
        assert_eq!(outcome.disposition, Disposition::Converted);
    }

    #[test]
    fn codec_failure_falls_back_to_original() {
        let backend = MockBackend::failing();
        let jpeg = jpeg_bytes(8, 8);

        let outcome = convert(&backend, request(jpeg.clone(), Modern), &lenient());

        assert!(outcome.is_fallback());
        assert_eq!(outcome.bytes, jpeg);
        assert_eq!(outcome.served, ImageFormat::Jpeg);
        assert_eq!(backend.encode_count(), 1);
    }

    #[test]
    fn mislabelled_codec_output_falls_back() {
        // Codec claims success but hands back a PNG for a WebP request
        let backend = MockBackend::returning(png_bytes(2, 2));
        let gif = gif_bytes(8, 8);

        let outcome = convert(&backend, request(gif.clone(), Modern), &lenient());

        assert!(outcome.is_fallback());
        assert_eq!(outcome.bytes, gif);
        assert_eq!(outcome.served, ImageFormat::Gif);
    }

    #[test]
    fn larger_webp_is_rejected_when_configured() {
        let mut big = webp_bytes(2, 2);
        big.resize(4096, 0);
        let backend = MockBackend::returning(big);
        let png = png_bytes(2, 2);

        let strict = convert(&backend, request(png.clone(), Modern), &EncodingSettings::default());
        assert!(strict.is_fallback());
        assert_eq!(strict.bytes, png);

        let relaxed = convert(&backend, request(png, Modern), &lenient());
        assert_eq!(relaxed.disposition, Disposition::Converted);
    }

    #[test]
    fn legacy_png_is_not_size_checked() {
        let mut big_png = png_bytes(2, 2);
        big_png.resize(8192, 0);
        let backend = MockBackend::returning(big_png);

        let outcome = convert(
            &backend,
            request(webp_bytes(2, 2), LegacyPng),
            &EncodingSettings::default(),
        );
        assert_eq!(outcome.disposition, Disposition::Converted);
        assert_eq!(outcome.served, ImageFormat::Png);
    }

    #[test]
    fn jpeg_encodes_lossy_at_configured_quality() {
        let backend = MockBackend::returning(webp_bytes(2, 2));
        let settings = EncodingSettings {
            quality: Quality::new(65),
            reject_larger: false,
        };

        convert(&backend, request(jpeg_bytes(8, 8), Modern), &settings);
        convert(&backend, request(png_bytes(8, 8), Modern), &settings);

        let ops = backend.get_operations();
        assert_eq!(
            ops[0],
            RecordedOp::Encode {
                source_format: ImageFormat::Jpeg,
                output_format: ImageFormat::WebP,
                quality: 65,
                lossless: false,
            }
        );
        assert!(matches!(ops[1], RecordedOp::Encode { lossless: true, .. }));
    }

    #[test]
    fn original_len_reports_stored_size() {
        let backend = MockBackend::returning(webp_bytes(2, 2));
        let png = png_bytes(8, 8);
        let len = png.len();
        let outcome = convert(&backend, request(png, Modern), &lenient());
        assert_eq!(outcome.original_len, len);
    }
}
