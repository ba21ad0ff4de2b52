//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Inspect
//!
//! Shows what a stored file really is and what each kind of client would
//! receive for it:
//!
//! ```text
//! testing/bmp.webp
//!     Claimed: WebP
//!     Sniffed: BMP (RGB), 512x512, 768.1kb
//!     WebP client: passthrough → image/bmp
//!     Other client: passthrough → image/bmp
//! ```
//!
//! ## Warm
//!
//! ```text
//! Warmed 12 files
//!     Converted: 9
//!     Fallback: 2
//!     Passthrough: 13
//!     Cache: 0 cached, 11 converted (11 total)
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects. `--json` output serializes the same
//! report structs with `serde_json`.

use crate::cache::CacheStats;
use crate::imaging::{Dimensions, ImageBackend};
use crate::negotiate::{ClientCapability, TargetFormat, decide_target};
use crate::pipeline::WarmSummary;
use crate::response::{ResponseMode, content_type_for};
use crate::sniff::{Sniffed, sniff};
use crate::types::{ColorMode, ImageFormat};
use serde::Serialize;
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes}b")
    } else {
        format!("{:.1}kb", bytes as f64 / 1024.0)
    }
}

// ============================================================================
// Inspect
// ============================================================================

/// What a client would receive for one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientView {
    pub target: TargetFormat,
    pub content_type: &'static str,
}

/// Diagnostic view of one stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub path: String,
    /// Format suggested by the file extension, if recognised.
    pub claimed: Option<ImageFormat>,
    pub format: ImageFormat,
    pub color_mode: ColorMode,
    pub dimensions: Option<Dimensions>,
    pub size: u64,
    pub webp_client: ClientView,
    pub other_client: ClientView,
}

/// Build the report for `bytes` read from `path`.
///
/// The content types assume the conversion succeeds; a codec failure at
/// request time would serve the original under its sniffed type instead.
pub fn inspect(
    backend: &impl ImageBackend,
    path: &Path,
    bytes: &[u8],
    mode: ResponseMode,
) -> InspectReport {
    let sniffed = sniff(bytes);
    let dimensions = match sniffed.format {
        ImageFormat::Unknown => None,
        format => backend.identify(bytes, format).ok(),
    };
    let view = |accepts_modern| client_view(ClientCapability { accepts_modern }, sniffed, mode);

    InspectReport {
        path: path.display().to_string(),
        claimed: claimed_format(path),
        format: sniffed.format,
        color_mode: sniffed.color_mode,
        dimensions,
        size: bytes.len() as u64,
        webp_client: view(true),
        other_client: view(false),
    }
}

fn client_view(capability: ClientCapability, sniffed: Sniffed, mode: ResponseMode) -> ClientView {
    let target = decide_target(capability, sniffed);
    let served = target.output_format().unwrap_or(sniffed.format);
    ClientView {
        target,
        content_type: content_type_for(served, mode),
    }
}

fn claimed_format(path: &Path) -> Option<ImageFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        "gif" => Some(ImageFormat::Gif),
        "webp" => Some(ImageFormat::WebP),
        "bmp" => Some(ImageFormat::Bmp),
        _ => None,
    }
}

/// Format one inspect report.
///
/// ```text
/// photo.jpg
///     Claimed: JPEG
///     Sniffed: JPEG (CMYK), 8x8, 2.1kb
///     WebP client: passthrough → image/jpeg
///     Other client: passthrough → image/jpeg
/// ```
pub fn format_inspect(report: &InspectReport) -> Vec<String> {
    let mut lines = vec![report.path.clone()];
    if let Some(claimed) = report.claimed {
        lines.push(format!("{}Claimed: {}", indent(1), claimed));
    }

    let mut sniffed = format!("{}Sniffed: {}", indent(1), report.format);
    if report.color_mode != ColorMode::Unknown {
        sniffed.push_str(&format!(" ({})", report.color_mode));
    }
    if let Some(d) = report.dimensions {
        sniffed.push_str(&format!(", {}x{}", d.width, d.height));
    }
    sniffed.push_str(&format!(", {}", format_size(report.size)));
    lines.push(sniffed);

    for (label, view) in [
        ("WebP client", &report.webp_client),
        ("Other client", &report.other_client),
    ] {
        lines.push(format!(
            "{}{}: {} → {}",
            indent(1),
            label,
            view.target.as_str(),
            view.content_type
        ));
    }
    lines
}

pub fn print_inspect(report: &InspectReport) {
    for line in format_inspect(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Warm
// ============================================================================

/// Format the result of a warm run.
pub fn format_warm_summary(summary: &WarmSummary, cache: Option<CacheStats>) -> Vec<String> {
    let mut lines = vec![format!("Warmed {} files", summary.files)];
    lines.push(format!("{}Converted: {}", indent(1), summary.converted));
    lines.push(format!("{}Fallback: {}", indent(1), summary.fallbacks));
    lines.push(format!("{}Passthrough: {}", indent(1), summary.passthrough));
    if summary.errors > 0 {
        lines.push(format!("{}Errors: {}", indent(1), summary.errors));
    }
    match cache {
        Some(stats) => lines.push(format!("{}Cache: {}", indent(1), stats)),
        None => lines.push(format!("{}Cache: disabled", indent(1))),
    }
    lines
}

pub fn print_warm_summary(summary: &WarmSummary, cache: Option<CacheStats>) {
    for line in format_warm_summary(summary, cache) {
        println!("{}", line);
    }
}
