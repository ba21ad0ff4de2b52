//! Response assembly.
//!
//! [`assemble`] is a pure function of the lookup result and the startup
//! [`ResponseMode`]. The `Content-Type` it picks is derived only from
//! [`ConversionOutcome::served`], which the conversion engine guarantees
//! describes the body, so the header never claims a format the body does not
//! contain.
//!
//! | Served format | Content-Type |
//! |---|---|
//! | JPEG | `image/jpeg` |
//! | PNG | `image/png` |
//! | GIF | `image/gif` |
//! | WebP | `image/webp` |
//! | BMP | `image/bmp`, `image/x-ms-bmp` with `bmp_alias`, `application/octet-stream` in legacy mode |
//! | unknown | `application/octet-stream` |

use crate::imaging::{ConversionOutcome, Disposition};
use crate::types::{ImageFormat, OCTET_STREAM};
use axum::http::StatusCode;

/// Historical MIME alias some servers emit for BMP.
pub const BMP_ALIAS: &str = "image/x-ms-bmp";

/// Header carrying conversion statistics.
pub const STATS_HEADER: &str = "x-image-stats";
/// Header carrying the conversion cache key.
pub const CACHE_KEY_HEADER: &str = "x-cache-key";

/// Content-type quirks, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResponseMode {
    /// Label BMP bodies as generic binary, as legacy servers did.
    pub legacy: bool,
    /// Label BMP bodies with the `image/x-ms-bmp` alias.
    pub bmp_alias: bool,
}

/// A successfully looked-up resource, ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub outcome: ConversionOutcome,
    /// Present when the conversion went through the cache.
    pub cache_key: Option<String>,
}

/// Everything the responder can conclude about a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    Forbidden,
    /// The resource exists but could not be read.
    Unreadable(String),
    Found(Served),
}

/// Status, headers and body to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSpec {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

impl ResponseSpec {
    fn status_only(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Content-Type for a served format under `mode`.
pub fn content_type_for(format: ImageFormat, mode: ResponseMode) -> &'static str {
    match format {
        ImageFormat::Bmp if mode.legacy => OCTET_STREAM,
        ImageFormat::Bmp if mode.bmp_alias => BMP_ALIAS,
        other => other.mime_type(),
    }
}

/// Turn a lookup into a response.
pub fn assemble(lookup: Lookup, mode: ResponseMode) -> ResponseSpec {
    let served = match lookup {
        Lookup::NotFound => return ResponseSpec::status_only(StatusCode::NOT_FOUND),
        Lookup::Forbidden => return ResponseSpec::status_only(StatusCode::FORBIDDEN),
        Lookup::Unreadable(message) => {
            return ResponseSpec {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                content_type: Some("text/plain"),
                headers: Vec::new(),
                body: message.into_bytes(),
            };
        }
        Lookup::Found(served) => served,
    };

    let Served { outcome, cache_key } = served;
    let mut headers = Vec::new();
    if let Some(stats) = stats_header(&outcome) {
        headers.push((STATS_HEADER, stats));
    }
    if let Some(key) = cache_key {
        headers.push((CACHE_KEY_HEADER, key));
    }

    ResponseSpec {
        status: StatusCode::OK,
        content_type: Some(content_type_for(outcome.served, mode)),
        headers,
        body: outcome.bytes,
    }
}

/// `status=success; original=12.3kb; ratio=45.67%;` for conversions to WebP,
/// `status=success; webp=12.3kb; ratio=45.67%;` when a WebP source was turned
/// into PNG, `status=failure;` for fallbacks, nothing for plain passthrough.
/// The size is always that of the source.
fn stats_header(outcome: &ConversionOutcome) -> Option<String> {
    match outcome.disposition {
        Disposition::Converted => {
            let ratio = if outcome.original_len == 0 {
                0.0
            } else {
                outcome.bytes.len() as f64 * 100.0 / outcome.original_len as f64
            };
            let label = match outcome.served {
                ImageFormat::Png => "webp",
                _ => "original",
            };
            Some(format!(
                "status=success; {label}={:.1}kb; ratio={:.2}%;",
                outcome.original_len as f64 / 1024.0,
                ratio
            ))
        }
        Disposition::Fallback(_) => Some("status=failure;".to_string()),
        Disposition::Passthrough => None,
    }
}
