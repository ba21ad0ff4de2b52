//! The request pipeline: read → sniff → decide → convert → assemble.
//!
//! [`Responder`] owns every piece of startup state (storage, codec backend,
//! encoding settings, optional cache, response mode) and exposes one
//! synchronous entry point, [`Responder::respond`]. It holds no per-request
//! state, so a single instance is shared by every request thread.
//!
//! ```text
//! storage.read ──NotFound──────────────────────────────► 404
//!      │
//!      ▼
//!   sniff ─► decide ─► [cache] ─► convert ─► assemble ──► 200
//! ```
//!
//! A missing resource returns before sniffing; nothing else is computed.
//!
//! [`Responder::warm`] runs the same lookups ahead of time, in parallel, for
//! both kinds of client, so the first real request is a cache hit.

use crate::cache::{CachedConversion, ConversionCache, cache_key};
use crate::imaging::{ConversionOutcome, Disposition, EncodingSettings, ImageBackend, convert};
use crate::negotiate::{ClientCapability, ConversionRequest, SourceImage, TargetFormat, decide};
use crate::response::{Lookup, ResponseMode, ResponseSpec, Served, assemble};
use crate::sniff::sniff_format;
use crate::storage::{Storage, StorageError, StoredImage};
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Add;
use tracing::{debug, info, warn};

const CAPABILITIES: [ClientCapability; 2] = [
    ClientCapability {
        accepts_modern: true,
    },
    ClientCapability {
        accepts_modern: false,
    },
];

/// Tally of a [`Responder::warm`] run. Each path counts once per client kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarmSummary {
    pub files: usize,
    pub converted: usize,
    pub fallbacks: usize,
    pub passthrough: usize,
    pub errors: usize,
}

impl WarmSummary {
    fn record(mut self, lookup: &Lookup) -> Self {
        match lookup {
            Lookup::Found(served) => match served.outcome.disposition {
                Disposition::Converted => self.converted += 1,
                Disposition::Fallback(_) => self.fallbacks += 1,
                Disposition::Passthrough => self.passthrough += 1,
            },
            Lookup::NotFound | Lookup::Forbidden | Lookup::Unreadable(_) => self.errors += 1,
        }
        self
    }
}

impl Add for WarmSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            files: self.files + other.files,
            converted: self.converted + other.converted,
            fallbacks: self.fallbacks + other.fallbacks,
            passthrough: self.passthrough + other.passthrough,
            errors: self.errors + other.errors,
        }
    }
}

/// Shared, immutable request handler.
pub struct Responder<B, S> {
    backend: B,
    storage: S,
    settings: EncodingSettings,
    cache: Option<ConversionCache>,
    mode: ResponseMode,
}

impl<B: ImageBackend, S: Storage> Responder<B, S> {
    pub fn new(backend: B, storage: S, settings: EncodingSettings, mode: ResponseMode) -> Self {
        Self {
            backend,
            storage,
            settings,
            cache: None,
            mode,
        }
    }

    /// Put a conversion cache in front of the engine.
    pub fn with_cache(mut self, cache: ConversionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&ConversionCache> {
        self.cache.as_ref()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Handle one request end to end.
    pub fn respond(&self, path: &str, capability: ClientCapability) -> ResponseSpec {
        assemble(self.lookup(path, capability), self.mode)
    }

    /// Everything up to, but not including, response assembly.
    pub fn lookup(&self, path: &str, capability: ClientCapability) -> Lookup {
        let stored = match self.storage.read(path) {
            Ok(stored) => stored,
            Err(StorageError::NotFound(_)) => return Lookup::NotFound,
            Err(StorageError::Forbidden(p)) => {
                warn!(path = %p, "request escapes document root");
                return Lookup::Forbidden;
            }
            Err(StorageError::Io(e)) => {
                warn!(path, error = %e, "failed to read resource");
                return Lookup::Unreadable(e.to_string());
            }
        };

        let StoredImage {
            bytes,
            canonical_path,
            modified,
            len,
        } = stored;
        let request = decide(capability, SourceImage::new(bytes));
        debug!(
            path,
            format = %request.source.format(),
            color = %request.source.sniffed.color_mode,
            accepts_webp = capability.accepts_modern,
            target = request.target.as_str(),
            "negotiated"
        );

        if request.target == TargetFormat::Passthrough {
            return Lookup::Found(Served {
                outcome: ConversionOutcome::passthrough(request.source),
                cache_key: None,
            });
        }

        let Some(cache) = &self.cache else {
            return Lookup::Found(Served {
                outcome: convert(&self.backend, request, &self.settings),
                cache_key: None,
            });
        };

        let key = cache_key(&canonical_path, modified, len, request.target);
        let outcome = self.convert_cached(cache, &key, request);
        Lookup::Found(Served {
            outcome,
            cache_key: Some(key),
        })
    }

    /// Look up every path for both client kinds on the rayon pool.
    pub fn warm(&self, paths: &[String]) -> WarmSummary {
        let summary = paths
            .par_iter()
            .map(|path| {
                let start = WarmSummary {
                    files: 1,
                    ..Default::default()
                };
                CAPABILITIES
                    .iter()
                    .fold(start, |acc, &cap| acc.record(&self.lookup(path, cap)))
            })
            .reduce(WarmSummary::default, |a, b| a + b);
        info!(
            files = summary.files,
            converted = summary.converted,
            fallbacks = summary.fallbacks,
            "warm complete"
        );
        summary
    }

    fn convert_cached(
        &self,
        cache: &ConversionCache,
        key: &str,
        request: ConversionRequest,
    ) -> ConversionOutcome {
        let original_len = request.source.bytes.len();

        match cache.lookup(key) {
            Some(CachedConversion::Failed) => {
                debug!(key, "cached conversion failure");
                return ConversionOutcome::fallback(request.source, "cached conversion failure");
            }
            Some(CachedConversion::Converted(bytes)) => {
                let format = sniff_format(&bytes);
                if Some(format) == request.target.output_format() {
                    return ConversionOutcome::converted(bytes, format, original_len);
                }
                warn!(key, "cache entry does not match its target, evicting");
                cache.evict(key);
            }
            None => {}
        }

        let outcome = convert(&self.backend, request, &self.settings);
        if let Err(e) = cache.store(key, &outcome) {
            warn!(key, error = %e, "failed to write cache entry");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::sniff::sniff_format;
    use crate::storage::DocumentRoot;
    use crate::test_helpers::*;
    use crate::types::ImageFormat;
    use axum::http::StatusCode;
    use tempfile::TempDir;

    const CAPABLE: ClientCapability = ClientCapability {
        accepts_modern: true,
    };
    const LEGACY: ClientCapability = ClientCapability {
        accepts_modern: false,
    };

    fn lenient() -> EncodingSettings {
        EncodingSettings {
            reject_larger: false,
            ..Default::default()
        }
    }

    fn responder(
        backend: MockBackend,
        root: &TempDir,
        mode: ResponseMode,
    ) -> Responder<MockBackend, DocumentRoot> {
        Responder::new(
            backend,
            DocumentRoot::new(root.path()).unwrap(),
            lenient(),
            mode,
        )
    }

    #[test]
    fn missing_resource_never_reaches_codec() {
        let root = setup_document_root(&[]);
        let r = responder(MockBackend::returning(webp_bytes(2, 2)), &root, Default::default());

        let spec = r.respond("/testing/notfound.jpg", CAPABLE);

        assert_eq!(spec.status, StatusCode::NOT_FOUND);
        assert!(r.backend.get_operations().is_empty());
    }

    #[test]
    fn capable_client_gets_converted_webp() {
        let root = setup_document_root(&[("regular.jpg", jpeg_bytes(8, 8))]);
        let webp = webp_bytes(2, 2);
        let r = responder(MockBackend::returning(webp.clone()), &root, Default::default());

        let spec = r.respond("/regular.jpg", CAPABLE);

        assert_eq!(spec.status, StatusCode::OK);
        assert_eq!(spec.content_type, Some("image/webp"));
        assert_eq!(spec.body, webp);
    }

    #[test]
    fn forced_codec_failure_serves_original_with_true_type() {
        let jpeg = jpeg_bytes(8, 8);
        let root = setup_document_root(&[("regular.jpg", jpeg.clone())]);
        let r = responder(MockBackend::failing(), &root, Default::default());

        let spec = r.respond("/regular.jpg", CAPABLE);

        assert_eq!(spec.status, StatusCode::OK);
        assert_eq!(spec.content_type, Some("image/jpeg"));
        assert_eq!(spec.body, jpeg);
        assert_eq!(spec.header("x-image-stats"), Some("status=failure;"));
    }

    #[test]
    fn bmp_in_webp_clothing_is_never_converted() {
        let bmp = bmp_bytes(8, 8);
        let root = setup_document_root(&[("bmp.webp", bmp.clone())]);
        let legacy = responder(
            MockBackend::returning(png_bytes(2, 2)),
            &root,
            ResponseMode {
                legacy: true,
                bmp_alias: false,
            },
        );

        let spec = legacy.respond("/bmp.webp", LEGACY);

        assert_eq!(spec.content_type, Some("application/octet-stream"));
        assert_eq!(spec.body, bmp);
        assert_eq!(sniff_format(&spec.body), ImageFormat::Bmp);
        assert!(legacy.backend.get_operations().is_empty());
    }

    #[test]
    fn forbidden_path_is_403() {
        let outer = TempDir::new().unwrap();
        write_file(outer.path(), "secret.png", &png_bytes(2, 2));
        write_file(outer.path(), "public/ok.png", &png_bytes(2, 2));
        let r = Responder::new(
            MockBackend::failing(),
            DocumentRoot::new(&outer.path().join("public")).unwrap(),
            lenient(),
            ResponseMode::default(),
        );

        assert_eq!(
            r.respond("/../secret.png", CAPABLE).status,
            StatusCode::FORBIDDEN
        );
    }

    // =========================================================================
    // Cache layer
    // =========================================================================

    fn cached_responder(
        backend: MockBackend,
        root: &TempDir,
        cache_dir: &TempDir,
    ) -> Responder<MockBackend, DocumentRoot> {
        responder(backend, root, Default::default())
            .with_cache(ConversionCache::open(cache_dir.path()).unwrap())
    }

    #[test]
    fn second_request_is_served_from_cache() {
        let root = setup_document_root(&[("regular.png", png_bytes(8, 8))]);
        let cache_dir = TempDir::new().unwrap();
        let r = cached_responder(MockBackend::returning(webp_bytes(2, 2)), &root, &cache_dir);

        let first = r.respond("/regular.png", CAPABLE);
        let second = r.respond("/regular.png", CAPABLE);

        assert_eq!(first, second);
        assert_eq!(r.backend.encode_count(), 1);
        assert!(first.header("x-cache-key").is_some());
        let stats = r.cache().unwrap().stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn cached_failure_is_not_retried() {
        let png = png_bytes(8, 8);
        let root = setup_document_root(&[("regular.png", png.clone())]);
        let cache_dir = TempDir::new().unwrap();
        let r = cached_responder(MockBackend::failing(), &root, &cache_dir);

        for _ in 0..3 {
            let spec = r.respond("/regular.png", CAPABLE);
            assert_eq!(spec.content_type, Some("image/png"));
            assert_eq!(spec.body, png);
        }
        assert_eq!(r.backend.encode_count(), 1);
    }

    #[test]
    fn targets_are_cached_separately() {
        let root = setup_document_root(&[("lossless.webp", webp_bytes(8, 8))]);
        let cache_dir = TempDir::new().unwrap();
        let r = cached_responder(MockBackend::returning(png_bytes(2, 2)), &root, &cache_dir);

        let legacy = r.respond("/lossless.webp", LEGACY);
        let capable = r.respond("/lossless.webp", CAPABLE);

        assert_eq!(legacy.content_type, Some("image/png"));
        assert_eq!(capable.content_type, Some("image/webp"));
        assert_eq!(capable.header("x-cache-key"), None);
    }

    #[test]
    fn corrupted_cache_entry_is_replaced() {
        let png = png_bytes(8, 8);
        let root = setup_document_root(&[("regular.png", png)]);
        let cache_dir = TempDir::new().unwrap();
        let webp = webp_bytes(2, 2);
        let r = cached_responder(MockBackend::returning(webp.clone()), &root, &cache_dir);

        let key = r
            .respond("/regular.png", CAPABLE)
            .header("x-cache-key")
            .unwrap()
            .to_string();
        std::fs::write(cache_dir.path().join(&key), b"garbage garbage garbage").unwrap();

        let spec = r.respond("/regular.png", CAPABLE);
        assert_eq!(spec.body, webp);
        assert_eq!(r.backend.encode_count(), 2);
    }

    #[test]
    fn warm_fills_cache_for_both_clients() {
        let root = setup_document_root(&[
            ("photo.jpg", jpeg_bytes(8, 8)),
            ("lossless.webp", webp_bytes(8, 8)),
            ("icon.bmp", bmp_bytes(8, 8)),
        ]);
        let cache_dir = TempDir::new().unwrap();
        let r = cached_responder(MockBackend::returning(webp_bytes(2, 2)), &root, &cache_dir);
        let paths = r.storage().request_paths();

        let summary = r.warm(&paths);

        assert_eq!(summary.files, 3);
        // jpg→webp converts; webp→png gets webp bytes back and falls back
        assert_eq!(summary.converted, 1);
        assert_eq!(summary.fallbacks, 1);
        // jpg (legacy), webp (capable), bmp (both)
        assert_eq!(summary.passthrough, 4);
        assert_eq!(summary.errors, 0);

        let encodes = r.backend.encode_count();
        r.warm(&paths);
        assert_eq!(r.backend.encode_count(), encodes);
    }

    #[test]
    fn warm_summary_counts_vanished_files() {
        let root = setup_document_root(&[]);
        let r = responder(MockBackend::failing(), &root, Default::default());

        let summary = r.warm(&["/gone.png".to_string()]);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.errors, 2);
    }

    #[test]
    fn lookup_exposes_disposition() {
        let root = setup_document_root(&[("cmyk.jpg", cmyk_jpeg_bytes())]);
        let r = responder(MockBackend::returning(webp_bytes(2, 2)), &root, Default::default());

        let Lookup::Found(served) = r.lookup("/cmyk.jpg", CAPABLE) else {
            panic!("expected cmyk.jpg to be found");
        };
        assert_eq!(served.outcome.disposition, Disposition::Passthrough);
        assert_eq!(served.outcome.served, ImageFormat::Jpeg);
    }
}
