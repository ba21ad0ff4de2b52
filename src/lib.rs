//! # webp-relay
//!
//! An image responder that serves WebP to clients that can render it, and
//! whatever they can render to everyone else, without ever sending a
//! `Content-Type` that disagrees with the body.
//!
//! # Architecture: One Request, Five Steps
//!
//! ```text
//! 1. Read      storage    →  bytes + file identity   (404 / 403 stop here)
//! 2. Sniff     bytes      →  true format + colour mode
//! 3. Decide    capability →  target (modern / legacy PNG / passthrough)
//! 4. Convert   target     →  outcome (converted / passthrough / fallback)
//! 5. Assemble  outcome    →  status, Content-Type, headers, body
//! ```
//!
//! Every step after the read is a pure function of its inputs, except the
//! codec call, which sits behind the [`imaging::ImageBackend`] trait so tests
//! can substitute a scripted mock.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | `ImageFormat` and `ColorMode`, shared by every step |
//! | [`sniff`] | Magic-byte classification, including JPEG CMYK detection |
//! | [`negotiate`] | `Accept` parsing, the convertibility matrix and the target policy |
//! | [`imaging`] | Codec backend trait, libwebp/`image` backend, conversion engine |
//! | [`storage`] | Document-root file access with containment checks |
//! | [`cache`] | On-disk conversion cache keyed by file identity and target |
//! | [`response`] | Pure response assembly and Content-Type mapping |
//! | [`pipeline`] | `Responder`: wires the steps together; offline cache warming |
//! | [`server`] | axum router and listener |
//! | [`config`] | `webp-relay.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting for `inspect` and `warm` |
//!
//! # Design Decisions
//!
//! ## Sniff, Never Trust
//!
//! File extensions and stored metadata are ignored. A `.webp` file that
//! holds a BMP is a BMP. Codec output is sniffed again before it is served,
//! and output that does not sniff as the requested format is treated as a
//! codec failure.
//!
//! ## Availability Over Fidelity
//!
//! A failed conversion never fails the request. The original bytes are served
//! with their own (sniffed) type and an `X-Image-Stats: status=failure;`
//! header. When the cache is enabled the failure is recorded so the codec is
//! not asked again for the same file.
//!
//! ## Legacy Mode
//!
//! Older deployments labelled BMP bodies `application/octet-stream`. That
//! quirk is a startup flag ([`response::ResponseMode`]), not a code path that
//! depends on request state.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod negotiate;
pub mod output;
pub mod pipeline;
pub mod response;
pub mod server;
pub mod sniff;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
