//! Responder configuration.
//!
//! Handles loading, validating, and merging a `webp-relay.toml` file over the
//! stock defaults. Command-line flags are applied on top by the binary.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! document_root = "public"
//! legacy_mode = false       # label BMP passthrough as application/octet-stream
//! bmp_alias = false         # label BMP as image/x-ms-bmp instead of image/bmp
//!
//! [encoding]
//! jpeg_quality = 80         # lossy WebP quality for JPEG sources (0-100)
//! reject_larger = true      # serve the original when WebP comes out larger
//!
//! [cache]
//! enabled = true
//! dir = ""                  # empty = <system temp dir>/webp-relay
//!
//! [processing]
//! max_processes = 4         # workers for `warm` (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [server]
//! legacy_mode = true
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::cache::DEFAULT_CACHE_DIRNAME;
use crate::imaging::{EncodingSettings, Quality};
use crate::response::ResponseMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "webp-relay.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration.
///
/// All fields have defaults. Config files need only specify the values they
/// want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Listener and response labelling.
    pub server: ServerConfig,
    /// Codec settings.
    pub encoding: EncodingConfig,
    /// Conversion cache.
    pub cache: CacheConfig,
    /// Parallel processing settings for offline cache warming.
    pub processing: ProcessingConfig,
}

impl RelayConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be non-zero".into(),
            ));
        }
        if self.server.document_root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "server.document_root must not be empty".into(),
            ));
        }
        if self.encoding.jpeg_quality > 100 {
            return Err(ConfigError::Validation(
                "encoding.jpeg_quality must be 0-100".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn encoding_settings(&self) -> EncodingSettings {
        EncodingSettings {
            quality: Quality::new(self.encoding.jpeg_quality),
            reject_larger: self.encoding.reject_larger,
        }
    }

    pub fn response_mode(&self) -> ResponseMode {
        ResponseMode {
            legacy: self.server.legacy_mode,
            bmp_alias: self.server.bmp_alias,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory images are served from.
    pub document_root: PathBuf,
    /// Label BMP passthrough as generic binary, like legacy servers did.
    pub legacy_mode: bool,
    /// Label BMP as `image/x-ms-bmp`.
    pub bmp_alias: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            document_root: PathBuf::from("public"),
            legacy_mode: false,
            bmp_alias: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    /// Lossy WebP quality for JPEG sources (0 = worst, 100 = best).
    pub jpeg_quality: u32,
    /// Serve the original when the WebP would be larger.
    pub reject_larger: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            reject_larger: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache directory. Empty means `<system temp dir>/webp-relay`.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::new(),
        }
    }
}

impl CacheConfig {
    /// The directory to use, resolving the empty default.
    pub fn effective_dir(&self) -> PathBuf {
        if self.dir.as_os_str().is_empty() {
            std::env::temp_dir().join(DEFAULT_CACHE_DIRNAME)
        } else {
            self.dir.clone()
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers for `warm`.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Stock defaults as a TOML value, the base layer for merging.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(RelayConfig::default())
        .unwrap_or_else(|_| toml::Value::Table(Default::default()))
}

/// Deep-merge two TOML values. Tables merge key by key; any other overlay
/// value replaces the base.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            toml::Value::Table(base)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<RelayConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: RelayConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# webp-relay configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Listener and response labelling
# ---------------------------------------------------------------------------
[server]
host = "127.0.0.1"
port = 8080

# Directory images are served from. Requests outside it get 403.
document_root = "public"

# Label BMP files served unchanged as application/octet-stream instead of
# image/bmp. Matches the behaviour of older servers.
legacy_mode = false

# Label BMP files as image/x-ms-bmp instead of image/bmp.
bmp_alias = false

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
[encoding]
# Lossy WebP quality for JPEG sources (0 = worst, 100 = best).
# PNG and GIF sources are always encoded lossless.
jpeg_quality = 80

# Serve the original image when the WebP version comes out larger.
reject_larger = true

# ---------------------------------------------------------------------------
# Conversion cache
# ---------------------------------------------------------------------------
[cache]
enabled = true

# Cache directory. Empty means <system temp dir>/webp-relay.
dir = ""

# ---------------------------------------------------------------------------
# Parallel processing (warm command)
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit for auto (= number of CPU cores).
# max_processes = 4
"##
}
