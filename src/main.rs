use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webp_relay::cache::ConversionCache;
use webp_relay::config::{self, RelayConfig};
use webp_relay::imaging::RustBackend;
use webp_relay::pipeline::Responder;
use webp_relay::storage::DocumentRoot;
use webp_relay::{output, server};

/// Shared flags for commands that go through the conversion cache.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the conversion cache: convert on every request
    #[arg(long)]
    no_cache: bool,

    /// Cache directory (overrides cache.dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "webp-relay")]
#[command(about = "Image responder with WebP content negotiation")]
#[command(long_about = "\
Image responder with WebP content negotiation

Serves images from a document root. Clients that send `Accept: image/webp`
get JPEG, PNG and GIF files converted to WebP; other clients get WebP files
converted to PNG. Everything else is served as stored.

Formats are sniffed from the bytes, never from the file extension, and the
Content-Type always matches the body:

  photo.jpg   (JPEG)       → image/webp  or image/jpeg
  banner.webp (WebP)       → image/webp  or image/png
  scan.jpg    (CMYK JPEG)  → image/jpeg  (never converted)
  old.webp    (BMP)        → image/bmp   (never converted)

A failed conversion serves the original with `X-Image-Stats: status=failure;`.

Run 'webp-relay gen-config' to generate a documented webp-relay.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (missing file = defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Relay(RelayCommand),
    /// Print a stock webp-relay.toml with all options documented
    GenConfig,
}

/// Commands that run against a loaded `webp-relay.toml`.
#[derive(Subcommand)]
enum RelayCommand {
    /// Serve images over HTTP
    Serve(ServeArgs),
    /// Show what files really are and what each client would get
    Inspect {
        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Pre-convert every file under the document root into the cache
    Warm {
        /// Document root (overrides server.document_root)
        #[arg(long)]
        root: Option<PathBuf>,
        #[command(flatten)]
        cache: CacheArgs,
    },
}

#[derive(clap::Args)]
struct ServeArgs {
    /// Address to bind (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to bind (overrides server.port)
    #[arg(long)]
    port: Option<u16>,
    /// Document root (overrides server.document_root)
    #[arg(long)]
    root: Option<PathBuf>,
    /// Label BMP as application/octet-stream, like older servers
    #[arg(long)]
    legacy_mode: bool,
    /// Label BMP as image/x-ms-bmp instead of image/bmp
    #[arg(long)]
    bmp_alias: bool,
    #[command(flatten)]
    cache: CacheArgs,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(())
        }
        Command::Relay(command) => {
            init_tracing();
            let config = config::load_config(&cli.config)?;
            run(command, config)
        }
    }
}

fn run(command: RelayCommand, mut config: RelayConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        RelayCommand::Serve(args) => {
            apply_serve_args(&mut config, args);
            config.validate()?;

            let responder = Arc::new(build_responder(&config)?);
            info!(
                root = %responder.storage().path().display(),
                legacy = config.server.legacy_mode,
                cache = config.cache.enabled,
                "starting"
            );

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(
                &config.server.host,
                config.server.port,
                server::router(responder),
            ))?;
        }
        RelayCommand::Inspect { files, json } => {
            let backend = RustBackend::new();
            let mode = config.response_mode();
            let mut reports = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path)
                    .map_err(|e| format!("{}: {}", path.display(), e))?;
                reports.push(output::inspect(&backend, path, &bytes, mode));
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    output::print_inspect(report);
                }
            }
        }
        RelayCommand::Warm { root, cache } => {
            if let Some(root) = root {
                config.server.document_root = root;
            }
            apply_cache_args(&mut config, &cache);
            if !config.cache.enabled {
                return Err("warm needs the conversion cache; drop --no-cache".into());
            }
            config.validate()?;

            init_thread_pool(&config.processing);
            let responder = build_responder(&config)?;
            let paths = responder.storage().request_paths();
            info!(files = paths.len(), "warming cache");
            let summary = responder.warm(&paths);
            output::print_warm_summary(&summary, responder.cache().map(|c| c.stats()));
        }
    }

    Ok(())
}

/// Log to stderr so `inspect --json` output stays machine-readable.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn apply_serve_args(config: &mut RelayConfig, args: ServeArgs) {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(root) = args.root {
        config.server.document_root = root;
    }
    config.server.legacy_mode |= args.legacy_mode;
    config.server.bmp_alias |= args.bmp_alias;
    apply_cache_args(config, &args.cache);
}

fn apply_cache_args(config: &mut RelayConfig, args: &CacheArgs) {
    if args.no_cache {
        config.cache.enabled = false;
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.dir = dir.clone();
    }
}

fn build_responder(
    config: &RelayConfig,
) -> Result<Responder<RustBackend, DocumentRoot>, Box<dyn std::error::Error>> {
    let storage = DocumentRoot::new(&config.server.document_root)
        .map_err(|e| format!("{}: {}", config.server.document_root.display(), e))?;
    let responder = Responder::new(
        RustBackend::new(),
        storage,
        config.encoding_settings(),
        config.response_mode(),
    );
    if !config.cache.enabled {
        return Ok(responder);
    }

    let dir = config.cache.effective_dir();
    match ConversionCache::open(&dir) {
        Ok(cache) => Ok(responder.with_cache(cache)),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cache unavailable, converting on every request");
            Ok(responder)
        }
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
