//! BucketDesk - browser-facing S3 proxy
//!
//! Serves the BucketDesk frontend and a small JSON API that performs S3
//! operations with the credentials each request carries.

mod config;
mod router;

use bucketdesk_s3::{
    BackendFactory, EphemeralBackendFactory, ProxyService, ProxyState, SdkBackendFactory,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{aws_defaults, BackendMode, Config};

#[derive(Parser, Debug)]
#[command(name = "bucketdesk")]
#[command(about = "Browser-facing S3 proxy", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "BUCKETDESK_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "BUCKETDESK_HOST")]
    host: Option<String>,

    /// Directory holding the frontend assets
    #[arg(long, env = "BUCKETDESK_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Storage backend: s3 or ephemeral (in-memory)
    #[arg(long, value_enum, env = "BUCKETDESK_BACKEND")]
    backend: Option<BackendMode>,

    /// Maximum size of a single uploaded file in bytes
    #[arg(long, env = "BUCKETDESK_MAX_UPLOAD_SIZE")]
    max_upload_size: Option<u64>,

    /// Files uploaded concurrently per request
    #[arg(long, env = "BUCKETDESK_UPLOAD_CONCURRENCY")]
    upload_concurrency: Option<usize>,

    /// Multipart part size in bytes for large uploads
    #[arg(long, env = "BUCKETDESK_PART_SIZE")]
    part_size: Option<usize>,

    /// Cached S3 clients (0 disables the cache)
    #[arg(long, env = "BUCKETDESK_CLIENT_CACHE_SIZE")]
    client_cache_size: Option<usize>,

    /// Configuration file (extension optional)
    #[arg(long, default_value = "bucketdesk", env = "BUCKETDESK_CONFIG")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "BUCKETDESK_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    /// Command line values win over the config file
    fn apply(self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(static_dir) = self.static_dir {
            config.static_dir = static_dir;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(size) = self.max_upload_size {
            config.max_upload_size = size;
        }
        if let Some(concurrency) = self.upload_concurrency {
            config.upload_concurrency = concurrency;
        }
        if let Some(size) = self.client_cache_size {
            config.client_cache_size = size;
        }
        if let Some(size) = self.part_size {
            config.part_size = size;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("bucketdesk={},tower_http=debug", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(&args.config)?;
    let config = args.apply(config);

    info!("Starting BucketDesk...");
    info!("  Backend: {}", config.backend.as_str());
    info!("  Static assets: {}", config.static_dir.display());
    info!(
        "  Uploads: max {} bytes per file, {} concurrent",
        config.max_upload_size, config.upload_concurrency
    );

    let factory: Arc<dyn BackendFactory> = match config.backend {
        BackendMode::S3 => Arc::new(
            SdkBackendFactory::new(config.client_cache_size).with_part_size(config.part_size),
        ),
        BackendMode::Ephemeral => Arc::new(EphemeralBackendFactory::default()),
    };
    let service = ProxyService::new(factory).with_upload_limits(config.upload_limits());
    let defaults = aws_defaults(|name| std::env::var(name).ok());
    let state = Arc::new(ProxyState::new(service).with_defaults(defaults));

    // Create router
    let app = router::create_router(state, &config.static_dir);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
