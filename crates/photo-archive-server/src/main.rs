mod config;
mod error;
mod handlers;
mod producer;
mod relay;
mod state;

use clap::builder::BoolishValueParser;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{default_producer_args, parse_delay, parse_size, ServerSection};
use crate::state::AppState;

/// Filter used when logging is enabled and RUST_LOG is unset.
const DEFAULT_LOG_FILTER: &str = "info,photo_archive_server=debug,tower_http=debug";

#[derive(Parser)]
#[command(
    name = "photo-archive-server",
    version,
    about = "Streams zip archives of photo directories over HTTP"
)]
struct Cli {
    /// Address to listen on
    #[arg(short, long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    listen: String,

    /// Directory whose subdirectories are served as archives
    #[arg(long, env = "PHOTOS_DIR", default_value = "test_photos")]
    photos_dir: String,

    /// Emit diagnostic logs (true/false)
    #[arg(
        long,
        env = "ENABLE_LOGGING",
        default_value = "true",
        default_missing_value = "true",
        num_args = 0..=1,
        value_parser = BoolishValueParser::new(),
        action = clap::ArgAction::Set
    )]
    enable_logging: bool,

    /// Delay after each archive chunk, in seconds
    #[arg(long, env = "RESPONSE_DELAY", default_value = "9", value_parser = parse_delay)]
    response_delay: f64,

    /// Bytes read from the producer per chunk (e.g. "1M", "256K")
    #[arg(long, env = "CHUNK_SIZE", default_value = "1M", value_parser = parse_size)]
    chunk_size: usize,

    /// HTML document served at `/`
    #[arg(long, env = "INDEX_PATH", default_value = "index.html")]
    index_path: String,

    /// Program invoked as `<program> -r - .` inside the archive directory
    #[arg(long, env = "ZIP_PROGRAM", default_value = "zip")]
    zip_program: String,

    /// Log output format: "json" or "pretty"
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    log_format: String,

    /// Number of tokio worker threads (minimum 1)
    #[arg(long, default_value_t = 4, value_parser = parse_min_one)]
    worker_threads: usize,
}

fn parse_min_one(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{e}"))?;
    if n == 0 {
        return Err("value must be at least 1".into());
    }
    Ok(n)
}

fn main() {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cli.worker_threads)
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to build tokio runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(async_main(cli));
}

async fn async_main(cli: Cli) {
    let config = ServerSection {
        listen: cli.listen,
        photos_dir: cli.photos_dir,
        enable_logging: cli.enable_logging,
        response_delay_secs: cli.response_delay,
        chunk_size: cli.chunk_size,
        index_path: cli.index_path,
        zip_program: cli.zip_program,
        producer_args: default_producer_args(),
        log_format: cli.log_format,
    };

    init_tracing(&config);

    if !std::path::Path::new(&config.photos_dir).is_dir() {
        tracing::warn!(
            photos_dir = %config.photos_dir,
            "photos directory does not exist yet; archive requests return 404 until it is created"
        );
    }

    let listen_addr = config.listen.clone();
    let shutdown = CancellationToken::new();
    let state = AppState::new(config, shutdown.clone());
    let app = handlers::router(state);

    let listener = TcpListener::bind(&listen_addr).await.unwrap_or_else(|e| {
        eprintln!("Error: cannot bind to {listen_addr}: {e}");
        std::process::exit(1);
    });
    info!("photo-archive-server listening on {listen_addr}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        eprintln!("Error: server failed: {e}");
        std::process::exit(1);
    }
    info!("server stopped");
}

fn init_tracing(config: &ServerSection) {
    let filter = if config.enable_logging {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    } else {
        EnvFilter::new("off")
    };

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

/// Resolve on Ctrl-C or SIGTERM and cancel every in-flight download.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown requested; cancelling in-flight downloads");
    shutdown.cancel();
}
