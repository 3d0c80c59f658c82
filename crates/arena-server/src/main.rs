//! Relay server binary.
//!
//! # Usage
//!
//! ```bash
//! arena-server /path/to/config.json
//! ```
//!
//! Exits 0 on signal-driven shutdown, non-zero on configuration or bind
//! failure.

use std::process::ExitCode;

use arena_server::{
    config::{Config, LoggerConfig},
    Server, ServerError,
};
use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Multi-room websocket game relay server
#[derive(Parser, Debug)]
#[command(name = "arena-server")]
#[command(about = "Multi-room websocket game relay server")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    config: std::path::PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("arena-server: {error}");
            return ExitCode::FAILURE;
        }
    };

    // Keeps the non-blocking file writer flushing until exit.
    let _log_guard = init_logging(config.logger.as_ref());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.number_of_additional_threads + 1)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to build the runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "startup failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Config) -> Result<(), ServerError> {
    let server = Server::bind(&config)?;
    tracing::info!("relay listening on {}", server.local_addr()?);
    server.run().await
}

fn init_logging(logger: Option<&LoggerConfig>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = logger.map(|cfg| cfg.level).unwrap_or_default();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    match logger {
        Some(cfg) => {
            let file = tracing_appender::rolling::never(
                &cfg.root,
                format!("server.{}", cfg.extension),
            );
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
            None
        }
    }
}
