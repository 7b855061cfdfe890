//! Receipt OCR - HTTP service for receipt and document text extraction
//!
//! Uploads are thresholded, run through Tesseract and, for receipts,
//! mined for the total amount and the date.

mod api;
mod config;
mod receipt;
mod service;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::{build_router, AppState};
use crate::config::AppConfig;
use crate::service::OcrService;
use crate::vision::TesseractCli;

/// Receipt OCR - extract text and receipt fields from images
#[derive(Parser, Debug)]
#[command(name = "receipt-ocr")]
#[command(about = "HTTP API for OCR of receipts and documents")]
struct Args {
    /// Configuration file (defaults to config.toml in the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("receipt_ocr=info,tower_http=info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    if args.write_default_config {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => config::get_config_dir()?.join("config.toml"),
        };
        config::save_config(&AppConfig::default(), &path)
            .with_context(|| format!("writing default config to {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config = load_or_create_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("{} starting...", config.general.app_name);

    let engine = TesseractCli::new(
        &config.ocr.tesseract_path,
        Duration::from_secs(config.ocr.timeout_secs),
    );
    match engine.version().await {
        Ok(version) => info!("Using {} ({})", version, engine.binary().display()),
        Err(e) => warn!(
            "Tesseract probe failed for {}: {}. Requests will fail until it is installed.",
            engine.binary().display(),
            e
        ),
    }

    let service = OcrService::new(Arc::new(engine), &config)?;
    let state = Arc::new(AppState {
        service,
        app_name: config.general.app_name.clone(),
    });
    let app = build_router(state, &config.server);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from `path`, or from the default location
///
/// An explicit path must load. The default file is optional and a broken
/// one falls back to defaults with a warning.
fn load_or_create_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_dir) = config::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring configuration: {:#}", e),
            }
        }
    }

    info!("Using default configuration");
    Ok(AppConfig::default())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Signal received, starting graceful shutdown");
}
