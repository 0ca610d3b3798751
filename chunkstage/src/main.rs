use std::path::PathBuf;
use std::sync::Arc;

use chunkstage::api;
use chunkstage::config::Config;
use chunkstage::utils::cli::Args;
use chunkstage::utils::state::AppState;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chunkstage=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = validate_config(&args).await;
    tracing::info!(
        root = %config.root_dir.display(),
        storage = %config.storage_typ,
        "storage configured"
    );
    let state = Arc::new(AppState::new(config));

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}

async fn validate_config(args: &Args) -> Config {
    let mut validation_errors = Vec::new();

    let root_dir = PathBuf::from(&args.root);
    if args.storage != "MEMORY" {
        match tokio::fs::metadata(&root_dir).await {
            Ok(meta) => {
                if !meta.is_dir() {
                    validation_errors.push(format!(
                        "CHUNKSTAGE_ROOTDIR `{}` exists but is not a directory",
                        args.root,
                    ));
                }
            }
            Err(_) => {
                if let Err(e) = tokio::fs::create_dir_all(&root_dir).await {
                    validation_errors.push(format!(
                        "CHUNKSTAGE_ROOTDIR `{}` does not exist and cannot be created: {e}",
                        args.root,
                    ));
                }
            }
        }
    }

    if !matches!(args.storage.as_str(), "FILESYSTEM" | "MEMORY") {
        validation_errors.push(format!(
            "CHUNKSTAGE_STORAGE `{}` is not one of FILESYSTEM, MEMORY",
            args.storage,
        ));
    }
    if args.merge_concurrency == 0 {
        tracing::warn!("CHUNKSTAGE_MERGE_CONCURRENCY is 0, merging one chunk at a time");
    }

    if !validation_errors.is_empty() {
        for error in &validation_errors {
            tracing::error!("{error}");
        }
        std::process::exit(1);
    }

    Config {
        host: args.host.clone(),
        port: args.port,
        storage_typ: args.storage.clone(),
        root_dir,
        max_chunk_size: args.max_chunk_size,
        body_limit: args.body_limit,
        merge_concurrency: args.merge_concurrency.max(1),
    }
}
