use anyhow::Result;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

mod bootstrap;
mod config;
mod embedder;
mod error;
mod index;
mod index_manager;
mod model;
mod routes;
mod server;
mod service;
mod snapshot;
mod state;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::AppConfig::from_env();
    let log_dir = config
        .log_dir
        .clone()
        .unwrap_or_else(|| format!("{}/logs", config.data_dir));
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "vectordb-backend.log");
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vectordb_backend=info,tower_http=info".into());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(non_blocking_writer)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        error!(target: "vectordb_backend::panic", location = %location, payload = %payload, "PANIC: thread panicked");
        default_panic(info);
    }));

    routes::health::init_start_time();

    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        ball_tree_default_leaf_size = config.ball_tree_default_leaf_size,
        log_dir = %log_dir,
        "vectordb backend starting"
    );

    let app_state = state::AppState::new(config)?;
    let app = server::create_app(app_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("vectordb backend listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("vectordb backend shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install secondary Ctrl+C handler");
    };

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, initiating shutdown"); },
        _ = terminate => { info!("received terminate signal, initiating shutdown"); },
    }
}
