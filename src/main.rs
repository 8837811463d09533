// src/main.rs
use std::net::SocketAddr;
use std::time::Duration;

use axum_server::Handle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use voting_backend::config::Config;
use voting_backend::routes;
use voting_backend::state::{AppState, StartupError};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::load()?;
    let state = AppState::from_config(&config).await?;
    let app = routes::create_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    info!("listening on {addr}");
    axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_on_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
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
                error!("failed to listen for SIGTERM: {e}");
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

    info!("shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
