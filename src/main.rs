use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use sweet_delights_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let store = match cfg.store_backend.to_ascii_lowercase().as_str() {
        "memory" => {
            warn!("Using in-memory document store; data is lost on restart");
            api::store::Store::in_memory()
        }
        _ => {
            let sql = api::store::SqlStore::connect(&cfg.database_url)
                .await
                .context("failed to connect to the document store")?;
            api::store::Store::new(Arc::new(sql))
        }
    };

    let notifier = api::notifications::NotificationDispatcher::from_config(&cfg, store.clone())
        .context("failed to build notification channels")?;

    if api::services::payment_gateway::PaymentGateway::from_config(&cfg.payment).is_err() {
        warn!("Payment gateway credentials incomplete; payment endpoints will answer 500");
    }

    let host: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address {}", cfg.host))?;
    let addr = SocketAddr::new(host, cfg.port);

    let state = api::AppState::new(cfg, store, notifier);
    let app = api::app_router(state);

    info!("sweet-delights-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
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
                warn!("failed to install SIGTERM handler: {}", e);
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
    info!("Shutdown signal received");
}
