use axum::routing::get;
use axum::Router;
use socketioxide::extract::SocketRef;
use socketioxide::SocketIo;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use messenger_service::config::AppConfig;
use messenger_service::engine::DialogEngine;
use messenger_service::routes::{health, images};
use messenger_service::socket::{handlers, Gateway};
use messenger_service::store::PgStore;
use messenger_service::transport::Transport;
use messenger_service::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    messenger_shared::middleware::init_tracing("messenger-service");

    let config = AppConfig::load()?;
    let port = config.port;

    let pool = messenger_shared::clients::db::create_pool(&config.database_url, config.db_pool_size)?;
    let store = Arc::new(PgStore::new(pool));

    let metrics_handle = messenger_shared::middleware::init_metrics()?;

    // The engine emits through the same io handle the layer serves.
    let (sio_layer, io) = SocketIo::builder()
        .max_payload(config.max_payload)
        .build_layer();
    let transport: Arc<dyn Transport> = Arc::new(io.clone());
    let gateway = Gateway::new(DialogEngine::new(store.clone(), transport));

    let state = Arc::new(AppState {
        config,
        store,
        gateway,
        metrics_handle,
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                handlers::on_connect_with_state(socket, state).await;
            }
        }
    });

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/v1/messenger/image/:id", get(images::get_image))
        .layer(sio_layer)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .layer(axum::middleware::from_fn_with_state(
            "messenger-service",
            messenger_shared::middleware::metrics_middleware,
        ))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "messenger-service starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("messenger-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    ctrl_c.await.ok();
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received Ctrl+C, shutting down");
    }
}
