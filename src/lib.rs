//! Coupon distribution backend.
//!
//! `GET /coupons` lists unclaimed coupons and `POST /claim` hands out one
//! coupon per requester. Repeat claims are refused when the browser still
//! carries the `couponClaimed` cookie, or when the requester's address
//! already owns a coupon. Allocation itself is a single atomic update in
//! the store.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;

use config::Config;
use routes::{claim_handler, coupons_handler, root_handler};
use state::AppState;
use store::PgCouponStore;

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/coupons", get(coupons_handler))
        .route("/claim", post(claim_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let Some(origin) = config.cors_origin.as_deref() else {
        return Ok(CorsLayer::permissive());
    };

    let origin = HeaderValue::from_str(origin)
        .map_err(|e| anyhow::anyhow!("Invalid cors_origin {origin:?}: {e}"))?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = PgCouponStore::connect(&config.database).await?;
    if config.bootstrap_schema {
        store.ensure_schema().await?;
        info!("Coupons table ready");
    }

    let state = AppState::new(Arc::new(store), &config);
    let app = build_router(state, cors_layer(&config)?);
    info!("Claim policy: {}", config.claim_policy);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Coupon backend listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {e}");
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
}
