//! Robot gateway server.
//!
//! Run with: cargo run -p robot-gateway-server
//!
//! Configuration comes from `ROBOT_GATEWAY_*` environment variables; see
//! `config.rs`. The default is a simulated robot on http://127.0.0.1:5000.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method, header};
use robot_gateway_core::{IdentityProvider, OperationLogStore, RobotTransport};
use robot_gateway_driver::{SimulatedRobot, TcpRobotLink};
use robot_gateway_session::{
    Gateway,
    storage::{MemoryLogStore, SqliteLogStore},
};
use robot_gateway_transport::{AppState, DynGateway, router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogStoreKind, ServerConfig, TransportKind};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    if config.identity.is_empty() {
        tracing::warn!("ROBOT_GATEWAY_TOKENS is empty; every authenticated route will return 401");
    }

    let transport: Arc<dyn RobotTransport> = match config.transport {
        TransportKind::Sim => Arc::new(SimulatedRobot::with_test_pattern()),
        TransportKind::Tcp => Arc::new(TcpRobotLink::new(config.robot_port)),
    };
    let store: Arc<dyn OperationLogStore> = match &config.log_store {
        LogStoreKind::Memory => Arc::new(MemoryLogStore::new()),
        LogStoreKind::Sqlite(url) => Arc::new(
            SqliteLogStore::new(url)
                .await
                .with_context(|| format!("failed to open operation log at {url}"))?,
        ),
    };
    let identity: Arc<dyn IdentityProvider> = Arc::new(config.identity.clone());

    let gateway: DynGateway = Gateway::with_config(transport, store, config.gateway.clone());
    let app = router(AppState::new(gateway.clone(), identity)).layer(cors(config.cors_origin.as_deref())?);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(
        transport = ?config.transport,
        log_store = ?config.log_store,
        "Server listening on http://{}",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Leave the robot in a clean state.
    gateway.shutdown().await;
    tracing::info!("Server stopped");
    Ok(())
}

fn cors(origin: Option<&str>) -> Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("invalid ROBOT_GATEWAY_CORS_ORIGIN {origin:?}"))?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
