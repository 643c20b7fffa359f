//! Cohort HTTP server backed by the in-memory store.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::HeaderName;
use cohort::kv::MemoryKvStore;
use cohort::{AssignmentService, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cohort=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("loading configuration")?;
    tracing::info!(?config, "configuration loaded");

    let identity_header = HeaderName::from_bytes(config.server.identity_header.as_bytes())
        .with_context(|| format!("invalid identity header {:?}", config.server.identity_header))?;

    let service = Arc::new(
        AssignmentService::builder(MemoryKvStore::new())
            .retry_policy(config.retry.clone())
            .build(),
    );
    let app = cohort::http::router(service, identity_header);

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("binding {}", config.server.addr))?;
    tracing::info!(addr = %config.server.addr, "starting server");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
