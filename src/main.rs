//! Live-support chat server
//!
//! (c) Softlandia 2025

use support_chat::api;
use support_chat::core::config::ChatConfig;
use support_chat::core::services::ChannelSessionService;
use support_chat::infrastructure::database::{ChangeFeed, DatabaseConnection};
use support_chat::infrastructure::repositories::DbChatChannel;

use anyhow::anyhow;
use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method};
use di::{Injectable, ServiceCollection};
use di_axum::RouterServiceProviderExtensions;
use log::info;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(web_server_task())
}

fn allowed_origins() -> anyhow::Result<Vec<HeaderValue>> {
    let origins = std::env::var("CORS_ORIGINS")
        .unwrap_or("http://localhost:3000,http://localhost:5173".to_owned());
    origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| origin.parse::<HeaderValue>().map_err(anyhow::Error::from))
        .collect()
}

async fn web_server_task() -> anyhow::Result<()> {
    let provider = ServiceCollection::new()
        .add(ChatConfig::singleton())
        .add(DatabaseConnection::singleton())
        .add(ChangeFeed::singleton())
        .add(DbChatChannel::scoped())
        .add(ChannelSessionService::scoped())
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;

    provider
        .get_required::<DatabaseConnection>()
        .migrate()
        .await?;

    let app = Router::new()
        .nest("/sessions", api::sessions::router())
        .layer(
            ServiceBuilder::new().layer(
                CorsLayer::new()
                    .allow_headers([
                        HeaderName::from_static("content-type"),
                        HeaderName::from_static("x-viewer-role"),
                    ])
                    .allow_methods([Method::GET, Method::POST])
                    .allow_origin(allowed_origins()?)
                    .expose_headers(Any),
            ),
        )
        .with_provider(provider);

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or("0.0.0.0:3000".to_owned());
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    info!("Shutting down...");
    Ok(())
}
