mod config;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use pinboard_api::AppStateInner;
use pinboard_db::Store;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pinboard=debug,pinboard_api=debug,pinboard_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_placeholder_secret() {
        warn!("PINBOARD_JWT_SECRET is unset or a placeholder; tokens are forgeable");
    }

    let store = Arc::new(Store::open(&config.data_dir)?);
    let state = AppStateInner::new(store, &config.auth)?;

    let app = pinboard_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Pinboard server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
