use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley_server::auth::AuthManager;
use parley_server::config::Config;
use parley_server::context::AppContext;
use parley_server::routes;
use parley_server::store::postgres::{create_pool, PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.rust_log.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = create_pool(&config).await?;
    sqlx::migrate!().run(&pool).await?;
    tracing::info!("Connected to database");

    let store = Arc::new(PgStore::new(pool));
    let auth = Arc::new(AuthManager::new(&config)?);
    let bind_addr = format!("{}:{}", config.host, config.port);
    let ctx = Arc::new(AppContext::new(store, auth, Arc::new(config)));

    let app = routes::create_router(ctx);
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "parley server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
