use std::sync::Arc;

use dotenv::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use microblog::{
    app,
    config::settings::Settings,
    store::{DynStore, MemoryStore, PgStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("microblog=info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let store: DynStore = match &settings.database_url {
        Some(url) => {
            let store = PgStore::connect(url, settings.database_max_connections).await?;
            info!("database connected");
            Arc::new(store)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let app_state = AppState::new(store, settings.clone());

    info!("Server running on http://localhost:{}", settings.port);

    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    axum::serve(listener, app(app_state)).await?;

    Ok(())
}
