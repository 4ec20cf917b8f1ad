//! Demo server: loads the entity model from JSON and serves its CRUD routes.
//!
//! Run from repo root: `cargo run -p demo-server`
//! Settings come from the environment or `.env` (`DATABASE_URL`, `MODEL_PATH`, `BIND_ADDR`, ...).

use crud_query_sdk::{common_routes, entity_routes, load_from_path, AppState, PgExecutor, Settings};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crud_query_sdk=info,demo_server=info")),
        )
        .init();

    let model = Arc::new(load_from_path(&settings.model_path).await?);

    let mut connect: PgConnectOptions = settings.database_url.parse()?;
    if let Some(timeout) = settings.db_statement_timeout {
        connect = connect.options([("statement_timeout", timeout.as_millis().to_string())]);
    }
    let pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect_with(connect)
        .await?;

    let state = AppState::new(model, Arc::new(PgExecutor::new(pool)))?;
    let app = common_routes().merge(entity_routes(state));

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("demo server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
