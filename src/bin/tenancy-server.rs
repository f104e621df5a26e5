//! Tenancy server: registers tenants and customers against the backend at `DATABASE_URL`.

use axum::Router;
use tenancy_sdk::{common_routes_with_ready, tenancy_routes, AppState, TenancyConfig, TenancyService};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tenancy_sdk=info,tenancy_server=info")),
        )
        .init();

    let config = TenancyConfig::from_env()?;
    let state = AppState::new(TenancyService::postgres(&config));

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(tenancy_routes(state));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
