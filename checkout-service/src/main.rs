use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;

use checkout_service::app::{build_router, AppState};
use checkout_service::gateway::HttpGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = PgPoolOptions::new()
        .max_connections(
            env::var("DB_MAX_CONNECTIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(10),
        )
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;

    let gateway_base_url = env::var("GATEWAY_BASE_URL")
        .unwrap_or_else(|_| "https://api.razorpay.com".to_string());
    let key_id = env::var("GATEWAY_KEY_ID").context("GATEWAY_KEY_ID must be set")?;
    let key_secret = env::var("GATEWAY_KEY_SECRET").context("GATEWAY_KEY_SECRET must be set")?;
    let webhook_secret =
        env::var("GATEWAY_WEBHOOK_SECRET").context("GATEWAY_WEBHOOK_SECRET must be set")?;

    let gateway = HttpGateway::new(
        gateway_base_url,
        key_id,
        key_secret.clone(),
        Duration::from_secs(10),
    )?;

    let state = AppState {
        db,
        gateway: Arc::new(gateway),
        key_secret,
        webhook_secret,
    };
    let app = build_router(state);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(8086);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting checkout-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
