mod config;
mod entitlement;
mod error;
mod logging;
mod payments;
mod server;
mod subscription;
mod users;

use tracing_subscriber::EnvFilter;

use crate::logging::time::CairoTimer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 提供 LD_JWT_SECRET 等机密配置
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_timer(CairoTimer)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::Settings::load()?;

    // Use configured host/port to bind the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = server::create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Lawdesk server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
