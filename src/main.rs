use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{Context, Result};

mod config;
mod error;
mod handlers;
mod recovery;
mod repair;
mod roadmap;
mod upstream;

use config::Config;
use error::ApiError;
use handlers::AppState;
use upstream::OpenRouterClient;

fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = Config::from_env().context("failed to load configuration")?;
    let client = OpenRouterClient::new(&config).context("failed to build HTTP client")?;
    let bind_addr = config.bind_addr();

    tracing::info!(
        model = %config.model,
        upstream = %config.api_url,
        timeout_secs = config.upstream_timeout.as_secs(),
        "configuration loaded"
    );

    let state = web::Data::new(AppState {
        config,
        client: Arc::new(client),
    });

    tracing::info!("server running on http://{}:{}", bind_addr.0, bind_addr.1);

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .app_data(handlers::json_config(ApiError::InvalidBody))
            .configure(handlers::configure)
    })
    .bind(bind_addr.clone())
    .with_context(|| format!("failed to bind {}:{}", bind_addr.0, bind_addr.1))?
    .run()
    .await
    .context("server exited with an error")
}
