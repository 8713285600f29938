mod browser;
mod cnfg;
mod error;
mod gateway;
mod html2pdf;
mod launcher;
mod options;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::http::Method;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use gateway::Gateway;
use html2pdf::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = cnfg::load_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pdf_render_gateway=info,tower_http=info")),
        )
        .init();

    let launcher = launcher::from_config(&config);
    tracing::info!(
        runtime = ?config.runtime,
        launcher = launcher.name(),
        default_margin = %config.defaults.margin,
        scale = config.defaults.scale,
        "Browser launch strategy selected"
    );

    let gateway = Gateway::new(launcher, config.defaults.clone(), config.render_timeout);
    let app_state = AppState {
        gateway: Arc::new(gateway),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    let app = html2pdf::router(app_state, config.max_body_bytes)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
