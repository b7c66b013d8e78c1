use anyhow::Context;

use compta_api::app::{build_app, build_services};
use compta_infra::ComptaConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    compta_observability::init();

    let config = ComptaConfig::load().context("failed to load configuration")?;
    let services = build_services(&config)
        .await
        .context("failed to initialise storage")?;

    let app = build_app(services);

    let addr = format!("0.0.0.0:{}", config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
