use anyhow::Context;

use pescaderia_api::app;
use pescaderia_infra::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pescaderia_observability::init();

    let config = Config::from_env().context("invalid configuration")?;
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let services = app::build_services(&config)
        .await
        .context("failed to initialise storage")?;
    let app = app::build_app_with(services, &config.cors_origins);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
