use anyhow::Result;
use climate_logger::clock::SystemClock;
use climate_logger::config::Config;
use climate_logger::http;
use climate_logger::store::{self, CsvLog};
use std::sync::Arc;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,climate_logger=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing()?;

    let log = store::spawn_log_thread(CsvLog::new(
        config.log_path.clone(),
        config.sync_each_append,
    ))?;
    log.ensure_initialized().await?;

    let state = http::HttpState {
        log,
        clock: Arc::new(SystemClock::new()),
        demo_when_empty: config.demo_when_empty,
        demo_seed: config.demo_seed,
        display_offset: config.display_offset(),
    };
    let app = http::router(state, config.cors_permissive);

    let listener = tokio::net::TcpListener::bind(&config.http_bind).await?;
    tracing::info!(
        bind = %config.http_bind,
        log_path = %config.log_path.display(),
        "climate-logger HTTP listening"
    );
    let http_handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "http server exited");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        _ = http_handle => {}
    }

    Ok(())
}
