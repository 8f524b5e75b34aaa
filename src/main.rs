use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lut_grader::app;
use lut_grader::config::settings::AppConfig;
use lut_grader::infrastructure::asset_store::http::HttpAssetStore;
use lut_grader::infrastructure::db::pool::{connect_to_db, run_migrations};
use lut_grader::modules::lut::repository::{LutCatalog, MemoryLutCatalog, PgLutCatalog};
use lut_grader::state::AppState;
use lut_grader::workers::sweeper::{SweepPolicy, run_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("Missing required configuration")?;

    let catalog: Arc<dyn LutCatalog> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_to_db(url).await.context("Failed to connect to PostgreSQL")?;
            run_migrations(&pool).await.context("Failed to migrate LUT catalog")?;
            Arc::new(PgLutCatalog::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, LUT catalog lives in memory only");
            Arc::new(MemoryLutCatalog::new())
        }
    };

    for dir in [&config.lut_storage_dir, &config.work_dir] {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let assets = Arc::new(
        HttpAssetStore::new(&config.asset_api_url, &config.asset_api_token)
            .context("Invalid ASSET_API_URL")?,
    );
    let state = AppState::assemble(config.clone(), catalog, assets)?;

    if let Some(dir) = config.lut_import_dir.as_deref() {
        match state.registry.import_dir(dir).await {
            Ok(imported) => info!("✅ Imported {} LUT(s) from {}", imported.len(), dir.display()),
            Err(e) => warn!("LUT import from {} failed: {}", dir.display(), e),
        }
    }

    let sweeper_shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(run_sweeper(
        state.jobs.store(),
        config.work_dir.clone(),
        SweepPolicy {
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            job_retention: Duration::from_secs(config.job_retention_secs),
            temp_max_age: Duration::from_secs(config.temp_max_age_secs),
        },
        sweeper_shutdown.clone(),
    ));

    let app = app::create_app(state.clone());

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining in-flight jobs...");
    state.jobs.shutdown().await;
    sweeper_shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
