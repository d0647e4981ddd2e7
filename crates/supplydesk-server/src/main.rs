mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use supplydesk_clients::{
    ClientSettings, HttpCatalogService, HttpExtractionService, HttpSupplierDirectory,
};
use supplydesk_pipeline::{PipelineContext, Services};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::{AuthState, RateLimitState, WebhookAuth},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = supplydesk_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = supplydesk_db::PoolConfig::from_app_config(&config);
    let pool = supplydesk_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = supplydesk_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database migrations up to date");

    let policy = supplydesk_core::load_policy_or_default(&config.policy_path)?;
    let services = Services {
        extraction: Arc::new(HttpExtractionService::new(&ClientSettings::extraction(
            &config,
        ))?),
        catalog: Arc::new(HttpCatalogService::new(&ClientSettings::catalog(&config))?),
        directory: Arc::new(HttpSupplierDirectory::new(&ClientSettings::directory(
            &config,
        ))?),
    };
    let ctx = PipelineContext::new(
        pool,
        policy,
        services,
        Duration::from_secs(config.extraction_timeout_secs),
    );

    let (queue, receiver) = supplydesk_pipeline::extraction_queue(config.extraction_queue_capacity);
    let consumer = supplydesk_pipeline::spawn_extraction_consumer(ctx.clone(), receiver);
    let mut scheduler = scheduler::build_scheduler(ctx.clone(), queue.clone(), &config).await?;

    let auth = AuthState::from_keys(&config.api_keys, config.is_development())?;
    let webhook = WebhookAuth::from_token(
        config.webhook_verify_token.as_deref(),
        config.is_development(),
    )?;
    let rate_limit = RateLimitState::per_minute(config.rate_limit_per_minute);
    let app = build_app(
        AppState {
            pipeline: ctx,
            queue,
        },
        auth,
        webhook,
        rate_limit,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "supplydesk server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    // Anything still in flight is failed by the stale sweep on next start.
    consumer.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
