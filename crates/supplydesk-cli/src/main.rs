mod recovery;
mod report;
mod submissions;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use supplydesk_clients::{
    ClientSettings, HttpCatalogService, HttpExtractionService, HttpSupplierDirectory,
};
use supplydesk_core::AppConfig;
use supplydesk_pipeline::{PipelineContext, Services};
use tracing_subscriber::EnvFilter;

use crate::recovery::RecoveryCommands;
use crate::report::ReportCommands;
use crate::submissions::SubmissionCommands;

#[derive(Debug, Parser)]
#[command(name = "supplydesk-cli")]
#[command(about = "Operator tooling for the supplier-submission pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Inspect and drive failed-operation recovery
    Recovery {
        #[command(subcommand)]
        command: RecoveryCommands,
    },
    /// Run or re-run extraction for one submission
    Submissions {
        #[command(subcommand)]
        command: SubmissionCommands,
    },
    /// Print dashboard reports
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("no command given; see `supplydesk-cli --help`");
        return Ok(());
    };

    dotenvy::dotenv().ok();
    let config = supplydesk_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let pool_config = supplydesk_db::PoolConfig::from_app_config(&config);
    let pool = supplydesk_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Migrate => {
            let applied = supplydesk_db::run_migrations(&pool).await?;
            tracing::info!(applied, "migrations applied");
            println!("migrations up to date ({applied} newly applied)");
        }
        Commands::Recovery { command } => {
            let ctx = pipeline_context(pool, &config)?;
            recovery::run(&ctx, command).await?;
        }
        Commands::Submissions { command } => {
            let ctx = pipeline_context(pool, &config)?;
            submissions::run(&ctx, command).await?;
        }
        Commands::Report { command } => {
            let ctx = pipeline_context(pool, &config)?;
            report::run(&ctx, command).await?;
        }
    }

    Ok(())
}

fn pipeline_context(pool: sqlx::PgPool, config: &AppConfig) -> anyhow::Result<PipelineContext> {
    let policy = supplydesk_core::load_policy_or_default(&config.policy_path)?;
    let services = Services {
        extraction: Arc::new(HttpExtractionService::new(&ClientSettings::extraction(
            config,
        ))?),
        catalog: Arc::new(HttpCatalogService::new(&ClientSettings::catalog(config))?),
        directory: Arc::new(HttpSupplierDirectory::new(&ClientSettings::directory(
            config,
        ))?),
    };
    Ok(PipelineContext::new(
        pool,
        policy,
        services,
        Duration::from_secs(config.extraction_timeout_secs),
    ))
}

/// Formats an optional value for table display.
fn fmt_opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests;
