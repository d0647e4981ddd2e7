use clap::Subcommand;
use supplydesk_pipeline::PipelineContext;

use crate::fmt_opt;

#[derive(Debug, Subcommand)]
pub enum ReportCommands {
    /// Submission and review funnel counts
    Stats,
    /// Active alerts, most severe first
    Alerts,
    /// Database and per-subsystem health
    Health,
    /// Suppliers ranked by approval rate
    Suppliers {
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Daily submissions and decisions
    Trends {
        #[arg(long, default_value = "7")]
        days: i32,
    },
}

pub(crate) async fn run(ctx: &PipelineContext, command: ReportCommands) -> anyhow::Result<()> {
    match command {
        ReportCommands::Stats => {
            let stats = supplydesk_pipeline::dashboard_stats(ctx).await;
            let s = &stats.submissions;
            println!(
                "submissions: {} total, {} pending, {} processing, {} completed, {} failed",
                s.total, s.pending, s.processing, s.completed, s.failed
            );
            let v = &stats.validation;
            println!(
                "validation:  {} pending, {} approved, {} rejected",
                v.pending, v.approved, v.rejected
            );
            let r = &stats.review_items;
            println!(
                "review:      {} pending, {} approved ({} auto), {} rejected",
                r.pending, r.approved, r.auto_approved, r.rejected
            );
            println!("approval rate: {:.1}%", stats.approval_rate * 100.0);
        }
        ReportCommands::Alerts => {
            let alerts = supplydesk_pipeline::system_alerts(ctx).await;
            if alerts.is_empty() {
                println!("no active alerts");
            }
            for alert in &alerts {
                println!("[{}] {}: {}", alert.severity, alert.code, alert.message);
            }
        }
        ReportCommands::Health => {
            let health = supplydesk_pipeline::system_health(ctx).await;
            println!("overall:  {}", health.status);
            println!("database: {}", health.database);
            for (name, subsystem) in &health.subsystems {
                println!(
                    "  {name:<12}{:<10}attempts={} failures={} permanent={}",
                    subsystem.status,
                    subsystem.attempts_24h,
                    subsystem.failures,
                    subsystem.permanently_failed
                );
            }
            println!("validation backlog: {}", health.validation_backlog);
        }
        ReportCommands::Suppliers { limit } => {
            let suppliers = supplydesk_pipeline::top_suppliers(ctx, limit).await?;
            println!(
                "{:<24}{:<28}{:<10}{:<10}{:<10}TIER",
                "SUPPLIER", "NAME", "PRODUCTS", "APPROVAL", "AVG CONF"
            );
            for s in &suppliers {
                println!(
                    "{:<24}{:<28}{:<10}{:<10}{:<10.1}{}",
                    s.supplier_id,
                    fmt_opt(s.supplier_name.as_deref()),
                    s.products_extracted,
                    format!("{:.0}%", s.approval_rate * 100.0),
                    s.average_confidence,
                    s.tier
                );
            }
        }
        ReportCommands::Trends { days } => {
            let points = supplydesk_pipeline::validation_trends(ctx, days).await?;
            println!("{:<12}{:<13}{:<10}{:<10}AVG CONF", "DATE", "SUBMISSIONS", "APPROVED", "REJECTED");
            for p in &points {
                println!(
                    "{:<12}{:<13}{:<10}{:<10}{}",
                    p.date,
                    p.submissions,
                    p.approved,
                    p.rejected,
                    fmt_opt(p.average_confidence.map(|c| format!("{c:.1}")))
                );
            }
        }
    }
    Ok(())
}
