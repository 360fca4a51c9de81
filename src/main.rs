use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod aggregate;
mod compare;
mod config;
mod db;
mod engine;
mod error;
mod fetch;
mod models;
mod pests;
mod ranking;
mod report;
mod routing;
mod sources;
#[cfg(test)]
mod testing;
mod trend;
mod utilization;

use crate::config::EngineArgs;
use crate::engine::AnalyticsEngine;
use crate::models::{Analysis, DateWindow, Technician};
use crate::report::{describe_diagnostics, format_amount, technician_names, utilization_label};
use crate::routing::UniformDistance;

#[derive(Parser)]
#[command(name = "pest-route-analytics")]
#[command(about = "Technician performance and routing analytics for pest-control operations", long_about = None)]
struct Cli {
    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true, default_value_t = 5)]
    max_connections: u32,
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct WindowArgs {
    /// First day of the period (defaults to 30 days before --end)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day of the period (defaults to today)
    #[arg(long)]
    end: Option<NaiveDate>,
}

impl WindowArgs {
    fn range(&self) -> (NaiveDate, NaiveDate) {
        let end = self.end.unwrap_or_else(|| Utc::now().date_naive());
        let start = self.start.unwrap_or(end - Duration::days(30));
        (start, end)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import case records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rank technicians by revenue
    Performance {
        #[command(flatten)]
        window: WindowArgs,
        /// Restrict the cohort to these technicians
        #[arg(long = "technician")]
        technicians: Vec<Uuid>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Monthly revenue per technician
    Trend {
        #[arg(long, default_value_t = 6)]
        months_back: u32,
    },
    /// Pest-type specialization
    Pests {
        #[command(flatten)]
        window: WindowArgs,
        /// List the technicians who handled this pest type
        #[arg(long)]
        pest: Option<String>,
    },
    /// Scheduled hours against available hours
    Utilization {
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Route optimization scores for one day
    Routes {
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Compare one technician with the cohort average
    Compare {
        #[arg(long)]
        technician: Uuid,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_notes<T>(analysis: &Analysis<T>) {
    for note in describe_diagnostics(&analysis.diagnostics) {
        println!("! {note}");
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.engine.into_config().context("invalid engine settings")?;
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let store = Arc::new(db::PgStore::new(pool.clone()));
    let engine = AnalyticsEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Box::new(UniformDistance::new(&config.distance)),
        &config,
    );
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} case records from {}.", csv.display());
        }
        Commands::Performance {
            window,
            technicians,
            limit,
        } => {
            let (start, end) = window.range();
            let only = (!technicians.is_empty()).then_some(technicians.as_slice());
            let analysis = engine.cohort_performance(only, start, end, &cancel).await?;
            if cli.json {
                return print_json(&analysis);
            }

            let roster = load_roster(&engine).await?;
            let names = technician_names(&roster);
            print_notes(&analysis);
            println!("Top technicians by revenue ({start} to {end}):");
            for snapshot in analysis.data.iter().take(limit) {
                println!(
                    "{:>3}. {} {} across {} cases (avg {})",
                    snapshot.rank.unwrap_or_default(),
                    names.get(&snapshot.technician_id).copied().unwrap_or("?"),
                    format_amount(snapshot.total_revenue),
                    snapshot.total_cases,
                    format_amount(snapshot.avg_case_value)
                );
            }
        }
        Commands::Trend { months_back } => {
            let analysis = engine.monthly_trend(months_back, Utc::now(), &cancel).await?;
            if cli.json {
                return print_json(&analysis);
            }

            let roster = load_roster(&engine).await?;
            let names = technician_names(&roster);
            print_notes(&analysis);
            if analysis.data.is_empty() {
                println!("No completed cases in the last {months_back} months.");
            }
            for point in &analysis.data {
                println!(
                    "{} {}: {} across {} cases",
                    point.month,
                    names.get(&point.technician_id).copied().unwrap_or("?"),
                    format_amount(point.total_revenue),
                    point.total_cases
                );
            }
        }
        Commands::Pests { window, pest } => {
            let (start, end) = window.range();
            let analysis = engine.pest_specialization(start, end, &cancel).await?;
            if cli.json {
                return print_json(&analysis);
            }

            let roster = load_roster(&engine).await?;
            let names = technician_names(&roster);
            print_notes(&analysis);
            if let Some(pest) = pest {
                let found = pests::specialists(&analysis.data.specializations, &pest);
                println!("{} technician(s) handled {pest}:", found.len());
                for id in found {
                    println!("- {}", names.get(&id).copied().unwrap_or("?"));
                }
            } else {
                for row in &analysis.data.overview {
                    println!(
                        "- {}: {} cases, {} revenue (avg {}), {} technicians",
                        row.pest_type,
                        row.case_count,
                        format_amount(row.total_revenue),
                        format_amount(row.avg_case_value),
                        row.technician_count
                    );
                }
            }
        }
        Commands::Utilization { window } => {
            let (start, end) = window.range();
            let analysis = engine.utilization(start, end, &cancel).await?;
            if cli.json {
                return print_json(&analysis);
            }

            let roster = load_roster(&engine).await?;
            let names = technician_names(&roster);
            print_notes(&analysis);
            for record in &analysis.data {
                println!(
                    "- {}: {:.1}% ({}), {:.1} h scheduled of {:.1} h available",
                    names.get(&record.technician_id).copied().unwrap_or("?"),
                    record.utilization_percent,
                    utilization_label(record),
                    record.scheduled_hours,
                    record.total_work_hours
                );
            }
        }
        Commands::Routes { date } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let analysis = engine.route_optimization(date, &cancel).await?;
            if cli.json {
                return print_json(&analysis);
            }

            let roster = load_roster(&engine).await?;
            let names = technician_names(&roster);
            print_notes(&analysis);
            if analysis.data.is_empty() {
                println!("No completed cases on {date}.");
            }
            for route in &analysis.data {
                println!(
                    "- {}: score {} ({}), {:.1} km, {:.1} km per case [{}]",
                    names.get(&route.technician_id).copied().unwrap_or("?"),
                    route.optimization_score,
                    route.route_efficiency.as_str(),
                    route.total_distance_km,
                    route.avg_distance_per_case_km,
                    route.data_source.as_str()
                );
            }
        }
        Commands::Compare { technician, window } => {
            let (start, end) = window.range();
            let analysis = engine
                .technician_comparison(technician, start, end, &cancel)
                .await?;
            if cli.json {
                return print_json(&analysis);
            }

            let comparison = &analysis.data;
            print_notes(&analysis);
            println!("Against the cohort average ({start} to {end}):");
            println!("- revenue {:+.1}%", comparison.revenue_delta_pct);
            println!("- cases {:+.1}%", comparison.cases_delta_pct);
            println!("- avg case value {:+.1}%", comparison.avg_case_value_delta_pct);
            for recommendation in &comparison.recommendations {
                println!("* {recommendation}");
            }
        }
        Commands::Report { window, out } => {
            let (start, end) = window.range();
            let period = DateWindow::new(start, end)?;
            let ranking = engine.cohort_performance(None, start, end, &cancel).await?;
            let utilization = engine.utilization(start, end, &cancel).await?;
            let pest_report = engine.pest_specialization(start, end, &cancel).await?;
            let routes = engine.route_optimization(end, &cancel).await?;
            let roster = load_roster(&engine).await?;

            let report = report::build_report(&report::ReportInput {
                window: period,
                roster: &roster,
                ranking: &ranking.data,
                utilization: &utilization.data,
                pests: &pest_report.data.overview,
                routes: &routes.data,
                diagnostics: &[
                    &ranking.diagnostics,
                    &utilization.diagnostics,
                    &pest_report.diagnostics,
                    &routes.diagnostics,
                ],
            });
            std::fs::write(&out, report)
                .with_context(|| format!("writing {}", out.display()))?;
            info!(path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

async fn load_roster(engine: &AnalyticsEngine) -> anyhow::Result<Vec<Technician>> {
    Ok(engine.active_cohort(None).await?)
}
