//! Hazard calculation setup (hzrd-calc) - Main entry point
//!
//! Bootstraps a calculation from a TOML job file, reports its progress, and
//! records finished work batches on behalf of workers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hzrd_calc::db::calculations::{get_calculation, get_job_stats};
use hzrd_calc::db::realizations::{get_realization, list_realizations};
use hzrd_calc::{progress_totals, report_progress, setup_calculation};
use hzrd_common::config::{resolve_database_path, CalculationConfig};
use hzrd_common::db::{init_database, JobStats, ProgressTotals, Realization};

/// Command-line arguments for hzrd-calc
#[derive(Parser, Debug)]
#[command(name = "hzrd-calc")]
#[command(about = "Logic tree realization setup and progress tracking")]
#[command(version)]
struct Args {
    /// Database file (overrides HZRD_DATABASE and the user config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a calculation from a job file and initialize its realizations
    Init {
        /// TOML job file
        #[arg(short, long)]
        job: PathBuf,
    },
    /// Show progress of a calculation
    Progress {
        #[arg(short, long)]
        calculation: i64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a finished batch of work units for a realization
    Complete {
        #[arg(short, long)]
        realization: i64,

        #[arg(short, long, default_value = "1")]
        items: i64,

        /// Give up after this long on a locked database
        /// (defaults to the calculation's engine.max_lock_wait_ms)
        #[arg(long, env = "HZRD_MAX_LOCK_WAIT_MS")]
        max_lock_wait_ms: Option<u64>,
    },
}

#[derive(Debug, Serialize)]
struct ProgressReport {
    calculation_id: i64,
    description: String,
    totals: ProgressTotals,
    percentage: f64,
    job_stats: Option<JobStats>,
    realizations: Vec<Realization>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hzrd_calc=info,hzrd_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let db_path = resolve_database_path(args.database.as_deref());
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    match args.command {
        Command::Init { job } => run_init(&pool, &job).await,
        Command::Progress { calculation, json } => run_progress(&pool, calculation, json).await,
        Command::Complete {
            realization,
            items,
            max_lock_wait_ms,
        } => run_complete(&pool, realization, items, max_lock_wait_ms).await,
    }
}

async fn run_init(pool: &SqlitePool, job: &Path) -> Result<()> {
    let config = CalculationConfig::load(job)
        .with_context(|| format!("Failed to load job file {}", job.display()))?;

    let setup = setup_calculation(pool, &config, Vec::new())
        .await
        .context("Failed to set up calculation")?;

    println!(
        "Calculation {} ({}): {} realizations, {} tasks",
        setup.calculation.id,
        setup.calculation.guid,
        setup.realizations.len(),
        setup.stats.num_tasks
    );

    Ok(())
}

async fn run_progress(pool: &SqlitePool, calculation_id: i64, json: bool) -> Result<()> {
    let calculation = get_calculation(pool, calculation_id)
        .await
        .context("Failed to load calculation")?;
    let totals = progress_totals(pool, calculation_id).await?;
    let job_stats = get_job_stats(pool, calculation_id).await?;
    let realizations = list_realizations(pool, calculation_id).await?;

    let report = ProgressReport {
        calculation_id,
        description: calculation.description,
        percentage: totals.percentage(),
        totals,
        job_stats,
        realizations,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "Calculation {} '{}': {}/{} realizations complete, {}/{} items ({:.1}%)",
        report.calculation_id,
        report.description,
        report.totals.complete_realizations,
        report.totals.realizations,
        report.totals.completed_items,
        report.totals.total_items,
        report.percentage
    );
    for rlz in &report.realizations {
        let total = rlz
            .total_items()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  #{:<4} id={:<6} {}/{}{}",
            rlz.ordinal,
            rlz.id,
            rlz.completed_items,
            total,
            if rlz.is_complete { "  complete" } else { "" }
        );
    }

    Ok(())
}

async fn run_complete(
    pool: &SqlitePool,
    realization_id: i64,
    items: i64,
    max_wait_ms: Option<u64>,
) -> Result<()> {
    report_progress(pool, realization_id, items, max_wait_ms)
        .await
        .with_context(|| format!("Failed to record progress for realization {}", realization_id))?;

    let realization = get_realization(pool, realization_id).await?;
    println!(
        "Realization {}: {}/{}",
        realization.id,
        realization.completed_items,
        realization
            .total_items()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string())
    );

    Ok(())
}
