//! Command-line interface for the referral event synchronizer.
//!
//! # Commands
//!
//! - `sync`: Mirror the next window of events, or catch up with `--auto`
//! - `watch`: Keep catching up on an interval until Ctrl-C
//! - `serve`: Start the HTTP API
//! - `status`: Print every sync cursor
//! - `member`: Print one member and its referral count
//!
//! # Example
//!
//! ```bash
//! referral-sync sync --event-type MemberAdded --auto --max-iterations 20
//! referral-sync serve --port 8080
//! ```

use crate::api::server::run_server;
use crate::app_state::AppState;
use crate::config::Config;
use crate::db::{create_pool, Repository};
use crate::error::{IndexerError, IndexerResult};
use crate::events::{normalize_address, EventSelection};
use crate::rpc::AlloyChainClient;
use crate::sync::{auto_sync, AutoSyncReport, MemberSyncer, SyncOutcome, SyncOutcomeStatus};
use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Referral event synchronizer
#[derive(Parser, Debug)]
#[command(name = "referral-sync")]
#[command(about = "Mirrors on-chain referral events into a local member store", long_about = None)]
#[command(version)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Sync the next block window (or until caught up with --auto)
    Sync {
        /// all, MemberAdded or UplineChanged
        #[arg(short, long, default_value = "all")]
        event_type: String,

        /// Repeat until every event type reaches the head
        #[arg(short, long)]
        auto: bool,

        /// Iteration budget for --auto
        #[arg(short, long, default_value = "10")]
        max_iterations: u32,
    },

    /// Catch up repeatedly on an interval until Ctrl-C
    Watch {
        /// Seconds between catch-up runs
        #[arg(short, long, default_value = "30")]
        interval: u64,

        /// Iteration budget per run
        #[arg(short, long, default_value = "10")]
        max_iterations: u32,
    },

    /// Start the HTTP API server
    Serve {
        /// Port to listen on (default: API_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print every sync cursor
    Status,

    /// Print a member and its referral count
    Member {
        /// Member address
        address: String,
    },
}

/// Parse CLI arguments and execute the appropriate command.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration loading fails
/// - The database or RPC connection fails
/// - A single-shot sync fails
pub async fn run() -> IndexerResult<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Sync {
            event_type,
            auto,
            max_iterations,
        } => run_sync_command(&config, &event_type, auto, max_iterations).await,
        Commands::Watch {
            interval,
            max_iterations,
        } => run_watch_command(&config, interval, max_iterations).await,
        Commands::Serve { port } => run_serve_command(&config, port).await,
        Commands::Status => run_status_command(&config).await,
        Commands::Member { address } => run_member_command(&config, &address).await,
    }
}

/// Wire the chain client and store from configuration.
async fn build_syncer(config: &Config) -> IndexerResult<MemberSyncer> {
    let pool = create_pool(config.database_url()).await?;
    let chain = AlloyChainClient::connect(config.rpc_url(), config.rpc_max_retries()).await?;
    info!(contract = %config.contract_address(), "Connected to chain");

    Ok(MemberSyncer::new(
        Arc::new(chain),
        Arc::new(Repository::new(pool)),
        config.contract_address(),
        config.sync_settings().clone(),
    ))
}

async fn run_sync_command(
    config: &Config,
    event_type: &str,
    auto: bool,
    max_iterations: u32,
) -> IndexerResult<()> {
    let selection = EventSelection::from_str(event_type)?;
    let syncer = build_syncer(config).await?;

    if auto {
        let report = auto_sync(&syncer, selection, max_iterations, config.auto_sync_pause()).await;
        print_report(&report);
        return Ok(());
    }

    for outcome in syncer.sync_selection(selection).await? {
        print_outcome(&outcome);
    }
    Ok(())
}

async fn run_watch_command(config: &Config, interval: u64, max_iterations: u32) -> IndexerResult<()> {
    let syncer = build_syncer(config).await?;
    println!(
        "{}",
        format!("Watching {} every {interval}s", syncer.contract_key())
            .cyan()
            .bold()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                println!("{}", "Shutdown complete".green().bold());
                return Ok(());
            }
            _ = ticker.tick() => {
                let report = auto_sync(
                    &syncer,
                    EventSelection::All,
                    max_iterations,
                    config.auto_sync_pause(),
                )
                .await;
                if !report.failed.is_empty() {
                    warn!(failed = ?report.failed, "Catch-up run had failures");
                }
                print_report(&report);
            }
        }
    }
}

async fn run_serve_command(config: &Config, port: Option<u16>) -> IndexerResult<()> {
    let syncer = build_syncer(config).await?;
    let state = AppState::new(syncer, config.auto_sync_pause());
    let port = port.unwrap_or_else(|| config.api_port());

    println!(
        "{} http://0.0.0.0:{port}/swagger-ui",
        "API docs:".cyan().bold()
    );
    run_server(state, port, config.rate_limit_rpm(), config.cors_origins()).await
}

async fn run_status_command(config: &Config) -> IndexerResult<()> {
    let repository = Repository::new(create_pool(config.database_url()).await?);
    let cursors = repository.list_cursors().await?;

    if cursors.is_empty() {
        println!("{}", "No sync cursors yet. Run `sync` first.".yellow());
        return Ok(());
    }

    for cursor in cursors {
        let status = match cursor.status.as_str() {
            "success" => cursor.status.green(),
            "error" => cursor.status.red(),
            _ => cursor.status.yellow(),
        };
        println!(
            "{:<14} {} block {} | window {} | synced {} | {}",
            cursor.event_type.bold(),
            cursor.contract_address.dimmed(),
            cursor.last_synced_block.to_string().yellow(),
            cursor.window_size,
            cursor.total_synced,
            status
        );
        if let Some(error) = cursor.last_error {
            println!("    {} {}", "last error:".red(), error);
        }
    }
    Ok(())
}

async fn run_member_command(config: &Config, address: &str) -> IndexerResult<()> {
    let parsed = Address::from_str(address.trim()).map_err(|e| {
        IndexerError::validation(format!("Invalid address '{address}': {e}"))
    })?;
    let key = normalize_address(&parsed);

    let repository = Repository::new(create_pool(config.database_url()).await?);
    let Some(member) = repository.get_member(&key).await? else {
        println!("{} {}", "Member not found:".yellow(), key);
        return Ok(());
    };
    let referrals = repository.count_referrals(&key).await?;

    let joined = chrono::DateTime::from_timestamp(member.time_joined, 0)
        .map_or_else(|| member.time_joined.to_string(), |t| t.to_rfc3339());

    println!("{} {}", "Member:".bold(), member.address.cyan());
    println!("{} {}", "Referrer:".bold(), member.referrer);
    println!("{} {}", "Joined:".bold(), joined);
    println!("{} {}", "Last event block:".bold(), member.last_event_block);
    println!("{} {}", "Direct referrals:".bold(), referrals.to_string().green());
    Ok(())
}

/// Display one sync-forward result with colored formatting.
fn print_outcome(outcome: &SyncOutcome) {
    let status = match outcome.status {
        SyncOutcomeStatus::Synced => outcome.status.to_string().green().bold(),
        SyncOutcomeStatus::AlreadyAtHead => outcome.status.to_string().blue().bold(),
        SyncOutcomeStatus::RangeLimited => outcome.status.to_string().yellow().bold(),
    };

    println!(
        "{:<14} {} | blocks {}..={} | events {} | records {} | cursor {}",
        outcome.event_type.to_string().bold(),
        status,
        outcome.from_block,
        outcome.to_block,
        outcome.events_found,
        outcome.records_synced.to_string().green(),
        outcome.last_synced_block.to_string().yellow()
    );
}

fn print_report(report: &AutoSyncReport) {
    for iteration in &report.iterations {
        println!("{}", format!("Iteration {}", iteration.iteration).dimmed());
        for step in &iteration.steps {
            match (&step.outcome, &step.error) {
                (Some(outcome), _) => print_outcome(outcome),
                (None, error) => println!(
                    "{:<14} {} {}",
                    step.event_type.to_string().bold(),
                    "failed".red().bold(),
                    error.as_deref().unwrap_or_default()
                ),
            }
        }
    }

    let summary = format!(
        "{} iterations, {} records synced, stopped: {}",
        report.iterations.len(),
        report.total_records_synced,
        report.stop_reason.as_str()
    );
    if report.completed {
        println!("{}", summary.green().bold());
    } else {
        println!("{}", summary.yellow().bold());
    }
}
