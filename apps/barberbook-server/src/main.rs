#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod config;
mod logging;
mod pages;
mod signals;

use anyhow::{Context, Result};
use axum::{middleware, Router};
use clap::{Parser, Subcommand};
use gate_auth::{
    axum_ext::{route_gate, GateState},
    DirectoryLookups, GateMetrics, LoggingMetrics, NoOpMetrics, RoutePolicyEngine,
    SessionResolver,
};
use gate_directory::{HostedAuthService, HostedDirectory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;

/// Barberbook Server - booking site with role-gated routes
#[derive(Parser)]
#[command(name = "barberbook-server")]
#[command(about = "Barberbook Server - booking site with role-gated routes")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate the route table and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config {
        if !Path::new(path).is_file() {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
    }

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (BARBERBOOK__*) -> 4) CLI overrides
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.port);

    logging::init_logging(&config.logging, cli.verbose);

    if cli.print_config {
        println!("Effective configuration:\n{}", config.to_pretty()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    let table = config
        .gate
        .build_rule_table()
        .context("route table is invalid")?;
    config.directory.base_url()?;

    println!("Configuration is valid ({} rules)", table.len());
    for (index, rule) in table.rules().iter().enumerate() {
        println!("  #{index} {rule} -> {}", rule.redirect_to);
    }
    for shadowed in table.shadowed_rules() {
        println!(
            "  warning: rule #{} is shadowed by rule #{}",
            shadowed.index, shadowed.shadowed_by
        );
    }
    Ok(())
}

/// Wire the hosted backend clients, the policy engine and the pages together
fn build_app(config: &AppConfig) -> Result<Router> {
    let table = config
        .gate
        .build_rule_table()
        .context("refusing to start with an invalid route table")?;

    let metrics: Arc<dyn GateMetrics> = if config.logging.gate_metrics {
        Arc::new(LoggingMetrics)
    } else {
        Arc::new(NoOpMetrics)
    };

    let auth = Arc::new(HostedAuthService::new(&config.directory)?);
    let directory = Arc::new(HostedDirectory::new(&config.directory)?);

    let resolver = SessionResolver::new(auth).with_metrics(metrics.clone());
    let engine = RoutePolicyEngine::new(table, DirectoryLookups::from_store(directory))
        .with_lookup_retries(config.gate.lookup_retries)
        .with_metrics(metrics.clone());
    let state = GateState::new(resolver, engine).with_metrics(metrics);

    Ok(pages::routes()
        .layer(middleware::from_fn_with_state(state, route_gate))
        .layer(TraceLayer::new_for_http()))
}

async fn run_server(config: AppConfig) -> Result<()> {
    let app = build_app(&config)?;

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    tracing::info!(addr = %config.server.bind_addr, "Barberbook Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(signals::shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Barberbook Server stopped");
    Ok(())
}
