use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use consulting_analysis::{
    analysis::cancellation,
    config::{Config, LogFormat, LoggingConfig, SimulationConfig},
    langbase::{LangbaseClient, LangbaseReasoner},
    server::{AppState, McpServer},
    simulation::SimulationEngine,
    storage::{Assumption, SqliteStorage},
};

#[derive(Parser, Debug)]
#[command(name = "consulting-analysis", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP over stdin/stdout (default)
    Serve,
    /// Run a simulation over assumptions from a JSON file and print the result
    Simulate {
        /// JSON array of assumptions
        #[arg(long)]
        file: PathBuf,
        /// Number of trials
        #[arg(long)]
        iterations: Option<usize>,
        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// One entry of the `simulate --file` input.
#[derive(Debug, Deserialize)]
struct AssumptionInput {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    description: String,
    min_value: f64,
    max_value: f64,
    #[serde(default = "default_distribution")]
    distribution: String,
    impact_area: String,
}

fn default_distribution() -> String {
    "uniform".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Simulate {
            file,
            iterations,
            seed,
        } => simulate(file, iterations, seed),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Consulting analysis server starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let client = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    let reasoner = LangbaseReasoner::new(client, config.pipes.clone());
    info!("Ensuring required Langbase pipes exist...");
    if let Err(e) = reasoner.ensure_pipes().await {
        error!(error = %e, "Failed to ensure pipes exist");
        return Err(e.into());
    }

    let (shutdown, shutdown_token) = cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling running analyses");
            shutdown.cancel();
        }
    });

    let state = Arc::new(AppState::new(
        config,
        storage,
        Arc::new(reasoner),
        shutdown_token,
    ));
    let server = McpServer::new(state);

    info!("Server ready, waiting for requests on stdin...");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

fn simulate(file: PathBuf, iterations: Option<usize>, seed: Option<u64>) -> anyhow::Result<()> {
    init_logging(&LoggingConfig::from_env());
    let config = SimulationConfig::from_env()?;

    let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let inputs: Vec<AssumptionInput> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of assumptions", file.display()))?;

    let assumptions: Vec<Assumption> = inputs
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            let mut assumption = Assumption::new(
                "cli",
                input.description,
                input.min_value,
                input.max_value,
                input.distribution,
                input.impact_area,
            );
            assumption.id = input.id.unwrap_or_else(|| format!("assumption-{}", index + 1));
            assumption
        })
        .collect();

    let engine = match seed.or(config.seed) {
        Some(seed) => SimulationEngine::seeded(seed),
        None => SimulationEngine::new(&config),
    };
    let iterations = iterations.unwrap_or(config.default_iterations);

    info!(
        file = %file.display(),
        assumptions = assumptions.len(),
        iterations,
        "Running simulation"
    );

    let result = engine.run(&assumptions, iterations)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Initialize tracing/logging. Output goes to stderr; stdout carries JSON-RPC.
fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
