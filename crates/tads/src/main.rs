use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tads::agents::RunOptions;
use tads::models::config::TadsConfig;
use tads::models::position::resolve_symbol;
use tads::models::{DecisionRecord, Direction, Language, Position};
use tads::risk::RiskAggregator;
use tads::{BatchRunner, TadsError};
use tracing_subscriber::EnvFilter;

/// Exit status for a degraded or unassessable decision.
const EXIT_DEGRADED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "tads", about = "Trading Adversarial Deliberation System")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tads.toml", global = true)]
    config: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deliberate on one symbol and print its decision record
    Analyze {
        symbol: String,
        /// Output language (en, de)
        #[arg(long)]
        lang: Option<Language>,
        /// Skip the directional judge and use this direction
        #[arg(long)]
        direction: Option<Direction>,
        /// Authoritative USD price
        #[arg(long)]
        price: Option<f64>,
    },
    /// Analyse 2 to 4 symbols side by side
    Compare {
        #[arg(required = true, num_args = 2..=4)]
        symbols: Vec<String>,
        #[arg(long)]
        lang: Option<Language>,
    },
    /// Manage and assess stored positions
    Portfolio {
        #[arg(long, default_value = "default", global = true)]
        owner: String,
        #[command(subcommand)]
        action: PortfolioCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PortfolioCommand {
    /// Add or replace positions, e.g. SILVER-LONG-956-4.16-78--15.5
    Add {
        #[arg(required = true)]
        positions: Vec<String>,
    },
    Show,
    Remove { symbol: String },
    Clear,
    /// Deliberate on every held symbol and print the risk report
    Assess {
        #[arg(long)]
        lang: Option<Language>,
    },
}

#[derive(Serialize)]
struct CompareEntry<'a> {
    symbol: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'a DecisionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

fn init_tracing(json: bool) {
    // Respects RUST_LOG
    let filter = EnvFilter::from_default_env();
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(path: &str) -> Result<TadsConfig> {
    let config_str =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config: {path}"))?;
    toml::from_str(&config_str).with_context(|| "Failed to parse config")
}

fn cancel_on_ctrl_c(runner: &BatchRunner) {
    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal; no further runs will launch");
        cancel.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli.config)?;
    let as_of = chrono::Utc::now().date_naive();
    let default_language = config.pipeline.default_language;

    match cli.command {
        Command::Analyze {
            symbol,
            lang,
            direction,
            price,
        } => {
            let orchestrator =
                tads::build_orchestrator(&config).context("Failed to build orchestrator")?;
            let options = RunOptions {
                forced_direction: direction,
                price_hint: price,
            };
            let result = tads::analyze(
                &orchestrator,
                &symbol,
                as_of,
                lang.unwrap_or(default_language),
                options,
            )
            .await;

            let state = match result {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "Analysis failed");
                    print_json(&DecisionRecord::degraded(format!("Error: {e}")), cli.pretty)?;
                    return Ok(ExitCode::FAILURE);
                }
            };

            let record = state
                .decision
                .unwrap_or_else(|| DecisionRecord::degraded("Error: run ended without a decision record"));
            print_json(&record, cli.pretty)?;
            if record.is_degraded() {
                return Ok(ExitCode::from(EXIT_DEGRADED));
            }
        }

        Command::Compare { symbols, lang } => {
            let orchestrator =
                tads::build_orchestrator(&config).context("Failed to build orchestrator")?;
            let runner = BatchRunner::new(orchestrator, &config.portfolio);
            cancel_on_ctrl_c(&runner);
            let outcomes = runner
                .compare(&symbols, as_of, lang.unwrap_or(default_language))
                .await?;

            let upstream = outcomes
                .iter()
                .find_map(|o| o.result.as_ref().err().filter(|e| e.is_upstream()));
            if let Some(upstream) = upstream {
                anyhow::bail!("Comparison failed: {upstream}");
            }
            let entries: Vec<CompareEntry<'_>> = outcomes
                .iter()
                .map(|o| match &o.result {
                    Ok(state) => CompareEntry {
                        symbol: &o.symbol,
                        decision: state.decision.as_ref(),
                        error: None,
                    },
                    Err(e) => CompareEntry {
                        symbol: &o.symbol,
                        decision: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect();
            print_json(&entries, cli.pretty)?;

            let all_usable = entries
                .iter()
                .all(|e| e.decision.is_some_and(|d| !d.is_degraded()));
            if !all_usable {
                return Ok(ExitCode::from(EXIT_DEGRADED));
            }
        }

        Command::Portfolio { owner, action } => {
            let store = tads::build_store(&config.cache)?;
            match action {
                PortfolioCommand::Add { positions } => {
                    let parsed = positions
                        .iter()
                        .map(|raw| {
                            raw.parse::<Position>()
                                .with_context(|| format!("Invalid position: {raw}"))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    for position in &parsed {
                        store.upsert_position(&owner, position)?;
                        tracing::info!(owner = %owner, symbol = %position.symbol, "Position saved");
                    }
                    print_json(&parsed, cli.pretty)?;
                }
                PortfolioCommand::Show => {
                    print_json(&store.positions(&owner)?, cli.pretty)?;
                }
                PortfolioCommand::Remove { symbol } => {
                    let symbol = resolve_symbol(&symbol);
                    if !store.remove_position(&owner, &symbol)? {
                        anyhow::bail!("No position for {symbol}");
                    }
                    tracing::info!(owner = %owner, symbol = %symbol, "Position removed");
                }
                PortfolioCommand::Clear => {
                    let removed = store.clear_positions(&owner)?;
                    tracing::info!(owner = %owner, removed, "Positions cleared");
                }
                PortfolioCommand::Assess { lang } => {
                    let positions = store.positions(&owner)?;
                    let orchestrator =
                        tads::build_orchestrator(&config).context("Failed to build orchestrator")?;
                    let runner = BatchRunner::new(orchestrator, &config.portfolio);
                    cancel_on_ctrl_c(&runner);
                    let aggregator = RiskAggregator::new(store, &config.portfolio);

                    let report = tads::assess_portfolio(
                        &runner,
                        &aggregator,
                        &positions,
                        as_of,
                        lang.unwrap_or(default_language),
                    )
                    .await
                    .map_err(|e: TadsError| anyhow::anyhow!("Assessment failed: {e}"))?;
                    print_json(&report, cli.pretty)?;
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
