use std::collections::BTreeMap;
use std::sync::Arc;

use analytics::AnalyticsEngine;
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use comfy_table::presets::UTF8_FULL;
use configuration::{Config, SizingConfig, load_config};
use core_types::{Holding, NewSimulator, PortfolioSnapshot, StrategyId};
use database::{Repository, connect, run_migrations};
use engine::{ExecutionEngine, Pipeline, PriceIngestor, Reconciler, StrategyEvaluator};
use indicatif::{ProgressBar, ProgressStyle};
use price_feed::YahooChartClient;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

/// Providers struggle with very long ranges, so backfills are fetched in
/// windows of this many days.
const BACKFILL_CHUNK_DAYS: i64 = 90;

/// The main entry point for the Vellum paper-trading application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();

    let config = load_config()?;
    let pool = connect().await.context("failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;
    let repository = Repository::new(pool);

    match cli.command {
        Commands::FetchPrices(args) => handle_fetch_prices(args, repository, &config).await?,
        Commands::Backfill(args) => handle_backfill(args, repository, &config).await?,
        Commands::Evaluate(args) => handle_evaluate(args, repository, &config).await?,
        Commands::Execute(args) => handle_execute(args, repository, &config).await?,
        Commands::Reconcile(args) => handle_reconcile(args, repository).await?,
        Commands::RunCycle(args) => handle_run_cycle(args, repository, &config).await?,
        Commands::Simulator(command) => match command {
            SimulatorCommands::Create(args) => handle_create(args, &repository, &config).await?,
            SimulatorCommands::List => handle_list(&repository).await?,
            SimulatorCommands::Track(args) => handle_track(args, &repository).await?,
            SimulatorCommands::Status(args) => handle_status(args, &repository).await?,
            SimulatorCommands::Signals(args) => handle_signals(args, &repository).await?,
            SimulatorCommands::Trades(args) => handle_trades(args, &repository).await?,
        },
    }

    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vellum=debug,sqlx=warn"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A paper-trading pipeline for daily-bar stock strategies.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the latest daily bars for every tracked symbol.
    FetchPrices(FetchPricesArgs),
    /// Download a historical range of daily bars.
    Backfill(BackfillArgs),
    /// Run each simulator's strategy over fresh bars and persist its signals.
    Evaluate(EvaluateArgs),
    /// Turn pending signals into simulated trades.
    Execute(StageArgs),
    /// Rebuild cash balances and positions from the trade ledger.
    Reconcile(StageArgs),
    /// Run all four pipeline stages back to back.
    RunCycle(StageArgs),
    /// Create and inspect simulators.
    #[command(subcommand)]
    Simulator(SimulatorCommands),
}

#[derive(Parser)]
struct FetchPricesArgs {
    /// Only fetch for symbols tracked by this simulator.
    #[arg(long)]
    simulator_id: Option<Uuid>,

    /// Trading day to fetch (YYYY-MM-DD), defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Parser)]
struct BackfillArgs {
    /// First day of the range (YYYY-MM-DD).
    #[arg(long)]
    from: NaiveDate,

    /// Last day of the range (YYYY-MM-DD).
    #[arg(long)]
    to: NaiveDate,

    /// Only backfill symbols tracked by this simulator.
    #[arg(long)]
    simulator_id: Option<Uuid>,
}

#[derive(Parser)]
struct EvaluateArgs {
    /// Only evaluate this simulator.
    #[arg(long)]
    simulator_id: Option<Uuid>,

    /// Evaluation date (YYYY-MM-DD), defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Parser)]
struct StageArgs {
    /// Restrict the stage to one simulator.
    #[arg(long)]
    simulator_id: Option<Uuid>,
}

#[derive(Subcommand)]
enum SimulatorCommands {
    /// Create a new simulator.
    Create(CreateSimulatorArgs),
    /// List all simulators.
    List,
    /// Add a symbol to a simulator's watch list, or disable one.
    Track(TrackArgs),
    /// Show a simulator's portfolio, valuation, and recent cash movements.
    Status(InspectArgs),
    /// Show a simulator's most recent signals.
    Signals(HistoryArgs),
    /// Show a simulator's most recent trades.
    Trades(HistoryArgs),
}

#[derive(Parser)]
struct CreateSimulatorArgs {
    /// Human-readable name, e.g. "sma-tech-basket".
    #[arg(long)]
    name: String,

    /// Strategy to run: "sma_crossover" or "threshold_rule".
    #[arg(long)]
    strategy: StrategyId,

    /// Strategy parameters as a JSON object, e.g. '{"short_window": 5}'.
    #[arg(long)]
    params: Option<String>,

    /// Sizing rule as JSON, e.g. '{"rule": "fixed_shares", "shares": "10"}'.
    #[arg(long)]
    sizing: Option<String>,

    /// Initial cash balance; falls back to the configured default.
    #[arg(long)]
    starting_cash: Option<Decimal>,

    /// Fee rate on the slipped notional; falls back to the configured default.
    #[arg(long)]
    fee_rate: Option<Decimal>,

    /// Slippage rate applied to fills; falls back to the configured default.
    #[arg(long)]
    slippage_rate: Option<Decimal>,
}

#[derive(Parser)]
struct TrackArgs {
    #[arg(long)]
    simulator_id: Uuid,

    /// Ticker symbol, e.g. "AAPL".
    #[arg(long)]
    symbol: String,

    /// Stop evaluating the symbol instead of (re-)enabling it.
    #[arg(long)]
    disable: bool,
}

#[derive(Parser)]
struct InspectArgs {
    #[arg(long)]
    simulator_id: Uuid,
}

#[derive(Parser)]
struct HistoryArgs {
    #[arg(long)]
    simulator_id: Uuid,

    /// How many rows to show, newest first.
    #[arg(long, default_value_t = 20)]
    limit: i64,
}

// ==============================================================================
// Pipeline Stage Commands
// ==============================================================================

async fn handle_fetch_prices(
    args: FetchPricesArgs,
    repository: Repository,
    config: &Config,
) -> anyhow::Result<()> {
    let provider = Arc::new(YahooChartClient::new(&config.feed)?);
    let ingestor = PriceIngestor::new(repository, provider);
    let summary = ingestor.run(args.simulator_id, args.date).await?;
    println!(
        "Ingest complete: {} bars written, {}/{} symbols fetched ({} skipped)",
        summary.bars_written,
        summary.symbols_fetched,
        summary.symbols_requested,
        summary.symbols_skipped
    );
    Ok(())
}

/// Backfills in bounded windows so one slow provider response cannot stall
/// the whole range, with a progress bar over the windows.
async fn handle_backfill(
    args: BackfillArgs,
    repository: Repository,
    config: &Config,
) -> anyhow::Result<()> {
    let symbols = match args.simulator_id {
        Some(id) => repository.enabled_symbols(id).await?,
        None => repository.all_enabled_symbols().await?,
    };
    if symbols.is_empty() {
        anyhow::bail!("no tracked symbols to backfill; track at least one symbol first");
    }
    println!(
        "Backfilling {} symbols from {} to {}",
        symbols.len(),
        args.from,
        args.to
    );

    let provider = Arc::new(YahooChartClient::new(&config.feed)?);
    let ingestor = PriceIngestor::new(repository, provider);

    let ranges = chunk_date_ranges(args.from, args.to, BACKFILL_CHUNK_DAYS);
    let progress = ProgressBar::new(ranges.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let mut bars_written = 0u64;
    for (start, end) in ranges {
        progress.set_message(format!("Fetching {start}..{end}"));
        let summary = ingestor.ingest_range(&symbols, start, end).await?;
        bars_written += summary.bars_written;
        progress.inc(1);
    }
    progress.finish_with_message(format!("Backfill complete, {bars_written} bars written"));
    Ok(())
}

async fn handle_evaluate(
    args: EvaluateArgs,
    repository: Repository,
    config: &Config,
) -> anyhow::Result<()> {
    let evaluator = StrategyEvaluator::new(repository, config.pipeline.clone());
    let summary = evaluator.run(args.simulator_id, args.date).await?;
    println!(
        "Evaluation complete: {} signals created across {} simulators ({} skipped, {} failed, {} symbols skipped)",
        summary.signals_created,
        summary.simulators_evaluated,
        summary.simulators_skipped,
        summary.simulators_failed,
        summary.symbols_skipped
    );
    Ok(())
}

async fn handle_execute(
    args: StageArgs,
    repository: Repository,
    config: &Config,
) -> anyhow::Result<()> {
    let executor = ExecutionEngine::new(repository, config.pipeline.clone());
    let summary = executor.run(args.simulator_id).await?;
    println!(
        "Execution complete: {} signals processed ({} executed, {} skipped, {} failed), {} trades created",
        summary.signals_processed, summary.executed, summary.skipped, summary.failed, summary.trades_created
    );
    if summary.simulators_locked_out > 0 {
        println!(
            "  {} simulators were locked by another pass and left untouched",
            summary.simulators_locked_out
        );
    }
    Ok(())
}

async fn handle_reconcile(args: StageArgs, repository: Repository) -> anyhow::Result<()> {
    let reconciler = Reconciler::new(repository);
    let summary = reconciler.run(args.simulator_id).await?;
    println!(
        "Reconcile complete: {} trades replayed into {} positions across {} simulators",
        summary.trades_replayed, summary.positions_written, summary.simulators_reconciled
    );
    if summary.simulators_locked_out > 0 {
        println!(
            "  {} simulators were locked by another pass and left untouched",
            summary.simulators_locked_out
        );
    }
    Ok(())
}

async fn handle_run_cycle(
    args: StageArgs,
    repository: Repository,
    config: &Config,
) -> anyhow::Result<()> {
    let provider = Arc::new(YahooChartClient::new(&config.feed)?);
    let pipeline = Pipeline::new(repository, provider, config);
    let cycle = pipeline.run_cycle(args.simulator_id).await?;
    println!("Cycle complete:");
    println!(
        "  ingest:    {} bars written ({} symbols skipped)",
        cycle.ingest.bars_written, cycle.ingest.symbols_skipped
    );
    println!(
        "  evaluate:  {} signals created ({} simulators skipped, {} failed)",
        cycle.evaluation.signals_created,
        cycle.evaluation.simulators_skipped,
        cycle.evaluation.simulators_failed
    );
    println!(
        "  execute:   {} trades created ({} signals skipped, {} failed)",
        cycle.execution.trades_created, cycle.execution.skipped, cycle.execution.failed
    );
    println!(
        "  reconcile: {} trades replayed across {} simulators",
        cycle.reconcile.trades_replayed, cycle.reconcile.simulators_reconciled
    );
    Ok(())
}

// ==============================================================================
// Simulator Commands
// ==============================================================================

async fn handle_create(
    args: CreateSimulatorArgs,
    repository: &Repository,
    config: &Config,
) -> anyhow::Result<()> {
    let strategy_params = match &args.params {
        Some(raw) => serde_json::from_str(raw).context("--params is not valid JSON")?,
        None => serde_json::json!({}),
    };
    // Fail fast on parameter bags the strategy cannot decode.
    strategies::build_strategy(args.strategy, &strategy_params)?;

    let sizing = match &args.sizing {
        Some(raw) => serde_json::from_str::<SizingConfig>(raw)
            .context("--sizing is not a valid sizing rule")?,
        None => SizingConfig::CashFraction {
            fraction: dec!(0.25),
        },
    };

    let new = NewSimulator {
        name: args.name,
        strategy_id: args.strategy,
        strategy_params,
        sizing: serde_json::to_value(&sizing)?,
        starting_cash: args
            .starting_cash
            .unwrap_or(config.simulator_defaults.starting_cash),
        fee_rate: args.fee_rate.unwrap_or(config.simulator_defaults.fee_rate),
        slippage_rate: args
            .slippage_rate
            .unwrap_or(config.simulator_defaults.slippage_rate),
    };
    if new.starting_cash <= Decimal::ZERO {
        anyhow::bail!("starting cash must be positive");
    }

    let simulator = repository.create_simulator(&new).await?;
    println!(
        "Created simulator {} ({}) with {} starting cash",
        simulator.simulator_id, simulator.name, simulator.starting_cash
    );
    println!("Next: track symbols with `simulator track --simulator-id {} --symbol AAPL`",
        simulator.simulator_id
    );
    Ok(())
}

async fn handle_list(repository: &Repository) -> anyhow::Result<()> {
    let simulators = repository.all_simulators().await?;
    if simulators.is_empty() {
        println!("No simulators yet. Create one with `simulator create`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Id", "Name", "Strategy", "Enabled", "Cash", "Starting Cash", "Fee", "Slippage",
    ]);
    for simulator in &simulators {
        table.add_row(vec![
            simulator.simulator_id.to_string(),
            simulator.name.clone(),
            simulator.strategy_id.to_string(),
            simulator.enabled.to_string(),
            simulator.cash_balance.to_string(),
            simulator.starting_cash.to_string(),
            simulator.fee_rate.to_string(),
            simulator.slippage_rate.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_track(args: TrackArgs, repository: &Repository) -> anyhow::Result<()> {
    // Resolve the simulator first so an unknown id is a clear error.
    let simulator = repository.simulator_by_id(args.simulator_id).await?;

    let symbol = args.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        anyhow::bail!("symbol must not be empty");
    }

    let enabled = !args.disable;
    repository
        .track_symbol(simulator.simulator_id, &symbol, enabled)
        .await?;
    if enabled {
        println!("Tracking {symbol} for {}", simulator.name);
    } else {
        println!("Disabled {symbol} for {}", simulator.name);
    }
    Ok(())
}

async fn handle_status(args: InspectArgs, repository: &Repository) -> anyhow::Result<()> {
    let simulator = repository.simulator_by_id(args.simulator_id).await?;
    let positions = repository.positions_for(args.simulator_id).await?;

    let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
    let closes: BTreeMap<String, Decimal> = repository
        .latest_bars(&symbols)
        .await?
        .into_iter()
        .map(|bar| (bar.symbol, bar.close))
        .collect();

    println!("{} ({})", simulator.name, simulator.simulator_id);
    println!(
        "  strategy: {}  enabled: {}",
        simulator.strategy_id, simulator.enabled
    );
    println!(
        "  cash: {}  starting cash: {}",
        simulator.cash_balance, simulator.starting_cash
    );

    if !positions.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec![
            "Symbol",
            "Quantity",
            "Avg Cost",
            "Last Close",
            "Market Value",
        ]);
        for position in &positions {
            let close = closes.get(&position.symbol);
            table.add_row(vec![
                position.symbol.clone(),
                position.quantity.to_string(),
                position.avg_cost.to_string(),
                close.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
                close
                    .map(|c| (position.quantity * *c).round_dp(4).to_string())
                    .unwrap_or_else(|| "?".to_string()),
            ]);
        }
        println!("{table}");
    }

    let portfolio = PortfolioSnapshot {
        simulator_id: simulator.simulator_id,
        cash: simulator.cash_balance,
        positions: positions
            .iter()
            .map(|p| {
                (
                    p.symbol.clone(),
                    Holding {
                        quantity: p.quantity,
                        avg_cost: p.avg_cost,
                    },
                )
            })
            .collect(),
        as_of: Utc::now(),
    };
    match AnalyticsEngine::default().snapshot(&portfolio, &closes, simulator.starting_cash) {
        Ok(perf) => {
            println!(
                "  equity: {}  unrealized pnl: {}",
                perf.equity, perf.unrealized_pnl
            );
            if let Some(pct) = perf.return_since_inception_pct {
                println!("  return since inception: {pct}%");
            }
        }
        Err(e) => println!("  valuation unavailable: {e}"),
    }

    let entries = repository.cash_ledger_for(args.simulator_id, 5).await?;
    if !entries.is_empty() {
        println!("  recent cash movements:");
        for entry in entries {
            println!(
                "    {}  {}  {} (balance {})",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.delta,
                entry.reason,
                entry.balance_after
            );
        }
    }
    Ok(())
}

async fn handle_signals(args: HistoryArgs, repository: &Repository) -> anyhow::Result<()> {
    let signals = repository.signals_for(args.simulator_id, args.limit).await?;
    if signals.is_empty() {
        println!("No signals recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Created",
        "Symbol",
        "Action",
        "Confidence",
        "Ref Price",
        "Status",
        "Detail",
    ]);
    for signal in &signals {
        table.add_row(vec![
            signal.created_at.format("%Y-%m-%d %H:%M").to_string(),
            signal.symbol.clone(),
            signal.action.to_string(),
            signal.confidence.to_string(),
            signal.ref_price.to_string(),
            signal.status.to_string(),
            signal.status_reason.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn handle_trades(args: HistoryArgs, repository: &Repository) -> anyhow::Result<()> {
    let trades = repository.trades_for(args.simulator_id).await?;
    if trades.is_empty() {
        println!("No trades recorded yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Executed", "Symbol", "Side", "Quantity", "Price", "Fee",
    ]);
    // The ledger is stored oldest-first; show the newest slice on top.
    for trade in trades.iter().rev().take(args.limit as usize) {
        table.add_row(vec![
            trade.executed_at.format("%Y-%m-%d %H:%M").to_string(),
            trade.symbol.clone(),
            trade.side.to_string(),
            trade.quantity.to_string(),
            trade.price.to_string(),
            trade.fee.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Helpers
// ==============================================================================

/// Splits an inclusive date range into consecutive windows of at most
/// `chunk_days` days each.
fn chunk_date_ranges(
    mut from: NaiveDate,
    to: NaiveDate,
    chunk_days: i64,
) -> Vec<(NaiveDate, NaiveDate)> {
    let mut ranges = Vec::new();
    while from <= to {
        let end = std::cmp::min(from + chrono::Duration::days(chunk_days - 1), to);
        ranges.push((from, end));
        from = match end.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    ranges
}
