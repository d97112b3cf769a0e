//! CLI definition and dispatch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::adapters::broker_execution::{BracketConfig, BrokerExecution};
use crate::adapters::csv_adapter::CsvMarketData;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_broker::PaperBroker;
use crate::adapters::replay_market_data::ReplayMarketData;
use crate::adapters::sim_execution::SimulatedExecution;
use crate::domain::backtest::{BacktestResult, filter_tradeable, load_instruments, run_backtest};
use crate::domain::error::SigtraderError;
use crate::domain::indicator::bundle::IndicatorBundle;
use crate::domain::live::LiveRunner;
use crate::domain::orchestrator::StrategyOrchestrator;
use crate::domain::strategy::{
    PaperAccount, StrategyKind, StrategySettings, build_backtest_config, build_bracket_pcts,
    build_live_config, build_paper_account, live_symbols,
};
use crate::ports::broker_port::BrokerGateway;

#[derive(Parser, Debug)]
#[command(
    name = "sigtrader",
    about = "Multi-instrument signal trading: backtests and paper trading"
)]
pub struct Cli {
    /// Log verbosity; RUST_LOG overrides it when set
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over CSV candle files
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated symbols, replacing `[backtest] symbols`
        #[arg(long)]
        symbols: Option<String>,
        /// Signal engine, replacing `[strategy] kind`
        #[arg(long)]
        strategy: Option<StrategyKind>,
    },
    /// Run the polling loop against the paper broker
    Live {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        max_iterations: Option<usize>,
    },
    /// Validate a configuration and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show non-zero balances of the paper account
    Balances {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Install the stderr log subscriber. Later calls keep the first one.
pub fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(cli.log_level);
    let result = match cli.command {
        Command::Backtest {
            config,
            symbols,
            strategy,
        } => run_backtest_command(&config, symbols.as_deref(), strategy),
        Command::Live {
            config,
            max_iterations,
        } => run_live(&config, max_iterations),
        Command::Validate { config } => run_validate(&config),
        Command::Balances { config } => run_balances(&config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SigtraderError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

fn resolve_settings(
    config: &FileConfigAdapter,
    kind: Option<StrategyKind>,
) -> Result<StrategySettings, SigtraderError> {
    match kind {
        Some(kind) => StrategySettings::for_kind(config, kind),
        None => StrategySettings::from_config(config),
    }
}

fn run_backtest_command(
    config_path: &Path,
    symbols: Option<&str>,
    kind: Option<StrategyKind>,
) -> Result<(), SigtraderError> {
    let config = load_config(config_path)?;
    let settings = resolve_settings(&config, kind)?;
    let bt_config = build_backtest_config(&config, symbols)?;

    let bundle = IndicatorBundle::new(settings.params.clone());
    let source = CsvMarketData::new(&bt_config.data_dir);
    let instruments = load_instruments(&source, &bt_config, &bundle)?;
    let instruments = filter_tradeable(instruments, settings.required_history())?;

    let symbols: Vec<String> = instruments.iter().map(|d| d.symbol.clone()).collect();
    let mut orchestrator = StrategyOrchestrator::new(settings.build_engine(), &symbols)?;
    let mut execution =
        SimulatedExecution::new(bt_config.initial_capital, bt_config.commission_pct);

    eprintln!(
        "Running backtest: {} instruments, {} strategy",
        symbols.len(),
        settings.kind
    );
    let result = run_backtest(&instruments, &mut orchestrator, &mut execution)?;
    print_backtest_summary(&result, bt_config.initial_capital);
    Ok(())
}

fn print_backtest_summary(result: &BacktestResult, initial_capital: f64) {
    let m = &result.metrics;
    eprintln!("  Processed: {} bars", result.bars_processed);
    eprintln!(
        "  Decisions: {} filled, {} rejected, {} skipped",
        result.fills, result.rejections, result.skips
    );

    eprintln!("\n=== Aggregate Results ===");
    eprintln!("Initial Capital:  {:.2}", initial_capital);
    eprintln!("Final Equity:     {:.2}", m.final_equity);
    eprintln!("Total Return:     {:.2}%", m.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", m.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", m.max_drawdown * 100.0);
    eprintln!("Total Trades:     {}", m.total_trades);
    eprintln!("Win Rate:         {:.1}%", m.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", m.profit_factor);

    if !result.per_symbol.is_empty() {
        eprintln!("\n=== Per-Symbol Summary ===");
        for sr in &result.per_symbol {
            let pnl_sign = if sr.total_pnl >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades, {:.1}% win rate, {}{:.2}",
                sr.symbol,
                sr.total_trades,
                sr.win_rate * 100.0,
                pnl_sign,
                sr.total_pnl,
            );
        }
    }
}

fn run_validate(config_path: &Path) -> Result<(), SigtraderError> {
    let config = load_config(config_path)?;
    let settings = StrategySettings::from_config(&config)?;
    let bt_config = build_backtest_config(&config, None)?;
    let live_config = build_live_config(&config)?;
    let (stop_pct, take_profit_pct) = build_bracket_pcts(&config)?;
    let account = build_paper_account(&config)?;
    eprintln!("Config validated successfully");

    let engine = settings.build_engine();
    eprintln!("\nStrategy:");
    eprintln!("  kind:            {}", settings.kind);
    eprintln!("  engine:          {}", engine.name());
    eprintln!("  required bars:   {}", settings.required_history());
    match settings.kind {
        StrategyKind::Rule => {
            let t = &settings.thresholds;
            eprintln!("  entry ADX min:   {}", t.entry_adx_min);
            eprintln!("  exit ADX max:    {}", t.exit_adx_max);
            eprintln!("  RSI band:        ({}, {})", t.rsi_lower, t.rsi_upper);
            eprintln!("  stochastic:      {}", t.use_stochastic);
            eprintln!("  ichimoku:        {}", t.use_ichimoku);
            eprintln!("  risk per trade:  {}", settings.sizer.risk_per_trade);
            eprintln!("  stop ATR mult:   {}", settings.sizer.stop_atr_multiple);
            eprintln!("  sizing:          {:?}", settings.sizer.mode);
        }
        StrategyKind::Crossover => {
            let c = &settings.crossover;
            eprintln!(
                "  EMA windows:     {}/{}",
                settings.params.short_window, settings.params.long_window
            );
            eprintln!("  buy when RSI <   {}", c.rsi_buy_below);
            eprintln!("  sell when RSI >  {}", c.rsi_sell_above);
            eprintln!("  sizing:          {:?}", settings.sizer.mode);
        }
        StrategyKind::Learned | StrategyKind::LearnedLagged => {
            let l = &settings.learned;
            eprintln!("  lookback:        {}", l.lookback);
            eprintln!("  margin:          {}", l.margin);
            eprintln!("  lags:            {}", l.variant.lags());
            eprintln!("  trees:           {}", l.forest.n_trees);
            eprintln!("  max depth:       {}", l.forest.max_depth);
            eprintln!("  order size:      {}", l.default_order_size);
            match l.max_history {
                Some(rows) => eprintln!("  max history:     {}", rows),
                None => eprintln!("  max history:     unbounded"),
            }
        }
    }

    let mut indicator_list: Vec<String> = settings
        .params
        .indicator_types()
        .iter()
        .map(|i| i.to_string())
        .collect();
    indicator_list.sort();
    indicator_list.dedup();
    eprintln!("\nIndicators to compute:");
    for ind in &indicator_list {
        eprintln!("  {}", ind);
    }

    eprintln!("\nUniverse:");
    eprintln!("  symbols:  {}", bt_config.symbols.join(", "));
    eprintln!("  data dir: {}", bt_config.data_dir);
    eprintln!(
        "  range:    {} to {}",
        bt_config
            .start_date
            .map_or_else(|| "start".to_string(), |d| d.to_string()),
        bt_config
            .end_date
            .map_or_else(|| "end".to_string(), |d| d.to_string()),
    );

    eprintln!("\nLive:");
    eprintln!("  poll interval: {}s", live_config.poll_interval.as_secs());
    eprintln!("  window bars:   {}", live_config.window_bars);
    eprintln!(
        "  bracket:       stop -{:.2}%, take profit +{:.2}%",
        stop_pct * 100.0,
        take_profit_pct * 100.0
    );
    eprintln!(
        "  paper account: {:.2} {}",
        account.balance, account.quote_asset
    );

    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

fn paper_broker(account: &PaperAccount) -> PaperBroker {
    PaperBroker::new(
        account.quote_asset.clone(),
        account.balance,
        account.commission_pct,
    )
}

/// Paper session: replays the CSV histories one bar per poll against a
/// paper broker with bracket exits.
fn run_live(config_path: &Path, max_iterations: Option<usize>) -> Result<(), SigtraderError> {
    let config = load_config(config_path)?;
    let settings = StrategySettings::from_config(&config)?;
    let bt_config = build_backtest_config(&config, live_symbols(&config).as_deref())?;
    let mut live_config = build_live_config(&config)?;
    let (stop_pct, take_profit_pct) = build_bracket_pcts(&config)?;
    let account = build_paper_account(&config)?;

    let required = settings.required_history();
    if live_config.window_bars < required {
        warn!(
            window_bars = live_config.window_bars,
            required, "candle window shorter than required history, widening"
        );
        live_config.window_bars = required;
    }

    let bundle = IndicatorBundle::new(settings.params.clone());
    let source = CsvMarketData::new(&bt_config.data_dir);
    let instruments = load_instruments(&source, &bt_config, &bundle)?;
    let instruments = filter_tradeable(instruments, required)?;
    let symbols: Vec<String> = instruments.iter().map(|d| d.symbol.clone()).collect();

    let remaining = instruments
        .iter()
        .map(|d| d.bar_count().saturating_sub(required))
        .max()
        .unwrap_or(0);
    let histories: BTreeMap<_, _> = instruments
        .into_iter()
        .map(|d| (d.symbol, d.candles))
        .collect();
    let mut feed = ReplayMarketData::new(histories, required);

    live_config.max_iterations = match max_iterations {
        Some(0) => None,
        Some(n) => Some(n),
        None => live_config.max_iterations.or(Some(remaining.max(1))),
    };

    let bracket = BracketConfig {
        stop_pct,
        take_profit_pct,
    };
    let mut execution = BrokerExecution::new(
        paper_broker(&account),
        account.quote_asset.clone(),
        bracket,
    );
    let orchestrator = StrategyOrchestrator::new(settings.build_engine(), &symbols)?;

    eprintln!(
        "Paper trading {} instruments with {} strategy",
        symbols.len(),
        settings.kind
    );
    info!(
        quote = %account.quote_asset,
        balance = account.balance,
        "paper account opened"
    );

    // Replay has no wall clock to wait on.
    let mut runner = LiveRunner::new(orchestrator, bundle, live_config).with_sleep(|_| {});
    let summary = runner.run(&mut feed, &mut execution);

    eprintln!("\n=== Live Session ===");
    eprintln!("Iterations:   {}", summary.iterations);
    eprintln!("Evaluations:  {}", summary.evaluations);
    eprintln!("Fills:        {}", summary.fills);
    eprintln!("Rejections:   {}", summary.rejections);
    eprintln!("Feed errors:  {}", summary.feed_errors);
    eprintln!("Errors:       {}", summary.errors);
    if !feed.is_exhausted() {
        eprintln!("Replay stopped before the end of the data");
    }

    print_balances(execution.broker())
}

fn run_balances(config_path: &Path) -> Result<(), SigtraderError> {
    let config = load_config(config_path)?;
    let account = build_paper_account(&config)?;
    print_balances(&paper_broker(&account))
}

fn print_balances(broker: &dyn BrokerGateway) -> Result<(), SigtraderError> {
    let balances = broker.balances()?;
    eprintln!("\n=== Balances ===");
    if balances.is_empty() {
        eprintln!("  (none)");
    }
    for b in &balances {
        println!("{}\t{:.8}\t{:.8}", b.asset, b.free, b.locked);
    }
    Ok(())
}
