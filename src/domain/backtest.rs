//! Historical replay of the orchestrator over a unified multi-instrument
//! timeline.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::domain::error::SigtraderError;
use crate::domain::indicator::bundle::{IndicatorBundle, IndicatorSnapshot};
use crate::domain::instrument_data::{InstrumentData, build_unified_timeline};
use crate::domain::metrics::{Metrics, SymbolResult};
use crate::domain::orchestrator::{StepOutcome, StrategyOrchestrator};
use crate::ports::execution_port::SimulatedAccount;
use crate::ports::market_data_port::MarketDataSource;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbols: Vec<String>,
    pub data_dir: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    /// Fraction of trade value charged on each leg.
    pub commission_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub bars_processed: usize,
    pub fills: usize,
    pub rejections: usize,
    pub skips: usize,
    pub metrics: Metrics,
    pub per_symbol: Vec<SymbolResult>,
}

/// Fetch every symbol and precompute its snapshots.
///
/// Symbols without data are skipped with a warning; other data errors abort.
pub fn load_instruments(
    source: &dyn MarketDataSource,
    config: &BacktestConfig,
    bundle: &IndicatorBundle,
) -> Result<Vec<InstrumentData>, SigtraderError> {
    let mut loaded = Vec::with_capacity(config.symbols.len());
    for symbol in &config.symbols {
        match source.fetch_candles(symbol, config.start_date, config.end_date) {
            Ok(candles) if candles.is_empty() => {
                warn!(%symbol, "no candles in range, skipping");
            }
            Ok(candles) => {
                debug!(%symbol, bars = candles.len(), "loaded candles");
                loaded.push(InstrumentData::new(symbol.clone(), candles, bundle));
            }
            Err(SigtraderError::NoData { .. }) => {
                warn!(%symbol, "no data, skipping");
            }
            Err(e) => return Err(e),
        }
    }
    if loaded.is_empty() {
        return Err(SigtraderError::NoData {
            symbol: config.symbols.join(","),
        });
    }
    Ok(loaded)
}

/// Drop instruments with fewer than `required` bars.
///
/// Fails with the shortest instrument's counts when nothing is left.
pub fn filter_tradeable(
    instruments: Vec<InstrumentData>,
    required: usize,
) -> Result<Vec<InstrumentData>, SigtraderError> {
    let shortest = instruments
        .iter()
        .min_by_key(|d| d.bar_count())
        .map(|d| (d.symbol.clone(), d.bar_count()));

    let kept: Vec<InstrumentData> = instruments
        .into_iter()
        .filter(|d| {
            let enough = d.bar_count() >= required;
            if !enough {
                warn!(
                    symbol = %d.symbol,
                    bars = d.bar_count(),
                    required,
                    "insufficient history, skipping"
                );
            }
            enough
        })
        .collect();

    match (kept.is_empty(), shortest) {
        (true, Some((symbol, bars))) => Err(SigtraderError::InsufficientData {
            symbol,
            bars,
            minimum: required,
        }),
        (true, None) => Err(SigtraderError::NoInstruments),
        (false, _) => Ok(kept),
    }
}

/// Replay every bar of `instruments` through `orchestrator`.
///
/// At each timeline point the account sees the bar closes, the orchestrator
/// steps every instrument with a bar at that time, and equity is recorded.
/// Orders fill at the current close.
pub fn run_backtest<A: SimulatedAccount>(
    instruments: &[InstrumentData],
    orchestrator: &mut StrategyOrchestrator,
    account: &mut A,
) -> Result<BacktestResult, SigtraderError> {
    let timeline = build_unified_timeline(instruments);
    info!(
        instruments = instruments.len(),
        bars = timeline.len(),
        engine = orchestrator.engine().name(),
        "starting backtest"
    );

    let mut fills = 0usize;
    let mut rejections = 0usize;
    let mut skips = 0usize;

    for &timestamp in &timeline {
        let snapshots: Vec<IndicatorSnapshot> = instruments
            .iter()
            .filter_map(|d| d.snapshot_at(timestamp))
            .cloned()
            .collect();

        for snapshot in &snapshots {
            account.on_price(&snapshot.symbol, timestamp, snapshot.close);
        }

        for record in orchestrator.step(&snapshots, account)? {
            match record.outcome {
                StepOutcome::Filled { .. } => fills += 1,
                StepOutcome::Rejected { .. } => rejections += 1,
                StepOutcome::Skipped(_) => skips += 1,
                StepOutcome::NoAction => {}
            }
        }

        account.record_equity(timestamp);
    }

    let portfolio = account.portfolio();
    let metrics = Metrics::compute(portfolio);
    let per_symbol = SymbolResult::compute_per_symbol(&portfolio.closed_trades);
    info!(
        fills,
        rejections,
        total_return = metrics.total_return,
        "backtest finished"
    );

    Ok(BacktestResult {
        bars_processed: timeline.len(),
        fills,
        rejections,
        skips,
        metrics,
        per_symbol,
    })
}
