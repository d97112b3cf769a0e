//! Polling loop that drives the orchestrator against live collaborators.
//!
//! One iteration reads a bounded candle window per instrument, reconciles
//! local positions with the execution collaborator, and steps only the
//! instruments whose newest bar has not been evaluated yet. A feed failure
//! skips that instrument for the iteration. Any other failure aborts the
//! iteration, which is logged and retried after a backoff; it never ends the
//! loop.

use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

use crate::domain::error::SigtraderError;
use crate::domain::indicator::bundle::{IndicatorBundle, IndicatorSnapshot};
use crate::domain::orchestrator::{StepOutcome, StepRecord, StrategyOrchestrator};
use crate::ports::execution_port::ExecutionPort;
use crate::ports::market_data_port::MarketDataSource;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Candles requested per instrument each iteration.
    pub window_bars: usize,
    /// `None` runs until interrupted.
    pub max_iterations: Option<usize>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(5),
            window_bars: 120,
            max_iterations: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveSummary {
    pub iterations: usize,
    pub evaluations: usize,
    pub fills: usize,
    pub rejections: usize,
    /// Instruments skipped because their candle feed failed.
    pub feed_errors: usize,
    /// Iterations that failed as a whole.
    pub errors: usize,
}

pub struct LiveRunner {
    orchestrator: StrategyOrchestrator,
    bundle: IndicatorBundle,
    config: LiveConfig,
    sleep: Box<dyn FnMut(Duration)>,
    feed_errors: usize,
}

impl LiveRunner {
    pub fn new(orchestrator: StrategyOrchestrator, bundle: IndicatorBundle, config: LiveConfig) -> Self {
        Self {
            orchestrator,
            bundle,
            config,
            sleep: Box::new(std::thread::sleep),
            feed_errors: 0,
        }
    }

    /// Replace the wall-clock sleep, e.g. to run without delays.
    pub fn with_sleep(mut self, sleep: impl FnMut(Duration) + 'static) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    pub fn orchestrator(&self) -> &StrategyOrchestrator {
        &self.orchestrator
    }

    /// One polling iteration.
    pub fn poll_once(
        &mut self,
        source: &mut dyn MarketDataSource,
        execution: &mut dyn ExecutionPort,
    ) -> Result<Vec<StepRecord>, SigtraderError> {
        let symbols: Vec<String> = self.orchestrator.symbols().map(str::to_string).collect();
        let mut snapshots: Vec<IndicatorSnapshot> = Vec::with_capacity(symbols.len());
        let mut newest: Option<NaiveDateTime> = None;

        for symbol in &symbols {
            let candles = match source.recent_candles(symbol, self.config.window_bars) {
                Ok(candles) => candles,
                Err(e) => {
                    self.feed_errors += 1;
                    let last_bar = self.orchestrator.state(symbol).and_then(|s| s.last_bar);
                    warn!(
                        %symbol,
                        last_bar = ?last_bar,
                        error = %e,
                        "candle feed failed, instrument skipped"
                    );
                    continue;
                }
            };
            let Some(latest) = candles.last() else {
                info!(%symbol, "no candles returned");
                continue;
            };
            execution.on_price(symbol, latest.timestamp, latest.close);
            newest = newest.max(Some(latest.timestamp));

            let seen = self
                .orchestrator
                .state(symbol)
                .and_then(|s| s.last_bar)
                .is_some_and(|last| latest.timestamp <= last);
            if seen {
                debug!(%symbol, timestamp = %latest.timestamp, "no new bar");
                continue;
            }

            if let Some(snapshot) = self.bundle.snapshot(&candles) {
                debug!(
                    %symbol,
                    timestamp = %snapshot.timestamp,
                    close = snapshot.close,
                    ema_short = ?snapshot.ema_short,
                    ema_long = ?snapshot.ema_long,
                    adx = ?snapshot.adx,
                    rsi = ?snapshot.rsi,
                    atr = ?snapshot.atr,
                    "indicator snapshot"
                );
                snapshots.push(snapshot);
            }
        }

        if let Some(timestamp) = newest {
            self.orchestrator.reconcile(execution, timestamp)?;
        }

        let records = self.orchestrator.step(&snapshots, execution)?;
        for record in &records {
            if let StepOutcome::Skipped(reason) = &record.outcome {
                info!(
                    symbol = %record.symbol,
                    timestamp = %record.timestamp,
                    %reason,
                    "instrument skipped"
                );
            }
        }
        Ok(records)
    }

    /// Poll until `max_iterations` is reached (forever when unset).
    pub fn run(
        &mut self,
        source: &mut dyn MarketDataSource,
        execution: &mut dyn ExecutionPort,
    ) -> LiveSummary {
        let mut summary = LiveSummary::default();
        let feed_errors_before = self.feed_errors;
        info!(
            engine = self.orchestrator.engine().name(),
            poll_secs = self.config.poll_interval.as_secs(),
            "live loop starting"
        );

        loop {
            summary.iterations += 1;
            let pause = match self.poll_once(source, execution) {
                Ok(records) => {
                    summary.evaluations += records.len();
                    for record in &records {
                        match record.outcome {
                            StepOutcome::Filled { .. } => summary.fills += 1,
                            StepOutcome::Rejected { .. } => summary.rejections += 1,
                            _ => {}
                        }
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    summary.errors += 1;
                    error!(
                        iteration = summary.iterations,
                        error = %e,
                        "live iteration failed, backing off"
                    );
                    self.config.error_backoff
                }
            };

            if self
                .config
                .max_iterations
                .is_some_and(|max| summary.iterations >= max)
            {
                break;
            }
            (self.sleep)(pause);
        }

        summary.feed_errors = self.feed_errors - feed_errors_before;
        info!(
            iterations = summary.iterations,
            fills = summary.fills,
            feed_errors = summary.feed_errors,
            errors = summary.errors,
            "live loop stopped"
        );
        summary
    }
}
