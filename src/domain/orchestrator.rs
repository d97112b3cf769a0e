//! Drives one time step across every instrument.
//!
//! Each instrument is evaluated independently against the cash figure read
//! once at the start of the step, so no decision depends on another
//! instrument's decision in the same step. Position state advances only on a
//! confirmed fill; a rejection leaves it untouched.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::domain::decision::{SkipReason, TradeDecision};
use crate::domain::error::{Rejection, SigtraderError};
use crate::domain::indicator::bundle::IndicatorSnapshot;
use crate::domain::instrument_state::{InstrumentState, Reconciliation};
use crate::domain::signal::{SignalEngine, StepInput};
use crate::ports::execution_port::{ExecutionPort, Fill, OrderRequest};

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Skipped(SkipReason),
    NoAction,
    Filled { decision: TradeDecision, fill: Fill },
    Rejected {
        decision: TradeDecision,
        rejection: Rejection,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub outcome: StepOutcome,
}

pub struct StrategyOrchestrator {
    engine: Box<dyn SignalEngine>,
    states: BTreeMap<String, InstrumentState>,
}

impl StrategyOrchestrator {
    /// Fails with [`SigtraderError::NoInstruments`] when `symbols` is empty.
    pub fn new(engine: Box<dyn SignalEngine>, symbols: &[String]) -> Result<Self, SigtraderError> {
        if symbols.is_empty() {
            return Err(SigtraderError::NoInstruments);
        }
        let capacity = engine.history_capacity();
        let states = symbols
            .iter()
            .map(|s| (s.clone(), InstrumentState::new(s.clone(), capacity)))
            .collect();
        Ok(Self { engine, states })
    }

    pub fn engine(&self) -> &dyn SignalEngine {
        self.engine.as_ref()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn state(&self, symbol: &str) -> Option<&InstrumentState> {
        self.states.get(symbol)
    }

    /// Evaluate every snapshot and submit the resulting decisions.
    ///
    /// Snapshots for unknown symbols are ignored with a warning.
    pub fn step(
        &mut self,
        snapshots: &[IndicatorSnapshot],
        execution: &mut dyn ExecutionPort,
    ) -> Result<Vec<StepRecord>, SigtraderError> {
        let available_cash = execution.available_cash()?;
        let mut records = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            let Some(state) = self.states.get_mut(&snapshot.symbol) else {
                warn!(symbol = %snapshot.symbol, "snapshot for unconfigured instrument");
                continue;
            };
            state.last_bar = Some(snapshot.timestamp);

            let input = StepInput {
                snapshot,
                available_cash,
            };
            let outcome = match self.engine.evaluate(&input, state) {
                Err(reason) => {
                    debug!(
                        symbol = %snapshot.symbol,
                        timestamp = %snapshot.timestamp,
                        %reason,
                        "instrument skipped"
                    );
                    StepOutcome::Skipped(reason)
                }
                Ok(TradeDecision::NoAction) => StepOutcome::NoAction,
                Ok(decision) => submit(state, snapshot, decision, execution),
            };

            records.push(StepRecord {
                symbol: snapshot.symbol.clone(),
                timestamp: snapshot.timestamp,
                outcome,
            });
        }
        Ok(records)
    }

    /// Align local position state with the execution collaborator, which is
    /// the source of truth. Returns the number of corrected instruments.
    pub fn reconcile(
        &mut self,
        execution: &dyn ExecutionPort,
        timestamp: NaiveDateTime,
    ) -> Result<usize, SigtraderError> {
        let mut corrected = 0;
        for (symbol, state) in &mut self.states {
            let report = execution.current_position(symbol)?;
            if let Some(change) = state.reconcile(report.as_ref(), timestamp) {
                corrected += 1;
                match change {
                    Reconciliation::ClosedExternally { local_size } => warn!(
                        %symbol,
                        local_size,
                        "position closed outside the strategy"
                    ),
                    Reconciliation::Adopted { size, entry_price } => warn!(
                        %symbol,
                        size,
                        entry_price,
                        "adopting position opened outside the strategy"
                    ),
                    Reconciliation::Resized {
                        local_size,
                        actual_size,
                    } => warn!(%symbol, local_size, actual_size, "position size mismatch"),
                }
            }
        }
        Ok(corrected)
    }
}

fn submit(
    state: &mut InstrumentState,
    snapshot: &IndicatorSnapshot,
    decision: TradeDecision,
    execution: &mut dyn ExecutionPort,
) -> StepOutcome {
    let order = OrderRequest {
        symbol: snapshot.symbol.clone(),
        timestamp: snapshot.timestamp,
        price: snapshot.close,
        decision,
    };
    match execution.submit(&order) {
        Ok(fill) => {
            info!(
                symbol = %order.symbol,
                timestamp = %order.timestamp,
                decision = %order.decision,
                price = fill.price,
                quantity = fill.quantity,
                "order filled"
            );
            state.apply_fill(&order.decision, &fill);
            StepOutcome::Filled {
                decision: order.decision,
                fill,
            }
        }
        Err(rejection) => {
            warn!(
                symbol = %order.symbol,
                timestamp = %order.timestamp,
                decision = %order.decision,
                %rejection,
                "order rejected"
            );
            StepOutcome::Rejected {
                decision: order.decision,
                rejection,
            }
        }
    }
}
