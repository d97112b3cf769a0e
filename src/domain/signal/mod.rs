//! Signal engines: per-instrument decision logic.
//!
//! An engine sees one instrument's [`IndicatorSnapshot`] and state at a time
//! and never anything about other instruments.

pub mod crossover;
pub mod learned;
pub mod rule_based;

pub use crossover::{CrossSignal, CrossoverSignalEngine, CrossoverThresholds};
pub use learned::{LearnedConfig, LearnedSignalEngine, LearnedVariant, TrainedModel};
pub use rule_based::{RuleBasedSignalEngine, RuleThresholds};

use crate::domain::decision::{SkipReason, TradeDecision};
use crate::domain::indicator::bundle::{IndicatorParams, IndicatorSnapshot};
use crate::domain::instrument_state::InstrumentState;

/// NaN and infinities count as unavailable.
pub(crate) fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Inputs for one instrument at one step.
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub snapshot: &'a IndicatorSnapshot,
    /// Cash read once at the start of the step.
    pub available_cash: f64,
}

pub trait SignalEngine {
    fn name(&self) -> &'static str;

    /// Bars of candle history needed before the engine can act.
    fn required_history(&self, params: &IndicatorParams) -> usize;

    /// Feature rows to retain per instrument; `None` keeps everything.
    fn history_capacity(&self) -> Option<usize> {
        None
    }

    /// Decide for one instrument. `Err` means the instrument is skipped this
    /// step; position state is never changed here.
    fn evaluate(
        &self,
        input: &StepInput<'_>,
        state: &mut InstrumentState,
    ) -> Result<TradeDecision, SkipReason>;
}
