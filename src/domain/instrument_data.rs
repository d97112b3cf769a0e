//! Loaded candle history for one instrument plus its unified replay timeline.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;

use crate::domain::indicator::bundle::{IndicatorBundle, IndicatorSnapshot};
use crate::domain::ohlcv::Candle;

#[derive(Debug, Clone)]
pub struct InstrumentData {
    pub symbol: String,
    pub candles: Vec<Candle>,
    /// One snapshot per candle, aligned by index.
    pub snapshots: Vec<IndicatorSnapshot>,
    pub time_index: HashMap<NaiveDateTime, usize>,
}

impl InstrumentData {
    /// Index the candles and precompute every snapshot with `bundle`.
    ///
    /// Indicators are causal, so computing over the whole history up front
    /// yields the same snapshot at each bar as recomputing bar by bar.
    pub fn new(symbol: String, candles: Vec<Candle>, bundle: &IndicatorBundle) -> Self {
        let time_index = candles
            .iter()
            .enumerate()
            .map(|(i, c)| (c.timestamp, i))
            .collect();
        let snapshots = bundle.compute(&candles);
        Self {
            symbol,
            candles,
            snapshots,
            time_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.candles.len()
    }

    pub fn candle_at(&self, timestamp: NaiveDateTime) -> Option<&Candle> {
        self.time_index.get(&timestamp).map(|&i| &self.candles[i])
    }

    pub fn snapshot_at(&self, timestamp: NaiveDateTime) -> Option<&IndicatorSnapshot> {
        self.time_index.get(&timestamp).map(|&i| &self.snapshots[i])
    }
}

/// Every distinct bar time across `instruments`, ascending.
pub fn build_unified_timeline(instruments: &[InstrumentData]) -> Vec<NaiveDateTime> {
    let unique: BTreeSet<NaiveDateTime> = instruments
        .iter()
        .flat_map(|d| d.candles.iter().map(|c| c.timestamp))
        .collect();
    unique.into_iter().collect()
}
