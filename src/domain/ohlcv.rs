//! Candle (OHLCV bar) representation.

use chrono::NaiveDateTime;

/// One OHLCV record for a single instrument at one bar interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// Returns the index of the first candle whose timestamp does not strictly
/// increase over its predecessor, if any.
pub fn find_ordering_violation(candles: &[Candle]) -> Option<usize> {
    candles
        .windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
        .map(|i| i + 1)
}
