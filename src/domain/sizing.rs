//! Position sizing.
//!
//! The default mode is volatility-normalized:
//!
//! risk_dollars = cash * risk_per_trade
//! stop_distance = stop_atr_multiple * ATR
//! size = risk_dollars / stop_distance
//!
//! Example: cash 10,000, risk 1% (100), ATR 2.00, multiple 2 (stop 4.00 away)
//! gives a size of 25. Expected loss if stopped is a constant fraction of
//! cash, whatever the instrument's volatility.
//!
//! The other modes spend a fraction of free cash at the current price: a
//! fixed percentage, or the Kelly fraction.

/// How an entry's quantity is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingMode {
    /// Risk a fixed fraction of cash against an ATR-based stop.
    AtrRisk,
    /// Spend `pct` of free cash at the current price.
    BalancePct { pct: f64 },
    /// Spend the Kelly fraction of free cash at the current price.
    Kelly { win_prob: f64, win_loss_ratio: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSizer {
    /// Fraction of cash risked per trade (e.g. 0.01 = 1%)
    pub risk_per_trade: f64,
    /// Stop distance in ATRs (e.g. 2.0)
    pub stop_atr_multiple: f64,
    pub mode: SizingMode,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.01,
            stop_atr_multiple: 2.0,
            mode: SizingMode::AtrRisk,
        }
    }
}

impl PositionSizer {
    pub fn new(risk_per_trade: f64, stop_atr_multiple: f64) -> Self {
        Self {
            risk_per_trade,
            stop_atr_multiple,
            mode: SizingMode::AtrRisk,
        }
    }

    pub fn with_mode(self, mode: SizingMode) -> Self {
        Self { mode, ..self }
    }

    /// Order quantity; 0.0 when ATR or cash is not positive.
    pub fn size(&self, cash: f64, atr: f64) -> f64 {
        if atr <= 0.0 || cash <= 0.0 || !atr.is_finite() || !cash.is_finite() {
            return 0.0;
        }
        let stop_distance = self.stop_distance(atr);
        if stop_distance <= 0.0 {
            return 0.0;
        }
        ((cash * self.risk_per_trade) / stop_distance).max(0.0)
    }

    /// Quantity under the configured mode. `atr` is only read by
    /// [`SizingMode::AtrRisk`]. Returns 0.0 for degenerate inputs.
    pub fn order_size(&self, cash: f64, price: f64, atr: Option<f64>) -> f64 {
        match self.mode {
            SizingMode::AtrRisk => atr.map_or(0.0, |atr| self.size(cash, atr)),
            SizingMode::BalancePct { pct } => balance_quantity(cash, price, pct),
            SizingMode::Kelly {
                win_prob,
                win_loss_ratio,
            } => balance_quantity(cash, price, kelly_fraction(win_prob, win_loss_ratio)),
        }
    }

    /// multiple * ATR; the stop sits this far below the entry price.
    pub fn stop_distance(&self, atr: f64) -> f64 {
        self.stop_atr_multiple * atr
    }
}

/// `fraction` of `cash` converted to units at `price`, rounded to six
/// decimals as exchanges accept.
pub fn balance_quantity(cash: f64, price: f64, fraction: f64) -> f64 {
    if !(cash.is_finite() && price.is_finite() && fraction.is_finite()) {
        return 0.0;
    }
    if cash <= 0.0 || price <= 0.0 || fraction <= 0.0 {
        return 0.0;
    }
    ((cash * fraction / price) * 1e6).round() / 1e6
}

/// Kelly criterion fraction, clamped to [0, 1].
///
/// f = p - (1 - p) / b, with p the win probability and b the win/loss ratio.
pub fn kelly_fraction(win_prob: f64, win_loss_ratio: f64) -> f64 {
    if win_loss_ratio <= 0.0 {
        return 0.0;
    }
    let f = win_prob - (1.0 - win_prob) / win_loss_ratio;
    f.clamp(0.0, 1.0)
}
