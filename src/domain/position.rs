//! Per-instrument position state and the closed-trade record.

use chrono::NaiveDateTime;

/// Details of an open long position.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub entry_price: f64,
    /// Fixed at entry, never trailed. Learned-model entries carry no stop.
    pub stop_loss_price: Option<f64>,
    pub size: f64,
    pub entry_time: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Flat,
    Long,
}

/// Flat, or long with the entry details. Entry data exists only while long.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Long(OpenPosition),
}

impl PositionState {
    pub fn status(&self) -> PositionStatus {
        match self {
            PositionState::Flat => PositionStatus::Flat,
            PositionState::Long(_) => PositionStatus::Long,
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, PositionState::Long(_))
    }

    pub fn entry_price(&self) -> Option<f64> {
        match self {
            PositionState::Long(p) => Some(p.entry_price),
            PositionState::Flat => None,
        }
    }

    pub fn stop_loss_price(&self) -> Option<f64> {
        match self {
            PositionState::Long(p) => p.stop_loss_price,
            PositionState::Flat => None,
        }
    }

    pub fn size(&self) -> f64 {
        match self {
            PositionState::Long(p) => p.size,
            PositionState::Flat => 0.0,
        }
    }

    /// True when long with a stop and `price` is at or below it.
    pub fn should_stop_loss(&self, price: f64) -> bool {
        self.stop_loss_price().is_some_and(|stop| price <= stop)
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        match self {
            PositionState::Long(p) => p.size * (price - p.entry_price),
            PositionState::Flat => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    /// Net of commission on both legs.
    pub pnl: f64,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
