//! Trade decisions and the reasons a step produced none.

use std::fmt;

use crate::domain::ml::FitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    SignalReversal,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop-loss"),
            ExitReason::SignalReversal => write!(f, "signal reversal"),
        }
    }
}

/// What a signal engine wants done for one instrument at one bar.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeDecision {
    NoAction,
    EnterLong {
        size: f64,
        /// Stop distance below the fill price, fixed at decision time;
        /// `None` for learned entries.
        stop_distance: Option<f64>,
    },
    ExitLong {
        reason: ExitReason,
    },
}

impl TradeDecision {
    pub fn is_action(&self) -> bool {
        !matches!(self, TradeDecision::NoAction)
    }
}

impl fmt::Display for TradeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDecision::NoAction => write!(f, "no action"),
            TradeDecision::EnterLong {
                size,
                stop_distance: Some(distance),
            } => write!(f, "enter long {:.6} (stop {:.4} below fill)", size, distance),
            TradeDecision::EnterLong {
                size,
                stop_distance: None,
            } => write!(f, "enter long {:.6}", size),
            TradeDecision::ExitLong { reason } => write!(f, "exit long ({})", reason),
        }
    }
}

/// A locally recovered condition: the instrument is skipped for this step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SkipReason {
    #[error("indicator data unavailable")]
    DataUnavailable,

    #[error("insufficient history: have {have} rows, need more than {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("degenerate sizing: atr={atr}, size={size}")]
    DegenerateSizing { atr: f64, size: f64 },

    #[error("model fit failed: {0}")]
    FitFailure(#[from] FitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_display() {
        let enter = TradeDecision::EnterLong {
            size: 0.5,
            stop_distance: Some(10.0),
        };
        assert_eq!(enter.to_string(), "enter long 0.500000 (stop 10.0000 below fill)");
        let exit = TradeDecision::ExitLong {
            reason: ExitReason::StopLoss,
        };
        assert_eq!(exit.to_string(), "exit long (stop-loss)");
        assert!(!TradeDecision::NoAction.is_action());
        assert!(exit.is_action());
    }

    #[test]
    fn skip_reason_wraps_fit_error() {
        let skip: SkipReason = FitError::SingleClass.into();
        assert_eq!(skip.to_string(), "model fit failed: training labels contain a single class");
    }
}
