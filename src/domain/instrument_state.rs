//! Everything the orchestrator keeps for one instrument between steps.

use chrono::NaiveDateTime;

use crate::domain::decision::TradeDecision;
use crate::domain::ml::FeatureHistory;
use crate::domain::position::{OpenPosition, PositionState};
use crate::domain::signal::crossover::CrossSignal;
use crate::domain::signal::learned::TrainedModel;
use crate::ports::execution_port::{Fill, PositionReport};

/// Quantities closer than this are treated as equal when reconciling.
const SIZE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct InstrumentState {
    pub symbol: String,
    pub position: PositionState,
    pub features: FeatureHistory,
    pub model: Option<TrainedModel>,
    /// Previous bar's class, for transition-triggered engines.
    pub cross_signal: Option<CrossSignal>,
    pub last_bar: Option<NaiveDateTime>,
}

/// How local state was corrected to match the execution collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Local state said long, the collaborator holds nothing.
    ClosedExternally { local_size: f64 },
    /// The collaborator holds a position local state did not know about.
    Adopted { size: f64, entry_price: f64 },
    /// Both long with different quantities.
    Resized { local_size: f64, actual_size: f64 },
}

impl InstrumentState {
    pub fn new(symbol: impl Into<String>, history_capacity: Option<usize>) -> Self {
        Self {
            symbol: symbol.into(),
            position: PositionState::Flat,
            features: FeatureHistory::new(history_capacity),
            model: None,
            cross_signal: None,
            last_bar: None,
        }
    }

    /// Advance the position after a confirmed fill of `decision`. The stop
    /// is anchored to the fill price, not the decision bar's close.
    pub fn apply_fill(&mut self, decision: &TradeDecision, fill: &Fill) {
        match decision {
            TradeDecision::EnterLong { stop_distance, .. } => {
                self.position = PositionState::Long(OpenPosition {
                    entry_price: fill.price,
                    stop_loss_price: stop_distance.map(|d| fill.price - d),
                    size: fill.quantity,
                    entry_time: fill.timestamp,
                });
            }
            TradeDecision::ExitLong { .. } => self.position = PositionState::Flat,
            TradeDecision::NoAction => {}
        }
    }

    /// Make local state agree with `report`, which is authoritative.
    pub fn reconcile(
        &mut self,
        report: Option<&PositionReport>,
        timestamp: NaiveDateTime,
    ) -> Option<Reconciliation> {
        let actual = report.filter(|r| r.size > SIZE_TOLERANCE);
        let local = self.position.is_long().then(|| self.position.size());
        match (local, actual) {
            (None, None) => None,
            (Some(local_size), None) => {
                self.position = PositionState::Flat;
                Some(Reconciliation::ClosedExternally { local_size })
            }
            (None, Some(r)) => {
                self.position = PositionState::Long(OpenPosition {
                    entry_price: r.entry_price,
                    stop_loss_price: None,
                    size: r.size,
                    entry_time: timestamp,
                });
                Some(Reconciliation::Adopted {
                    size: r.size,
                    entry_price: r.entry_price,
                })
            }
            (Some(local_size), Some(r)) => {
                if (local_size - r.size).abs() <= SIZE_TOLERANCE {
                    return None;
                }
                if let PositionState::Long(open) = &mut self.position {
                    open.size = r.size;
                }
                Some(Reconciliation::Resized {
                    local_size,
                    actual_size: r.size,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::ExitReason;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn fill(price: f64, quantity: f64) -> Fill {
        Fill {
            symbol: "ETHUSDT".into(),
            timestamp: ts(),
            price,
            quantity,
            commission: 0.0,
        }
    }

    #[test]
    fn enter_fill_sets_entry_and_stop() {
        let mut state = InstrumentState::new("ETHUSDT", None);
        let decision = TradeDecision::EnterLong {
            size: 3.0,
            stop_distance: Some(10.0),
        };
        state.apply_fill(&decision, &fill(100.0, 3.0));
        assert_eq!(state.position.entry_price(), Some(100.0));
        assert_eq!(state.position.stop_loss_price(), Some(90.0));
        assert!((state.position.size() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stop_follows_a_slipped_fill() {
        let mut state = InstrumentState::new("ETHUSDT", None);
        let decision = TradeDecision::EnterLong {
            size: 1.0,
            stop_distance: Some(10.0),
        };
        // decided at a close of 100, filled at 102
        state.apply_fill(&decision, &fill(102.0, 1.0));
        assert_eq!(state.position.entry_price(), Some(102.0));
        assert_eq!(state.position.stop_loss_price(), Some(92.0));
    }

    #[test]
    fn exit_fill_goes_flat() {
        let mut state = InstrumentState::new("ETHUSDT", None);
        state.apply_fill(
            &TradeDecision::EnterLong {
                size: 1.0,
                stop_distance: None,
            },
            &fill(100.0, 1.0),
        );
        state.apply_fill(
            &TradeDecision::ExitLong {
                reason: ExitReason::SignalReversal,
            },
            &fill(105.0, 1.0),
        );
        assert_eq!(state.position, PositionState::Flat);
    }

    #[test]
    fn reconcile_closed_externally() {
        let mut state = InstrumentState::new("ETHUSDT", None);
        state.apply_fill(
            &TradeDecision::EnterLong {
                size: 2.0,
                stop_distance: Some(5.0),
            },
            &fill(100.0, 2.0),
        );
        let change = state.reconcile(None, ts());
        assert_eq!(
            change,
            Some(Reconciliation::ClosedExternally { local_size: 2.0 })
        );
        assert!(!state.position.is_long());
    }

    #[test]
    fn reconcile_adopts_unknown_position() {
        let mut state = InstrumentState::new("ETHUSDT", None);
        let report = PositionReport {
            size: 1.5,
            entry_price: 200.0,
        };
        let change = state.reconcile(Some(&report), ts());
        assert!(matches!(change, Some(Reconciliation::Adopted { .. })));
        assert_eq!(state.position.entry_price(), Some(200.0));
        assert_eq!(state.position.stop_loss_price(), None);
    }

    #[test]
    fn reconcile_matching_is_noop() {
        let mut state = InstrumentState::new("ETHUSDT", None);
        assert_eq!(state.reconcile(None, ts()), None);
        let dust = PositionReport {
            size: 1e-12,
            entry_price: 1.0,
        };
        assert_eq!(state.reconcile(Some(&dust), ts()), None);

        state.apply_fill(
            &TradeDecision::EnterLong {
                size: 2.0,
                stop_distance: None,
            },
            &fill(100.0, 2.0),
        );
        let same = PositionReport {
            size: 2.0,
            entry_price: 100.0,
        };
        assert_eq!(state.reconcile(Some(&same), ts()), None);
        let smaller = PositionReport {
            size: 1.0,
            entry_price: 100.0,
        };
        assert_eq!(
            state.reconcile(Some(&smaller), ts()),
            Some(Reconciliation::Resized {
                local_size: 2.0,
                actual_size: 1.0
            })
        );
    }
}
