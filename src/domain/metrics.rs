//! Performance metrics for a finished backtest.
//!
//! Per-period returns are annualized using the median spacing between equity
//! points, so the same code serves daily and intraday bars.

use std::collections::BTreeMap;

use super::portfolio::{EquityPoint, Portfolio};
use super::position::ClosedTrade;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of equity points below the running peak.
    pub max_drawdown_duration: usize,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio) -> Self {
        let equity_curve = &portfolio.equity_curve;
        let trades = &portfolio.closed_trades;
        let initial_capital = portfolio.initial_capital;

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = ratio(final_equity - initial_capital, initial_capital);

        let periods_per_year = periods_per_year(equity_curve);
        let periods = equity_curve.len().saturating_sub(1) as f64;
        let annualized_return = match periods_per_year {
            Some(ppy) if periods > 0.0 && total_return > -1.0 => {
                (1.0 + total_return).powf(ppy / periods) - 1.0
            }
            _ => 0.0,
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let (sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(equity_curve, periods_per_year.unwrap_or(0.0));

        let wins = TradeSide::collect(trades.iter().map(|t| t.pnl).filter(|&p| p > 0.0));
        let losses = TradeSide::collect(trades.iter().map(|t| -t.pnl).filter(|&p| p > 0.0));
        let total_trades = trades.len();

        let win_rate = ratio(wins.count as f64, total_trades as f64);
        let profit_factor = match (wins.total, losses.total) {
            (_, l) if l > 0.0 => wins.total / l,
            (w, _) if w > 0.0 => f64::INFINITY,
            _ => 0.0,
        };

        Metrics {
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades,
            trades_won: wins.count,
            trades_lost: losses.count,
            win_rate,
            profit_factor,
            avg_win: wins.mean(),
            avg_loss: losses.mean(),
            largest_win: wins.largest,
            largest_loss: losses.largest,
        }
    }
}

/// Count, sum and extreme of the winning (or losing) trades, losses as
/// positive amounts.
#[derive(Debug, Default)]
struct TradeSide {
    count: usize,
    total: f64,
    largest: f64,
}

impl TradeSide {
    fn collect(amounts: impl Iterator<Item = f64>) -> Self {
        amounts.fold(Self::default(), |side, amount| Self {
            count: side.count + 1,
            total: side.total + amount,
            largest: side.largest.max(amount),
        })
    }

    fn mean(&self) -> f64 {
        ratio(self.total, self.count as f64)
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Trade summary for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolResult {
    pub symbol: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub total_pnl: f64,
    pub win_rate: f64,
}

impl SymbolResult {
    /// One entry per symbol that traded, in symbol order.
    pub fn compute_per_symbol(trades: &[ClosedTrade]) -> Vec<SymbolResult> {
        let mut grouped: BTreeMap<&str, Vec<&ClosedTrade>> = BTreeMap::new();
        for trade in trades {
            grouped.entry(trade.symbol.as_str()).or_default().push(trade);
        }
        grouped
            .into_iter()
            .map(|(symbol, trades)| {
                let total_trades = trades.len();
                let winning_trades = trades.iter().filter(|t| t.is_win()).count();
                SymbolResult {
                    symbol: symbol.to_string(),
                    total_trades,
                    winning_trades,
                    total_pnl: trades.iter().map(|t| t.pnl).sum(),
                    win_rate: winning_trades as f64 / total_trades as f64,
                }
            })
            .collect()
    }
}

/// Equity points per year, from the median spacing between points.
fn periods_per_year(equity_curve: &[EquityPoint]) -> Option<f64> {
    let mut spacings: Vec<i64> = equity_curve
        .windows(2)
        .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds())
        .filter(|&s| s > 0)
        .collect();
    if spacings.is_empty() {
        return None;
    }
    spacings.sort_unstable();
    let median = spacings[spacings.len() / 2] as f64;
    Some(SECONDS_PER_YEAR / median)
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, usize) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], periods_per_year: f64) -> (f64, f64) {
    if equity_curve.len() < 2 || periods_per_year <= 0.0 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annualizer = periods_per_year.sqrt();

    let sharpe = ratio(mean, stddev) * annualizer;

    let downside_variance: f64 = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>()
        / n;
    let downside_stddev = downside_variance.sqrt();

    let sortino = ratio(mean, downside_stddev) * annualizer;

    (sharpe, sortino)
}
