//! Resolves configuration into a signal engine and run settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::backtest::BacktestConfig;
use crate::domain::config_validation::{
    invalid, read_bool, read_date, read_f64, read_positive_f64, read_usize, read_usize_list,
    validate_date_range,
};
use crate::domain::error::SigtraderError;
use crate::domain::indicator::bundle::IndicatorParams;
use crate::domain::live::LiveConfig;
use crate::domain::ml::ForestConfig;
use crate::domain::signal::{
    CrossoverSignalEngine, CrossoverThresholds, LearnedConfig, LearnedSignalEngine,
    LearnedVariant, RuleBasedSignalEngine, RuleThresholds, SignalEngine,
};
use crate::domain::sizing::{PositionSizer, SizingMode};
use crate::domain::universe::require_symbols;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Rule,
    Learned,
    LearnedLagged,
    Crossover,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rule" => Ok(StrategyKind::Rule),
            "learned" => Ok(StrategyKind::Learned),
            "learned_lagged" => Ok(StrategyKind::LearnedLagged),
            "crossover" => Ok(StrategyKind::Crossover),
            other => Err(format!(
                "unknown strategy '{}', expected rule, learned, learned_lagged or crossover",
                other
            )),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Rule => write!(f, "rule"),
            StrategyKind::Learned => write!(f, "learned"),
            StrategyKind::LearnedLagged => write!(f, "learned_lagged"),
            StrategyKind::Crossover => write!(f, "crossover"),
        }
    }
}

/// Everything needed to build an engine, resolved from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySettings {
    pub kind: StrategyKind,
    pub params: IndicatorParams,
    pub thresholds: RuleThresholds,
    pub sizer: PositionSizer,
    pub learned: LearnedConfig,
    pub crossover: CrossoverThresholds,
}

impl StrategySettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SigtraderError> {
        let kind = match config.get_string("strategy", "kind") {
            Some(raw) => raw
                .parse()
                .map_err(|reason: String| invalid("strategy", "kind", reason))?,
            None => StrategyKind::Rule,
        };
        Self::for_kind(config, kind)
    }

    /// Settings for `kind` regardless of `[strategy] kind`. Kind-dependent
    /// defaults (learned variant, sizing mode, short EMA) follow `kind`.
    pub fn for_kind(config: &dyn ConfigPort, kind: StrategyKind) -> Result<Self, SigtraderError> {
        let conservative = rules_preset_is_conservative(config)?;
        Ok(Self {
            kind,
            params: build_indicator_params(config, kind)?,
            thresholds: build_rule_thresholds(config, conservative)?,
            sizer: build_sizer(config, conservative, kind)?,
            learned: build_learned_config(config, kind)?,
            crossover: build_crossover_thresholds(config)?,
        })
    }

    pub fn build_engine(&self) -> Box<dyn SignalEngine> {
        match self.kind {
            StrategyKind::Rule => Box::new(RuleBasedSignalEngine::new(
                self.thresholds.clone(),
                self.sizer,
            )),
            StrategyKind::Learned | StrategyKind::LearnedLagged => {
                Box::new(LearnedSignalEngine::new(self.learned.clone()))
            }
            StrategyKind::Crossover => Box::new(CrossoverSignalEngine::new(
                self.crossover.clone(),
                self.sizer,
            )),
        }
    }

    /// Bars an instrument needs before the configured engine can act.
    pub fn required_history(&self) -> usize {
        self.build_engine().required_history(&self.params)
    }
}

fn rules_preset_is_conservative(config: &dyn ConfigPort) -> Result<bool, SigtraderError> {
    match config.get_string("rules", "preset") {
        None => Ok(false),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "" | "default" => Ok(false),
            "conservative" => Ok(true),
            other => Err(invalid(
                "rules",
                "preset",
                format!("unknown preset '{}', expected default or conservative", other),
            )),
        },
    }
}

pub fn build_indicator_params(
    config: &dyn ConfigPort,
    kind: StrategyKind,
) -> Result<IndicatorParams, SigtraderError> {
    let mut d = IndicatorParams::default();
    if kind == StrategyKind::Crossover {
        d.short_window = 5;
    }
    let s = "indicators";
    let params = IndicatorParams {
        short_window: read_usize(config, s, "short_window", d.short_window, 1)?,
        long_window: read_usize(config, s, "long_window", d.long_window, 1)?,
        atr_period: read_usize(config, s, "atr_period", d.atr_period, 1)?,
        rsi_period: read_usize(config, s, "rsi_period", d.rsi_period, 1)?,
        adx_period: read_usize(config, s, "adx_period", d.adx_period, 1)?,
        macd_fast: read_usize(config, s, "macd_fast", d.macd_fast, 1)?,
        macd_slow: read_usize(config, s, "macd_slow", d.macd_slow, 1)?,
        macd_signal: read_usize(config, s, "macd_signal", d.macd_signal, 1)?,
        bollinger_period: read_usize(config, s, "bollinger_period", d.bollinger_period, 1)?,
        bollinger_mult: read_positive_f64(config, s, "bollinger_mult", d.bollinger_mult, 10.0)?,
        stochastic_k: read_usize(config, s, "stochastic_k", d.stochastic_k, 1)?,
        stochastic_d_fast: read_usize(config, s, "stochastic_d_fast", d.stochastic_d_fast, 1)?,
        stochastic_d_slow: read_usize(config, s, "stochastic_d_slow", d.stochastic_d_slow, 1)?,
        ichimoku_tenkan: read_usize(config, s, "ichimoku_tenkan", d.ichimoku_tenkan, 1)?,
        ichimoku_kijun: read_usize(config, s, "ichimoku_kijun", d.ichimoku_kijun, 1)?,
        ichimoku_senkou: read_usize(config, s, "ichimoku_senkou", d.ichimoku_senkou, 1)?,
        ichimoku_lead: read_usize(config, s, "ichimoku_lead", d.ichimoku_lead, 0)?,
        feature_ema_period: read_usize(config, s, "feature_ema_period", d.feature_ema_period, 1)?,
    };
    if params.short_window >= params.long_window {
        return Err(invalid(s, "short_window", "must be less than long_window"));
    }
    if params.macd_fast >= params.macd_slow {
        return Err(invalid(s, "macd_fast", "must be less than macd_slow"));
    }
    Ok(params)
}

pub fn build_rule_thresholds(
    config: &dyn ConfigPort,
    conservative: bool,
) -> Result<RuleThresholds, SigtraderError> {
    let d = if conservative {
        RuleThresholds::conservative()
    } else {
        RuleThresholds::default()
    };
    let s = "rules";
    let thresholds = RuleThresholds {
        entry_adx_min: read_f64(config, s, "entry_adx_min", d.entry_adx_min, 0.0, 100.0)?,
        exit_adx_max: read_f64(config, s, "exit_adx_max", d.exit_adx_max, 0.0, 100.0)?,
        rsi_lower: read_f64(config, s, "rsi_lower", d.rsi_lower, 0.0, 100.0)?,
        rsi_upper: read_f64(config, s, "rsi_upper", d.rsi_upper, 0.0, 100.0)?,
        use_stochastic: read_bool(config, s, "use_stochastic", d.use_stochastic)?,
        use_ichimoku: read_bool(config, s, "use_ichimoku", d.use_ichimoku)?,
    };
    if thresholds.rsi_lower >= thresholds.rsi_upper {
        return Err(invalid(s, "rsi_lower", "must be less than rsi_upper"));
    }
    Ok(thresholds)
}

pub fn build_sizer(
    config: &dyn ConfigPort,
    conservative: bool,
    kind: StrategyKind,
) -> Result<PositionSizer, SigtraderError> {
    let s = "strategy";
    let default_risk = if conservative { 0.05 } else { 0.01 };
    let d = PositionSizer::default();
    let sizer = PositionSizer::new(
        read_positive_f64(config, s, "risk_per_trade", default_risk, 1.0)?,
        read_positive_f64(config, s, "stop_atr_multiple", d.stop_atr_multiple, 100.0)?,
    );

    let default_mode = if kind == StrategyKind::Crossover {
        "balance_pct"
    } else {
        "atr_risk"
    };
    let raw_mode = config
        .get_string(s, "sizing")
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_mode.to_string());
    let mode = match raw_mode.as_str() {
        "atr_risk" => SizingMode::AtrRisk,
        "balance_pct" => SizingMode::BalancePct {
            pct: read_positive_f64(config, s, "balance_pct", 0.01, 1.0)?,
        },
        "kelly" => SizingMode::Kelly {
            win_prob: read_f64(config, s, "kelly_win_prob", 0.55, 0.0, 1.0)?,
            win_loss_ratio: read_positive_f64(config, s, "kelly_win_loss_ratio", 1.0, 1_000.0)?,
        },
        other => {
            return Err(invalid(
                s,
                "sizing",
                format!("unknown sizing '{}', expected atr_risk, balance_pct or kelly", other),
            ));
        }
    };
    Ok(sizer.with_mode(mode))
}

pub fn build_crossover_thresholds(
    config: &dyn ConfigPort,
) -> Result<CrossoverThresholds, SigtraderError> {
    let d = CrossoverThresholds::default();
    let s = "crossover";
    let thresholds = CrossoverThresholds {
        rsi_buy_below: read_f64(config, s, "rsi_buy_below", d.rsi_buy_below, 0.0, 100.0)?,
        rsi_sell_above: read_f64(config, s, "rsi_sell_above", d.rsi_sell_above, 0.0, 100.0)?,
    };
    if thresholds.rsi_buy_below > thresholds.rsi_sell_above {
        return Err(invalid(s, "rsi_buy_below", "must not exceed rsi_sell_above"));
    }
    Ok(thresholds)
}

pub fn build_learned_config(
    config: &dyn ConfigPort,
    kind: StrategyKind,
) -> Result<LearnedConfig, SigtraderError> {
    let d = LearnedConfig::default();
    let f = ForestConfig::default();
    let s = "learned";

    let forest = ForestConfig {
        n_trees: read_usize(config, s, "n_trees", f.n_trees, 1)?,
        max_depth: read_usize(config, s, "max_depth", f.max_depth, 1)?,
        min_samples_split: read_usize(config, s, "min_samples_split", f.min_samples_split, 2)?,
        min_samples_leaf: read_usize(config, s, "min_samples_leaf", f.min_samples_leaf, 1)?,
        seed: read_usize(config, s, "seed", f.seed as usize, 0)? as u64,
        ..f
    };

    let variant = match kind {
        StrategyKind::LearnedLagged => LearnedVariant::LaggedCv {
            lags: read_usize(config, s, "lags", 3, 1)?,
            cv_folds: read_usize(config, s, "cv_folds", 3, 2)?,
            depth_grid: {
                let grid = read_usize_list(config, s, "depth_grid", &[4, 8], 1)?;
                if grid.is_empty() {
                    return Err(invalid(s, "depth_grid", "must list at least one depth"));
                }
                grid
            },
        },
        StrategyKind::Rule | StrategyKind::Learned | StrategyKind::Crossover => {
            LearnedVariant::Refit
        }
    };

    let mut learned = LearnedConfig {
        lookback: read_usize(config, s, "lookback", d.lookback, 1)?,
        margin: read_usize(config, s, "margin", d.margin, 0)?,
        forest,
        variant,
        default_order_size: read_positive_f64(
            config,
            s,
            "default_order_size",
            d.default_order_size,
            f64::MAX,
        )?,
        max_history: None,
    };

    let max_history = read_usize(config, s, "max_history", 0, 0)?;
    if max_history > 0 {
        if max_history <= learned.min_rows() {
            return Err(invalid(
                s,
                "max_history",
                format!(
                    "must be 0 or greater than lookback + margin + lags ({})",
                    learned.min_rows()
                ),
            ));
        }
        learned.max_history = Some(max_history);
    }
    Ok(learned)
}

/// `symbols` replaces the configured `[backtest] symbols` list when given.
pub fn build_backtest_config(
    config: &dyn ConfigPort,
    symbols: Option<&str>,
) -> Result<BacktestConfig, SigtraderError> {
    let s = "backtest";
    let symbols = match symbols {
        Some(list) => require_symbols(Some(list), s)?,
        None => require_symbols(config.get_string(s, "symbols").as_deref(), s)?,
    };
    let start_date = read_date(config, s, "start_date")?;
    let end_date = read_date(config, s, "end_date")?;
    validate_date_range(start_date, end_date, s)?;
    Ok(BacktestConfig {
        symbols,
        data_dir: config
            .get_string(s, "data_dir")
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "data".to_string()),
        start_date,
        end_date,
        initial_capital: read_positive_f64(config, s, "initial_capital", 10_000.0, f64::MAX)?,
        commission_pct: read_f64(config, s, "commission_pct", 0.001, 0.0, 0.5)?,
    })
}

pub fn build_live_config(config: &dyn ConfigPort) -> Result<LiveConfig, SigtraderError> {
    let s = "live";
    let d = LiveConfig::default();
    let max_iterations = read_usize(config, s, "max_iterations", 0, 0)?;
    Ok(LiveConfig {
        poll_interval: Duration::from_secs(
            read_usize(config, s, "poll_interval_secs", d.poll_interval.as_secs() as usize, 1)? as u64,
        ),
        error_backoff: Duration::from_secs(
            read_usize(config, s, "error_backoff_secs", d.error_backoff.as_secs() as usize, 0)? as u64,
        ),
        window_bars: read_usize(config, s, "window_bars", d.window_bars, 2)?,
        max_iterations: (max_iterations > 0).then_some(max_iterations),
    })
}

/// Stop and take-profit distances for live brackets, as fractions of the fill.
pub fn build_bracket_pcts(config: &dyn ConfigPort) -> Result<(f64, f64), SigtraderError> {
    Ok((
        read_positive_f64(config, "live", "bracket_stop_pct", 0.02, 0.99)?,
        read_positive_f64(config, "live", "bracket_take_profit_pct", 0.02, 10.0)?,
    ))
}

/// Starting state of the paper exchange account.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperAccount {
    pub quote_asset: String,
    pub balance: f64,
    pub commission_pct: f64,
}

pub fn build_paper_account(config: &dyn ConfigPort) -> Result<PaperAccount, SigtraderError> {
    let quote_asset = config
        .get_string("live", "quote_asset")
        .map(|q| q.trim().to_uppercase())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| "USDT".to_string());
    let initial_capital =
        read_positive_f64(config, "backtest", "initial_capital", 10_000.0, f64::MAX)?;
    Ok(PaperAccount {
        quote_asset,
        balance: read_positive_f64(config, "live", "paper_balance", initial_capital, f64::MAX)?,
        commission_pct: read_f64(config, "backtest", "commission_pct", 0.001, 0.0, 0.5)?,
    })
}

/// The `[live] symbols` list, when one is configured.
pub fn live_symbols(config: &dyn ConfigPort) -> Option<String> {
    config
        .get_string("live", "symbols")
        .filter(|list| !list.trim().is_empty())
}
