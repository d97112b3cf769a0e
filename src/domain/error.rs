//! Domain error types.

/// Top-level error type for sigtrader.
#[derive(Debug, thiserror::Error)]
pub enum SigtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no instruments configured")]
    NoInstruments,

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SigtraderError> for std::process::ExitCode {
    fn from(err: &SigtraderError) -> Self {
        let code: u8 = match err {
            SigtraderError::Io(_) => 1,
            SigtraderError::ConfigParse { .. }
            | SigtraderError::ConfigMissing { .. }
            | SigtraderError::ConfigInvalid { .. }
            | SigtraderError::NoInstruments => 2,
            SigtraderError::Data { .. } => 3,
            SigtraderError::Broker { .. } => 4,
            SigtraderError::NoData { .. } | SigtraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

/// Why the execution collaborator declined a decision.
///
/// A rejection never advances the instrument's position state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("insufficient cash: need {required:.2}, have {available:.2}")]
    InsufficientCash { required: f64, available: f64 },

    #[error("no open position for {symbol}")]
    NoPosition { symbol: String },

    #[error("position already open for {symbol}")]
    AlreadyOpen { symbol: String },

    #[error("invalid order size {size}")]
    InvalidSize { size: f64 },

    #[error("no price available for {symbol}")]
    NoPrice { symbol: String },

    #[error("exchange rejected order: {reason}")]
    Exchange { reason: String },
}
