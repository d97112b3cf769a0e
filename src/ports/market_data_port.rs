//! Market data source port.

use chrono::NaiveDate;

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::Candle;

pub trait MarketDataSource {
    /// Full history in `[start, end]` (inclusive dates, either bound optional),
    /// ordered by timestamp.
    fn fetch_candles(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, SigtraderError>;

    /// The newest `window` candles, oldest first. Polling may advance a feed.
    fn recent_candles(&mut self, symbol: &str, window: usize)
    -> Result<Vec<Candle>, SigtraderError>;
}
