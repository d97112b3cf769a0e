//! Replays stored candle histories as if they were arriving live.
//!
//! Each `recent_candles` call for a symbol reveals one more bar, so a paper
//! live session walks through history at the polling rate.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::Candle;
use crate::ports::market_data_port::MarketDataSource;

#[derive(Debug, Clone)]
struct Feed {
    candles: Vec<Candle>,
    /// Number of bars already revealed.
    cursor: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayMarketData {
    feeds: BTreeMap<String, Feed>,
}

impl ReplayMarketData {
    /// `revealed` bars of every history are visible before the first poll.
    pub fn new(histories: BTreeMap<String, Vec<Candle>>, revealed: usize) -> Self {
        let feeds = histories
            .into_iter()
            .map(|(symbol, candles)| {
                let cursor = revealed.min(candles.len());
                (symbol, Feed { candles, cursor })
            })
            .collect();
        Self { feeds }
    }

    /// True once every feed has revealed its final bar.
    pub fn is_exhausted(&self) -> bool {
        self.feeds.values().all(|f| f.cursor >= f.candles.len())
    }

    fn feed(&self, symbol: &str) -> Result<&Feed, SigtraderError> {
        self.feeds.get(symbol).ok_or_else(|| SigtraderError::NoData {
            symbol: symbol.to_string(),
        })
    }
}

impl MarketDataSource for ReplayMarketData {
    fn fetch_candles(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, SigtraderError> {
        let feed = self.feed(symbol)?;
        Ok(feed.candles[..feed.cursor]
            .iter()
            .filter(|c| {
                let date = c.timestamp.date();
                start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
            })
            .cloned()
            .collect())
    }

    fn recent_candles(
        &mut self,
        symbol: &str,
        window: usize,
    ) -> Result<Vec<Candle>, SigtraderError> {
        let feed = self
            .feeds
            .get_mut(symbol)
            .ok_or_else(|| SigtraderError::NoData {
                symbol: symbol.to_string(),
            })?;
        if feed.cursor < feed.candles.len() {
            feed.cursor += 1;
        }
        let start = feed.cursor.saturating_sub(window);
        Ok(feed.candles[start..feed.cursor].to_vec())
    }
}
