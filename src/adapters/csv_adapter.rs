//! CSV candle files: `<data_dir>/<SYMBOL>.csv`.
//!
//! Expected header: `timestamp,open,high,low,close,volume`. Timestamps are
//! `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD` (midnight).

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::error::SigtraderError;
use crate::domain::ohlcv::{Candle, find_ordering_violation};
use crate::ports::market_data_port::MarketDataSource;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvMarketData {
    data_dir: PathBuf,
}

impl CsvMarketData {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", symbol))
    }

    /// Every candle in the file, sorted by timestamp.
    pub fn read_all(&self, symbol: &str) -> Result<Vec<Candle>, SigtraderError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(SigtraderError::NoData {
                symbol: symbol.to_string(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|e| SigtraderError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut candles = Vec::new();

        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| SigtraderError::Data {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let field = |index: usize, name: &str| {
                record.get(index).ok_or_else(|| SigtraderError::Data {
                    reason: format!("{} row {}: missing {} column", path.display(), line + 1, name),
                })
            };
            let number = |index: usize, name: &str| -> Result<f64, SigtraderError> {
                let value: f64 =
                    field(index, name)?
                        .trim()
                        .parse()
                        .map_err(|e| SigtraderError::Data {
                            reason: format!("{} row {}: invalid {}: {}", path.display(), line + 1, name, e),
                        })?;
                if !value.is_finite() {
                    return Err(SigtraderError::Data {
                        reason: format!("{} row {}: {} is not finite", path.display(), line + 1, name),
                    });
                }
                Ok(value)
            };
            let price = |index: usize, name: &str| -> Result<f64, SigtraderError> {
                let value = number(index, name)?;
                if value <= 0.0 {
                    return Err(SigtraderError::Data {
                        reason: format!("{} row {}: {} must be positive, got {}", path.display(), line + 1, name, value),
                    });
                }
                Ok(value)
            };

            let timestamp = parse_timestamp(field(0, "timestamp")?).ok_or_else(|| {
                SigtraderError::Data {
                    reason: format!("{} row {}: invalid timestamp", path.display(), line + 1),
                }
            })?;

            candles.push(Candle {
                symbol: symbol.to_string(),
                timestamp,
                open: price(1, "open")?,
                high: price(2, "high")?,
                low: price(3, "low")?,
                close: price(4, "close")?,
                volume: number(5, "volume")?,
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        if let Some(i) = find_ordering_violation(&candles) {
            return Err(SigtraderError::Data {
                reason: format!(
                    "{}: duplicate timestamp {}",
                    path.display(),
                    candles[i].timestamp
                ),
            });
        }
        Ok(candles)
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl MarketDataSource for CsvMarketData {
    fn fetch_candles(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<Candle>, SigtraderError> {
        let mut candles = self.read_all(symbol)?;
        candles.retain(|c| {
            let date = c.timestamp.date();
            start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
        });
        Ok(candles)
    }

    fn recent_candles(
        &mut self,
        symbol: &str,
        window: usize,
    ) -> Result<Vec<Candle>, SigtraderError> {
        let mut candles = self.read_all(symbol)?;
        let excess = candles.len().saturating_sub(window);
        candles.drain(..excess);
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "timestamp,open,high,low,close,volume\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000.5\n";
        fs::write(path.join("BTCUSDT.csv"), csv_content).unwrap();

        let hourly = "timestamp,open,high,low,close,volume\n\
            2024-01-15 10:00:00,1,2,0.5,1.5,10\n\
            2024-01-15 11:00:00,1.5,2,1,1.8,12\n";
        fs::write(path.join("ETHUSDT.csv"), hourly).unwrap();

        let dupes = "timestamp,open,high,low,close,volume\n\
            2024-01-15,1,1,1,1,1\n\
            2024-01-15,1,1,1,1,1\n";
        fs::write(path.join("DUPE.csv"), dupes).unwrap();

        fs::write(
            path.join("BAD.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,x,1,1,1,1\n",
        )
        .unwrap();

        fs::write(
            path.join("NAN.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,1,2,0.5,NaN,10\n",
        )
        .unwrap();
        fs::write(
            path.join("INF.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,1,inf,0.5,1,10\n",
        )
        .unwrap();
        fs::write(
            path.join("ZERO.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-15,1,2,0,1,10\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_sorts_and_parses() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let candles = adapter.fetch_candles("BTCUSDT", None, None).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(
            candles[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
        assert_eq!(candles[0].symbol, "BTCUSDT");
        assert!((candles[0].close - 105.0).abs() < f64::EPSILON);
        assert!((candles[1].volume - 60000.5).abs() < f64::EPSILON);
    }

    #[test]
    fn fetch_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let day = NaiveDate::from_ymd_opt(2024, 1, 16);
        let candles = adapter.fetch_candles("BTCUSDT", day, day).unwrap();
        assert_eq!(candles.len(), 1);
        assert!((candles[0].close - 110.0).abs() < f64::EPSILON);
    }

    #[test]
    fn intraday_timestamps() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);
        let candles = adapter.fetch_candles("ETHUSDT", None, None).unwrap();
        assert_eq!(candles[1].timestamp.format("%H:%M").to_string(), "11:00");
    }

    #[test]
    fn missing_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);
        assert!(matches!(
            adapter.fetch_candles("XYZ", None, None),
            Err(SigtraderError::NoData { .. })
        ));
    }

    #[test]
    fn duplicates_and_garbage_are_data_errors() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);
        assert!(matches!(
            adapter.fetch_candles("DUPE", None, None),
            Err(SigtraderError::Data { .. })
        ));
        assert!(matches!(
            adapter.fetch_candles("BAD", None, None),
            Err(SigtraderError::Data { .. })
        ));
    }

    #[test]
    fn recent_candles_keeps_newest() {
        let (_dir, path) = setup_test_data();
        let mut adapter = CsvMarketData::new(path);
        let recent = adapter.recent_candles("BTCUSDT", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!((recent[1].close - 115.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_and_non_positive_prices_are_data_errors() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);
        for symbol in ["NAN", "INF", "ZERO"] {
            assert!(
                matches!(
                    adapter.fetch_candles(symbol, None, None),
                    Err(SigtraderError::Data { .. })
                ),
                "{symbol}"
            );
        }
    }
}
