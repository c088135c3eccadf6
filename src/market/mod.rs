pub mod yahoo;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::PriceSeries;

pub use yahoo::YahooClient;

/// Source of daily OHLCV history.
///
/// Implementations return bars deduplicated by date in ascending order and
/// fail with `DataUnavailable` when the range holds no bars.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn daily_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries>;
}
