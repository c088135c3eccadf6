use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info};

use super::MarketDataSource;
use crate::config::DataSettings;
use crate::error::{ForecastError, Result};
use crate::types::{Bar, PriceSeries};

/// Client for the public Yahoo Finance chart API (daily bars only).
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(settings: &DataSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<PriceSeries> {
        if let Some(err) = resp.chart.error {
            debug!("Chart API error for {}: {} {}", symbol, err.code, err.description);
            return Err(ForecastError::DataUnavailable { symbol: symbol.to_string() });
        }

        let Some(result) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
            return Err(ForecastError::DataUnavailable { symbol: symbol.to_string() });
        };
        let offset = result.meta.map(|m| m.gmtoffset).unwrap_or(0);
        let timestamps = result.timestamp.unwrap_or_default();
        let Some(quote) = result.indicators.quote.into_iter().next() else {
            return Err(ForecastError::DataUnavailable { symbol: symbol.to_string() });
        };

        let bars: Vec<Bar> = timestamps
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
                Some(Bar {
                    date,
                    open: to_decimal(quote.open.get(i).copied().flatten())?,
                    high: to_decimal(quote.high.get(i).copied().flatten())?,
                    low: to_decimal(quote.low.get(i).copied().flatten())?,
                    close: to_decimal(quote.close.get(i).copied().flatten())?,
                    volume: to_decimal(quote.volume.get(i).copied().flatten())?,
                })
            })
            .collect();

        if bars.is_empty() {
            return Err(ForecastError::DataUnavailable { symbol: symbol.to_string() });
        }
        Ok(PriceSeries::new(bars))
    }
}

fn to_decimal(value: Option<f64>) -> Option<Decimal> {
    let value = value.filter(|v| v.is_finite())?;
    // shortest round-trip text keeps quoted prices like 185.64 exact
    value.to_string().parse().ok()
}

#[async_trait]
impl MarketDataSource for YahooClient {
    async fn daily_bars(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        // end date is inclusive
        let period2 = end.succ_opt().unwrap_or(end).and_time(NaiveTime::MIN).and_utc().timestamp();
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history",
            self.base_url, symbol, period1, period2
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ForecastError::DataUnavailable { symbol: symbol.to_string() });
        }
        if !status.is_success() {
            return Err(ForecastError::Upstream(format!("{} returned {}", url, status)));
        }

        let body: ChartResponse = response.json().await?;
        let series = Self::parse_chart(symbol, body)?;
        info!("Fetched {} daily bars for {} ({} to {})", series.len(), symbol, start, end);
        Ok(series)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(json: &str) -> Result<PriceSeries> {
        let resp: ChartResponse = serde_json::from_str(json).unwrap();
        YahooClient::parse_chart("AAPL", resp)
    }

    #[test]
    fn test_parse_drops_null_rows_and_duplicates() {
        // 2024-01-02, 2024-01-03 (null close), 2024-01-04, then 2024-01-02 again
        let json = r#"{"chart": {"result": [{
            "meta": {"gmtoffset": -18000},
            "timestamp": [1704205800, 1704292200, 1704378600, 1704205900],
            "indicators": {"quote": [{
                "open":   [187.15, 184.22, 182.15, 1.0],
                "high":   [188.44, 185.88, 183.09, 1.0],
                "low":    [183.89, 183.43, 180.88, 1.0],
                "close":  [185.64, null,   181.91, 1.0],
                "volume": [82488700, 58414500, 71983600, 1]
            }]}
        }], "error": null}}"#;

        let series = parse(json).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(series.bars()[0].close, dec!(185.64));
        assert_eq!(series.bars()[1].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(series.bars()[1].volume, dec!(71983600));
    }

    #[test]
    fn test_unknown_symbol_is_data_unavailable() {
        let json = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        let err = parse(json).unwrap_err();
        assert!(matches!(err, ForecastError::DataUnavailable { ref symbol } if symbol == "AAPL"));
    }

    #[test]
    fn test_empty_range_is_data_unavailable() {
        let json = r#"{"chart": {"result": [{"meta": {"gmtoffset": 0}, "indicators": {"quote": [{}]}}], "error": null}}"#;
        assert!(matches!(parse(json), Err(ForecastError::DataUnavailable { .. })));
    }
}
