use chrono::NaiveDate;
use ndarray::Array2;
use rust_decimal::Decimal;
use tracing::debug;

use super::{
    run, to_f64, BollingerBands, Stochastic, WilliamsR, ADX, ATR, CCI, EMA, MACD, OBV, ROC, RSI,
    SMA,
};
use crate::error::{ForecastError, Result};
use crate::types::PriceSeries;

/// Moving-average windows included when the series is at least this long.
pub const MA_PERIODS: [usize; 4] = [5, 10, 20, 50];
pub const CLOSE_COLUMN: &str = "Close";

/// Dense feature table: one row per retained date, one column per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl IndicatorFrame {
    /// Builds a dense frame from sparse columns.
    ///
    /// Each column is forward-filled then back-filled; rows that still hold a
    /// gap (a column with no value at all) are dropped. Non-finite values
    /// count as gaps.
    pub fn from_columns(dates: Vec<NaiveDate>, columns: Vec<(String, Vec<Option<f64>>)>) -> Self {
        let n_rows = dates.len();
        let mut names = Vec::with_capacity(columns.len());
        let mut filled = Vec::with_capacity(columns.len());

        for (name, mut values) in columns {
            debug_assert_eq!(values.len(), n_rows, "column {} misaligned", name);
            values.resize(n_rows, None);
            fill_gaps(&mut values);
            names.push(name);
            filled.push(values);
        }

        let keep: Vec<usize> = (0..n_rows)
            .filter(|&row| filled.iter().all(|col| col[row].is_some()))
            .collect();

        let mut values = Array2::<f64>::zeros((keep.len(), names.len()));
        for (out_row, &row) in keep.iter().enumerate() {
            for (j, col) in filled.iter().enumerate() {
                values[[out_row, j]] = col[row].unwrap_or_default();
            }
        }

        Self {
            dates: keep.iter().map(|&row| dates[row]).collect(),
            columns: names,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn feature_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.values.column(idx).to_vec())
    }

    pub fn closes(&self) -> Option<Vec<f64>> {
        self.column(CLOSE_COLUMN)
    }

    /// Projects the frame onto `names` in that order.
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.columns.iter().position(|c| c == name) {
                Some(idx) => indices.push(idx),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(ForecastError::SchemaMismatch { missing });
        }

        Ok(self.values.select(ndarray::Axis(1), &indices))
    }
}

fn fill_gaps(values: &mut [Option<f64>]) {
    let mut last = None;
    for v in values.iter_mut() {
        if v.map_or(true, |x| !x.is_finite()) {
            *v = last;
        } else {
            last = *v;
        }
    }

    let mut next = None;
    for v in values.iter_mut().rev() {
        match v {
            Some(_) => next = *v,
            None => *v = next,
        }
    }
}

/// Turns a price series into the technical-indicator feature frame.
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn compute(series: &PriceSeries) -> IndicatorFrame {
        let bars = series.bars();
        let n = bars.len();
        let closes: Vec<Option<f64>> = bars.iter().map(|b| to_f64(b.close)).collect();

        let mut columns: Vec<(String, Vec<Option<f64>>)> = vec![
            ("Open".to_string(), bars.iter().map(|b| to_f64(b.open)).collect()),
            ("High".to_string(), bars.iter().map(|b| to_f64(b.high)).collect()),
            ("Low".to_string(), bars.iter().map(|b| to_f64(b.low)).collect()),
            (CLOSE_COLUMN.to_string(), closes.clone()),
            ("Volume".to_string(), bars.iter().map(|b| to_f64(b.volume)).collect()),
        ];

        let mut sma_20 = None;
        for period in MA_PERIODS {
            if n < period {
                continue;
            }
            let sma_values = to_column(run(&mut SMA::new(period), bars));
            let ema_values = to_column(run(&mut EMA::new(period), bars));
            if period == 20 {
                sma_20 = Some(sma_values.clone());
            }
            columns.push((format!("SMA_{}", period), sma_values));
            columns.push((format!("EMA_{}", period), ema_values));
        }

        columns.push(("RSI".to_string(), to_column(run(&mut RSI::new(14), bars))));

        let macd = run(&mut MACD::default_params(), bars);
        columns.push(("MACD".to_string(), to_column(macd.iter().map(|o| o.macd_line))));
        columns.push(("MACD_signal".to_string(), to_column(macd.iter().map(|o| o.signal_line))));
        columns.push(("MACD_hist".to_string(), to_column(macd.iter().map(|o| o.histogram))));

        let stoch = run(&mut Stochastic::default_params(), bars);
        columns.push(("STOCH_k".to_string(), to_column(stoch.iter().map(|(k, _)| *k))));
        columns.push(("STOCH_d".to_string(), to_column(stoch.iter().map(|(_, d)| *d))));

        let bands = run(&mut BollingerBands::default_params(), bars);
        columns.push(("BB_high".to_string(), to_column(bands.iter().map(|b| b.map(|b| b.upper)))));
        columns.push(("BB_low".to_string(), to_column(bands.iter().map(|b| b.map(|b| b.lower)))));
        columns.push(("BB_pct".to_string(), to_column(bands.iter().map(|b| b.and_then(|b| b.percent_b)))));

        columns.push(("ATR".to_string(), to_column(run(&mut ATR::new(14), bars))));
        columns.push(("ADX".to_string(), to_column(run(&mut ADX::default_params(), bars))));
        columns.push(("Williams_R".to_string(), to_column(run(&mut WilliamsR::new(14), bars))));
        columns.push(("CCI".to_string(), to_column(run(&mut CCI::new(20), bars))));
        columns.push(("ROC".to_string(), to_column(run(&mut ROC::new(12), bars))));

        if series.total_volume() > Decimal::ZERO {
            let obv = run(&mut OBV::new(), bars);
            columns.push(("OBV".to_string(), to_column(obv.into_iter().map(Some))));
        }

        if let Some(sma_20) = sma_20 {
            let relative = closes
                .iter()
                .zip(&sma_20)
                .map(|(close, avg)| match (close, avg) {
                    (Some(c), Some(a)) if *a != 0.0 => Some((c - a) / a * 100.0),
                    _ => None,
                })
                .collect();
            columns.push(("price_vs_SMA20".to_string(), relative));
        }

        columns.push(("return_1d".to_string(), pct_change(&closes, 1)));
        columns.push(("return_5d".to_string(), pct_change(&closes, 5)));

        let frame = IndicatorFrame::from_columns(series.dates(), columns);
        debug!(
            "Indicator frame: {} of {} rows retained, {} features",
            frame.len(),
            n,
            frame.feature_names().len()
        );
        frame
    }
}

fn to_column(values: impl IntoIterator<Item = Option<Decimal>>) -> Vec<Option<f64>> {
    values.into_iter().map(|v| v.and_then(to_f64)).collect()
}

/// Percent change against the value `periods` rows earlier.
pub fn pct_change(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i < periods {
                return None;
            }
            match (values[i], values[i - periods]) {
                (Some(cur), Some(prev)) if prev != 0.0 => Some((cur / prev - 1.0) * 100.0),
                _ => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::synthetic_series;

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.1).collect()
    }

    #[test]
    fn test_fill_gaps_forward_then_backward() {
        let mut values = vec![None, None, Some(1.0), None, Some(f64::NAN), Some(3.0), None];
        fill_gaps(&mut values);
        assert_eq!(
            values,
            vec![Some(1.0), Some(1.0), Some(1.0), Some(1.0), Some(1.0), Some(3.0), Some(3.0)]
        );
    }

    #[test]
    fn test_all_missing_column_drops_every_row() {
        let dates: Vec<NaiveDate> = (1..=3).map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap()).collect();
        let frame = IndicatorFrame::from_columns(
            dates,
            vec![
                ("a".to_string(), vec![Some(1.0), Some(2.0), Some(3.0)]),
                ("b".to_string(), vec![None, None, None]),
            ],
        );
        assert!(frame.is_empty());
        assert_eq!(frame.feature_names().len(), 2);
    }

    #[test]
    fn test_full_history_column_set() {
        let frame = IndicatorEngine::compute(&synthetic_series(&wave(120)));

        let expected = [
            "Open", "High", "Low", "Close", "Volume", "SMA_5", "EMA_5", "SMA_10", "EMA_10",
            "SMA_20", "EMA_20", "SMA_50", "EMA_50", "RSI", "MACD", "MACD_signal", "MACD_hist",
            "STOCH_k", "STOCH_d", "BB_high", "BB_low", "BB_pct", "ATR", "ADX", "Williams_R", "CCI",
            "ROC", "OBV", "price_vs_SMA20", "return_1d", "return_5d",
        ];
        let names: Vec<&str> = frame.feature_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, expected);
        assert_eq!(frame.len(), 120);
        assert!(frame.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_dates_are_ordered_subset_of_input() {
        let series = synthetic_series(&wave(80));
        let frame = IndicatorEngine::compute(&series);
        let input = series.dates();

        assert!(!frame.is_empty());
        assert!(frame.dates().windows(2).all(|w| w[0] < w[1]));
        assert!(frame.dates().iter().all(|d| input.contains(d)));
    }

    #[test]
    fn test_short_history_omits_long_averages() {
        let frame = IndicatorEngine::compute(&synthetic_series(&wave(40)));
        let names = frame.feature_names();

        assert!(names.iter().any(|n| n == "SMA_20"));
        assert!(!names.iter().any(|n| n == "SMA_50" || n == "EMA_50"));
        assert!(names.iter().any(|n| n == "price_vs_SMA20"));
    }

    #[test]
    fn test_zero_volume_omits_obv() {
        let series = synthetic_series(&wave(60));
        let bars = series
            .bars()
            .iter()
            .cloned()
            .map(|mut b| {
                b.volume = Decimal::ZERO;
                b
            })
            .collect();
        let frame = IndicatorEngine::compute(&PriceSeries::new(bars));
        assert!(frame.column("OBV").is_none());
        assert!(frame.column("RSI").is_some());
    }

    #[test]
    fn test_empty_series_gives_empty_frame() {
        let frame = IndicatorEngine::compute(&PriceSeries::default());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_select_reports_missing_columns() {
        let frame = IndicatorEngine::compute(&synthetic_series(&wave(40)));
        let wanted = vec!["Close".to_string(), "SMA_50".to_string()];
        match frame.select(&wanted) {
            Err(ForecastError::SchemaMismatch { missing }) => assert_eq!(missing, vec!["SMA_50".to_string()]),
            other => panic!("expected schema mismatch, got {:?}", other),
        }

        let subset = frame.select(&["RSI".to_string(), "Close".to_string()]).unwrap();
        assert_eq!(subset.ncols(), 2);
        assert_eq!(subset.column(1).to_vec(), frame.closes().unwrap());
    }

    #[test]
    fn test_pct_change() {
        let values = vec![Some(100.0), Some(110.0), Some(99.0)];
        let changes = pct_change(&values, 1);
        assert_eq!(changes[0], None);
        assert!((changes[1].unwrap() - 10.0).abs() < 1e-9);
        assert!((changes[2].unwrap() + 10.0).abs() < 1e-9);
    }
}
