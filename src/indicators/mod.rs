pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod frame;
pub mod macd;
pub mod oscillators;
pub mod rsi;
pub mod trend;
pub mod volume;

pub use atr::ATR;
pub use bollinger::BollingerBands;
pub use ema::{EMA, SMA};
pub use frame::{IndicatorEngine, IndicatorFrame};
pub use macd::MACD;
pub use oscillators::{Stochastic, WilliamsR, ROC};
pub use rsi::RSI;
pub use trend::{ADX, CCI};
pub use volume::OBV;

use std::collections::VecDeque;

use rust_decimal::prelude::{MathematicalOps, ToPrimitive};
use rust_decimal::Decimal;
use tracing::trace;

use crate::types::Bar;

/// A streaming indicator fed one daily bar at a time, oldest first.
pub trait Indicator {
    type Output;

    fn name(&self) -> &'static str;

    fn next(&mut self, bar: &Bar) -> Self::Output;

    fn reset(&mut self);
}

/// Feeds every bar through `indicator` and collects one output per bar.
pub fn run<I: Indicator>(indicator: &mut I, bars: &[Bar]) -> Vec<I::Output> {
    trace!(indicator = indicator.name(), bars = bars.len(), "running indicator");
    bars.iter().map(|bar| indicator.next(bar)).collect()
}

/// Trailing window over the last `capacity` values. Statistics are only
/// defined once the window is full.
#[derive(Debug, Clone)]
pub struct Window {
    capacity: usize,
    values: VecDeque<Decimal>,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Appends `value` and returns the value that fell out, if any.
    pub fn push(&mut self, value: Decimal) -> Option<Decimal> {
        self.values.push_back(value);
        if self.values.len() > self.capacity {
            self.values.pop_front()
        } else {
            None
        }
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.values.len() == self.capacity
    }

    pub fn oldest(&self) -> Option<Decimal> {
        self.values.front().copied()
    }

    pub fn mean(&self) -> Option<Decimal> {
        if !self.is_full() {
            return None;
        }
        Some(self.values.iter().sum::<Decimal>() / Decimal::from(self.capacity as u64))
    }

    pub fn max(&self) -> Option<Decimal> {
        self.is_full().then(|| self.values.iter().max().copied()).flatten()
    }

    pub fn min(&self) -> Option<Decimal> {
        self.is_full().then(|| self.values.iter().min().copied()).flatten()
    }

    /// Mean absolute deviation around the window mean.
    pub fn mean_deviation(&self) -> Option<Decimal> {
        let mean = self.mean()?;
        let total: Decimal = self.values.iter().map(|v| (*v - mean).abs()).sum();
        Some(total / Decimal::from(self.capacity as u64))
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<Decimal> {
        let mean = self.mean()?;
        let variance = self
            .values
            .iter()
            .map(|v| (*v - mean) * (*v - mean))
            .sum::<Decimal>()
            / Decimal::from(self.capacity as u64);
        variance.sqrt()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Lossy conversion used when indicator output enters the float feature frame.
pub fn to_f64(value: Decimal) -> Option<f64> {
    value.to_f64().filter(|v| v.is_finite())
}


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filled(capacity: usize, values: &[Decimal]) -> Window {
        let mut window = Window::new(capacity);
        for v in values {
            window.push(*v);
        }
        window
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = Window::new(2);
        assert_eq!(window.push(dec!(1)), None);
        assert_eq!(window.mean(), None);
        window.push(dec!(5));
        assert_eq!(window.push(dec!(3)), Some(dec!(1)));
        assert_eq!(window.oldest(), Some(dec!(5)));
        assert_eq!(window.mean(), Some(dec!(4)));
        assert_eq!(window.max(), Some(dec!(5)));
        assert_eq!(window.min(), Some(dec!(3)));
    }

    #[test]
    fn test_population_std_dev() {
        let window = filled(8, &[dec!(2), dec!(4), dec!(4), dec!(4), dec!(5), dec!(5), dec!(7), dec!(9)]);
        let sd = window.std_dev().unwrap();
        assert!((sd - dec!(2)).abs() < dec!(0.000001));
        assert_eq!(window.mean_deviation(), Some(dec!(1.5)));
    }

    #[test]
    fn test_to_f64_round_trips_prices() {
        assert_eq!(to_f64(dec!(185.64)), Some(185.64));
        assert_eq!(to_f64(Decimal::ZERO), Some(0.0));
    }
}
