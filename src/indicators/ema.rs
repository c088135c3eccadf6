use rust_decimal::Decimal;

use super::{Indicator, Window};
use crate::types::Bar;

/// Simple moving average of closes.
#[derive(Debug, Clone)]
pub struct SMA {
    window: Window,
}

impl SMA {
    pub fn new(period: usize) -> Self {
        Self {
            window: Window::new(period),
        }
    }

    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        self.window.push(value);
        self.window.mean()
    }
}

impl Indicator for SMA {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "SMA"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        self.update(bar.close)
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Exponential moving average with smoothing `2 / (period + 1)`. The first
/// value is the plain average of the first `period` inputs.
#[derive(Debug, Clone)]
pub struct EMA {
    alpha: Decimal,
    seed: Window,
    current: Option<Decimal>,
}

impl EMA {
    pub fn new(period: usize) -> Self {
        Self {
            alpha: Decimal::TWO / Decimal::from(period as u64 + 1),
            seed: Window::new(period),
            current: None,
        }
    }

    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        self.current = match self.current {
            Some(prev) => Some(prev + self.alpha * (value - prev)),
            None => {
                self.seed.push(value);
                self.seed.mean()
            }
        };
        self.current
    }
}

impl Indicator for EMA {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "EMA"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        self.update(bar.close)
    }

    fn reset(&mut self) {
        self.seed.clear();
        self.current = None;
    }
}
