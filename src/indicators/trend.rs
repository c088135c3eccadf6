use rust_decimal::Decimal;

use super::{atr::true_range, Indicator, Window};
use crate::types::Bar;

/// Wilder running sum: a plain sum over the first `period` inputs, then
/// `s - s / period + x`.
#[derive(Debug, Clone, Default)]
struct WilderSum {
    total: Decimal,
    seen: usize,
}

impl WilderSum {
    fn add(&mut self, value: Decimal, period: usize) -> bool {
        self.seen += 1;
        if self.seen <= period {
            self.total += value;
        } else {
            self.total = self.total - self.total / Decimal::from(period as u64) + value;
        }
        self.seen >= period
    }
}

/// Average directional index.
#[derive(Debug, Clone)]
pub struct ADX {
    period: usize,
    prev: Option<Bar>,
    tr: WilderSum,
    plus_dm: WilderSum,
    minus_dm: WilderSum,
    dx_seed: Window,
    value: Option<Decimal>,
}

impl ADX {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev: None,
            tr: WilderSum::default(),
            plus_dm: WilderSum::default(),
            minus_dm: WilderSum::default(),
            dx_seed: Window::new(period),
            value: None,
        }
    }

    pub fn default_params() -> Self {
        Self::new(14)
    }

    fn directional_index(&self) -> Decimal {
        if self.tr.total.is_zero() {
            return Decimal::ZERO;
        }
        let plus = self.plus_dm.total / self.tr.total;
        let minus = self.minus_dm.total / self.tr.total;
        if (plus + minus).is_zero() {
            Decimal::ZERO
        } else {
            (plus - minus).abs() / (plus + minus) * Decimal::ONE_HUNDRED
        }
    }
}

impl Indicator for ADX {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "ADX"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        let prev = self.prev.replace(bar.clone())?;

        let up = bar.high - prev.high;
        let down = prev.low - bar.low;
        let plus_dm = if up > down && up > Decimal::ZERO { up } else { Decimal::ZERO };
        let minus_dm = if down > up && down > Decimal::ZERO { down } else { Decimal::ZERO };

        let period = self.period;
        self.plus_dm.add(plus_dm, period);
        self.minus_dm.add(minus_dm, period);
        if !self.tr.add(true_range(bar, Some(prev.close)), period) {
            return None;
        }

        let dx = self.directional_index();
        let n = Decimal::from(period as u64);
        self.value = match self.value {
            Some(adx) => Some((adx * (n - Decimal::ONE) + dx) / n),
            None => {
                self.dx_seed.push(dx);
                self.dx_seed.mean()
            }
        };
        self.value
    }

    fn reset(&mut self) {
        *self = Self::new(self.period);
    }
}

/// Commodity channel index over typical prices with the usual 0.015 constant.
#[derive(Debug, Clone)]
pub struct CCI {
    typical: Window,
}

impl CCI {
    pub fn new(period: usize) -> Self {
        Self {
            typical: Window::new(period),
        }
    }
}

impl Indicator for CCI {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "CCI"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        let price = bar.typical_price();
        self.typical.push(price);
        let mean = self.typical.mean()?;
        let deviation = self.typical.mean_deviation().filter(|d| !d.is_zero())?;
        Some((price - mean) / (Decimal::new(15, 3) * deviation))
    }

    fn reset(&mut self) {
        self.typical.clear();
    }
}
