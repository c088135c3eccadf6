use rust_decimal::Decimal;

use super::{Indicator, Window};
use crate::types::Bar;

/// Largest of the bar's range and its gaps against the previous close.
pub(crate) fn true_range(bar: &Bar, prev_close: Option<Decimal>) -> Decimal {
    let range = bar.range();
    match prev_close {
        Some(prev) => range
            .max((bar.high - prev).abs())
            .max((bar.low - prev).abs()),
        None => range,
    }
}

/// Average true range with Wilder smoothing.
#[derive(Debug, Clone)]
pub struct ATR {
    period: usize,
    prev_close: Option<Decimal>,
    seed: Window,
    average: Option<Decimal>,
}

impl ATR {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            seed: Window::new(period),
            average: None,
        }
    }
}

impl Indicator for ATR {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "ATR"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        let tr = true_range(bar, self.prev_close.replace(bar.close));
        let n = Decimal::from(self.period as u64);

        self.average = match self.average {
            Some(avg) => Some((avg * (n - Decimal::ONE) + tr) / n),
            None => {
                self.seed.push(tr);
                self.seed.mean()
            }
        };
        self.average
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.seed.clear();
        self.average = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::testing::bar;
    use rust_decimal_macros::dec;

    #[test]
    fn test_gap_dominates_range() {
        let b = bar(dec!(12), dec!(11), dec!(11.5));
        assert_eq!(true_range(&b, Some(dec!(8))), dec!(4));
        assert_eq!(true_range(&b, Some(dec!(13))), dec!(2));
        assert_eq!(true_range(&b, None), dec!(1));
    }

    #[test]
    fn test_steady_range() {
        let mut atr = ATR::new(3);
        let out: Vec<_> = (0..6).map(|_| atr.next(&bar(dec!(11), dec!(9), dec!(10)))).collect();
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(dec!(2)));
        assert_eq!(out[5], Some(dec!(2)));
    }
}
