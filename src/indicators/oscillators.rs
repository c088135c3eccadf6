use rust_decimal::Decimal;

use super::{Indicator, Window};
use crate::types::Bar;

/// Highest high and lowest low over the same trailing window.
#[derive(Debug, Clone)]
struct Extremes {
    highs: Window,
    lows: Window,
}

impl Extremes {
    fn new(period: usize) -> Self {
        Self {
            highs: Window::new(period),
            lows: Window::new(period),
        }
    }

    /// `(highest, lowest)` once full, skipping windows with no range.
    fn push(&mut self, bar: &Bar) -> Option<(Decimal, Decimal)> {
        self.highs.push(bar.high);
        self.lows.push(bar.low);
        let (high, low) = (self.highs.max()?, self.lows.min()?);
        (high > low).then_some((high, low))
    }

    fn clear(&mut self) {
        self.highs.clear();
        self.lows.clear();
    }
}

/// Stochastic %K over `period` bars with %D as its `smooth`-bar average.
#[derive(Debug, Clone)]
pub struct Stochastic {
    extremes: Extremes,
    k_history: Window,
}

impl Stochastic {
    pub fn new(period: usize, smooth: usize) -> Self {
        Self {
            extremes: Extremes::new(period),
            k_history: Window::new(smooth),
        }
    }

    /// 14 bars, 3-bar %D.
    pub fn default_params() -> Self {
        Self::new(14, 3)
    }
}

impl Indicator for Stochastic {
    /// `(%K, %D)`
    type Output = (Option<Decimal>, Option<Decimal>);

    fn name(&self) -> &'static str {
        "Stochastic"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        let Some((high, low)) = self.extremes.push(bar) else {
            // %D needs `smooth` consecutive defined %K readings
            self.k_history.clear();
            return (None, None);
        };
        let k = (bar.close - low) / (high - low) * Decimal::ONE_HUNDRED;
        self.k_history.push(k);
        (Some(k), self.k_history.mean())
    }

    fn reset(&mut self) {
        self.extremes.clear();
        self.k_history.clear();
    }
}

/// Williams %R in `[-100, 0]`.
#[derive(Debug, Clone)]
pub struct WilliamsR {
    extremes: Extremes,
}

impl WilliamsR {
    pub fn new(period: usize) -> Self {
        Self {
            extremes: Extremes::new(period),
        }
    }
}

impl Indicator for WilliamsR {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "WilliamsR"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        let (high, low) = self.extremes.push(bar)?;
        Some((bar.close - high) / (high - low) * Decimal::ONE_HUNDRED)
    }

    fn reset(&mut self) {
        self.extremes.clear();
    }
}

/// Percent change of the close against the close `period` bars back.
#[derive(Debug, Clone)]
pub struct ROC {
    closes: Window,
}

impl ROC {
    pub fn new(period: usize) -> Self {
        Self {
            closes: Window::new(period + 1),
        }
    }
}

impl Indicator for ROC {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "ROC"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        self.closes.push(bar.close);
        if !self.closes.is_full() {
            return None;
        }
        let base = self.closes.oldest().filter(|b| !b.is_zero())?;
        Some((bar.close / base - Decimal::ONE) * Decimal::ONE_HUNDRED)
    }

    fn reset(&mut self) {
        self.closes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::run;
    use crate::indicators::testing::{bar, flat_bars};
    use rust_decimal_macros::dec;

    #[test]
    fn test_stochastic_k_and_d() {
        let mut stoch = Stochastic::new(3, 2);
        let bars = [
            bar(dec!(10), dec!(8), dec!(9)),
            bar(dec!(11), dec!(9), dec!(10)),
            bar(dec!(12), dec!(10), dec!(12)),
            bar(dec!(13), dec!(11), dec!(11)),
        ];
        let out = run(&mut stoch, &bars);

        assert_eq!(out[1], (None, None));
        assert_eq!(out[2], (Some(dec!(100)), None));
        assert_eq!(out[3], (Some(dec!(50)), Some(dec!(75))));
    }

    #[test]
    fn test_stochastic_undefined_on_flat_window() {
        let mut stoch = Stochastic::new(2, 1);
        let out = run(&mut stoch, &flat_bars(&[dec!(5), dec!(5), dec!(6)]));
        assert_eq!(out[1], (None, None));
        assert_eq!(out[2], (Some(dec!(100)), Some(dec!(100))));
    }

    #[test]
    fn test_williams_r_extremes() {
        let mut wr = WilliamsR::new(2);
        let out = run(
            &mut wr,
            &[
                bar(dec!(10), dec!(5), dec!(7)),
                bar(dec!(9), dec!(6), dec!(5)),
                bar(dec!(12), dec!(8), dec!(12)),
            ],
        );
        assert_eq!(out, vec![None, Some(dec!(-100)), Some(dec!(0))]);
    }

    #[test]
    fn test_roc_looks_back_period_bars() {
        let mut roc = ROC::new(2);
        let out = run(&mut roc, &flat_bars(&[dec!(100), dec!(105), dec!(110), dec!(84)]));
        assert_eq!(out, vec![None, None, Some(dec!(10)), Some(dec!(-20))]);
    }
}
