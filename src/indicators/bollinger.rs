use rust_decimal::Decimal;

use super::{Indicator, Window};
use crate::types::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerOutput {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
    /// Position of the close inside the bands; undefined when they collapse.
    pub percent_b: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct BollingerBands {
    window: Window,
    width: Decimal,
}

impl BollingerBands {
    pub fn new(period: usize, width: Decimal) -> Self {
        Self {
            window: Window::new(period),
            width,
        }
    }

    /// 20 closes, two standard deviations.
    pub fn default_params() -> Self {
        Self::new(20, Decimal::TWO)
    }

    pub fn update(&mut self, close: Decimal) -> Option<BollingerOutput> {
        self.window.push(close);
        let middle = self.window.mean()?;
        let offset = self.window.std_dev()? * self.width;
        let (upper, lower) = (middle + offset, middle - offset);

        Some(BollingerOutput {
            upper,
            middle,
            lower,
            percent_b: (upper > lower).then(|| (close - lower) / (upper - lower)),
        })
    }
}

impl Indicator for BollingerBands {
    type Output = Option<BollingerOutput>;

    fn name(&self) -> &'static str {
        "BollingerBands"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        self.update(bar.close)
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_collapsed_bands() {
        let mut bands = BollingerBands::new(3, dec!(2));
        let out = [dec!(10), dec!(10), dec!(10)].map(|p| bands.update(p));

        assert!(out[1].is_none());
        let last = out[2].unwrap();
        assert_eq!((last.upper, last.lower), (dec!(10), dec!(10)));
        assert_eq!(last.percent_b, None);
    }

    #[test]
    fn test_close_near_top_of_bands() {
        let mut bands = BollingerBands::new(4, dec!(2));
        let mut last = None;
        for p in [dec!(10), dec!(12), dec!(11), dec!(14)] {
            last = bands.update(p);
        }
        let out = last.unwrap();
        assert_eq!(out.middle, dec!(11.75));
        assert!(out.upper > out.middle && out.middle > out.lower);
        assert!(out.percent_b.unwrap() > dec!(0.5));
    }
}
