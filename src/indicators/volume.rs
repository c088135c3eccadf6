use std::cmp::Ordering;

use rust_decimal::Decimal;

use super::Indicator;
use crate::types::Bar;

/// On-balance volume: running total of volume signed by the close-to-close move.
#[derive(Debug, Clone, Default)]
pub struct OBV {
    prev_close: Option<Decimal>,
    total: Decimal,
}

impl OBV {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Indicator for OBV {
    type Output = Decimal;

    fn name(&self) -> &'static str {
        "OBV"
    }

    fn next(&mut self, bar: &Bar) -> Decimal {
        if let Some(prev) = self.prev_close.replace(bar.close) {
            match bar.close.cmp(&prev) {
                Ordering::Greater => self.total += bar.volume,
                Ordering::Less => self.total -= bar.volume,
                Ordering::Equal => {}
            }
        }
        self.total
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
