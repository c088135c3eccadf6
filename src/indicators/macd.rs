use rust_decimal::Decimal;

use super::{Indicator, EMA};
use crate::types::Bar;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MACDOutput {
    pub macd_line: Option<Decimal>,
    pub signal_line: Option<Decimal>,
    pub histogram: Option<Decimal>,
}

/// Fast EMA minus slow EMA, with an EMA of that difference as the signal.
#[derive(Debug, Clone)]
pub struct MACD {
    periods: (usize, usize, usize),
    fast: EMA,
    slow: EMA,
    signal: EMA,
}

impl MACD {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            periods: (fast, slow, signal),
            fast: EMA::new(fast),
            slow: EMA::new(slow),
            signal: EMA::new(signal),
        }
    }

    /// 12/26/9.
    pub fn default_params() -> Self {
        Self::new(12, 26, 9)
    }

    pub fn update(&mut self, close: Decimal) -> MACDOutput {
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);
        let macd_line = fast.zip(slow).map(|(f, s)| f - s);
        // the signal EMA only sees values once the line exists
        let signal_line = macd_line.and_then(|line| self.signal.update(line));

        MACDOutput {
            macd_line,
            signal_line,
            histogram: macd_line.zip(signal_line).map(|(line, signal)| line - signal),
        }
    }
}

impl Indicator for MACD {
    type Output = MACDOutput;

    fn name(&self) -> &'static str {
        "MACD"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        self.update(bar.close)
    }

    fn reset(&mut self) {
        let (fast, slow, signal) = self.periods;
        *self = Self::new(fast, slow, signal);
    }
}
