use rust_decimal::Decimal;

use super::Indicator;
use crate::types::Bar;

/// Wilder relative strength index. Average gain and loss are seeded with
/// plain means over the first `period` changes, then smoothed by `1/period`.
#[derive(Debug, Clone)]
pub struct RSI {
    period: usize,
    prev_close: Option<Decimal>,
    seeded: usize,
    gain_sum: Decimal,
    loss_sum: Decimal,
    averages: Option<(Decimal, Decimal)>,
}

impl RSI {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            seeded: 0,
            gain_sum: Decimal::ZERO,
            loss_sum: Decimal::ZERO,
            averages: None,
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        let prev = self.prev_close.replace(close)?;
        let delta = close - prev;
        let gain = delta.max(Decimal::ZERO);
        let loss = (-delta).max(Decimal::ZERO);
        let n = Decimal::from(self.period as u64);

        self.averages = match self.averages {
            Some((avg_gain, avg_loss)) => Some((
                (avg_gain * (n - Decimal::ONE) + gain) / n,
                (avg_loss * (n - Decimal::ONE) + loss) / n,
            )),
            None => {
                self.seeded += 1;
                self.gain_sum += gain;
                self.loss_sum += loss;
                (self.seeded == self.period).then(|| (self.gain_sum / n, self.loss_sum / n))
            }
        };

        self.averages
            .map(|(avg_gain, avg_loss)| strength_index(avg_gain, avg_loss))
    }
}

fn strength_index(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss.is_zero() {
        return Decimal::ONE_HUNDRED;
    }
    Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + avg_gain / avg_loss)
}

impl Indicator for RSI {
    type Output = Option<Decimal>;

    fn name(&self) -> &'static str {
        "RSI"
    }

    fn next(&mut self, bar: &Bar) -> Self::Output {
        self.update(bar.close)
    }

    fn reset(&mut self) {
        *self = Self::new(self.period);
    }
}
