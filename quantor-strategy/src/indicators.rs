use rust_decimal::{Decimal, MathematicalOps};
use std::collections::VecDeque;

/// Simple moving average indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sma {
    period: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
}

impl Sma {
    /// Create a new SMA with the given period.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            values: VecDeque::new(),
            sum: Decimal::ZERO,
        }
    }

    /// Update the SMA with a new value and return the latest average.
    pub fn update(&mut self, value: Decimal) -> Decimal {
        self.values.push_back(value);
        self.sum += value;
        if self.values.len() > self.period {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.average()
    }

    /// Current average value.
    pub fn average(&self) -> Decimal {
        if self.values.is_empty() {
            Decimal::ZERO
        } else {
            self.sum / Decimal::from(self.values.len() as u64)
        }
    }

    /// Whether a full period of samples has been observed.
    pub fn is_warm(&self) -> bool {
        self.values.len() >= self.period
    }
}

/// Exponential moving average indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ema {
    multiplier: Decimal,
    value: Option<Decimal>,
}

impl Ema {
    /// Create a new EMA with the given period.
    pub fn new(period: usize) -> Self {
        let multiplier = Decimal::from(2u64) / Decimal::from(period.max(1) as u64 + 1);
        Self {
            multiplier,
            value: None,
        }
    }

    /// Update the EMA with a new price and return the latest value.
    pub fn update(&mut self, price: Decimal) -> Decimal {
        match self.value {
            Some(val) => {
                let next = (price - val) * self.multiplier + val;
                self.value = Some(next);
                next
            }
            None => {
                self.value = Some(price);
                price
            }
        }
    }

    /// Current EMA value if initialised.
    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

/// Relative strength index with Wilder smoothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rsi {
    period: usize,
    last: Option<Decimal>,
    avg_gain: Decimal,
    avg_loss: Decimal,
    samples: usize,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            last: None,
            avg_gain: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            samples: 0,
        }
    }

    /// Update with a new close and return the latest RSI once warm.
    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        let Some(last) = self.last.replace(close) else {
            return None;
        };

        let change = close - last;
        let (gain, loss) = if change >= Decimal::ZERO {
            (change, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -change)
        };

        let period = Decimal::from(self.period as u64);
        if self.samples < self.period {
            // Seed phase: plain average of the first `period` changes.
            self.avg_gain += gain;
            self.avg_loss += loss;
            self.samples += 1;
            if self.samples == self.period {
                self.avg_gain /= period;
                self.avg_loss /= period;
            } else {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (period - Decimal::ONE) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - Decimal::ONE) + loss) / period;
        }

        Some(self.value())
    }

    fn value(&self) -> Decimal {
        if self.avg_loss.is_zero() {
            return Decimal::ONE_HUNDRED;
        }
        let rs = self.avg_gain / self.avg_loss;
        Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs)
    }
}

/// Bollinger bands output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Bands {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
}

/// Bollinger bands over a rolling close window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bollinger {
    period: usize,
    k: Decimal,
    values: VecDeque<Decimal>,
}

impl Bollinger {
    pub fn new(period: usize, k: Decimal) -> Self {
        Self {
            period: period.max(1),
            k,
            values: VecDeque::new(),
        }
    }

    /// Update with a new close and return the latest bands once warm.
    pub fn update(&mut self, close: Decimal) -> Option<Bands> {
        self.values.push_back(close);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
        self.bands()
    }

    /// Bands over the current window, without consuming a new sample. `None` until warm.
    pub fn bands(&self) -> Option<Bands> {
        if self.values.len() < self.period {
            return None;
        }

        let count = Decimal::from(self.values.len() as u64);
        let mean = self.values.iter().copied().sum::<Decimal>() / count;
        let variance = self
            .values
            .iter()
            .map(|value| {
                let deviation = *value - mean;
                deviation * deviation
            })
            .sum::<Decimal>()
            / count;
        let std_dev = variance.sqrt()?;

        Some(Bands {
            upper: mean + self.k * std_dev,
            middle: mean,
            lower: mean - self.k * std_dev,
        })
    }
}

/// MACD output.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MacdOutput {
    pub macd: Decimal,
    pub signal: Decimal,
    pub histogram: Decimal,
}

/// Moving average convergence divergence (12, 26, 9 by default).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    samples: usize,
    slow_period: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self {
            fast: Ema::new(fast),
            slow: Ema::new(slow),
            signal: Ema::new(signal),
            samples: 0,
            slow_period: slow,
        }
    }

    /// Update with a new close and return the latest output once the slow EMA is warm.
    pub fn update(&mut self, close: Decimal) -> Option<MacdOutput> {
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);
        self.samples += 1;

        let macd = fast - slow;
        let signal = self.signal.update(macd);

        if self.samples < self.slow_period {
            return None;
        }

        Some(MacdOutput {
            macd,
            signal,
            histogram: macd - signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sma_rolls_over_window() {
        let mut sma = Sma::new(3);
        assert_eq!(sma.update(dec!(1)), dec!(1));
        assert_eq!(sma.update(dec!(2)), dec!(1.5));
        assert_eq!(sma.update(dec!(3)), dec!(2));
        assert!(sma.is_warm());
        // 2, 3, 4
        assert_eq!(sma.update(dec!(4)), dec!(3));
    }

    #[test]
    fn test_ema_seeds_with_first_value() {
        let mut ema = Ema::new(9);
        assert_eq!(ema.value(), None);
        assert_eq!(ema.update(dec!(10)), dec!(10));
        let next = ema.update(dec!(20));
        assert!(next > dec!(10) && next < dec!(20));
    }

    #[test]
    fn test_rsi_extremes() {
        // Monotonically rising closes push RSI to 100.
        let mut rsi = Rsi::new(14);
        let mut latest = None;
        for close in 1..=20 {
            latest = rsi.update(Decimal::from(close));
        }
        assert_eq!(latest, Some(Decimal::ONE_HUNDRED));

        // Monotonically falling closes push RSI towards 0.
        let mut rsi = Rsi::new(14);
        let mut latest = None;
        for close in (1..=20).rev() {
            latest = rsi.update(Decimal::from(close));
        }
        assert_eq!(latest, Some(Decimal::ZERO));
    }

    #[test]
    fn test_rsi_warms_after_period_changes() {
        let mut rsi = Rsi::new(14);
        for close in 1..=14 {
            assert_eq!(rsi.update(Decimal::from(close)), None, "still seeding");
        }
        assert!(rsi.update(dec!(15)).is_some());
    }

    #[test]
    fn test_bollinger_bands_symmetry() {
        let mut bollinger = Bollinger::new(4, Decimal::TWO);
        assert_eq!(bollinger.update(dec!(10)), None);
        assert_eq!(bollinger.update(dec!(12)), None);
        assert_eq!(bollinger.update(dec!(10)), None);

        let bands = bollinger.update(dec!(12)).unwrap();
        assert_eq!(bands.middle, dec!(11));
        assert_eq!(bands.upper - bands.middle, bands.middle - bands.lower);
        assert_eq!(bands.upper, dec!(13));
    }

    #[test]
    fn test_macd_crossover_sign() {
        let mut macd = Macd::new(3, 6, 3);

        // Rising closes: fast EMA above slow, positive MACD.
        let mut latest = None;
        for close in 1..=10 {
            latest = macd.update(Decimal::from(close * 10));
        }
        let rising = latest.unwrap();
        assert!(rising.macd > Decimal::ZERO);

        // A sharp reversal drags the MACD line below its signal line.
        let mut latest = rising;
        for close in (1..=8).rev() {
            if let Some(output) = macd.update(Decimal::from(close * 10)) {
                latest = output;
            }
        }
        assert!(latest.histogram < Decimal::ZERO);
    }
}
