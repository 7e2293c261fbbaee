//! Running mean/max over a window of recorded values.

use tally_core::AggregateSummary;

/// Count, running sum, and running max of recorded values.
///
/// Overflow of `total` is not guarded; a window would need to record
/// around 2^63 milliseconds of age to reach it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningAggregate {
    count: u64,
    total: i64,
    max: i64,
}

impl RunningAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, value: i64) {
        self.count += 1;
        self.total += value;
        if value > self.max {
            self.max = value;
        }
    }

    /// Rounded mean, or 0 when nothing was recorded.
    pub fn mean(&self) -> i64 {
        if self.count == 0 {
            return 0;
        }
        (self.total as f64 / self.count as f64).round() as i64
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fractional samples for caller-named aggregates (ratios, averages).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleAggregate {
    count: u64,
    sum: f64,
    max: f64,
}

impl SampleAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, value: f64) {
        if self.count == 0 || value > self.max {
            self.max = value;
        }
        self.count += 1;
        self.sum += value;
    }

    /// Arithmetic mean, or 0 when nothing was recorded.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn summary(&self) -> AggregateSummary {
        AggregateSummary {
            mean: self.mean(),
            max: self.max,
            count: self.count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mean_is_zero() {
        let agg = RunningAggregate::new();
        assert_eq!(agg.mean(), 0);
        assert_eq!(agg.max(), 0);
        assert_eq!(agg.count(), 0);
    }

    #[test]
    fn mean_and_max() {
        let mut agg = RunningAggregate::new();
        agg.record(1000);
        agg.record(3000);
        agg.record(2000);
        assert_eq!(agg.mean(), 2000);
        assert_eq!(agg.max(), 3000);
        assert_eq!(agg.count(), 3);
        assert_eq!(agg.total(), 6000);
    }

    #[test]
    fn mean_rounds() {
        let mut agg = RunningAggregate::new();
        agg.record(1);
        agg.record(2);
        // 1.5 rounds up.
        assert_eq!(agg.mean(), 2);

        agg.record(2);
        // 5 / 3 = 1.67
        assert_eq!(agg.mean(), 2);

        let mut agg = RunningAggregate::new();
        agg.record(10);
        agg.record(10);
        agg.record(11);
        // 31 / 3 = 10.33
        assert_eq!(agg.mean(), 10);
    }

    #[test]
    fn reset_clears_everything() {
        let mut agg = RunningAggregate::new();
        agg.record(500);
        agg.reset();
        assert_eq!(agg, RunningAggregate::default());
        assert_eq!(agg.mean(), 0);
    }

    #[test]
    fn samples_keep_fractions_and_negative_max() {
        let mut agg = SampleAggregate::new();
        agg.record(-0.5);
        agg.record(-0.25);
        assert_eq!(agg.max(), -0.25);
        assert_eq!(agg.mean(), -0.375);

        agg.record(0.75);
        assert_eq!(
            agg.summary(),
            AggregateSummary {
                mean: 0.0,
                max: 0.75,
                count: 3,
            }
        );
    }

    #[test]
    fn empty_samples_summarize_to_zero() {
        assert_eq!(SampleAggregate::new().summary(), AggregateSummary::default());
    }
}
