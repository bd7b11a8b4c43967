//! Streaming min/max/mean/median over a set of observations.

/// Basic statistics derived from a data set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
}

/// Accumulates observations one at a time and compiles a [`StatsReport`].
///
/// `report` consumes the compiler: a compiler covers exactly one data set and
/// is not reused across scrape cycles.
#[derive(Debug)]
pub struct StatsCompiler {
    min: f64,
    max: f64,
    sum: f64,
    samples: Vec<f64>,
}

impl StatsCompiler {
    /// `capacity` is a hint for the expected number of samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn observe(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.samples.push(value);
    }

    /// Compiles the report. An empty data set reports all zeros.
    pub fn report(mut self) -> StatsReport {
        let num = self.samples.len();
        if num == 0 {
            return StatsReport {
                min: 0.0,
                max: 0.0,
                avg: 0.0,
                median: 0.0,
            };
        }

        self.samples.sort_by(f64::total_cmp);
        let pivot = num / 2;
        let median = if num % 2 == 0 {
            (self.samples[pivot - 1] + self.samples[pivot]) / 2.0
        } else {
            self.samples[pivot]
        };

        StatsReport {
            min: self.min,
            max: self.max,
            avg: self.sum / num as f64,
            median,
        }
    }
}
