//! Timing statistics of a benchmark.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Summary statistics of the timed rounds of a benchmark, in seconds.
///
/// The field names follow the `stats` object of `pytest-benchmark` results, so result files can be consumed by the
/// same tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// The fastest round.
    pub min: f64,
    /// The slowest round.
    pub max: f64,
    /// The mean round time.
    pub mean: f64,
    /// The sample standard deviation, 0 for a single round.
    pub stddev: f64,
    /// The number of timed rounds.
    pub rounds: usize,
    /// The median round time.
    pub median: f64,
    /// The interquartile range.
    pub iqr: f64,
    /// The first quartile.
    pub q1: f64,
    /// The third quartile.
    pub q3: f64,
    /// The number of rounds beyond 1.5 IQR of the quartiles.
    pub iqr_outliers: usize,
    /// The number of rounds beyond one standard deviation of the mean.
    pub stddev_outliers: usize,
    /// `"<stddev_outliers>;<iqr_outliers>"`
    pub outliers: String,
    /// The lowest round time within 1.5 IQR below the first quartile.
    pub ld15iqr: f64,
    /// The highest round time within 1.5 IQR above the third quartile.
    pub hd15iqr: f64,
    /// Operations per second, the inverse of the mean.
    pub ops: f64,
    /// The total time of all rounds.
    pub total: f64,
    /// The round times.
    pub data: Vec<f64>,
    /// Iterations per round.
    pub iterations: usize,
}

/// The `q`-quantile of `sorted`, interpolating linearly between neighbours.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor();
    let fraction = position - lower;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = lower as usize;
    match sorted.get(lower + 1) {
        Some(upper) => sorted[lower] + (upper - sorted[lower]) * fraction,
        None => sorted[lower],
    }
}

impl Statistics {
    /// Compute statistics of the round `durations`.
    ///
    /// Returns [`None`] if `durations` is empty.
    #[must_use]
    pub fn from_durations(durations: &[Duration]) -> Option<Self> {
        let data: Vec<f64> = durations.iter().map(Duration::as_secs_f64).collect();
        Self::from_seconds(data)
    }

    /// Compute statistics of round times in seconds.
    ///
    /// Returns [`None`] if `data` is empty.
    #[must_use]
    pub fn from_seconds(data: Vec<f64>) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        let rounds = data.len();
        let mut sorted = data.clone();
        sorted.sort_by(f64::total_cmp);

        let total: f64 = data.iter().sum();
        let mean = total / rounds as f64;
        let stddev = if rounds > 1 {
            let sum_sq: f64 = data.iter().map(|value| (value - mean).powi(2)).sum();
            (sum_sq / (rounds - 1) as f64).sqrt()
        } else {
            0.0
        };

        let median = quantile(&sorted, 0.5);
        let (q1, q3) = if rounds > 1 {
            (quantile(&sorted, 0.25), quantile(&sorted, 0.75))
        } else {
            (sorted[0], sorted[0])
        };
        let iqr = q3 - q1;
        let low_fence = q1 - 1.5 * iqr;
        let high_fence = q3 + 1.5 * iqr;
        let ld15iqr = sorted
            .iter()
            .copied()
            .find(|&value| value >= low_fence)
            .unwrap_or(sorted[0]);
        let hd15iqr = sorted
            .iter()
            .rev()
            .copied()
            .find(|&value| value <= high_fence)
            .unwrap_or(sorted[rounds - 1]);

        let stddev_outliers = data
            .iter()
            .filter(|&&value| value < mean - stddev || value > mean + stddev)
            .count();
        let iqr_outliers = data
            .iter()
            .filter(|&&value| value < low_fence || value > high_fence)
            .count();

        Some(Self {
            min: sorted[0],
            max: sorted[rounds - 1],
            mean,
            stddev,
            rounds,
            median,
            iqr,
            q1,
            q3,
            iqr_outliers,
            stddev_outliers,
            outliers: format!("{stddev_outliers};{iqr_outliers}"),
            ld15iqr,
            hd15iqr,
            ops: if mean > 0.0 { 1.0 / mean } else { 0.0 },
            total,
            data,
            iterations: 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn statistics_of_rounds() {
        let stats = Statistics::from_seconds(vec![4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(stats.rounds, 4);
        assert!(approx_eq(stats.min, 1.0));
        assert!(approx_eq(stats.max, 4.0));
        assert!(approx_eq(stats.mean, 2.5));
        assert!(approx_eq(stats.median, 2.5));
        assert!(approx_eq(stats.q1, 1.75));
        assert!(approx_eq(stats.q3, 3.25));
        assert!(approx_eq(stats.stddev, (5.0f64 / 3.0).sqrt()));
        assert!(approx_eq(stats.total, 10.0));
        assert!(approx_eq(stats.ops, 0.4));
        assert_eq!(stats.stddev_outliers, 2);
        assert_eq!(stats.iqr_outliers, 0);
        assert_eq!(stats.outliers, "2;0");
        assert_eq!(stats.data, [4.0, 1.0, 3.0, 2.0]);
    }

    #[test]
    fn statistics_single_round() {
        let stats = Statistics::from_durations(&[Duration::from_millis(500)]).unwrap();
        assert!(approx_eq(stats.mean, 0.5));
        assert!(approx_eq(stats.stddev, 0.0));
        assert!(approx_eq(stats.iqr, 0.0));
        assert!(Statistics::from_durations(&[]).is_none());
    }
}
