//! Burst noise filters.
//!
//! Each sampling tick reads a flex sensor several times in quick succession
//! and collapses the burst to one value. The strategy is a deployment choice:
//!
//! - **Raw** – the most recent sample, unfiltered.
//! - **Average** – arithmetic mean of the burst.
//! - **Median** – middle sample; for an even count the floor of the mean of
//!   the two central samples.
//! - **Trimmed mean** – drop `n / 4` samples from each end of the sorted
//!   burst, average the rest.
//!
//! # Example
//!
//! ```rust
//! use echohand_perception::filter::{FilterStrategy, NoiseFilter};
//!
//! let median = NoiseFilter::new(FilterStrategy::Median, 8);
//! assert_eq!(median.reduce(&[3, 1, 4, 1, 5, 9, 2, 6]), Some(3.0));
//!
//! let trimmed = NoiseFilter::new(FilterStrategy::TrimmedMean, 16);
//! let ramp: Vec<i32> = (0..16).collect();
//! assert_eq!(trimmed.reduce(&ramp), Some(7.5));
//! ```

use serde::{Deserialize, Serialize};

/// Samples per burst when nothing else is configured.
pub const DEFAULT_SAMPLE_COUNT: usize = 16;

/// How a burst of samples is reduced to one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrategy {
    Raw,
    #[default]
    Average,
    Median,
    TrimmedMean,
}

/// A filter strategy paired with its burst length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFilter {
    pub strategy: FilterStrategy,
    pub sample_count: usize,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new(FilterStrategy::default(), DEFAULT_SAMPLE_COUNT)
    }
}

impl NoiseFilter {
    /// `sample_count` is raised to at least one.
    pub fn new(strategy: FilterStrategy, sample_count: usize) -> Self {
        Self {
            strategy,
            sample_count: sample_count.max(1),
        }
    }

    /// Number of readings [`NoiseFilter::sample`] takes per burst.
    ///
    /// The raw strategy only ever needs one.
    pub fn burst_len(&self) -> usize {
        match self.strategy {
            FilterStrategy::Raw => 1,
            _ => self.sample_count.max(1),
        }
    }

    /// Reduce an already collected burst. `None` for an empty burst.
    pub fn reduce(&self, samples: &[i32]) -> Option<f64> {
        if samples.is_empty() {
            return None;
        }
        let value = match self.strategy {
            FilterStrategy::Raw => f64::from(samples[samples.len() - 1]),
            FilterStrategy::Average => mean(samples),
            FilterStrategy::Median => f64::from(median(samples)),
            FilterStrategy::TrimmedMean => trimmed_mean(samples),
        };
        Some(value)
    }

    /// Take [`NoiseFilter::burst_len`] readings from `read` and reduce them.
    ///
    /// The first failing read aborts the burst.
    pub fn sample<E>(&self, mut read: impl FnMut() -> Result<i32, E>) -> Result<Option<f64>, E> {
        let burst = (0..self.burst_len())
            .map(|_| read())
            .collect::<Result<Vec<_>, E>>()?;
        Ok(self.reduce(&burst))
    }
}

fn mean(samples: &[i32]) -> f64 {
    let sum: i64 = samples.iter().map(|&s| i64::from(s)).sum();
    sum as f64 / samples.len() as f64
}

fn sorted(samples: &[i32]) -> Vec<i32> {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    sorted
}

fn median(samples: &[i32]) -> i32 {
    let sorted = sorted(samples);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return sorted[mid];
    }
    let pair = i64::from(sorted[mid - 1]) + i64::from(sorted[mid]);
    pair.div_euclid(2) as i32
}

fn trimmed_mean(samples: &[i32]) -> f64 {
    let sorted = sorted(samples);
    let trim = sorted.len() / 4;
    mean(&sorted[trim..sorted.len() - trim])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(strategy: FilterStrategy) -> NoiseFilter {
        NoiseFilter::new(strategy, DEFAULT_SAMPLE_COUNT)
    }

    #[test]
    fn empty_burst_yields_nothing() {
        for strategy in [
            FilterStrategy::Raw,
            FilterStrategy::Average,
            FilterStrategy::Median,
            FilterStrategy::TrimmedMean,
        ] {
            assert_eq!(filter(strategy).reduce(&[]), None);
        }
    }

    #[test]
    fn raw_passes_latest_sample() {
        assert_eq!(filter(FilterStrategy::Raw).reduce(&[10, 20, 30]), Some(30.0));
    }

    #[test]
    fn average_is_exact() {
        assert_eq!(filter(FilterStrategy::Average).reduce(&[1, 2]), Some(1.5));
        assert_eq!(
            filter(FilterStrategy::Average).reduce(&[i32::MAX, i32::MAX]),
            Some(f64::from(i32::MAX))
        );
    }

    #[test]
    fn median_even_count_floors_the_central_pair() {
        let f = filter(FilterStrategy::Median);
        assert_eq!(f.reduce(&[3, 1, 4, 1, 5, 9, 2, 6]), Some(3.0));
        assert_eq!(f.reduce(&[-3, -2]), Some(-3.0));
    }

    #[test]
    fn median_odd_count_takes_the_middle() {
        let f = filter(FilterStrategy::Median);
        assert_eq!(f.reduce(&[900, 1, 450]), Some(450.0));
        assert_eq!(f.reduce(&[7]), Some(7.0));
    }

    #[test]
    fn median_rejects_a_spike() {
        let f = filter(FilterStrategy::Median);
        assert_eq!(f.reduce(&[800, 801, 799, 3300, 800]), Some(800.0));
    }

    #[test]
    fn trimmed_mean_drops_quartiles() {
        let f = filter(FilterStrategy::TrimmedMean);
        let ramp: Vec<i32> = (0..16).rev().collect();
        assert_eq!(f.reduce(&ramp), Some(7.5));
    }

    #[test]
    fn trimmed_mean_short_burst_is_untrimmed() {
        let f = filter(FilterStrategy::TrimmedMean);
        assert_eq!(f.reduce(&[1, 2, 6]), Some(3.0));
    }

    #[test]
    fn sample_reads_burst_len_values() {
        let mut reads = 0;
        let f = NoiseFilter::new(FilterStrategy::Average, 4);
        let value = f
            .sample(|| -> Result<i32, ()> {
                reads += 1;
                Ok(reads * 10)
            })
            .unwrap();
        assert_eq!(reads, 4);
        assert_eq!(value, Some(25.0));

        let mut reads = 0;
        let raw = NoiseFilter::new(FilterStrategy::Raw, 16);
        raw.sample(|| -> Result<i32, ()> {
            reads += 1;
            Ok(0)
        })
        .unwrap();
        assert_eq!(reads, 1);
    }

    #[test]
    fn sample_propagates_read_errors() {
        let f = NoiseFilter::new(FilterStrategy::Median, 5);
        let result = f.sample(|| Err::<i32, _>("adc offline"));
        assert_eq!(result, Err("adc offline"));
    }

    #[test]
    fn zero_sample_count_is_raised_to_one() {
        assert_eq!(NoiseFilter::new(FilterStrategy::Average, 0).burst_len(), 1);
    }

    #[test]
    fn strategy_names_are_snake_case() {
        let json = serde_json::to_string(&FilterStrategy::TrimmedMean).unwrap();
        assert_eq!(json, "\"trimmed_mean\"");
        let f: NoiseFilter = serde_json::from_str(r#"{"strategy":"median"}"#).unwrap();
        assert_eq!(f.sample_count, DEFAULT_SAMPLE_COUNT);
    }
}
