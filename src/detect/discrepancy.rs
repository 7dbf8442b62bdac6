//! Numerical discrepancy (burstiness) model
//!
//! Each year's burstiness is its share of the word's mass minus the uniform
//! share `1/n`. Bursts are the maximal scoring subsequences of that signal,
//! found in linear time with the Ruzzo-Tompa algorithm. Long bursts are
//! re-analyzed relative to their own mass to expose nested sub-bursts.

use serde::{Deserialize, Serialize};

use super::{Detector, YearScore};
use crate::error::{EventsError, Result};
use crate::series::WordSeries;

/// How an interval's score is derived
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyScoring {
    /// Nesting depth plus one
    Level,
    /// Log-scaled mean burstiness of the interval
    MeanBurstiness,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscrepancyParams {
    /// Intervals at least this long are analyzed again
    pub min_recursion_span: usize,
    pub scoring: DiscrepancyScoring,
}

impl Default for DiscrepancyParams {
    fn default() -> Self {
        Self {
            min_recursion_span: 32,
            scoring: DiscrepancyScoring::Level,
        }
    }
}

/// A burst over dense indexes `[left, right]`
#[derive(Clone, Debug, PartialEq)]
pub struct BurstInterval {
    pub left: usize,
    pub right: usize,
    /// 0 for top-level bursts, parent level + 1 for nested ones
    pub level: u32,
    /// Sum of top-level burstiness over the interval
    pub mass: f64,
}

impl BurstInterval {
    /// Number of years covered
    pub fn span(&self) -> usize {
        self.right - self.left + 1
    }
}

/// Per-year burstiness, `None` when the series carries no mass
pub fn burstiness(series: &[f64]) -> Option<Vec<f64>> {
    let sum: f64 = series.iter().sum();
    if !(sum > 0.0) {
        return None;
    }
    let uniform = 1.0 / series.len() as f64;
    Some(series.iter().map(|x| x / sum - uniform).collect())
}

fn prefix_sums(values: &[f64]) -> Vec<f64> {
    let mut sums = Vec::with_capacity(values.len() + 1);
    let mut acc = 0.0;
    sums.push(acc);
    for value in values {
        acc += value;
        sums.push(acc);
    }
    sums
}

/// All maximal scoring subsequences of `values`, as inclusive index pairs
///
/// Returned intervals are disjoint and in increasing order.
pub fn max_sequences(values: &[f64]) -> Vec<(usize, usize)> {
    let n = values.len();
    let sums = prefix_sums(values);
    let mut intervals: Vec<(usize, usize)> = Vec::new();
    let mut back: Vec<Option<usize>> = Vec::new();

    let mut i = 0;
    while i < n {
        if values[i] > 0.0 {
            let mut end = i;
            while end + 1 < n && values[end + 1] > 0.0 {
                end += 1;
            }

            // Rightmost earlier interval whose left prefix sum is lower
            let left_sum = sums[i];
            let mut pred = intervals.len().checked_sub(1);
            while let Some(c) = pred {
                if sums[intervals[c].0] < left_sum {
                    break;
                }
                pred = back[c];
            }
            intervals.push((i, end));
            back.push(pred);

            loop {
                let k = intervals.len() - 1;
                match back[k] {
                    Some(p) if sums[intervals[p].1 + 1] < sums[end + 1] => {
                        intervals[p].1 = end;
                        intervals.truncate(p + 1);
                        back.truncate(p + 1);
                    }
                    _ => break,
                }
            }
            i = end;
        }
        i += 1;
    }
    intervals
}

/// Score of an interval by its mean burstiness
pub fn mean_burstiness_score(mass: f64, len: usize) -> u32 {
    let mean = mass / len as f64;
    let base = (mean.ln() + 6.0) * 10.0 / 6.0;
    if base >= 0.0 {
        1 + base as u32
    } else {
        0
    }
}

pub struct DiscrepancyDetector {
    params: DiscrepancyParams,
}

impl DiscrepancyDetector {
    pub fn new(params: DiscrepancyParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DiscrepancyParams {
        &self.params
    }

    /// Bursts of `series[inf..sup]` and their nested sub-bursts
    pub fn intervals(&self, series: &[f64], inf: usize, sup: usize) -> Result<Vec<BurstInterval>> {
        let window = &series[inf..sup];
        let top = burstiness(window)
            .ok_or_else(|| EventsError::Degenerate("series has no mass".to_string()))?;
        let sums = prefix_sums(&top);
        let mass = |left: usize, right: usize| sums[right + 1 - inf] - sums[left - inf];

        let mut intervals: Vec<BurstInterval> = max_sequences(&top)
            .into_iter()
            .map(|(l, r)| BurstInterval {
                left: l + inf,
                right: r + inf,
                level: 0,
                mass: mass(l + inf, r + inf),
            })
            .collect();

        let min_span = self.params.min_recursion_span.max(1);
        let mut next = 0;
        while next < intervals.len() {
            let parent = intervals[next].clone();
            next += 1;
            if parent.span() < min_span {
                continue;
            }
            let local = match burstiness(&series[parent.left..=parent.right]) {
                Some(local) => local,
                None => continue,
            };
            for (l, r) in max_sequences(&local) {
                if r - l + 1 >= parent.span() {
                    continue;
                }
                let (left, right) = (l + parent.left, r + parent.left);
                intervals.push(BurstInterval {
                    left,
                    right,
                    level: parent.level + 1,
                    mass: mass(left, right),
                });
            }
        }
        Ok(intervals)
    }

    pub fn score(&self, interval: &BurstInterval) -> u32 {
        match self.params.scoring {
            DiscrepancyScoring::Level => interval.level + 1,
            DiscrepancyScoring::MeanBurstiness => {
                mean_burstiness_score(interval.mass, interval.span())
            }
        }
    }
}

impl Detector for DiscrepancyDetector {
    fn name(&self) -> &'static str {
        "discrepancy"
    }

    fn score_series(&self, series: &WordSeries) -> Result<Vec<YearScore>> {
        let span = series.smoothed_span();
        if span.is_empty() {
            return Err(EventsError::Degenerate(
                "series shorter than the smoothing window".to_string(),
            ));
        }
        let intervals = self.intervals(&series.smoothed, span.start, span.end)?;

        let mut per_year = vec![0u32; series.len()];
        for interval in &intervals {
            let score = self.score(interval);
            for slot in &mut per_year[interval.left..=interval.right] {
                *slot = (*slot).max(score);
            }
        }

        Ok(per_year
            .into_iter()
            .enumerate()
            .filter(|&(_, score)| score > 0)
            .map(|(i, score)| YearScore::new(series.years.year_at(i), score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_sequences() {
        assert_eq!(
            max_sequences(&[-1.0, -1.0, 0.5, 0.2, 0.7, -1.0, 0.0, -2.0]),
            vec![(2, 4)]
        );
        assert_eq!(
            max_sequences(&[1.0, -0.5, 1.0, -3.0, 0.2, -0.1, 5.0]),
            vec![(0, 2), (4, 6)]
        );
        assert_eq!(
            max_sequences(&[3.0, -1.0, -1.0, 2.0, -5.0, 1.0]),
            vec![(0, 0), (3, 3), (5, 5)]
        );
        assert!(max_sequences(&[-1.0, 0.0, -2.0]).is_empty());
        assert!(max_sequences(&[]).is_empty());
    }

    #[test]
    fn test_single_block() {
        let mut series = vec![0.0; 100];
        for value in &mut series[10..20] {
            *value = 1.0;
        }
        let detector = DiscrepancyDetector::new(DiscrepancyParams::default());
        let intervals = detector.intervals(&series, 0, 100).unwrap();

        assert_eq!(intervals.len(), 1);
        assert_eq!((intervals[0].left, intervals[0].right), (10, 19));
        assert_eq!(intervals[0].level, 0);
        assert!((intervals[0].mass - 0.9).abs() < 1e-9);
        assert_eq!(detector.score(&intervals[0]), 1);
    }

    #[test]
    fn test_nested_bursts() {
        let mut series = vec![0.0; 200];
        for value in &mut series[50..90] {
            *value = 1.0;
        }
        for value in &mut series[60..65] {
            *value = 3.0;
        }
        let detector = DiscrepancyDetector::new(DiscrepancyParams::default());
        let intervals = detector.intervals(&series, 0, 200).unwrap();

        assert_eq!(intervals.len(), 2);
        assert_eq!((intervals[0].left, intervals[0].right, intervals[0].level), (50, 89, 0));
        assert_eq!((intervals[1].left, intervals[1].right, intervals[1].level), (60, 64, 1));
    }

    #[test]
    fn test_offset_window() {
        let mut series = vec![0.0; 30];
        series[2] = 9.0;
        series[15] = 1.0;
        let detector = DiscrepancyDetector::new(DiscrepancyParams::default());
        let intervals = detector.intervals(&series, 5, 25).unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!((intervals[0].left, intervals[0].right), (15, 15));
    }

    #[test]
    fn test_mean_burstiness_score() {
        assert_eq!(mean_burstiness_score(0.9, 10), 6);
        assert_eq!(mean_burstiness_score(1e-4, 10), 0);
    }

    #[test]
    fn test_zero_series_is_degenerate() {
        let detector = DiscrepancyDetector::new(DiscrepancyParams::default());
        let err = detector.intervals(&[0.0; 10], 0, 10).unwrap_err();
        assert!(!err.is_fatal());
    }
}
