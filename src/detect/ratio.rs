//! Triple-point ratio heuristic
//!
//! A year is scored by how many growing ratio thresholds the step into it
//! (and out of it) clears. Two consecutive moves in the same direction need
//! a ratio of `1 + step * (k + 1)` each, a single move needs twice the step.

use serde::{Deserialize, Serialize};

use super::{Detector, YearScore};
use crate::error::Result;
use crate::series::WordSeries;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatioParams {
    /// Ratio increment per threshold level
    pub step: f64,
    /// Highest threshold level tested
    pub max_level: u32,
    /// The middle point must be at least this large
    pub min_value: f64,
}

impl Default for RatioParams {
    fn default() -> Self {
        Self {
            step: 0.1,
            max_level: 8,
            min_value: 1e-4,
        }
    }
}

pub struct RatioDetector {
    params: RatioParams,
}

impl RatioDetector {
    pub fn new(params: RatioParams) -> Self {
        Self { params }
    }

    /// Threshold levels cleared by the triple `(a, b, c)`
    pub fn level(&self, a: f64, b: f64, c: f64) -> u32 {
        if !(a >= 0.0 && b >= self.params.min_value && c >= 0.0) {
            return 0;
        }
        let mut level = 0;
        while level <= self.params.max_level {
            let k = (level + 1) as f64;
            let sup = 1.0 + self.params.step * k;
            let double_sup = 1.0 + 2.0 * self.params.step * k;
            let inf = 1.0 - self.params.step * k;
            let double_inf = 1.0 / double_sup;

            let rising = (b > sup * a && c > sup * b) || b > double_sup * a;
            let falling = (b < inf * a && c < inf * b) || b < double_inf * a;
            if !(rising || falling) {
                break;
            }
            level += 1;
        }
        level
    }
}

impl Detector for RatioDetector {
    fn name(&self) -> &'static str {
        "ratio"
    }

    fn score_series(&self, series: &WordSeries) -> Result<Vec<YearScore>> {
        let s = &series.smoothed;
        let span = series.smoothed_span();
        let start = span.start.max(1);
        let end = span.end.min(s.len().saturating_sub(1));

        let mut scores = Vec::new();
        for j in start..end {
            let level = self.level(s[j - 1], s[j], s[j + 1]);
            if level > 0 {
                scores.push(YearScore::new(series.years.year_at(j), level));
            }
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::YearRange;

    fn word_series(smoothed: Vec<f64>) -> WordSeries {
        let n = smoothed.len();
        WordSeries {
            word: "test".to_string(),
            years: YearRange::new(1900, n),
            raw: smoothed.clone(),
            smoothed,
            matches: vec![0; n],
            totals: vec![0; n],
            smoothing_window: 0,
        }
    }

    #[test]
    fn test_levels() {
        let detector = RatioDetector::new(RatioParams::default());
        // Flat
        assert_eq!(detector.level(1.0, 1.0, 1.0), 0);
        // Single doubling clears 1.2, 1.4, 1.6, 1.8 but not 2.0
        assert_eq!(detector.level(1.0, 2.0, 2.0), 4);
        // Steady 25% growth clears 1.1 and 1.2 twice in a row
        assert_eq!(detector.level(1.0, 1.25, 1.5625), 2);
        // Halving clears 1/1.2 through 1/1.8 but not 1/2
        assert_eq!(detector.level(2.0, 1.0, 1.0), 4);
        // Below the noise floor
        assert_eq!(detector.level(0.0, 1e-5, 1.0), 0);
    }

    #[test]
    fn test_level_is_capped() {
        let detector = RatioDetector::new(RatioParams::default());
        assert_eq!(detector.level(0.0, 1.0, 5.0), 9);
    }

    #[test]
    fn test_score_series() {
        let detector = RatioDetector::new(RatioParams::default());
        let series = word_series(vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
        let scores = detector.score_series(&series).unwrap();
        assert_eq!(scores, vec![YearScore::new(1903, 4)]);
    }
}
