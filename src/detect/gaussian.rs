//! Gaussian segmentation
//!
//! Every window of up to `max_window + 1` years is tested for a Gaussian
//! bump sitting on a flat baseline: the baseline is the window minimum, the
//! excess mass is normalized to a distribution and accepted when its excess
//! kurtosis is near zero and its earth mover's distance to the matching
//! normal pdf is small. Accepted windows are packed greedily, best fit first,
//! without overlap.
//!
//! Windowed moments come from prefix sums, so each window costs O(1) before
//! the distance check.

use serde::{Deserialize, Serialize};

use super::{Detector, YearScore};
use crate::error::Result;
use crate::series::WordSeries;

/// Number of power moments kept in the prefix tables
const NUM_MOMENTS: usize = 4;

/// Resolution at which floating fields of candidates compare equal
const EPSILON: f64 = 1e-6;

/// Score of a fully confident segment
const MAX_COUNT: f64 = 10.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussianParams {
    /// A window spans at most `max_window + 1` years
    pub max_window: usize,
    /// Smallest window, in years, that is tested
    pub min_window: usize,
    /// Accept when `|excess kurtosis|` is below this
    pub kurtosis_tolerance: f64,
    /// Accept when the earth mover's distance is below this
    pub max_distance: f64,
    /// Emit a pdf-shaped profile with sigma scaled by this factor instead of a
    /// flat score over the segment
    pub widening: Option<f64>,
}

impl Default for GaussianParams {
    fn default() -> Self {
        Self {
            max_window: 50,
            min_window: 5,
            kurtosis_tolerance: 0.05,
            max_distance: 0.3,
            widening: None,
        }
    }
}

impl GaussianParams {
    pub fn with_widening(mut self, widening: f64) -> Self {
        self.widening = Some(widening);
        self
    }

    pub fn with_max_window(mut self, max_window: usize) -> Self {
        self.max_window = max_window;
        self
    }
}

/// An accepted window and its fitted normal
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianCandidate {
    pub left: usize,
    pub right: usize,
    pub mean: f64,
    pub sigma: f64,
    /// Earth mover's distance to the fitted pdf
    pub distance: f64,
    /// Peak height of the bump relative to the baseline
    pub increase: f64,
}

impl GaussianCandidate {
    /// Total order key: distance ascending, increase descending, then
    /// position and shape ascending. Floats are quantized to [`EPSILON`].
    fn sort_key(&self) -> (i64, i64, usize, usize, i64, i64) {
        (
            quantize(self.distance),
            quantize(self.increase).saturating_neg(),
            self.left,
            self.right,
            quantize(self.mean),
            quantize(self.sigma),
        )
    }
}

fn quantize(value: f64) -> i64 {
    // Saturates on infinities, NaN maps to zero
    (value / EPSILON).round() as i64
}

/// Density of a zero-mean normal with deviation `sigma` at `x`
pub fn normal_pdf(x: f64, sigma: f64) -> f64 {
    let u = x / sigma;
    (-0.5 * u * u).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

/// Prefix sums of `v * i^k` for `k` in `1..=4`
struct PrefixMoments {
    rows: Vec<[f64; NUM_MOMENTS]>,
}

impl PrefixMoments {
    /// Moments of the index itself
    fn powers(len: usize) -> Self {
        Self::weighted(&vec![1.0; len])
    }

    /// Moments of the index weighted by `series`
    fn weighted(series: &[f64]) -> Self {
        let mut rows = Vec::with_capacity(series.len() + 1);
        rows.push([0.0; NUM_MOMENTS]);
        for (i, &value) in series.iter().enumerate() {
            let previous = rows[i];
            let mut row = [0.0; NUM_MOMENTS];
            let mut power = 1.0;
            for j in 0..NUM_MOMENTS {
                power *= i as f64;
                row[j] = previous[j] + value * power;
            }
            rows.push(row);
        }
        Self { rows }
    }

    fn len(&self) -> usize {
        self.rows.len() - 1
    }

    fn query(&self, left: usize, right: usize, order: usize) -> f64 {
        self.rows[right + 1][order] - self.rows[left][order]
    }
}

/// Windowed moments of the baseline-subtracted, normalized series
struct Window<'a> {
    moments: &'a PrefixMoments,
    powers: &'a PrefixMoments,
    left: usize,
    right: usize,
    min_value: f64,
    min_sum: f64,
}

impl Window<'_> {
    fn full_moment(&self, order: usize) -> f64 {
        let x = self.moments.query(self.left, self.right, order);
        let y = self.powers.query(self.left, self.right, order);
        (x - self.min_value * y) / self.min_sum
    }

    /// `(excess kurtosis, mean, variance)`
    fn kurtosis(&self) -> (f64, f64, f64) {
        let m1 = self.full_moment(0);
        let m2 = self.full_moment(1);
        let m3 = self.full_moment(2);
        let m4 = self.full_moment(3);

        let mean = m1;
        let variance = m2 - mean * mean;
        let central4 = m4 - 4.0 * mean * m3 + 6.0 * mean * mean * m2 - 3.0 * mean.powi(4);
        (central4 / (variance * variance) - 3.0, mean, variance)
    }
}

fn earth_movers_distance(
    series: &[f64],
    left: usize,
    right: usize,
    min_value: f64,
    min_sum: f64,
    mean: f64,
    sigma: f64,
) -> f64 {
    let mut carried = 0.0;
    let mut distance = 0.0;
    for (i, &value) in series.iter().enumerate().take(right + 1).skip(left) {
        carried += (value - min_value) / min_sum - normal_pdf(i as f64 - mean, sigma);
        distance += carried.abs();
    }
    distance
}

/// Gaussian segmentation detector
pub struct GaussianDetector {
    params: GaussianParams,
    powers: PrefixMoments,
}

impl GaussianDetector {
    /// Build a detector whose index power table covers `num_years` years
    pub fn new(params: GaussianParams, num_years: usize) -> Self {
        Self {
            params,
            powers: PrefixMoments::powers(num_years),
        }
    }

    pub fn params(&self) -> &GaussianParams {
        &self.params
    }

    /// All accepted windows with `inf <= left <= right < sup`, best first
    pub fn candidates(&self, series: &[f64], inf: usize, sup: usize) -> Vec<GaussianCandidate> {
        let sup = sup.min(series.len());
        let local;
        let powers = if self.powers.len() >= series.len() {
            &self.powers
        } else {
            local = PrefixMoments::powers(series.len());
            &local
        };
        let moments = PrefixMoments::weighted(series);
        let min_window = self.params.min_window.max(1);

        let mut candidates = Vec::new();
        for left in inf..sup {
            let mut min_value = f64::MAX;
            let mut sum = 0.0;
            let last = sup.min(left + self.params.max_window + 1);
            for right in left..last {
                let value = series[right];
                min_value = min_value.min(value);
                sum += value;

                let width = right - left + 1;
                if width < min_window {
                    continue;
                }
                // Excess mass at rounding level is a plateau, not a bump
                let min_sum = sum - width as f64 * min_value;
                if min_sum <= EPSILON * sum.abs() {
                    continue;
                }

                let window = Window {
                    moments: &moments,
                    powers,
                    left,
                    right,
                    min_value,
                    min_sum,
                };
                let (kurtosis, mean, variance) = window.kurtosis();
                if !(variance > 0.0) || !(kurtosis.abs() < self.params.kurtosis_tolerance) {
                    continue;
                }
                if mean < left as f64 || mean > right as f64 {
                    continue;
                }

                let sigma = variance.sqrt();
                let distance =
                    earth_movers_distance(series, left, right, min_value, min_sum, mean, sigma);
                if distance < self.params.max_distance {
                    candidates.push(GaussianCandidate {
                        left,
                        right,
                        mean,
                        sigma,
                        distance,
                        increase: min_sum * normal_pdf(0.0, sigma) / min_value,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        candidates
    }

    /// Pack sorted candidates without overlap and score their years
    ///
    /// Returns `(dense index, score)` pairs in acceptance order.
    pub fn select(&self, candidates: &[GaussianCandidate], len: usize) -> Vec<(usize, u32)> {
        let mut used = vec![false; len];
        let mut scores = Vec::new();

        for candidate in candidates {
            let span = candidate.left..=candidate.right;
            if candidate.right >= len || used[span.clone()].iter().any(|&u| u) {
                continue;
            }

            let peak = normal_pdf(0.0, candidate.sigma);
            let count = (MAX_COUNT * candidate.increase.min(1.0)) as i64;
            let ratio = (count as f64 + 0.5) / peak;

            for i in span {
                used[i] = true;
                let score = match self.params.widening {
                    Some(widening) => {
                        let sample =
                            normal_pdf(i as f64 - candidate.mean, widening * candidate.sigma);
                        (ratio * sample) as i64
                    }
                    None => count,
                };
                if score > 0 {
                    scores.push((i, score as u32));
                }
            }
        }
        scores
    }
}

impl Detector for GaussianDetector {
    fn name(&self) -> &'static str {
        "gaussian"
    }

    fn score_series(&self, series: &WordSeries) -> Result<Vec<YearScore>> {
        let span = series.smoothed_span();
        let candidates = self.candidates(&series.smoothed, span.start, span.end);
        let mut scores: Vec<YearScore> = self
            .select(&candidates, series.len())
            .into_iter()
            .map(|(i, score)| YearScore::new(series.years.year_at(i), score))
            .collect();
        scores.sort_by_key(|s| s.year);
        Ok(scores)
    }
}
