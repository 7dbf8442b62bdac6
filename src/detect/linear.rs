//! Linear-segment regression
//!
//! The standardized series is cut into pieces that a straight line fits
//! well. A piece grows one year at a time; once the least squares error of
//! the fit reaches `e^max_log_error` the piece is closed before the new year
//! and a fresh one starts there. Steep pieces score high.

use serde::{Deserialize, Serialize};

use super::{Detector, YearScore};
use crate::error::{EventsError, Result};
use crate::series::WordSeries;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearParams {
    /// A piece is closed once `ln(error)` reaches this
    pub max_log_error: f64,
    /// Offset added to `ln|slope|` before doubling into a score
    pub score_threshold: f64,
    pub max_iterations: usize,
    pub gradient_tolerance: f64,
}

impl Default for LinearParams {
    fn default() -> Self {
        Self {
            max_log_error: -5.0,
            score_threshold: 3.0,
            max_iterations: 100,
            gradient_tolerance: 1e-3,
        }
    }
}

/// Unconstrained minimization of a smooth objective
pub trait Minimizer: Send + Sync {
    /// Return an approximate minimizer of `objective`, starting at `initial`
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        gradient: &dyn Fn(&[f64], &mut [f64]),
        initial: &[f64],
    ) -> Vec<f64>;
}

/// Fletcher-Reeves conjugate gradient with an interpolating line search
#[derive(Clone, Debug)]
pub struct ConjugateGradient {
    pub max_iterations: usize,
    pub gradient_tolerance: f64,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            gradient_tolerance: 1e-3,
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn step_to(x: &[f64], direction: &[f64], t: f64) -> Vec<f64> {
    x.iter().zip(direction).map(|(xi, di)| xi + t * di).collect()
}

impl ConjugateGradient {
    /// Step length along `direction` that lowers `objective`, with the value
    /// reached. `slope` is the directional derivative at `x` and is negative.
    fn line_search(
        objective: &dyn Fn(&[f64]) -> f64,
        x: &[f64],
        fx: f64,
        direction: &[f64],
        slope: f64,
    ) -> Option<(f64, f64)> {
        let mut t = 1.0 / dot(direction, direction).sqrt();
        for _ in 0..60 {
            let ft = objective(&step_to(x, direction, t));
            // Minimum of the parabola through fx, slope and ft
            let curvature = ft - fx - slope * t;
            if curvature > 0.0 {
                let tq = -slope * t * t / (2.0 * curvature);
                let fq = objective(&step_to(x, direction, tq));
                if fq < fx && fq <= ft {
                    return Some((tq, fq));
                }
            }
            if ft < fx {
                return Some((t, ft));
            }
            t *= 0.5;
        }
        None
    }
}

impl Minimizer for ConjugateGradient {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        gradient: &dyn Fn(&[f64], &mut [f64]),
        initial: &[f64],
    ) -> Vec<f64> {
        let n = initial.len();
        let mut x = initial.to_vec();
        let mut fx = objective(&x);
        let mut g = vec![0.0; n];
        gradient(&x, &mut g);
        let mut direction: Vec<f64> = g.iter().map(|v| -v).collect();
        let mut since_restart = 0;

        for _ in 0..self.max_iterations {
            let g_norm2 = dot(&g, &g);
            if g_norm2.sqrt() < self.gradient_tolerance {
                break;
            }

            let mut slope = dot(&g, &direction);
            if !(slope < 0.0) || since_restart >= n {
                direction = g.iter().map(|v| -v).collect();
                slope = -g_norm2;
                since_restart = 0;
            }

            let (t, ft) = match Self::line_search(objective, &x, fx, &direction, slope) {
                Some(step) => step,
                None => break,
            };
            x = step_to(&x, &direction, t);
            fx = ft;

            gradient(&x, &mut g);
            let beta = dot(&g, &g) / g_norm2;
            for (d, gi) in direction.iter_mut().zip(&g) {
                *d = -gi + beta * *d;
            }
            since_restart += 1;
        }
        x
    }
}

/// A fitted piece over local indexes `[begin, end]`
#[derive(Clone, Debug, PartialEq)]
pub struct LinearSegment {
    pub begin: usize,
    pub end: usize,
    pub slope: f64,
}

/// Standard score with the sample deviation
pub fn standardize(values: &[f64]) -> Result<Vec<f64>> {
    let n = values.len();
    if n < 2 {
        return Err(EventsError::Degenerate(format!(
            "{} values cannot be standardized",
            n
        )));
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let sigma = variance.sqrt();
    if !(sigma > 0.0) {
        return Err(EventsError::Degenerate("series has no variation".to_string()));
    }
    Ok(values.iter().map(|v| (v - mean) / sigma).collect())
}

/// Half the squared error of `slope * j + intercept` over `data`
fn regression_error(params: &[f64], data: &[f64]) -> f64 {
    let error: f64 = data
        .iter()
        .enumerate()
        .map(|(j, y)| {
            let diff = params[0] * j as f64 + params[1] - y;
            diff * diff
        })
        .sum();
    error / 2.0
}

fn regression_gradient(params: &[f64], data: &[f64], out: &mut [f64]) {
    out[0] = 0.0;
    out[1] = 0.0;
    for (j, y) in data.iter().enumerate() {
        let diff = params[0] * j as f64 + params[1] - y;
        out[0] += diff * j as f64;
        out[1] += diff;
    }
}

pub struct LinearDetector {
    params: LinearParams,
    minimizer: Box<dyn Minimizer>,
}

impl LinearDetector {
    pub fn new(params: LinearParams) -> Self {
        let minimizer = ConjugateGradient {
            max_iterations: params.max_iterations,
            gradient_tolerance: params.gradient_tolerance,
        };
        Self::with_minimizer(params, Box::new(minimizer))
    }

    pub fn with_minimizer(params: LinearParams, minimizer: Box<dyn Minimizer>) -> Self {
        Self { params, minimizer }
    }

    fn fit(&self, data: &[f64], start: &[f64]) -> (Vec<f64>, f64) {
        let objective = |p: &[f64]| regression_error(p, data);
        let gradient = |p: &[f64], out: &mut [f64]| regression_gradient(p, data, out);
        let fitted = self.minimizer.minimize(&objective, &gradient, start);
        let error = regression_error(&fitted, data);
        (fitted, error)
    }

    /// Cut standardized `values` into well-fitting pieces
    pub fn segments(&self, values: &[f64]) -> Vec<LinearSegment> {
        let mut segments = Vec::new();
        if values.is_empty() {
            return segments;
        }

        let mut begin = 0;
        let mut current = vec![0.0, 0.0];
        for end in 1..values.len() {
            let (fitted, error) = self.fit(&values[begin..=end], &current);
            if error.ln() >= self.params.max_log_error {
                segments.push(LinearSegment {
                    begin,
                    end: end - 1,
                    slope: current[0],
                });
                begin = end;
                current = vec![0.0, 0.0];
            } else {
                current = fitted;
            }
        }
        segments.push(LinearSegment {
            begin,
            end: values.len() - 1,
            slope: current[0],
        });
        segments
    }

    /// `int(2 * (threshold + ln|slope|))`, zero for flat pieces
    pub fn score(&self, slope: f64) -> u32 {
        let score = 2.0 * (self.params.score_threshold + slope.abs().ln());
        if score >= 1.0 {
            score as u32
        } else {
            0
        }
    }
}

impl Detector for LinearDetector {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn score_series(&self, series: &WordSeries) -> Result<Vec<YearScore>> {
        let span = series.smoothed_span();
        let values = standardize(&series.smoothed[span.clone()])?;

        let mut scores = Vec::new();
        for segment in self.segments(&values) {
            let score = self.score(segment.slope);
            if score == 0 {
                continue;
            }
            for j in segment.begin..=segment.end {
                scores.push(YearScore::new(series.years.year_at(span.start + j), score));
            }
        }
        Ok(scores)
    }
}
