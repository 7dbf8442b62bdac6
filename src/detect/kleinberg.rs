//! Kleinberg's batch burst model
//!
//! Each year draws `relevant` hits out of `docs` trials from a binomial
//! whose rate is the hidden state: state `j` has rate `alpha_0 * base^j`,
//! with `alpha_0` the overall hit rate. Climbing states costs
//! `gamma * ln(n)` per level, staying or descending is free. The most
//! likely state sequence is found with Viterbi.

use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;
use tracing::trace;

use super::{Detector, YearScore};
use crate::error::{EventsError, Result};
use crate::series::WordSeries;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KleinbergParams {
    /// Rate multiplier between consecutive states
    pub base: f64,
    /// Weight of the cost of climbing one state
    pub gamma: f64,
    /// Counts up to this have a tabulated `ln k!`; larger ones use `ln_gamma`
    pub factorial_table_size: u64,
}

impl Default for KleinbergParams {
    fn default() -> Self {
        Self {
            base: 2.0,
            gamma: 1.0,
            factorial_table_size: 1 << 16,
        }
    }
}

/// `ln k!`, tabulated for `k` in `0..=max` and computed beyond
pub struct LnFactorials {
    table: Vec<f64>,
}

impl LnFactorials {
    pub fn new(max: u64) -> Self {
        let mut table = Vec::with_capacity(max as usize + 1);
        table.push(0.0);
        let mut acc = 0.0;
        for k in 1..=max {
            acc += (k as f64).ln();
            table.push(acc);
        }
        Self { table }
    }

    /// Largest tabulated argument
    pub fn max(&self) -> u64 {
        (self.table.len() - 1) as u64
    }

    pub fn get(&self, k: u64) -> f64 {
        match self.table.get(k as usize) {
            Some(&value) => value,
            None => ln_gamma(k as f64 + 1.0),
        }
    }

    /// `-ln C(n, k)`
    pub fn neg_ln_choose(&self, n: u64, k: u64) -> f64 {
        self.get(k) + self.get(n - k) - self.get(n)
    }
}

/// Burst detector; owns its log-factorial table
pub struct KleinbergDetector {
    params: KleinbergParams,
    ln_factorials: LnFactorials,
}

impl KleinbergDetector {
    pub fn new(params: KleinbergParams) -> Self {
        let ln_factorials = LnFactorials::new(params.factorial_table_size);
        Self {
            params,
            ln_factorials,
        }
    }

    pub fn params(&self) -> &KleinbergParams {
        &self.params
    }

    /// State rates `alpha_0 * base^j` not exceeding one
    pub fn alphas(&self, total_relevant: u64, total_docs: u64) -> Vec<f64> {
        let mut alphas = vec![total_relevant as f64 / total_docs as f64];
        if self.params.base > 1.0 {
            while let Some(&last) = alphas.last() {
                let next = last * self.params.base;
                if next > 1.0 {
                    break;
                }
                alphas.push(next);
            }
        }
        alphas
    }

    /// Most likely state per year
    pub fn burst_states(&self, relevant: &[u64], docs: &[u64]) -> Result<Vec<usize>> {
        if docs.is_empty() {
            return Err(EventsError::Degenerate("empty burst input".to_string()));
        }
        if docs.len() != relevant.len() {
            return Err(EventsError::Degenerate(format!(
                "{} relevant counts for {} trial counts",
                relevant.len(),
                docs.len()
            )));
        }

        let mut ln_choose = Vec::with_capacity(docs.len());
        for (i, (&r, &d)) in relevant.iter().zip(docs).enumerate() {
            if r > d {
                return Err(EventsError::Degenerate(format!(
                    "year {} has {} hits out of {} trials",
                    i, r, d
                )));
            }
            ln_choose.push(self.ln_factorials.neg_ln_choose(d, r));
        }

        let total_relevant: u64 = relevant.iter().sum();
        let total_docs: u64 = docs.iter().sum();
        if total_relevant == 0 {
            return Err(EventsError::Degenerate("no relevant hits".to_string()));
        }
        if total_relevant == total_docs {
            return Err(EventsError::Degenerate(
                "every trial is a hit".to_string(),
            ));
        }

        let alphas = self.alphas(total_relevant, total_docs);
        let num_states = alphas.len();
        let n = docs.len();
        let climb = self.params.gamma * (n as f64).ln();

        let mut prev = vec![f64::INFINITY; num_states];
        prev[0] = 0.0;
        let mut next = vec![f64::INFINITY; num_states];
        let mut psi = vec![0usize; n * num_states];

        for i in 0..n {
            let r = relevant[i] as f64;
            let nr = (docs[i] - relevant[i]) as f64;
            for j in 0..num_states {
                let mut best = f64::INFINITY;
                let mut best_k = 0;
                for (k, &score) in prev.iter().enumerate() {
                    let mut cand = score;
                    if j > k {
                        cand += (j - k) as f64 * climb;
                    }
                    if cand < best {
                        best = cand;
                        best_k = k;
                    }
                }

                let alpha = alphas[j];
                let mut cost = ln_choose[i] - r * alpha.ln();
                if nr > 0.0 {
                    cost -= nr * (-alpha).ln_1p();
                }
                next[j] = best + cost;
                psi[i * num_states + j] = best_k;
            }
            std::mem::swap(&mut prev, &mut next);
        }

        let mut state = 0;
        for (j, &score) in prev.iter().enumerate() {
            if score < prev[state] {
                state = j;
            }
        }

        let mut states = vec![0usize; n];
        for i in (0..n).rev() {
            states[i] = state;
            state = psi[i * num_states + state];
        }
        trace!("Burst states over {} years, {} levels", n, num_states);
        Ok(states)
    }
}

impl Detector for KleinbergDetector {
    fn name(&self) -> &'static str {
        "kleinberg"
    }

    fn score_series(&self, series: &WordSeries) -> Result<Vec<YearScore>> {
        // Matches in years without a corpus total are not observable
        let relevant: Vec<u64> = series
            .matches
            .iter()
            .zip(&series.totals)
            .map(|(&m, &t)| if t == 0 { 0 } else { m })
            .collect();
        let states = self.burst_states(&relevant, &series.totals)?;

        Ok(states
            .into_iter()
            .enumerate()
            .filter(|&(_, state)| state > 0)
            .map(|(i, state)| YearScore::new(series.years.year_at(i), state as u32))
            .collect())
    }
}
