//! Event detectors
//!
//! Every detector turns one [`WordSeries`] into sparse per-year scores.
//! A detector that cannot say anything about a word returns
//! [`EventsError::Degenerate`](crate::error::EventsError::Degenerate); the
//! batch scan counts those and moves on.

mod discrepancy;
mod gaussian;
mod kleinberg;
mod linear;
mod ratio;

pub use discrepancy::{
    burstiness, max_sequences, mean_burstiness_score, BurstInterval, DiscrepancyDetector,
    DiscrepancyParams, DiscrepancyScoring,
};
pub use gaussian::{normal_pdf, GaussianCandidate, GaussianDetector, GaussianParams};
pub use kleinberg::{KleinbergDetector, KleinbergParams, LnFactorials};
pub use linear::{
    standardize, ConjugateGradient, LinearDetector, LinearParams, LinearSegment, Minimizer,
};
pub use ratio::{RatioDetector, RatioParams};

use serde::{Deserialize, Serialize};

use crate::config::{DetectorKind, EventsConfig};
use crate::error::Result;
use crate::series::WordSeries;

/// Score of one calendar year
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearScore {
    pub year: u16,
    pub score: u32,
}

impl YearScore {
    pub fn new(year: u16, score: u32) -> Self {
        Self { year, score }
    }
}

/// Common contract of all detectors
pub trait Detector: Send + Sync {
    /// Short name used for output files and logs
    fn name(&self) -> &'static str;

    /// Score the years of one word. Only years with a positive score are
    /// returned.
    fn score_series(&self, series: &WordSeries) -> Result<Vec<YearScore>>;
}

/// Instantiate one detector of the given kind from `config`
pub fn build_detector(kind: DetectorKind, config: &EventsConfig) -> Box<dyn Detector> {
    match kind {
        DetectorKind::Gaussian => Box::new(GaussianDetector::new(
            config.gaussian.clone(),
            config.store.years.len(),
        )),
        DetectorKind::Kleinberg => Box::new(KleinbergDetector::new(config.kleinberg.clone())),
        DetectorKind::Discrepancy => {
            Box::new(DiscrepancyDetector::new(config.discrepancy.clone()))
        }
        DetectorKind::Ratio => Box::new(RatioDetector::new(config.ratio.clone())),
        DetectorKind::Linear => Box::new(LinearDetector::new(config.linear.clone())),
    }
}

/// Instantiate the active detectors, in configuration order
pub fn build_detectors(config: &EventsConfig) -> Vec<Box<dyn Detector>> {
    config
        .detectors
        .iter()
        .map(|&kind| build_detector(kind, config))
        .collect()
}
