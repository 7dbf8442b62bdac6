use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::detect::{DiscrepancyParams, GaussianParams, KleinbergParams, LinearParams, RatioParams};
use crate::error::{EventsError, Result};
use crate::store::YearRange;

/// Store layout and write-time policy
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Years addressable by dense series and the totals table
    pub years: YearRange,
    /// Maximum number of time records buffered per word while writing
    pub max_table_years: usize,
    /// Words whose total match count is below this are not written
    pub min_total_match_count: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            years: YearRange::default(),
            max_table_years: 520,
            min_total_match_count: 1 << 14,
        }
    }
}

impl StoreConfig {
    pub fn with_years(mut self, years: YearRange) -> Self {
        self.years = years;
        self
    }

    pub fn with_min_total_match_count(mut self, threshold: u64) -> Self {
        self.min_total_match_count = threshold;
        self
    }

    pub fn with_max_table_years(mut self, max_table_years: usize) -> Self {
        self.max_table_years = max_table_years;
        self
    }
}

/// Series construction and smoothing
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Half width of the centered moving average
    pub smoothing_window: usize,
    /// Values below `max / ratio` count as zero before smoothing
    pub significance_ratio: Option<f64>,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 2,
            significance_ratio: None,
        }
    }
}

/// Which words a batch scan visits and which years it reports
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Skip words whose total match count is below this
    pub min_total_match_count: u64,
    /// Skip part-of-speech tagged forms such as `run_VERB`
    pub skip_tagged_words: bool,
    /// Drop scores for years before this one
    pub min_report_year: Option<u16>,
    /// Worker threads for the parallel scan (1 = sequential)
    pub worker_threads: usize,
    /// Entries handed to the worker pool per round
    pub chunk_size: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_total_match_count: 1 << 20,
            skip_tagged_words: true,
            min_report_year: None,
            worker_threads: 1,
            chunk_size: 4096,
        }
    }
}

impl ScanConfig {
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    pub fn with_min_total_match_count(mut self, threshold: u64) -> Self {
        self.min_total_match_count = threshold;
        self
    }

    pub fn with_min_report_year(mut self, year: Option<u16>) -> Self {
        self.min_report_year = year;
        self
    }
}

/// Detector selector used by configuration files and the CLI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Gaussian,
    Kleinberg,
    Discrepancy,
    Ratio,
    Linear,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 5] = [
        DetectorKind::Gaussian,
        DetectorKind::Kleinberg,
        DetectorKind::Discrepancy,
        DetectorKind::Ratio,
        DetectorKind::Linear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Gaussian => "gaussian",
            DetectorKind::Kleinberg => "kleinberg",
            DetectorKind::Discrepancy => "discrepancy",
            DetectorKind::Ratio => "ratio",
            DetectorKind::Linear => "linear",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorKind {
    type Err = EventsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gaussian" => Ok(DetectorKind::Gaussian),
            "kleinberg" => Ok(DetectorKind::Kleinberg),
            "discrepancy" | "burstiness" => Ok(DetectorKind::Discrepancy),
            "ratio" | "double-change" | "double_change" => Ok(DetectorKind::Ratio),
            "linear" => Ok(DetectorKind::Linear),
            other => Err(EventsError::Config(format!("unknown detector '{}'", other))),
        }
    }
}

/// Complete configuration for a batch run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub store: StoreConfig,
    pub series: SeriesConfig,
    pub scan: ScanConfig,
    pub detectors: Vec<DetectorKind>,
    pub gaussian: GaussianParams,
    pub kleinberg: KleinbergParams,
    pub discrepancy: DiscrepancyParams,
    pub ratio: RatioParams,
    pub linear: LinearParams,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            series: SeriesConfig::default(),
            scan: ScanConfig::default(),
            detectors: vec![DetectorKind::Gaussian],
            gaussian: GaussianParams::default(),
            kleinberg: KleinbergParams::default(),
            discrepancy: DiscrepancyParams::default(),
            ratio: RatioParams::default(),
            linear: LinearParams::default(),
        }
    }
}

impl EventsConfig {
    /// Load a JSON configuration file; missing fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: EventsConfig = serde_json::from_str(&text)
            .map_err(|e| EventsError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EventsError::Config(e.to_string()))
    }

    /// Reject settings no batch run can work with
    pub fn validate(&self) -> Result<()> {
        if self.store.max_table_years == 0 {
            return Err(EventsError::Config(
                "max_table_years must be positive".to_string(),
            ));
        }
        if self.store.years.is_empty() {
            return Err(EventsError::Config("year range is empty".to_string()));
        }
        if self.store.years.end_year() > u16::MAX as u32 + 1 {
            return Err(EventsError::Config(format!(
                "year range {} does not fit in u16 years",
                self.store.years
            )));
        }
        if 2 * self.series.smoothing_window + 1 > self.store.years.len() {
            return Err(EventsError::Config(format!(
                "smoothing window {} is wider than the {} supported years",
                self.series.smoothing_window,
                self.store.years.len()
            )));
        }
        if let Some(ratio) = self.series.significance_ratio {
            if !(ratio > 0.0) {
                return Err(EventsError::Config(format!(
                    "significance ratio must be positive, got {}",
                    ratio
                )));
            }
        }
        if self.scan.chunk_size == 0 {
            return Err(EventsError::Config("scan chunk size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn with_detectors(mut self, detectors: Vec<DetectorKind>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn with_scan(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }
}
