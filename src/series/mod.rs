//! Dense per-word frequency series
//!
//! A word's sparse time table is spread over the configured year range and
//! normalized against the corpus totals, then smoothed with a centered
//! moving average. Detectors only ever see [`WordSeries`].

use crate::config::SeriesConfig;
use crate::error::{EventsError, Result};
use crate::store::{TimeRecord, YearRange, YearTotals};

/// Everything a detector may look at for one word
#[derive(Clone, Debug, PartialEq)]
pub struct WordSeries {
    pub word: String,
    pub years: YearRange,
    /// `100 * word matches / corpus matches` per year
    pub raw: Vec<f64>,
    /// `raw` after significance gating and smoothing
    pub smoothed: Vec<f64>,
    /// Word match counts per year
    pub matches: Vec<u64>,
    /// Corpus match counts per year
    pub totals: Vec<u64>,
    /// Half width of the smoothing window that produced `smoothed`
    pub smoothing_window: usize,
}

impl WordSeries {
    pub fn len(&self) -> usize {
        self.smoothed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.smoothed.is_empty()
    }

    /// Dense indexes at which `smoothed` holds a full-window average
    pub fn smoothed_span(&self) -> std::ops::Range<usize> {
        let w = self.smoothing_window;
        if self.len() < 2 * w + 1 {
            return 0..0;
        }
        w..self.len() - w
    }
}

/// Spread a time table over the totals' year range
///
/// Years outside the range are a structural error. Years whose corpus total
/// is zero stay at zero.
pub fn to_dense_series(table: &[TimeRecord], totals: &YearTotals) -> Result<Vec<f64>> {
    let range = totals.range();
    let mut series = vec![0.0; range.len()];
    for record in table {
        let index = year_index(range, record.year)?;
        let total = totals.at(index).map(|t| t.match_count).unwrap_or(0);
        if total > 0 {
            series[index] = 100.0 * record.match_count as f64 / total as f64;
        }
    }
    Ok(series)
}

/// Word match counts per year of `range`
pub fn to_dense_counts(table: &[TimeRecord], range: YearRange) -> Result<Vec<u64>> {
    let mut counts = vec![0u64; range.len()];
    for record in table {
        let index = year_index(range, record.year)?;
        counts[index] = counts[index].saturating_add(record.match_count);
    }
    Ok(counts)
}

fn year_index(range: YearRange, year: u16) -> Result<usize> {
    range.index_of(year).ok_or(EventsError::YearOutOfRange {
        year,
        min_year: range.min_year,
        end_year: range.end_year(),
    })
}

/// Centered moving average over `2 * window + 1` values
pub fn smooth(series: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![0.0; series.len()];
    smooth_into(series, window, &mut out);
    out
}

/// Smooth `series` into `out`, which must have the same length
///
/// Positions without a full window are left untouched. A negative window
/// sum averages to zero.
pub fn smooth_into(series: &[f64], window: usize, out: &mut [f64]) {
    debug_assert_eq!(series.len(), out.len());
    let width = 2 * window + 1;
    let mut sum = 0.0;
    for i in 0..series.len() {
        sum += series[i];
        if i >= width {
            sum -= series[i - width];
        }
        if i + 1 >= width {
            out[i - window] = sum.max(0.0) / width as f64;
        }
    }
}

/// Zero every value below `max / ratio`
pub fn apply_significance(series: &mut [f64], ratio: f64) {
    let max = series.iter().cloned().fold(0.0, f64::max);
    let threshold = max / ratio;
    for value in series.iter_mut() {
        if *value < threshold {
            *value = 0.0;
        }
    }
}

/// Builds [`WordSeries`] against one totals table
pub struct SeriesBuilder<'a> {
    totals: &'a YearTotals,
    config: SeriesConfig,
    total_counts: Vec<u64>,
}

impl<'a> SeriesBuilder<'a> {
    pub fn new(totals: &'a YearTotals, config: SeriesConfig) -> Self {
        Self {
            totals,
            config,
            total_counts: totals.match_counts(),
        }
    }

    pub fn years(&self) -> YearRange {
        self.totals.range()
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Build the dense, normalized and smoothed series of one word
    pub fn build(&self, word: &str, table: &[TimeRecord]) -> Result<WordSeries> {
        let raw = to_dense_series(table, self.totals)?;
        let matches = to_dense_counts(table, self.totals.range())?;

        let window = self.config.smoothing_window;
        let smoothed = match self.config.significance_ratio {
            Some(ratio) => {
                let mut gated = raw.clone();
                apply_significance(&mut gated, ratio);
                smooth(&gated, window)
            }
            None => smooth(&raw, window),
        };

        Ok(WordSeries {
            word: word.to_string(),
            years: self.totals.range(),
            raw,
            smoothed,
            matches,
            totals: self.total_counts.clone(),
            smoothing_window: self.config.smoothing_window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> YearRange {
        YearRange::new(1900, 10)
    }

    #[test]
    fn test_dense_series() {
        let totals = YearTotals::from_match_counts(range(), &[(1900, 200), (1903, 50), (1905, 0)]);
        let table = vec![
            TimeRecord::new(1900, 20, 1),
            TimeRecord::new(1903, 5, 1),
            TimeRecord::new(1905, 9, 1),
        ];
        let series = to_dense_series(&table, &totals).unwrap();
        assert_eq!(series.len(), 10);
        assert!((series[0] - 10.0).abs() < 1e-12);
        assert!((series[3] - 10.0).abs() < 1e-12);
        // Zero corpus total is never divided into
        assert_eq!(series[5], 0.0);
        assert_eq!(series[1], 0.0);
    }

    #[test]
    fn test_year_out_of_range() {
        let totals = YearTotals::uniform(range(), 100);
        let table = vec![TimeRecord::new(1910, 1, 1)];
        let err = to_dense_series(&table, &totals).unwrap_err();
        assert!(matches!(
            err,
            EventsError::YearOutOfRange {
                year: 1910,
                min_year: 1900,
                end_year: 1910
            }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_smooth_constant() {
        let series = vec![3.0; 12];
        let smoothed = smooth(&series, 2);
        for (i, value) in smoothed.iter().enumerate() {
            if (2..10).contains(&i) {
                assert!((value - 3.0).abs() < 1e-12, "index {}", i);
            } else {
                assert_eq!(*value, 0.0);
            }
        }
    }

    #[test]
    fn test_smooth_spike() {
        let mut series = vec![0.0; 11];
        series[5] = 5.0;
        let smoothed = smooth(&series, 2);
        assert_eq!(smoothed[2], 0.0);
        for i in 3..8 {
            assert!((smoothed[i] - 1.0).abs() < 1e-12);
        }
        assert_eq!(smoothed[8], 0.0);
    }

    #[test]
    fn test_smooth_short_series() {
        let series = vec![1.0; 4];
        assert_eq!(smooth(&series, 2), vec![0.0; 4]);
        assert_eq!(smooth(&series, 0), series);
    }

    #[test]
    fn test_smooth_clamps_negative_sum() {
        let series = vec![-3.0, 1.0, 1.0, 1.0];
        let smoothed = smooth(&series, 0);
        assert_eq!(smoothed, vec![0.0, 1.0, 1.0, 1.0]);

        let smoothed = smooth(&[-3.0, 2.0, 2.0, 2.0], 1);
        assert_eq!(smoothed[1], 1.0 / 3.0);
        assert_eq!(smoothed[2], 2.0);
    }

    #[test]
    fn test_significance_gating() {
        let mut series = vec![150.0, 0.5, 1.0, 2.0];
        apply_significance(&mut series, 150.0);
        assert_eq!(series, vec![150.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_builder() {
        let totals = YearTotals::uniform(range(), 1000);
        let table: Vec<TimeRecord> = (1900..1910).map(|y| TimeRecord::new(y, 10, 1)).collect();
        let builder = SeriesBuilder::new(&totals, SeriesConfig::default());
        let series = builder.build("steady", &table).unwrap();

        assert_eq!(series.word, "steady");
        assert_eq!(series.matches, vec![10; 10]);
        assert_eq!(series.totals, vec![1000; 10]);
        assert_eq!(series.smoothed_span(), 2..8);
        for i in series.smoothed_span() {
            assert!((series.smoothed[i] - 1.0).abs() < 1e-12);
        }
    }
}
