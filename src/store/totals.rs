//! Corpus-wide per-year totals used as the normalization denominator
//!
//! The reference file is text: whitespace/tab separated quadruples
//! `year,match_count,page_count,volume_count`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::YearRange;
use crate::error::{EventsError, Result};

/// Totals for one calendar year
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalCounts {
    pub match_count: u64,
    pub page_count: u32,
    pub volume_count: u32,
}

/// Per-year totals over a fixed year range
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct YearTotals {
    range: YearRange,
    counts: Vec<TotalCounts>,
}

impl YearTotals {
    /// All-zero totals over `range`
    pub fn empty(range: YearRange) -> Self {
        Self {
            range,
            counts: vec![TotalCounts::default(); range.len()],
        }
    }

    /// Load the reference file. A missing or malformed file is fatal.
    pub fn load<P: AsRef<Path>>(path: P, range: YearRange) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EventsError::Totals(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text, range)
    }

    /// Parse the reference format
    pub fn parse(text: &str, range: YearRange) -> Result<Self> {
        let mut totals = Self::empty(range);
        let mut parsed = 0usize;

        for token in text.split_whitespace() {
            let fields: Vec<&str> = token.split(',').filter(|f| !f.is_empty()).collect();
            if fields.len() != 4 {
                return Err(EventsError::Totals(format!(
                    "expected year,match,page,volume but found '{}'",
                    token
                )));
            }
            let year: u16 = parse_field(fields[0], "year")?;
            let counts = TotalCounts {
                match_count: parse_field(fields[1], "match count")?,
                page_count: parse_field(fields[2], "page count")?,
                volume_count: parse_field(fields[3], "volume count")?,
            };
            parsed += 1;

            match range.index_of(year) {
                Some(index) => totals.counts[index] = counts,
                None => debug!("Skipping totals for year {} outside {}", year, range),
            }
        }

        if parsed == 0 {
            return Err(EventsError::Totals("no yearly totals found".to_string()));
        }
        Ok(totals)
    }

    /// Build from explicit `(year, match_count)` pairs
    pub fn from_match_counts(range: YearRange, counts: &[(u16, u64)]) -> Self {
        let mut totals = Self::empty(range);
        for &(year, match_count) in counts {
            if let Some(index) = range.index_of(year) {
                totals.counts[index].match_count = match_count;
            }
        }
        totals
    }

    /// Same match count for every year of the range
    pub fn uniform(range: YearRange, match_count: u64) -> Self {
        let mut totals = Self::empty(range);
        for counts in &mut totals.counts {
            counts.match_count = match_count;
        }
        totals
    }

    pub fn range(&self) -> YearRange {
        self.range
    }

    /// Totals for a calendar year
    pub fn get(&self, year: u16) -> Option<&TotalCounts> {
        self.range.index_of(year).map(|i| &self.counts[i])
    }

    /// Totals by dense series index
    pub fn at(&self, index: usize) -> Option<&TotalCounts> {
        self.counts.get(index)
    }

    /// Global match counts, one per year of the range
    pub fn match_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.match_count).collect()
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, name: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| EventsError::Totals(format!("invalid {} '{}'", name, field)))
}
