//! Core types for the word-indexed time-series store
//!
//! The store is three flat files sharing a base name:
//! - `<base>.main`: fixed-size [`Entry`] records, no header
//! - `<base>.words`: concatenated word bytes, no delimiters
//! - `<base>.time`: concatenated fixed-size [`TimeRecord`]s, no delimiters
//!
//! All integers use native byte order. This is an internal format, not a
//! portable interchange format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one entry record in the index file, in bytes.
///
/// ```text
/// word_offset:        u32  [0..4]
/// time_offset:        u32  [4..8]
/// word_length:        u16  [8..10]
/// time_length:        u16  [10..12]
/// reserved            -    [12..16]
/// total_match_count:  u64  [16..24]
/// total_volume_count: u32  [24..28]
/// reserved            -    [28..32]
/// ```
pub const ENTRY_RECORD_SIZE: usize = 32;

/// Size of one time-table record in the time file, in bytes.
///
/// ```text
/// match_count:  u64  [0..8]
/// volume_count: u32  [8..12]
/// year:         u16  [12..14]
/// reserved      -    [14..16]
/// ```
pub const TIME_RECORD_SIZE: usize = 16;

/// First calendar year covered by the default year range
pub const MIN_YEAR: u16 = 1500;

/// Number of years covered by the default year range
pub const MAX_YEARS: usize = 509;

/// Index record for one word
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Byte offset of the word in the word blob
    pub word_offset: u32,
    /// Byte offset of the time table in the time file
    pub time_offset: u32,
    /// Length of the word in bytes
    pub word_length: u16,
    /// Number of time records
    pub time_length: u16,
    /// Sum of match counts over all years
    pub total_match_count: u64,
    /// Sum of volume counts over all years
    pub total_volume_count: u32,
}

impl Entry {
    /// Serialize to [`ENTRY_RECORD_SIZE`] bytes
    pub fn write_ne(&self, buf: &mut [u8; ENTRY_RECORD_SIZE]) {
        buf.fill(0);
        buf[0..4].copy_from_slice(&self.word_offset.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.time_offset.to_ne_bytes());
        buf[8..10].copy_from_slice(&self.word_length.to_ne_bytes());
        buf[10..12].copy_from_slice(&self.time_length.to_ne_bytes());
        buf[16..24].copy_from_slice(&self.total_match_count.to_ne_bytes());
        buf[24..28].copy_from_slice(&self.total_volume_count.to_ne_bytes());
    }

    /// Deserialize from [`ENTRY_RECORD_SIZE`] bytes
    pub fn read_ne(buf: &[u8; ENTRY_RECORD_SIZE]) -> Self {
        Self {
            word_offset: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
            time_offset: u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]),
            word_length: u16::from_ne_bytes([buf[8], buf[9]]),
            time_length: u16::from_ne_bytes([buf[10], buf[11]]),
            total_match_count: u64::from_ne_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
            total_volume_count: u32::from_ne_bytes([buf[24], buf[25], buf[26], buf[27]]),
        }
    }

    /// Number of bytes this entry's time table occupies in the time file
    pub fn time_bytes(&self) -> u64 {
        self.time_length as u64 * TIME_RECORD_SIZE as u64
    }
}

/// One year of counts for a word
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    pub year: u16,
    pub match_count: u64,
    pub volume_count: u32,
}

impl TimeRecord {
    pub fn new(year: u16, match_count: u64, volume_count: u32) -> Self {
        Self {
            year,
            match_count,
            volume_count,
        }
    }

    /// Serialize to [`TIME_RECORD_SIZE`] bytes
    pub fn write_ne(&self, buf: &mut [u8; TIME_RECORD_SIZE]) {
        buf.fill(0);
        buf[0..8].copy_from_slice(&self.match_count.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.volume_count.to_ne_bytes());
        buf[12..14].copy_from_slice(&self.year.to_ne_bytes());
    }

    /// Deserialize from [`TIME_RECORD_SIZE`] bytes
    pub fn read_ne(buf: &[u8; TIME_RECORD_SIZE]) -> Self {
        Self {
            match_count: u64::from_ne_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
            volume_count: u32::from_ne_bytes([buf[8], buf[9], buf[10], buf[11]]),
            year: u16::from_ne_bytes([buf[12], buf[13]]),
        }
    }
}

/// Decode a contiguous run of time records
pub fn decode_time_records(bytes: &[u8]) -> Vec<TimeRecord> {
    bytes
        .chunks_exact(TIME_RECORD_SIZE)
        .map(|chunk| {
            let mut buf = [0u8; TIME_RECORD_SIZE];
            buf.copy_from_slice(chunk);
            TimeRecord::read_ne(&buf)
        })
        .collect()
}

/// Encode time records back to back
pub fn encode_time_records(records: &[TimeRecord], output: &mut Vec<u8>) {
    let mut buf = [0u8; TIME_RECORD_SIZE];
    output.reserve(records.len() * TIME_RECORD_SIZE);
    for record in records {
        record.write_ne(&mut buf);
        output.extend_from_slice(&buf);
    }
}

/// Contiguous range of supported calendar years, `[min_year, min_year + num_years)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min_year: u16,
    pub num_years: usize,
}

impl YearRange {
    pub fn new(min_year: u16, num_years: usize) -> Self {
        Self {
            min_year,
            num_years,
        }
    }

    /// One past the last supported year
    pub fn end_year(&self) -> u32 {
        self.min_year as u32 + self.num_years as u32
    }

    pub fn contains(&self, year: u16) -> bool {
        year >= self.min_year && (year as u32) < self.end_year()
    }

    /// Dense series index of a year, if supported
    pub fn index_of(&self, year: u16) -> Option<usize> {
        if self.contains(year) {
            Some((year - self.min_year) as usize)
        } else {
            None
        }
    }

    /// Calendar year of a dense series index
    pub fn year_at(&self, index: usize) -> u16 {
        self.min_year + index as u16
    }

    pub fn len(&self) -> usize {
        self.num_years
    }

    pub fn is_empty(&self) -> bool {
        self.num_years == 0
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self::new(MIN_YEAR, MAX_YEARS)
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.min_year, self.end_year())
    }
}
