//! Rewrite a store in byte-wise word order
//!
//! Only the index is sorted in memory. Time tables are copied one entry at a
//! time from the source store, so the offsets of the output are rebuilt from
//! scratch while counts are carried over untouched.

use std::path::Path;

use tracing::{debug, info, warn};

use super::reader::StoreReader;
use super::writer::StoreAppender;
use crate::error::Result;

/// How often sort progress is logged, in entries
const PROGRESS_INTERVAL: usize = 10_000;

/// Counters reported by [`sort_store`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortStats {
    pub entries: u64,
    pub word_bytes: u64,
    pub time_bytes: u64,
    /// Words that appeared more than once in the source
    pub duplicates: u64,
}

/// Sort the store at `src` into a new store at `dst`
///
/// `src` and `dst` must name different stores.
pub fn sort_store<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<SortStats> {
    let reader = StoreReader::open(src.as_ref())?;
    sort_reader(&reader, dst)
}

/// Sort an already opened store into a new store at `dst`
pub fn sort_reader<Q: AsRef<Path>>(reader: &StoreReader, dst: Q) -> Result<SortStats> {
    let mut order: Vec<(usize, &str)> = reader.iter_words().collect::<Result<_>>()?;
    order.sort_by(|a, b| a.1.as_bytes().cmp(b.1.as_bytes()));
    debug!("Sorted {} words in memory", order.len());

    let mut appender = StoreAppender::create(dst.as_ref())?;
    let mut stats = SortStats::default();
    let mut previous: Option<&str> = None;

    for (done, &(index, word)) in order.iter().enumerate() {
        if previous == Some(word) {
            warn!("Duplicate word '{}' at entry {}", word, index);
            stats.duplicates += 1;
        }
        previous = Some(word);

        let entry = reader.entry(index)?;
        let table = reader.read_time_table(index)?;
        appender.append(word, &entry, &table)?;

        if (done + 1) % PROGRESS_INTERVAL == 0 {
            debug!("Sorted {}/{} entries", done + 1, order.len());
        }
    }

    appender.flush()?;
    stats.entries = appender.entries();
    stats.word_bytes = appender.word_bytes();
    stats.time_bytes = appender.time_bytes();

    info!(
        "Sorted store written to {}: {} entries, {} duplicates",
        dst.as_ref().display(),
        stats.entries,
        stats.duplicates
    );
    Ok(stats)
}
