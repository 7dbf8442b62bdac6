//! Ingestion of raw n-gram count files
//!
//! Input lines follow the Google Books 1-gram layout
//! `word<TAB>year<TAB>match_count<TAB>volume_count`, grouped by word.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::StoreWriter;

/// One parsed input line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NgramRecord<'a> {
    pub word: &'a str,
    pub year: u16,
    pub match_count: u64,
    pub volume_count: u32,
}

/// Counters of an ingestion run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files: u64,
    pub lines: u64,
    pub records: u64,
    pub malformed: u64,
}

/// Parse one line; `None` when it does not have the expected shape
pub fn parse_line(line: &str) -> Option<NgramRecord<'_>> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut fields = line.split('\t');
    let word = fields.next()?;
    if word.is_empty() {
        return None;
    }
    let year = fields.next()?.trim().parse().ok()?;
    let match_count = fields.next()?.trim().parse().ok()?;
    let volume_count = fields.next()?.trim().parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(NgramRecord {
        word,
        year,
        match_count,
        volume_count,
    })
}

/// Feed every line of `reader` into `writer`
pub fn ingest_reader<R: BufRead>(
    reader: R,
    writer: &mut StoreWriter,
    stats: &mut IngestStats,
) -> Result<()> {
    for (number, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        stats.lines += 1;
        let record = std::str::from_utf8(&line).ok().and_then(parse_line);
        match record {
            Some(record) => {
                writer.update(
                    record.word,
                    record.year,
                    record.match_count,
                    record.volume_count,
                )?;
                stats.records += 1;
            }
            None => {
                if !line.is_empty() {
                    warn!("Skipping malformed line {}", number + 1);
                    stats.malformed += 1;
                }
            }
        }
    }
    Ok(())
}

/// Ingest the given files, in order, into one store
pub fn ingest_files<P: AsRef<Path>>(paths: &[P], writer: &mut StoreWriter) -> Result<IngestStats> {
    let mut stats = IngestStats::default();
    for path in paths {
        let path = path.as_ref();
        debug!("Ingesting {}", path.display());
        let file = File::open(path)?;
        ingest_reader(BufReader::new(file), writer, &mut stats)?;
        stats.files += 1;
    }
    writer.flush()?;
    info!(
        "Ingested {} files: {} records, {} malformed lines",
        stats.files, stats.records, stats.malformed
    );
    Ok(stats)
}
