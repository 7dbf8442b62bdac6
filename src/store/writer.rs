//! Store writer
//!
//! Records arrive grouped by word. The writer buffers one word at a time and,
//! when the word changes, appends the index record, the word bytes and the
//! time table to the three store files. Offsets are cumulative, so every new
//! entry points past everything written before it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use super::files::StorePaths;
use super::types::{encode_time_records, Entry, TimeRecord, ENTRY_RECORD_SIZE};
use crate::config::StoreConfig;
use crate::error::{EventsError, Result};

/// Counters reported when a store build finishes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Entries written to the index
    pub words_written: u64,
    /// Words dropped by the minimum match count policy
    pub words_pruned: u64,
    /// Time records dropped because a word exceeded the table cap
    pub rows_dropped: u64,
    /// Bytes written to the word blob
    pub word_bytes: u64,
    /// Bytes written to the time file
    pub time_bytes: u64,
}

/// Low-level appender shared by the writer and the sort stage
///
/// Owns the three output files and the cumulative offsets.
pub struct StoreAppender {
    main: BufWriter<File>,
    words: BufWriter<File>,
    time: BufWriter<File>,
    word_offset: u64,
    time_offset: u64,
    entries: u64,
    scratch: Vec<u8>,
}

impl StoreAppender {
    /// Create or truncate the store files at `base`
    pub fn create<P: AsRef<Path>>(base: P) -> Result<Self> {
        let (main, words, time) = StorePaths::new(base).create()?;
        Ok(Self {
            main: BufWriter::new(main),
            words: BufWriter::new(words),
            time: BufWriter::new(time),
            word_offset: 0,
            time_offset: 0,
            entries: 0,
            scratch: Vec::new(),
        })
    }

    /// Append one entry. Offsets and lengths in `entry` are recomputed;
    /// the aggregate counts are kept as given.
    pub fn append(&mut self, word: &str, entry: &Entry, table: &[TimeRecord]) -> Result<Entry> {
        let word_length = u16::try_from(word.len()).map_err(|_| EventsError::OffsetOverflow {
            word: word.to_string(),
            what: "word length",
            offset: word.len() as u64,
        })?;
        let time_length = u16::try_from(table.len()).map_err(|_| EventsError::OffsetOverflow {
            word: word.to_string(),
            what: "time length",
            offset: table.len() as u64,
        })?;
        let word_offset = checked_offset(word, "word", self.word_offset)?;
        let time_offset = checked_offset(word, "time", self.time_offset)?;

        let record = Entry {
            word_offset,
            time_offset,
            word_length,
            time_length,
            total_match_count: entry.total_match_count,
            total_volume_count: entry.total_volume_count,
        };

        let mut buf = [0u8; ENTRY_RECORD_SIZE];
        record.write_ne(&mut buf);
        self.main.write_all(&buf)?;
        self.words.write_all(word.as_bytes())?;

        self.scratch.clear();
        encode_time_records(table, &mut self.scratch);
        self.time.write_all(&self.scratch)?;

        self.word_offset += word.len() as u64;
        self.time_offset += self.scratch.len() as u64;
        self.entries += 1;
        Ok(record)
    }

    /// Number of entries appended so far
    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn word_bytes(&self) -> u64 {
        self.word_offset
    }

    pub fn time_bytes(&self) -> u64 {
        self.time_offset
    }

    /// Flush buffered bytes of all three files to the OS
    pub fn flush(&mut self) -> Result<()> {
        self.main.flush()?;
        self.words.flush()?;
        self.time.flush()?;
        Ok(())
    }
}

fn checked_offset(word: &str, what: &'static str, offset: u64) -> Result<u32> {
    u32::try_from(offset).map_err(|_| EventsError::OffsetOverflow {
        word: word.to_string(),
        what,
        offset,
    })
}

/// The word currently being accumulated
struct PendingWord {
    word: String,
    total_match_count: u64,
    total_volume_count: u32,
    table: Vec<TimeRecord>,
    dropped: u64,
}

/// Streaming writer that coalesces grouped `(word, year, counts)` records
pub struct StoreWriter {
    appender: StoreAppender,
    config: StoreConfig,
    pending: Option<PendingWord>,
    stats: WriterStats,
}

impl StoreWriter {
    /// Create or truncate the store files at `base`
    pub fn create<P: AsRef<Path>>(base: P, config: StoreConfig) -> Result<Self> {
        let base = base.as_ref();
        debug!("Creating store at {}", base.display());
        Ok(Self {
            appender: StoreAppender::create(base)?,
            config,
            pending: None,
            stats: WriterStats::default(),
        })
    }

    /// Add one record. All records for a word must arrive consecutively.
    pub fn update(
        &mut self,
        word: &str,
        year: u16,
        match_count: u64,
        volume_count: u32,
    ) -> Result<()> {
        let same_word = self.pending.as_ref().map(|p| p.word == word).unwrap_or(false);
        if !same_word {
            self.flush()?;
            self.pending = Some(PendingWord {
                word: word.to_string(),
                total_match_count: 0,
                total_volume_count: 0,
                table: Vec::new(),
                dropped: 0,
            });
        }

        let cap = self.config.max_table_years.min(u16::MAX as usize);
        if let Some(pending) = self.pending.as_mut() {
            pending.total_match_count = pending.total_match_count.saturating_add(match_count);
            pending.total_volume_count = pending.total_volume_count.saturating_add(volume_count);
            if pending.table.len() < cap {
                pending
                    .table
                    .push(TimeRecord::new(year, match_count, volume_count));
            } else {
                pending.dropped += 1;
            }
        }
        Ok(())
    }

    /// Emit the buffered word, if any
    pub fn flush(&mut self) -> Result<()> {
        let pending = match self.pending.take() {
            Some(pending) => pending,
            None => return Ok(()),
        };

        if pending.dropped > 0 {
            warn!(
                "Time table of '{}' exceeds {} years, dropped {} records",
                pending.word, self.config.max_table_years, pending.dropped
            );
            self.stats.rows_dropped += pending.dropped;
        }

        if pending.total_match_count < self.config.min_total_match_count {
            self.stats.words_pruned += 1;
            return Ok(());
        }

        if pending.word.len() > u16::MAX as usize {
            warn!(
                "Dropping word of {} bytes starting with {:?}",
                pending.word.len(),
                pending.word.chars().take(16).collect::<String>()
            );
            self.stats.words_pruned += 1;
            return Ok(());
        }

        let entry = Entry {
            total_match_count: pending.total_match_count,
            total_volume_count: pending.total_volume_count,
            ..Default::default()
        };
        self.appender.append(&pending.word, &entry, &pending.table)?;
        self.stats.words_written += 1;
        Ok(())
    }

    /// Counters so far (the buffered word is not yet included)
    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Flush the last word and all file buffers
    pub fn finish(mut self) -> Result<WriterStats> {
        self.flush()?;
        self.appender.flush()?;
        self.stats.word_bytes = self.appender.word_bytes();
        self.stats.time_bytes = self.appender.time_bytes();
        info!(
            "Store written: {} words, {} pruned, {} rows dropped",
            self.stats.words_written, self.stats.words_pruned, self.stats.rows_dropped
        );
        Ok(self.stats)
    }
}
