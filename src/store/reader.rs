//! Read-only access to a store
//!
//! The entry index is memory-mapped and the word blob is loaded whole, so
//! word access and binary search never touch the disk. Time tables are read
//! on demand with a seek into the time file. Every offset and length coming
//! from the index is checked before it is used.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::Path;

use memmap2::Mmap;
use parking_lot::Mutex;
use tracing::debug;

use super::files::StorePaths;
use super::totals::YearTotals;
use super::types::{decode_time_records, Entry, TimeRecord, YearRange, ENTRY_RECORD_SIZE};
use crate::error::{EventsError, Result};

/// Bytes of the entry index
enum IndexBytes {
    Mapped(Mmap),
    Empty,
}

impl Deref for IndexBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            IndexBytes::Mapped(mmap) => mmap,
            IndexBytes::Empty => &[],
        }
    }
}

/// Random-access reader over the three store files
///
/// Shareable across threads; time-file reads are serialized on one handle.
pub struct StoreReader {
    paths: StorePaths,
    index: IndexBytes,
    words: Vec<u8>,
    time: Mutex<File>,
    time_file_size: u64,
    num_words: usize,
    totals: Option<YearTotals>,
}

impl StoreReader {
    /// Open the store files at `base` without a totals table
    pub fn open<P: AsRef<Path>>(base: P) -> Result<Self> {
        let paths = StorePaths::new(base);
        let (main, mut words_file, time) = paths.open_read()?;

        let index_size = main.metadata()?.len();
        if index_size % ENTRY_RECORD_SIZE as u64 != 0 {
            return Err(EventsError::TruncatedIndex {
                size: index_size,
                record_size: ENTRY_RECORD_SIZE,
            });
        }
        let index = if index_size == 0 {
            IndexBytes::Empty
        } else {
            // SAFETY: the store is immutable once written and writers never
            // run concurrently with readers of the same store.
            IndexBytes::Mapped(unsafe { Mmap::map(&main)? })
        };

        let mut words = Vec::with_capacity(words_file.metadata()?.len() as usize);
        words_file.read_to_end(&mut words)?;

        let time_file_size = time.metadata()?.len();
        let num_words = (index_size / ENTRY_RECORD_SIZE as u64) as usize;

        debug!(
            "Opened store {} with {} entries ({} word bytes, {} time bytes)",
            paths.main.display(),
            num_words,
            words.len(),
            time_file_size
        );

        Ok(Self {
            paths,
            index,
            words,
            time: Mutex::new(time),
            time_file_size,
            num_words,
            totals: None,
        })
    }

    /// Open the store and load the corpus totals reference file
    pub fn open_with_totals<P: AsRef<Path>, Q: AsRef<Path>>(
        base: P,
        totals_path: Q,
        years: YearRange,
    ) -> Result<Self> {
        let totals = YearTotals::load(totals_path, years)?;
        Ok(Self::open(base)?.with_totals(totals))
    }

    /// Attach an already loaded totals table
    pub fn with_totals(mut self, totals: YearTotals) -> Self {
        self.totals = Some(totals);
        self
    }

    pub fn totals(&self) -> Option<&YearTotals> {
        self.totals.as_ref()
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Number of entries in the index
    pub fn num_words(&self) -> usize {
        self.num_words
    }

    pub fn is_empty(&self) -> bool {
        self.num_words == 0
    }

    /// Size of the word blob in bytes
    pub fn word_blob_len(&self) -> usize {
        self.words.len()
    }

    /// Size of the time file in bytes
    pub fn time_file_size(&self) -> u64 {
        self.time_file_size
    }

    /// Decode the index record of entry `index`
    pub fn entry(&self, index: usize) -> Result<Entry> {
        if index >= self.num_words {
            return Err(EventsError::EntryOutOfRange {
                index,
                num_words: self.num_words,
            });
        }
        let start = index * ENTRY_RECORD_SIZE;
        let mut buf = [0u8; ENTRY_RECORD_SIZE];
        buf.copy_from_slice(&self.index[start..start + ENTRY_RECORD_SIZE]);
        Ok(Entry::read_ne(&buf))
    }

    /// The word of entry `index`, checked against the word blob
    pub fn word_at(&self, index: usize) -> Result<&str> {
        let entry = self.entry(index)?;
        self.word_of(index, &entry)
    }

    fn word_of(&self, index: usize, entry: &Entry) -> Result<&str> {
        let blob_len = self.words.len();
        let offset = entry.word_offset as usize;
        let length = entry.word_length as usize;
        if offset >= blob_len || length > blob_len - offset {
            return Err(EventsError::WordOutOfBounds {
                index,
                offset: entry.word_offset,
                length: entry.word_length,
                blob_len,
            });
        }
        std::str::from_utf8(&self.words[offset..offset + length]).map_err(|_| {
            EventsError::InvalidWord {
                index,
                offset: entry.word_offset,
            }
        })
    }

    /// Read the time table of entry `index`
    pub fn read_time_table(&self, index: usize) -> Result<Vec<TimeRecord>> {
        let entry = self.entry(index)?;
        self.time_table_of(index, &entry)
    }

    fn time_table_of(&self, index: usize, entry: &Entry) -> Result<Vec<TimeRecord>> {
        self.check_time_bounds(index, entry)?;

        let mut bytes = vec![0u8; entry.time_bytes() as usize];
        {
            let mut file = self.time.lock();
            file.seek(SeekFrom::Start(entry.time_offset as u64))?;
            file.read_exact(&mut bytes)?;
        }
        Ok(decode_time_records(&bytes))
    }

    fn check_time_bounds(&self, index: usize, entry: &Entry) -> Result<()> {
        if entry.time_length == 0 {
            return Err(EventsError::EmptyTimeTable {
                index,
                offset: entry.time_offset,
            });
        }
        let end = entry.time_offset as u64 + entry.time_bytes();
        if end > self.time_file_size {
            return Err(EventsError::TimeTableOutOfBounds {
                index,
                offset: entry.time_offset,
                length: entry.time_length,
                file_len: self.time_file_size,
            });
        }
        Ok(())
    }

    /// Binary search for `word`. Only meaningful on a sorted store.
    pub fn lookup(&self, word: &str) -> Result<Option<usize>> {
        let target = word.as_bytes();
        let mut lo = 0usize;
        let mut hi = self.num_words;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.word_at(mid)?.as_bytes().cmp(target) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(mid)),
            }
        }
        Ok(None)
    }

    /// Look up a word and read its time table
    pub fn time_table_for(&self, word: &str) -> Result<Option<(usize, Vec<TimeRecord>)>> {
        match self.lookup(word)? {
            Some(index) => Ok(Some((index, self.read_time_table(index)?))),
            None => Ok(None),
        }
    }

    /// Iterate over `(index, word)` pairs in index order
    pub fn iter_words(&self) -> impl Iterator<Item = Result<(usize, &str)>> + '_ {
        (0..self.num_words).map(move |i| self.word_at(i).map(|w| (i, w)))
    }

    /// Check word and time bounds of every entry, reporting the first violation
    pub fn verify(&self) -> Result<()> {
        for index in 0..self.num_words {
            let entry = self.entry(index)?;
            self.word_of(index, &entry)?;
            self.check_time_bounds(index, &entry)?;
        }
        Ok(())
    }

    /// True when words are in non-decreasing byte order
    ///
    /// Equal neighbours are allowed, `sort` keeps duplicate words.
    pub fn is_sorted(&self) -> Result<bool> {
        let mut previous: Option<&str> = None;
        for item in self.iter_words() {
            let (_, word) = item?;
            if let Some(prev) = previous {
                if prev.as_bytes() > word.as_bytes() {
                    return Ok(false);
                }
            }
            previous = Some(word);
        }
        Ok(true)
    }
}
