//! Word-indexed time-series store
//!
//! Build a store with [`StoreWriter`], order it with [`sort_store`] and read
//! it back through [`StoreReader`].

mod files;
mod reader;
mod sort;
mod totals;
mod types;
mod writer;

pub use files::{StorePaths, MAIN_EXTENSION, TIME_EXTENSION, WORDS_EXTENSION};
pub use reader::StoreReader;
pub use sort::{sort_reader, sort_store, SortStats};
pub use totals::{TotalCounts, YearTotals};
pub use types::{
    decode_time_records, encode_time_records, Entry, TimeRecord, YearRange, ENTRY_RECORD_SIZE,
    MAX_YEARS, MIN_YEAR, TIME_RECORD_SIZE,
};
pub use writer::{StoreAppender, StoreWriter, WriterStats};
