use thiserror::Error;

/// Main error type for store and detector operations
#[derive(Error, Debug)]
pub enum EventsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entry index {index} out of range (store has {num_words} entries)")]
    EntryOutOfRange { index: usize, num_words: usize },

    #[error(
        "Word of entry {index} out of bounds: offset {offset} + length {length} exceeds word blob of {blob_len} bytes"
    )]
    WordOutOfBounds {
        index: usize,
        offset: u32,
        length: u16,
        blob_len: usize,
    },

    #[error("Word of entry {index} at offset {offset} is not valid UTF-8")]
    InvalidWord { index: usize, offset: u32 },

    #[error("Entry {index} has an empty time table (time offset {offset})")]
    EmptyTimeTable { index: usize, offset: u32 },

    #[error(
        "Time table of entry {index} out of bounds: offset {offset} + {length} records exceeds time file of {file_len} bytes"
    )]
    TimeTableOutOfBounds {
        index: usize,
        offset: u32,
        length: u16,
        file_len: u64,
    },

    #[error("Year {year} outside supported range [{min_year}, {end_year})")]
    YearOutOfRange {
        year: u16,
        min_year: u16,
        end_year: u32,
    },

    #[error("Offset overflow while writing '{word}': {what} offset would reach {offset}")]
    OffsetOverflow {
        word: String,
        what: &'static str,
        offset: u64,
    },

    #[error("Index file size {size} is not a multiple of the {record_size}-byte entry record")]
    TruncatedIndex { size: u64, record_size: usize },

    #[error("Totals file error: {0}")]
    Totals(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Degenerate input: {0}")]
    Degenerate(String),
}

/// Result type alias for store and detector operations
pub type Result<T> = std::result::Result<T, EventsError>;

impl EventsError {
    /// Check if this error must abort the batch.
    ///
    /// Everything except degenerate detector input implies a corrupt store,
    /// a broken reference file or a failed device.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, EventsError::Degenerate(_))
    }

    /// Check if this error points at a corrupt store
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EventsError::EntryOutOfRange { .. }
                | EventsError::WordOutOfBounds { .. }
                | EventsError::InvalidWord { .. }
                | EventsError::EmptyTimeTable { .. }
                | EventsError::TimeTableOutOfBounds { .. }
                | EventsError::YearOutOfRange { .. }
                | EventsError::OffsetOverflow { .. }
                | EventsError::TruncatedIndex { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EventsError::WordOutOfBounds {
            index: 7,
            offset: 120,
            length: 9,
            blob_len: 125,
        };
        assert_eq!(
            err.to_string(),
            "Word of entry 7 out of bounds: offset 120 + length 9 exceeds word blob of 125 bytes"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!EventsError::Degenerate("flat".to_string()).is_fatal());
        assert!(EventsError::EmptyTimeTable { index: 1, offset: 0 }.is_fatal());
        assert!(EventsError::Totals("missing".to_string()).is_fatal());

        assert!(EventsError::EmptyTimeTable { index: 1, offset: 0 }.is_structural());
        assert!(!EventsError::Totals("missing".to_string()).is_structural());
    }
}
