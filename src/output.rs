//! Detector output files
//!
//! One sink per detector. Rows are appended so an interrupted batch can be
//! resumed without losing what was already written.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detect::YearScore;
use crate::error::{EventsError, Result};
use crate::store::YearRange;

/// Row layout of an output file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `word<TAB>year<TAB>score`, one row per scored year
    Summary,
    /// `word,c_0,...,c_{n-1}`, one row per word over the whole year range
    Relevance,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Summary => "txt",
            OutputFormat::Relevance => "csv",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Summary => f.write_str("summary"),
            OutputFormat::Relevance => f.write_str("relevance"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = EventsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "summary" | "txt" => Ok(OutputFormat::Summary),
            "relevance" | "csv" => Ok(OutputFormat::Relevance),
            other => Err(EventsError::Config(format!("unknown output format '{}'", other))),
        }
    }
}

/// How an existing output file is treated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Keep existing rows and write after them
    Append,
    /// Start from an empty file
    Truncate,
}

/// True when an output file is already present
pub fn exists<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref().is_file()
}

/// Append-only writer of `(word, year, score)` rows
pub struct EventSink {
    path: PathBuf,
    writer: BufWriter<File>,
    format: OutputFormat,
    separator: char,
    years: YearRange,
    rows: u64,
    counts: Vec<u32>,
}

impl EventSink {
    pub fn open<P: AsRef<Path>>(
        path: P,
        format: OutputFormat,
        mode: OpenMode,
        years: YearRange,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            OpenMode::Append => options.append(true),
            OpenMode::Truncate => options.write(true).truncate(true),
        };
        let file = options.open(&path)?;
        debug!("Opened {} sink {} ({:?})", format, path.display(), mode);

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            format,
            separator: match format {
                OutputFormat::Summary => '\t',
                OutputFormat::Relevance => ',',
            },
            years,
            rows: 0,
            counts: vec![0; years.len()],
        })
    }

    /// Use a different field separator
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Rows written through this sink
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Write the scores of one word
    pub fn write_word(&mut self, word: &str, scores: &[YearScore]) -> Result<()> {
        match self.format {
            OutputFormat::Summary => {
                for score in scores {
                    writeln!(
                        self.writer,
                        "{word}{sep}{year}{sep}{score}",
                        word = word,
                        sep = self.separator,
                        year = score.year,
                        score = score.score
                    )?;
                    self.rows += 1;
                }
            }
            OutputFormat::Relevance => {
                self.counts.iter_mut().for_each(|c| *c = 0);
                for score in scores {
                    if let Some(index) = self.years.index_of(score.year) {
                        self.counts[index] = score.score;
                    }
                }
                write!(self.writer, "{}", word)?;
                for count in &self.counts {
                    write!(self.writer, "{}{}", self.separator, count)?;
                }
                writeln!(self.writer)?;
                self.rows += 1;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
