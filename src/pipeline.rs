//! Batch scan: store entries to detector output
//!
//! For each accepted entry the time table is read, turned into a
//! [`WordSeries`] and handed to every active detector. Results go to one
//! sink per detector, always in index order. With more than one worker the
//! entries of a chunk are scored in parallel and written afterwards by the
//! calling thread.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{EventsConfig, ScanConfig};
use crate::detect::{build_detectors, Detector, YearScore};
use crate::error::{EventsError, Result};
use crate::output::EventSink;
use crate::series::{SeriesBuilder, WordSeries};
use crate::store::{Entry, StoreReader, YearTotals};

/// Counters of a batch scan
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Entries looked at
    pub words_visited: u64,
    /// Entries rejected by the scan filters
    pub words_skipped: u64,
    /// Entries handed to the detectors
    pub words_scored: u64,
    /// Detector runs that found the input degenerate
    pub degenerate: u64,
    /// Year scores produced
    pub scores: u64,
}

/// Detector results for one word, in detector order
#[derive(Clone, Debug, PartialEq)]
pub struct WordScores {
    pub index: usize,
    pub word: String,
    /// `None` where the detector found the series degenerate
    pub results: Vec<Option<Vec<YearScore>>>,
}

pub struct Pipeline<'a> {
    reader: &'a StoreReader,
    builder: SeriesBuilder<'a>,
    detectors: Vec<Box<dyn Detector>>,
    scan: ScanConfig,
}

impl<'a> Pipeline<'a> {
    /// Pipeline with the detectors named in `config`
    pub fn new(reader: &'a StoreReader, totals: &'a YearTotals, config: &EventsConfig) -> Self {
        Self {
            reader,
            builder: SeriesBuilder::new(totals, config.series.clone()),
            detectors: build_detectors(config),
            scan: config.scan.clone(),
        }
    }

    /// Replace the active detectors
    pub fn with_detectors(mut self, detectors: Vec<Box<dyn Detector>>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn detectors(&self) -> &[Box<dyn Detector>] {
        &self.detectors
    }

    /// Scan filters: tagged forms and rare words are skipped
    pub fn accepts(&self, word: &str, entry: &Entry) -> bool {
        if self.scan.skip_tagged_words && word.contains('_') {
            return false;
        }
        entry.total_match_count >= self.scan.min_total_match_count
    }

    /// Build the series of entry `index`
    pub fn series(&self, index: usize) -> Result<WordSeries> {
        let word = self.reader.word_at(index)?;
        let table = self.reader.read_time_table(index)?;
        self.builder.build(word, &table)
    }

    /// Run every detector over entry `index`
    ///
    /// Returns `None` when the scan filters reject the entry. Fatal errors
    /// are propagated, degenerate inputs become `None` results.
    pub fn score_entry(&self, index: usize) -> Result<Option<WordScores>> {
        let entry = self.reader.entry(index)?;
        let word = self.reader.word_at(index)?;
        if !self.accepts(word, &entry) {
            return Ok(None);
        }

        let series = self.series(index)?;
        let mut results = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            match detector.score_series(&series) {
                Ok(scores) => results.push(Some(self.report_filter(scores))),
                Err(EventsError::Degenerate(reason)) => {
                    debug!("{} skipped '{}': {}", detector.name(), word, reason);
                    results.push(None);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Some(WordScores {
            index,
            word: word.to_string(),
            results,
        }))
    }

    fn report_filter(&self, mut scores: Vec<YearScore>) -> Vec<YearScore> {
        if let Some(min_year) = self.scan.min_report_year {
            scores.retain(|s| s.year >= min_year);
        }
        scores
    }

    /// Scan every entry of the store. `sinks[i]` receives detector `i`.
    pub fn run(&self, sinks: &mut [EventSink]) -> Result<ScanStats> {
        let indices: Vec<usize> = (0..self.reader.num_words()).collect();
        self.run_indices(&indices, sinks)
    }

    /// Scan the given words, looked up in a sorted store
    ///
    /// Words not present in the store are logged and skipped.
    pub fn run_words<S: AsRef<str>>(&self, words: &[S], sinks: &mut [EventSink]) -> Result<ScanStats> {
        let mut indices = Vec::with_capacity(words.len());
        for word in words {
            match self.reader.lookup(word.as_ref())? {
                Some(index) => indices.push(index),
                None => debug!("'{}' is not in the store", word.as_ref()),
            }
        }
        self.run_indices(&indices, sinks)
    }

    fn run_indices(&self, indices: &[usize], sinks: &mut [EventSink]) -> Result<ScanStats> {
        if sinks.len() != self.detectors.len() {
            return Err(EventsError::Config(format!(
                "{} sinks for {} detectors",
                sinks.len(),
                self.detectors.len()
            )));
        }

        let mut stats = ScanStats::default();
        if self.scan.worker_threads <= 1 {
            for &index in indices {
                let scored = self.score_entry(index)?;
                self.record(scored, sinks, &mut stats)?;
            }
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.scan.worker_threads)
                .build()
                .map_err(|e| EventsError::Config(format!("worker pool: {}", e)))?;
            for chunk in indices.chunks(self.scan.chunk_size.max(1)) {
                let batch: Vec<Result<Option<WordScores>>> =
                    pool.install(|| chunk.par_iter().map(|&i| self.score_entry(i)).collect());
                for scored in batch {
                    self.record(scored?, sinks, &mut stats)?;
                }
                debug!("Scanned {} entries", stats.words_visited);
            }
        }

        for sink in sinks.iter_mut() {
            sink.flush()?;
        }
        info!(
            "Scan finished: {} scored, {} skipped, {} degenerate, {} scores",
            stats.words_scored, stats.words_skipped, stats.degenerate, stats.scores
        );
        Ok(stats)
    }

    fn record(
        &self,
        scored: Option<WordScores>,
        sinks: &mut [EventSink],
        stats: &mut ScanStats,
    ) -> Result<()> {
        stats.words_visited += 1;
        let scored = match scored {
            Some(scored) => scored,
            None => {
                stats.words_skipped += 1;
                return Ok(());
            }
        };
        stats.words_scored += 1;

        for (result, sink) in scored.results.iter().zip(sinks.iter_mut()) {
            match result {
                Some(scores) => {
                    stats.scores += scores.len() as u64;
                    sink.write_word(&scored.word, scores)?;
                }
                None => stats.degenerate += 1,
            }
        }
        Ok(())
    }
}
