use ngram_events::detect::{DiscrepancyDetector, DiscrepancyParams, GaussianParams};
use ngram_events::{
    DetectorKind, EventSink, EventsConfig, OpenMode, OutputFormat, Pipeline, ScanConfig,
    StoreConfig, StoreReader, StoreWriter, YearRange, YearTotals,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const CORPUS_TOTAL: u64 = 100_000_000;

fn gaussian_count(year: u16) -> u64 {
    let x = year as f64 - 1800.0;
    let sigma = 6.0;
    let pdf = (-x * x / (2.0 * sigma * sigma)).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt());
    (2_000_000.0 * pdf).round() as u64 + 1000
}

/// Sorted store with a one-year spike, a smooth bump and a tagged form
fn build_store(dir: &Path) -> (PathBuf, PathBuf) {
    let years = YearRange::default();
    let base = dir.join("sort/eng");

    let mut writer =
        StoreWriter::create(&base, StoreConfig::default().with_min_total_match_count(0)).unwrap();
    for year in years.min_year..years.end_year() as u16 {
        writer.update("bump", year, gaussian_count(year), 1).unwrap();
    }
    writer.update("spike", 1800, 2_000_000, 40).unwrap();
    for year in 1900..1950 {
        writer.update("spike_NOUN", year, 100_000, 1).unwrap();
    }
    writer.finish().unwrap();

    let totals = dir.join("totalcounts-1");
    let text: Vec<String> = (years.min_year..years.end_year() as u16)
        .map(|year| format!("{},{},1000,100", year, CORPUS_TOTAL))
        .collect();
    std::fs::write(&totals, text.join("\t")).unwrap();

    (base, totals)
}

fn config(detectors: Vec<DetectorKind>) -> EventsConfig {
    EventsConfig::default()
        .with_detectors(detectors)
        .with_scan(ScanConfig::default().with_min_total_match_count(0))
}

fn open_sinks(dir: &Path, pipeline: &Pipeline, format: OutputFormat) -> Vec<EventSink> {
    pipeline
        .detectors()
        .iter()
        .map(|d| {
            let path = dir.join(format!("{}.{}", d.name(), format.extension()));
            EventSink::open(path, format, OpenMode::Truncate, YearRange::default()).unwrap()
        })
        .collect()
}

/// Parse summary rows into word -> year -> score
fn read_summary(path: &Path) -> BTreeMap<String, BTreeMap<u16, u32>> {
    let mut rows: BTreeMap<String, BTreeMap<u16, u32>> = BTreeMap::new();
    for line in std::fs::read_to_string(path).unwrap().lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 3, "malformed row '{}'", line);
        rows.entry(fields[0].to_string())
            .or_default()
            .insert(fields[1].parse().unwrap(), fields[2].parse().unwrap());
    }
    rows
}

#[test]
fn test_spike_is_a_discrepancy_burst() {
    let temp_dir = TempDir::new().unwrap();
    let (base, totals_path) = build_store(temp_dir.path());
    let reader = StoreReader::open(&base).unwrap();
    let totals = YearTotals::load(&totals_path, YearRange::default()).unwrap();

    let config = config(vec![DetectorKind::Discrepancy]);
    let pipeline = Pipeline::new(&reader, &totals, &config);
    let out = temp_dir.path().join("relevance");
    let mut sinks = open_sinks(&out, &pipeline, OutputFormat::Summary);

    let stats = pipeline.run(&mut sinks).unwrap();
    assert_eq!(stats.words_visited, 3);
    assert_eq!(stats.words_skipped, 1);
    assert_eq!(stats.words_scored, 2);
    drop(sinks);

    let rows = read_summary(&out.join("discrepancy.txt"));
    assert!(!rows.contains_key("spike_NOUN"));

    // Smoothing with a half width of 2 spreads the spike over five years
    let spike = &rows["spike"];
    let expected: BTreeMap<u16, u32> = (1798..=1802).map(|year| (year, 1)).collect();
    assert_eq!(spike, &expected);
}

#[test]
fn test_bump_is_a_gaussian_event() {
    let temp_dir = TempDir::new().unwrap();
    let (base, totals_path) = build_store(temp_dir.path());
    let reader = StoreReader::open_with_totals(&base, &totals_path, YearRange::default()).unwrap();
    let totals = reader.totals().unwrap().clone();

    let config = config(vec![DetectorKind::Gaussian]);
    let pipeline = Pipeline::new(&reader, &totals, &config);
    let index = reader.lookup("bump").unwrap().unwrap();
    let scored = pipeline.score_entry(index).unwrap().unwrap();
    let scores = scored.results[0].as_ref().unwrap();

    assert!(!scores.is_empty());
    let peak = scores.iter().find(|s| s.year == 1800).unwrap();
    assert_eq!(peak.score, 10);
    for score in scores {
        assert!(
            (1740..=1860).contains(&score.year),
            "score outside the bump: {:?}",
            score
        );
        assert!(score.score <= 10);
    }
}

#[test]
fn test_gaussian_widening_peaks_at_mean() {
    let temp_dir = TempDir::new().unwrap();
    let (base, totals_path) = build_store(temp_dir.path());
    let reader = StoreReader::open(&base).unwrap();
    let totals = YearTotals::load(&totals_path, YearRange::default()).unwrap();

    let mut config = config(vec![DetectorKind::Gaussian]);
    config.gaussian = GaussianParams::default().with_widening(1.5);
    let pipeline = Pipeline::new(&reader, &totals, &config);
    let index = reader.lookup("bump").unwrap().unwrap();
    let scored = pipeline.score_entry(index).unwrap().unwrap();
    let scores = scored.results[0].as_ref().unwrap();

    // The widened profile tapers on both sides of a plateau around the mean
    let best = scores.iter().map(|s| s.score).max().unwrap();
    let plateau: Vec<u16> = scores
        .iter()
        .filter(|s| s.score == best)
        .map(|s| s.year)
        .collect();
    assert!(best < 10);
    assert!(plateau.contains(&1800));
    assert!(plateau.iter().all(|year| (1790..=1810).contains(year)));
    assert!(scores.iter().any(|s| s.year < 1795 && s.score < best));
    assert!(scores.iter().any(|s| s.year > 1805 && s.score < best));
}

#[test]
fn test_spike_is_a_kleinberg_burst() {
    let temp_dir = TempDir::new().unwrap();
    let (base, totals_path) = build_store(temp_dir.path());
    let reader = StoreReader::open(&base).unwrap();
    let totals = YearTotals::load(&totals_path, YearRange::default()).unwrap();

    let config = config(vec![DetectorKind::Kleinberg]);
    let pipeline = Pipeline::new(&reader, &totals, &config);
    let index = reader.lookup("spike").unwrap().unwrap();
    let scored = pipeline.score_entry(index).unwrap().unwrap();
    let scores = scored.results[0].as_ref().unwrap();

    assert!(scores.iter().any(|s| s.year == 1800 && s.score > 0));
    assert!(scores.iter().all(|s| (1795..=1805).contains(&s.year)));
}

#[test]
fn test_relevance_rows_and_resume() {
    let temp_dir = TempDir::new().unwrap();
    let (base, totals_path) = build_store(temp_dir.path());
    let reader = StoreReader::open(&base).unwrap();
    let totals = YearTotals::load(&totals_path, YearRange::default()).unwrap();

    let config = config(vec![DetectorKind::Discrepancy]);
    let pipeline = Pipeline::new(&reader, &totals, &config);
    let out = temp_dir.path().join("relevance");
    let path = out.join("discrepancy.csv");

    let mut sinks = open_sinks(&out, &pipeline, OutputFormat::Relevance);
    pipeline.run_words(&["spike"], &mut sinks).unwrap();
    drop(sinks);

    let first = std::fs::read_to_string(&path).unwrap();
    let fields: Vec<&str> = first.trim_end().split(',').collect();
    assert_eq!(fields.len(), 1 + YearRange::default().len());
    assert_eq!(fields[0], "spike");
    // Column 1 + 298 holds year 1798
    assert_eq!(fields[299..304], ["1"; 5]);
    assert_eq!(fields[298], "0");
    assert_eq!(fields[304], "0");

    // Resuming appends after the existing row
    let mut sinks = vec![EventSink::open(
        &path,
        OutputFormat::Relevance,
        OpenMode::Append,
        YearRange::default(),
    )
    .unwrap()];
    pipeline.run_words(&["bump", "missing"], &mut sinks).unwrap();
    drop(sinks);

    let resumed = std::fs::read_to_string(&path).unwrap();
    let words: Vec<&str> = resumed
        .lines()
        .map(|line| line.split(',').next().unwrap())
        .collect();
    assert_eq!(words, vec!["spike", "bump"]);
}

#[test]
fn test_parallel_scan_writes_in_index_order() {
    let temp_dir = TempDir::new().unwrap();
    let (base, totals_path) = build_store(temp_dir.path());
    let reader = StoreReader::open(&base).unwrap();
    let totals = YearTotals::load(&totals_path, YearRange::default()).unwrap();

    let run = |threads: usize, dir: &str| {
        let mut config = config(vec![
            DetectorKind::Discrepancy,
            DetectorKind::Kleinberg,
            DetectorKind::Ratio,
        ]);
        config.scan = config.scan.with_worker_threads(threads);
        config.scan.chunk_size = 1;
        config.scan.skip_tagged_words = false;
        let pipeline = Pipeline::new(&reader, &totals, &config);
        let out = temp_dir.path().join(dir);
        let mut sinks = open_sinks(&out, &pipeline, OutputFormat::Summary);
        let stats = pipeline.run(&mut sinks).unwrap();
        drop(sinks);
        let files: Vec<String> = ["discrepancy", "kleinberg", "ratio"]
            .iter()
            .map(|name| std::fs::read_to_string(out.join(format!("{}.txt", name))).unwrap())
            .collect();
        (stats, files)
    };

    let (sequential_stats, sequential) = run(1, "seq");
    let (parallel_stats, parallel) = run(4, "par");
    assert_eq!(sequential_stats, parallel_stats);
    assert_eq!(sequential, parallel);
}

#[test]
fn test_custom_detector_set() {
    let temp_dir = TempDir::new().unwrap();
    let (base, totals_path) = build_store(temp_dir.path());
    let reader = StoreReader::open(&base).unwrap();
    let totals = YearTotals::load(&totals_path, YearRange::default()).unwrap();

    let config = config(vec![]);
    let pipeline = Pipeline::new(&reader, &totals, &config).with_detectors(vec![Box::new(
        DiscrepancyDetector::new(DiscrepancyParams::default()),
    )]);
    assert_eq!(pipeline.detectors().len(), 1);

    let out = temp_dir.path().join("custom");
    let mut sinks = open_sinks(&out, &pipeline, OutputFormat::Summary);
    let stats = pipeline.run_words(&["spike"], &mut sinks).unwrap();
    assert_eq!(stats.scores, 5);
    assert_eq!(sinks[0].rows_written(), 5);
}
