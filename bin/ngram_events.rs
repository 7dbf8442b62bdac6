use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ngram_events::output::exists;
use ngram_events::store::{sort_store, StorePaths};
use ngram_events::{
    ingest, DetectorKind, EventSink, EventsConfig, OpenMode, OutputFormat, Pipeline,
    StoreReader, StoreWriter, YearTotals,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "ngram-events")]
#[command(about = "Event detection over n-gram word frequency time series", long_about = None)]
struct Args {
    /// JSON configuration file; missing fields keep their defaults
    #[arg(long, env = "NGRAM_EVENTS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a store from tab-separated 1-gram count files
    Ingest {
        /// Base path of the store to create
        #[arg(long, env = "NGRAM_EVENTS_STORE")]
        store: PathBuf,

        /// Words with fewer total matches are not written
        #[arg(long)]
        min_total_match_count: Option<u64>,

        /// Input files, each grouped by word
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Rewrite a store in word order
    Sort {
        /// Base path of the unsorted store
        #[arg(long)]
        src: PathBuf,

        /// Base path of the sorted store to create
        #[arg(long)]
        dst: PathBuf,
    },

    /// Check every entry of a store for structural corruption
    Verify {
        #[arg(long, env = "NGRAM_EVENTS_STORE")]
        store: PathBuf,
    },

    /// Print the entries of the given words
    Lookup {
        #[arg(long, env = "NGRAM_EVENTS_STORE")]
        store: PathBuf,

        /// Words to look up
        #[arg(required = true)]
        words: Vec<String>,
    },

    /// Run detectors over a sorted store
    Detect {
        #[arg(long, env = "NGRAM_EVENTS_STORE")]
        store: PathBuf,

        /// Corpus totals file (`year,match,page,volume` quadruples)
        #[arg(long, env = "NGRAM_EVENTS_TOTALS")]
        totals: PathBuf,

        /// Directory receiving one output file per detector
        #[arg(long, env = "NGRAM_EVENTS_OUTPUT_DIR", default_value = "./data/relevance")]
        output_dir: PathBuf,

        /// Comma-separated detectors (gaussian, kleinberg, discrepancy, ratio, linear)
        #[arg(long, value_delimiter = ',')]
        detectors: Vec<DetectorKind>,

        /// Output layout (summary, relevance)
        #[arg(long, default_value = "summary")]
        format: OutputFormat,

        /// Append to existing output files instead of replacing them
        #[arg(long)]
        resume: bool,

        /// Worker threads; 0 uses every core
        #[arg(long, env = "NGRAM_EVENTS_THREADS")]
        threads: Option<usize>,

        /// Drop scores for years before this one
        #[arg(long)]
        min_report_year: Option<u16>,

        /// Only score these words instead of the whole store
        #[arg(long, value_delimiter = ',')]
        words: Vec<String>,
    },

    /// Print the effective configuration as JSON
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<EventsConfig> {
    match path {
        Some(path) => EventsConfig::from_json_file(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(EventsConfig::default()),
    }
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;

    info!("ngram-events v{}", ngram_events::VERSION);

    match args.command {
        Command::Ingest {
            store,
            min_total_match_count,
            files,
        } => {
            if let Some(threshold) = min_total_match_count {
                config.store.min_total_match_count = threshold;
            }
            config.validate()?;
            let mut writer = StoreWriter::create(&store, config.store.clone())?;
            let stats = ingest::ingest_files(&files, &mut writer)?;
            let written = writer.finish()?;
            info!(
                "Ingested {} records into {} ({} words)",
                stats.records,
                store.display(),
                written.words_written
            );
        }

        Command::Sort { src, dst } => {
            if StorePaths::new(&src) == StorePaths::new(&dst) {
                bail!("source and destination stores must differ");
            }
            let stats = sort_store(&src, &dst)?;
            info!("Sorted {} entries into {}", stats.entries, dst.display());
        }

        Command::Verify { store } => {
            let reader = StoreReader::open(&store)?;
            reader.verify()?;
            let sorted = reader.is_sorted()?;
            info!(
                "{}: {} entries, structurally sound, {}",
                reader.paths().main.display(),
                reader.num_words(),
                if sorted { "sorted" } else { "not sorted" }
            );
        }

        Command::Lookup { store, words } => {
            let reader = StoreReader::open(&store)?;
            for word in &words {
                match reader.time_table_for(word)? {
                    Some((index, table)) => {
                        let entry = reader.entry(index)?;
                        let first = table.iter().map(|r| r.year).min().unwrap_or(0);
                        let last = table.iter().map(|r| r.year).max().unwrap_or(0);
                        println!(
                            "{}\tindex={}\tmatches={}\tvolumes={}\tyears={}\t{}-{}",
                            word,
                            index,
                            entry.total_match_count,
                            entry.total_volume_count,
                            table.len(),
                            first,
                            last
                        );
                    }
                    None => println!("{}\tnot found", word),
                }
            }
        }

        Command::Detect {
            store,
            totals,
            output_dir,
            detectors,
            format,
            resume,
            threads,
            min_report_year,
            words,
        } => {
            if !detectors.is_empty() {
                config.detectors = detectors;
            }
            if let Some(threads) = threads {
                let threads = if threads == 0 { num_cpus::get() } else { threads };
                config.scan = config.scan.clone().with_worker_threads(threads);
            }
            if min_report_year.is_some() {
                config.scan.min_report_year = min_report_year;
            }
            config.validate()?;

            let totals = YearTotals::load(&totals, config.store.years)?;
            let reader = StoreReader::open(&store)?;
            if !reader.is_sorted()? {
                bail!("{} is not sorted; run `sort` first", store.display());
            }

            let pipeline = Pipeline::new(&reader, &totals, &config);
            let mut sinks = Vec::with_capacity(pipeline.detectors().len());
            for detector in pipeline.detectors() {
                let path = output_dir.join(format!("{}.{}", detector.name(), format.extension()));
                let mode = if resume && exists(&path) {
                    OpenMode::Append
                } else {
                    OpenMode::Truncate
                };
                sinks.push(EventSink::open(&path, format, mode, config.store.years)?);
            }

            let stats = if words.is_empty() {
                pipeline.run(&mut sinks)?
            } else {
                pipeline.run_words(&words, &mut sinks)?
            };
            info!(
                "Scored {} of {} words into {}",
                stats.words_scored,
                stats.words_visited,
                output_dir.display()
            );
        }

        Command::Config => {
            println!("{}", config.to_json()?);
        }
    }

    Ok(())
}
