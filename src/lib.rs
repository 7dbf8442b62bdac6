pub mod config;
pub mod detect;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod series;
pub mod store;

pub use config::{DetectorKind, EventsConfig, ScanConfig, SeriesConfig, StoreConfig};
pub use detect::{Detector, YearScore};
pub use error::{EventsError, Result};
pub use output::{EventSink, OpenMode, OutputFormat};
pub use pipeline::{Pipeline, ScanStats};
pub use series::{SeriesBuilder, WordSeries};
pub use store::{sort_store, StoreReader, StoreWriter, YearRange, YearTotals};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
