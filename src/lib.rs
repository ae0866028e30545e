//! Turns an interval histogram log into an interval percentile log and an
//! overall percentile distribution report.

pub mod config;
pub mod error;
pub mod log_reader;
pub mod logging;
pub mod report;

pub use config::{Cli, Config, OutputFormat, TimeRange};
pub use error::ProcessorError;
pub use log_reader::{HistogramLogReader, IntervalHistogram, IntervalSource};
pub use report::{run, Summary};
