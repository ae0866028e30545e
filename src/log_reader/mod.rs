pub mod reader;

use hdrhistogram::Histogram;

use crate::config::TimeRange;

pub use reader::HistogramLogReader;

/// One decoded interval: the values recorded during a bounded slice of the
/// original run, plus where that slice sits in time.
#[derive(Debug, Clone)]
pub struct IntervalHistogram {
    pub histogram: Histogram<u64>,
    /// Absolute interval start, milliseconds since the Unix epoch.
    pub start_timestamp_ms: u64,
    /// Absolute interval end, milliseconds since the Unix epoch.
    pub end_timestamp_ms: u64,
}

impl IntervalHistogram {
    /// Interval end relative to `reference_start_sec`, in seconds.
    pub fn elapsed_end_sec(&self, reference_start_sec: f64) -> f64 {
        self.end_timestamp_ms as f64 / 1000.0 - reference_start_sec
    }
}

/// Pull-based supplier of interval histograms.
///
/// This is the seam between the aggregation pass and whatever decodes the
/// log, so the pass can be driven from synthetic in-memory intervals.
pub trait IntervalSource {
    /// Next interval whose start offset lies inside `range`, or `None` once
    /// the input is exhausted, the window has been passed, or decoding failed.
    fn next_interval(&mut self, range: &TimeRange) -> Option<IntervalHistogram>;

    /// The log's declared start time in seconds since the epoch, `0.0` while unknown.
    fn start_time_sec(&self) -> f64;
}
