use hdrhistogram::Histogram;

use crate::config::Config;
use crate::error::{ProcessorError, Result};

/// Running merge of every interval read so far.
///
/// Strictly accumulating: there is no reset or removal. The histogram
/// auto-resizes so an interval is never rejected for carrying values above
/// the configured highest trackable value.
pub struct Accumulator {
    hist: Histogram<u64>,
    intervals: u64,
}

impl Accumulator {
    pub fn new(lowest: u64, highest: u64, sigfig: u8) -> Result<Self> {
        let mut hist =
            Histogram::<u64>::new_with_bounds(lowest, highest, sigfig).map_err(ProcessorError::Histogram)?;
        hist.auto(true);
        Ok(Self { hist, intervals: 0 })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.lowest_trackable, config.highest_trackable, config.sigfig)
    }

    /// Add every recorded value of `interval` into the running total.
    pub fn merge(&mut self, interval: &Histogram<u64>) -> Result<()> {
        self.hist.add(interval).map_err(ProcessorError::Merge)?;
        self.intervals += 1;
        Ok(())
    }

    /// Read-only view over everything merged so far.
    pub fn cumulative(&self) -> &Histogram<u64> {
        &self.hist
    }

    /// Number of intervals merged.
    pub fn intervals(&self) -> u64 {
        self.intervals
    }
}
