use std::io::Write;

use tracing::{debug, info};

use super::accumulator::Accumulator;
use super::format::{
    renderer_for, write_start_time, write_time_range, IntervalRow, RowRenderer, DISTRIBUTION_TITLE,
    INTERVAL_LOG_TITLE,
};
use super::percentiles::PercentileSet;
use super::sink::Sinks;
use crate::config::Config;
use crate::error::Result;
use crate::log_reader::{HistogramLogReader, IntervalHistogram, IntervalSource};

// ─── Public entry point ──────────────────────────────────────────

/// Open the configured input and outputs and run one full pass.
///
/// Only an unreadable input aborts before any output is produced.
pub fn run(config: Config) -> Result<Summary> {
    let source = HistogramLogReader::open(config.input.as_deref())?;
    let sinks = Sinks::open(&config);
    let (summary, _) = Processor::new(config, source, sinks)?.run()?;
    Ok(summary)
}

// ─── Driver ──────────────────────────────────────────────────────

/// What a finished pass looked like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub intervals: u64,
    pub total_count: u64,
    pub reference_start_sec: Option<f64>,
}

/// Single sequential pass: pull, merge, report.
pub struct Processor<S, W> {
    config: Config,
    source: S,
    sinks: Sinks<W>,
    renderer: Box<dyn RowRenderer + Send>,
    accumulator: Accumulator,
    /// Log start time, latched from the first interval that reports one.
    reference_start_sec: Option<f64>,
    legend_written: bool,
}

impl<S: IntervalSource, W: Write> Processor<S, W> {
    pub fn new(config: Config, source: S, sinks: Sinks<W>) -> Result<Self> {
        Ok(Self {
            renderer: renderer_for(config.format),
            accumulator: Accumulator::from_config(&config)?,
            config,
            source,
            sinks,
            reference_start_sec: None,
            legend_written: false,
        })
    }

    /// Drive the pass to completion and hand the sinks back.
    pub fn run(mut self) -> Result<(Summary, Sinks<W>)> {
        self.write_range_headers()?;
        debug!("awaiting first interval");

        while let Some(interval) = self.source.next_interval(&self.config.range) {
            self.accumulator.merge(&interval.histogram)?;

            if let Some(start_sec) = self.latch_start_time() {
                self.write_start_headers(start_sec)?;
                debug!(start_sec, "start time latched, streaming");
            }

            self.write_interval_row(&interval)?;
        }

        debug!("end of input, writing distribution");
        self.renderer.write_distribution(
            &mut self.sinks.distribution,
            self.accumulator.cumulative(),
            self.config.ticks_per_half,
            self.config.value_unit_ratio,
        )?;
        self.sinks.flush()?;

        let summary = Summary {
            intervals: self.accumulator.intervals(),
            total_count: self.accumulator.cumulative().len(),
            reference_start_sec: self.reference_start_sec,
        };
        info!(
            intervals = summary.intervals,
            total_count = summary.total_count,
            "processed histogram log"
        );
        Ok((summary, self.sinks))
    }

    /// Set the reference start time once; later values are ignored.
    /// Returns the value only on the call that latched it.
    fn latch_start_time(&mut self) -> Option<f64> {
        if self.reference_start_sec.is_some() {
            return None;
        }
        let start_sec = self.source.start_time_sec();
        if start_sec == 0.0 {
            return None;
        }
        self.reference_start_sec = Some(start_sec);
        Some(start_sec)
    }

    fn write_range_headers(&mut self) -> Result<()> {
        let range = &self.config.range;
        if let Some(log) = self.sinks.interval_log.as_mut() {
            write_time_range(log, INTERVAL_LOG_TITLE, range)?;
        }
        if self.sinks.distribution_is_file {
            write_time_range(&mut self.sinks.distribution, DISTRIBUTION_TITLE, range)?;
        }
        Ok(())
    }

    fn write_start_headers(&mut self, start_sec: f64) -> Result<()> {
        write_start_time(&mut self.sinks.distribution, start_sec)?;
        if let Some(log) = self.sinks.interval_log.as_mut() {
            write_start_time(log, start_sec)?;
        }
        Ok(())
    }

    fn write_interval_row(&mut self, interval: &IntervalHistogram) -> Result<()> {
        let Some(log) = self.sinks.interval_log.as_mut() else {
            return Ok(());
        };

        if !self.legend_written {
            writeln!(log, "{}", self.renderer.legend())?;
            self.legend_written = true;
        }

        let reference_sec = self
            .reference_start_sec
            .unwrap_or_else(|| self.source.start_time_sec());
        let ratio = self.config.value_unit_ratio;
        let row = IntervalRow {
            elapsed_sec: interval.elapsed_end_sec(reference_sec),
            interval: PercentileSet::from_histogram(&interval.histogram, ratio),
            total: PercentileSet::from_histogram(self.accumulator.cumulative(), ratio),
        };
        debug!(elapsed_sec = row.elapsed_sec, count = row.interval.count, "interval row");
        self.renderer.write_row(log, &row)?;
        Ok(())
    }
}
