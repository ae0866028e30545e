use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hdrhistogram::serialization::{DeserializeError, Deserializer};
use hdrhistogram::Histogram;
use tracing::{debug, warn};

use super::{IntervalHistogram, IntervalSource};
use crate::config::TimeRange;
use crate::error::{ProcessorError, Result};

// ─── Log syntax ──────────────────────────────────────────────────

const START_TIME_PREFIX: &str = "#[StartTime: ";
const BASE_TIME_PREFIX: &str = "#[BaseTime: ";
const LEGEND_PREFIX: &str = "\"StartTimestamp\"";
const TAG_PREFIX: &str = "Tag=";

/// Timestamps more than a year older than StartTime are taken as relative.
const RELATIVE_TIMESTAMP_THRESHOLD_SEC: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("malformed line: {0:?}")]
    Malformed(String),

    #[error("bad base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("bad histogram payload: {0:?}")]
    Histogram(DeserializeError),
}

/// The fields of an interval line that matter for reading.
struct IntervalLine<'a> {
    timestamp_sec: f64,
    length_sec: f64,
    encoded_histogram: &'a str,
}

// ─── Reader ──────────────────────────────────────────────────────

/// Streaming decoder for the textual interval histogram log format.
///
/// Reads one line per step; nothing beyond the current line is buffered.
pub struct HistogramLogReader<R> {
    input: R,
    line: String,
    start_time_sec: f64,
    observed_start_time: bool,
    base_time_sec: f64,
    observed_base_time: bool,
    deserializer: Deserializer,
}

impl HistogramLogReader<Box<dyn BufRead + Send>> {
    /// Read from the named file, or from standard input when `path` is `None`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let input: Box<dyn BufRead + Send> = match path {
            Some(path) => {
                let file = File::open(path).map_err(|source| ProcessorError::InputOpen {
                    path: path.to_path_buf(),
                    source,
                })?;
                Box::new(BufReader::new(file))
            }
            None => Box::new(BufReader::new(io::stdin())),
        };
        Ok(Self::new(input))
    }
}

impl<R: BufRead> HistogramLogReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            line: String::new(),
            start_time_sec: 0.0,
            observed_start_time: false,
            base_time_sec: 0.0,
            observed_base_time: false,
            deserializer: Deserializer::new(),
        }
    }

    fn read_next(&mut self, range: &TimeRange) -> std::result::Result<Option<IntervalHistogram>, DecodeError> {
        loop {
            self.line.clear();
            if self.input.read_line(&mut self.line)? == 0 {
                return Ok(None);
            }
            let line = self.line.trim();

            // A time header without a number is just another comment.
            if let Some(rest) = line.strip_prefix(START_TIME_PREFIX) {
                match parse_leading_seconds(rest) {
                    Some(sec) => {
                        self.start_time_sec = sec;
                        self.observed_start_time = true;
                    }
                    None => debug!(header = line, "ignoring unparsable StartTime header"),
                }
                continue;
            }
            if let Some(rest) = line.strip_prefix(BASE_TIME_PREFIX) {
                match parse_leading_seconds(rest) {
                    Some(sec) => {
                        self.base_time_sec = sec;
                        self.observed_base_time = true;
                    }
                    None => debug!(header = line, "ignoring unparsable BaseTime header"),
                }
                continue;
            }
            if line.is_empty() || line.starts_with('#') || line.starts_with(LEGEND_PREFIX) {
                continue;
            }

            let entry = parse_interval_line(line)?;

            if !self.observed_start_time {
                // No StartTime header: the first interval defines it.
                self.start_time_sec = entry.timestamp_sec;
                self.observed_start_time = true;
            }
            if !self.observed_base_time {
                self.base_time_sec =
                    if entry.timestamp_sec < self.start_time_sec - RELATIVE_TIMESTAMP_THRESHOLD_SEC {
                        self.start_time_sec
                    } else {
                        0.0
                    };
                self.observed_base_time = true;
            }

            let absolute_start_sec = entry.timestamp_sec + self.base_time_sec;
            let offset_sec = absolute_start_sec - self.start_time_sec;

            if range.is_before(offset_sec) {
                continue;
            }
            if range.is_after(offset_sec) {
                debug!(offset_sec, "interval past end of range, stopping");
                return Ok(None);
            }

            let histogram = decode(&mut self.deserializer, entry.encoded_histogram)?;
            return Ok(Some(IntervalHistogram {
                histogram,
                start_timestamp_ms: (absolute_start_sec * 1000.0) as u64,
                end_timestamp_ms: ((absolute_start_sec + entry.length_sec) * 1000.0) as u64,
            }));
        }
    }
}

impl<R: BufRead> IntervalSource for HistogramLogReader<R> {
    fn next_interval(&mut self, range: &TimeRange) -> Option<IntervalHistogram> {
        match self.read_next(range) {
            Ok(interval) => interval,
            Err(e) => {
                warn!(error = %e, "stopping log read");
                None
            }
        }
    }

    fn start_time_sec(&self) -> f64 {
        self.start_time_sec
    }
}

// ─── Line parsing ────────────────────────────────────────────────

/// `1441812279.474 (seconds since epoch), ...` → `1441812279.474`
fn parse_leading_seconds(rest: &str) -> Option<f64> {
    rest.split(|c: char| c.is_whitespace() || c == ']')
        .next()
        .and_then(|s| s.parse().ok())
}

fn decode(deserializer: &mut Deserializer, encoded: &str) -> std::result::Result<Histogram<u64>, DecodeError> {
    let bytes = STANDARD.decode(encoded)?;
    deserializer
        .deserialize(&mut bytes.as_slice())
        .map_err(DecodeError::Histogram)
}

/// `[Tag=<tag>,]<start>,<length>,<max>,<base64 histogram>`
fn parse_interval_line(line: &str) -> std::result::Result<IntervalLine<'_>, DecodeError> {
    let malformed = || DecodeError::Malformed(line.to_string());

    let mut fields = line.split(',').map(str::trim).peekable();
    if fields.peek().is_some_and(|f| f.starts_with(TAG_PREFIX)) {
        fields.next();
    }

    let timestamp_sec = fields.next().and_then(|f| f.parse().ok()).ok_or_else(malformed)?;
    let length_sec = fields.next().and_then(|f| f.parse().ok()).ok_or_else(malformed)?;
    let _max: f64 = fields.next().and_then(|f| f.parse().ok()).ok_or_else(malformed)?;
    let encoded_histogram = fields.next().filter(|f| !f.is_empty()).ok_or_else(malformed)?;
    if fields.next().is_some() {
        return Err(malformed());
    }

    Ok(IntervalLine {
        timestamp_sec,
        length_sec,
        encoded_histogram,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use hdrhistogram::serialization::{Serializer, V2DeflateSerializer};

    use super::*;

    fn encode(values: &[u64]) -> String {
        let mut h = Histogram::<u64>::new_with_bounds(1, 3_600_000_000_000, 2).unwrap();
        for &v in values {
            h.record(v).unwrap();
        }
        let mut buf = Vec::new();
        V2DeflateSerializer::new().serialize(&h, &mut buf).unwrap();
        STANDARD.encode(buf)
    }

    fn reader(text: String) -> HistogramLogReader<Cursor<Vec<u8>>> {
        HistogramLogReader::new(Cursor::new(text.into_bytes()))
    }

    fn drain(r: &mut impl IntervalSource, range: TimeRange) -> Vec<IntervalHistogram> {
        std::iter::from_fn(|| r.next_interval(&range)).collect()
    }

    /// Relative-timestamp log with one interval starting at each offset.
    fn log_with_offsets(offsets: &[f64]) -> String {
        let mut text = String::from("#[StartTime: 1000000000.000 (seconds since epoch), Sun Sep 09 01:46:40 UTC 2001]\n");
        text.push_str("\"StartTimestamp\",\"Interval_Length\",\"Interval_Max\",\"Interval_Compressed_Histogram\"\n");
        for (i, offset) in offsets.iter().enumerate() {
            let payload = encode(&[1_000_000 * (i as u64 + 1)]);
            text.push_str(&format!("{offset:.3},0.500,1.000,{payload}\n"));
        }
        text
    }

    #[test]
    fn reads_start_time_and_intervals() {
        let mut r = reader(log_with_offsets(&[0.0, 1.0]));
        let intervals = drain(&mut r, TimeRange::unbounded());

        assert_eq!(intervals.len(), 2);
        assert_eq!(r.start_time_sec(), 1_000_000_000.0);
        assert_eq!(intervals[0].start_timestamp_ms, 1_000_000_000_000);
        assert_eq!(intervals[1].end_timestamp_ms, 1_000_000_001_500);
        assert_eq!(intervals[1].histogram.len(), 1);
        assert!((intervals[1].elapsed_end_sec(r.start_time_sec()) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn window_keeps_inclusive_offsets() {
        let mut r = reader(log_with_offsets(&[1.0, 3.0, 4.9, 5.0, 5.1]));
        let intervals = drain(&mut r, TimeRange::new(2.0, 5.0));

        let offsets: Vec<f64> = intervals
            .iter()
            .map(|i| i.start_timestamp_ms as f64 / 1000.0 - 1_000_000_000.0)
            .collect();
        assert_eq!(offsets.len(), 3);
        for (got, want) in offsets.iter().zip([3.0, 4.9, 5.0]) {
            assert!((got - want).abs() < 2e-3, "{got} != {want}");
        }
    }

    #[test]
    fn inverted_window_admits_nothing() {
        let mut r = reader(log_with_offsets(&[0.0, 1.0, 2.0, 3.0, 5.0, 6.0]));
        assert!(drain(&mut r, TimeRange::new(5.0, 2.0)).is_empty());
    }

    #[test]
    fn start_past_log_end_is_empty() {
        let mut r = reader(log_with_offsets(&[0.0, 1.0]));
        assert!(drain(&mut r, TimeRange::new(100.0, f64::INFINITY)).is_empty());
    }

    #[test]
    fn absolute_timestamps_without_start_header() {
        let payload = encode(&[2_000_000]);
        let text = format!(
            "Tag=app,1500000000.000,1.000,2.000,{payload}\n1500000001.000,1.000,2.000,{payload}\n"
        );
        let mut r = reader(text);
        let intervals = drain(&mut r, TimeRange::unbounded());

        assert_eq!(intervals.len(), 2);
        assert_eq!(r.start_time_sec(), 1_500_000_000.0);
        assert_eq!(intervals[1].end_timestamp_ms, 1_500_000_002_000);
    }

    #[test]
    fn base_time_shifts_relative_timestamps() {
        let payload = encode(&[2_000_000]);
        let text = format!(
            "#[StartTime: 1000000010.000 (seconds since epoch)]\n#[BaseTime: 1000000000.000 (seconds since epoch)]\n12.000,1.000,2.000,{payload}\n"
        );
        let mut r = reader(text);
        let intervals = drain(&mut r, TimeRange::new(1.5, 2.5));

        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start_timestamp_ms, 1_000_000_012_000);
    }

    #[test]
    fn corrupt_line_ends_the_read() {
        let mut text = log_with_offsets(&[0.0]);
        text.push_str("1.000,1.000,1.000,not-base64!!\n");
        text.push_str(&log_with_offsets(&[2.0]));
        let mut r = reader(text);

        assert_eq!(drain(&mut r, TimeRange::unbounded()).len(), 1);
    }

    #[test]
    fn unparsable_time_headers_are_skipped() {
        let payload = encode(&[2_000_000]);
        let text = format!(
            "#[StartTime: (unknown)]\n#[BaseTime: ?]\n1500000000.000,1.000,2.000,{payload}\n1500000001.000,1.000,2.000,{payload}\n"
        );
        let mut r = reader(text);
        let intervals = drain(&mut r, TimeRange::unbounded());

        assert_eq!(intervals.len(), 2);
        // start time falls back to the first interval's timestamp
        assert_eq!(r.start_time_sec(), 1_500_000_000.0);
        assert_eq!(intervals[0].start_timestamp_ms, 1_500_000_000_000);
    }

    #[test]
    fn rejects_short_interval_lines() {
        assert!(parse_interval_line("1.0,2.0").is_err());
        assert!(parse_interval_line("1.0,2.0,3.0,").is_err());
        assert!(parse_interval_line("Tag=x,1.0,2.0,3.0,AAAA").is_ok());
    }
}
