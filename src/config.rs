use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

// ─── Fixed histogram parameters ──────────────────────────────────

/// ~20 μs best-case resolution when values are recorded in nanoseconds.
pub const DEFAULT_LOWEST_TRACKABLE: u64 = 20_000;
/// One hour in nanoseconds.
pub const DEFAULT_HIGHEST_TRACKABLE: u64 = 3_600 * 1_000 * 1_000 * 1_000;
pub const DEFAULT_SIGFIG: u8 = 2;
pub const DEFAULT_TICKS_PER_HALF: u32 = 5;
/// Nanoseconds → milliseconds.
pub const DEFAULT_VALUE_UNIT_RATIO: f64 = 1_000_000.0;

/// Flags that historically take a single dash despite being long names.
const LEGACY_LONG_FLAGS: &[&str] = &["-csv", "-start", "-end"];

// ─── Command line ────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "hdr-log-processor",
    version,
    about = "Summarise an interval histogram log into percentile reports"
)]
pub struct Cli {
    /// Use CSV format for output log files
    #[arg(long)]
    pub csv: bool,

    /// File name of Histogram Log to process (default is standard input)
    #[arg(short = 'i', value_name = "logFileName")]
    pub input: Option<PathBuf>,

    /// File name to output to (default is standard output);
    /// the percentile distribution goes to <outputFileName>.hgrm
    #[arg(short = 'o', value_name = "outputFileName")]
    pub output: Option<PathBuf>,

    /// The start time for the range in the file, in seconds
    #[arg(long, value_name = "rangeStartTimeSec", default_value_t = 0.0, value_parser = parse_range_start)]
    pub start: f64,

    /// The end time for the range in the file, in seconds (default is infinite)
    #[arg(long, value_name = "rangeEndTimeSec", allow_negative_numbers = true)]
    pub end: Option<f64>,

    /// Number of significant value digits kept by the histograms
    #[arg(short = 's', value_name = "digits", default_value_t = DEFAULT_SIGFIG,
          value_parser = clap::value_parser!(u8).range(0..=5))]
    pub sigfig: u8,
}

impl Cli {
    /// Parse process-style arguments, accepting `-csv`/`-start`/`-end`
    /// as spellings of their double-dash forms.
    pub fn parse_legacy<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::parse_from(normalize_args(args))
    }

    /// Fallible variant of [`Cli::parse_legacy`], used by tests.
    pub fn try_parse_legacy<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }
}

fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some(s) if LEGACY_LONG_FLAGS.contains(&s) => OsString::from(format!("-{s}")),
            _ => arg,
        })
        .collect()
}

fn parse_range_start(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("range start must be a non-negative number, got {s}"));
    }
    Ok(value)
}

// ─── Run configuration ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Csv,
}

/// Inclusive `[start, end]` window in seconds relative to the log's start time.
///
/// `end < start` is kept as given and admits nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start_sec: f64,
    pub end_sec: f64,
}

impl TimeRange {
    pub const fn new(start_sec: f64, end_sec: f64) -> Self {
        Self { start_sec, end_sec }
    }

    pub const fn unbounded() -> Self {
        Self::new(0.0, f64::INFINITY)
    }

    pub fn is_end_bounded(&self) -> bool {
        self.end_sec.is_finite()
    }

    /// Offset lies before the window; keep reading.
    pub fn is_before(&self, offset_sec: f64) -> bool {
        offset_sec < self.start_sec
    }

    /// Offset lies past the window; nothing later can qualify.
    pub fn is_after(&self, offset_sec: f64) -> bool {
        offset_sec > self.end_sec
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Immutable settings for one processing run.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: OutputFormat,
    pub range: TimeRange,
    pub lowest_trackable: u64,
    pub highest_trackable: u64,
    pub sigfig: u8,
    pub ticks_per_half: u32,
    pub value_unit_ratio: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            format: OutputFormat::Plain,
            range: TimeRange::unbounded(),
            lowest_trackable: DEFAULT_LOWEST_TRACKABLE,
            highest_trackable: DEFAULT_HIGHEST_TRACKABLE,
            sigfig: DEFAULT_SIGFIG,
            ticks_per_half: DEFAULT_TICKS_PER_HALF,
            value_unit_ratio: DEFAULT_VALUE_UNIT_RATIO,
        }
    }
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            input: cli.input,
            output: cli.output,
            format: if cli.csv {
                OutputFormat::Csv
            } else {
                OutputFormat::Plain
            },
            range: TimeRange::new(cli.start, cli.end.unwrap_or(f64::INFINITY)),
            sigfig: cli.sigfig,
            ..Self::default()
        }
    }
}

impl Config {
    /// `<output>.hgrm`, where the percentile distribution is written.
    pub fn distribution_path(&self) -> Option<PathBuf> {
        self.output.as_ref().map(|out| {
            let mut name = out.clone().into_os_string();
            name.push(".hgrm");
            PathBuf::from(name)
        })
    }
}
