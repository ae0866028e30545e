use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::config::Config;

pub type BoxedSink = Box<dyn Write + Send>;

/// The two report destinations of a run.
pub struct Sinks<W> {
    /// Per-interval rows; absent when no output file was requested or it
    /// could not be created.
    pub interval_log: Option<W>,
    /// Final percentile distribution; always present.
    pub distribution: W,
    /// Whether `distribution` is the `.hgrm` file rather than stdout.
    /// Only opened files get the time-range header.
    pub distribution_is_file: bool,
}

impl Sinks<BoxedSink> {
    /// Open the sinks requested by `config`.
    ///
    /// Creation failures are logged and never abort the run: a missing
    /// interval log is simply skipped, a missing `.hgrm` file falls back to
    /// standard output.
    pub fn open(config: &Config) -> Self {
        let (Some(output), Some(hgrm)) = (config.output.as_deref(), config.distribution_path()) else {
            return Self {
                interval_log: None,
                distribution: stdout(),
                distribution_is_file: false,
            };
        };

        let interval_log = create(output)
            .inspect_err(|e| warn!(path = %output.display(), error = %e, "failed to open output file"))
            .ok();

        let (distribution, distribution_is_file) = match create(&hgrm) {
            Ok(file) => (file, true),
            Err(e) => {
                warn!(
                    path = %hgrm.display(),
                    error = %e,
                    "failed to open percentiles histogram output file, using stdout"
                );
                (stdout(), false)
            }
        };

        Self {
            interval_log,
            distribution,
            distribution_is_file,
        }
    }
}

impl<W: Write> Sinks<W> {
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(log) = self.interval_log.as_mut() {
            log.flush()?;
        }
        self.distribution.flush()
    }
}

fn create(path: &Path) -> io::Result<BoxedSink> {
    let file = File::create(path)?;
    debug!(path = %path.display(), "opened output file");
    Ok(Box::new(BufWriter::new(file)))
}

fn stdout() -> BoxedSink {
    Box::new(BufWriter::new(io::stdout()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn no_output_means_stdout_only() {
        let sinks = Sinks::open(&Config::default());
        assert!(sinks.interval_log.is_none());
        assert!(!sinks.distribution_is_file);
    }

    #[test]
    fn opens_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output: Some(dir.path().join("run.log")),
            ..Config::default()
        };
        let mut sinks = Sinks::open(&config);
        assert!(sinks.interval_log.is_some());
        assert!(sinks.distribution_is_file);
        sinks.flush().unwrap();

        assert!(dir.path().join("run.log").exists());
        assert!(dir.path().join("run.log.hgrm").exists());
    }

    #[test]
    fn unwritable_output_is_not_fatal() {
        let config = Config {
            output: Some(PathBuf::from("/nonexistent-dir/for/sure/run.log")),
            ..Config::default()
        };
        let sinks = Sinks::open(&config);
        assert!(sinks.interval_log.is_none());
        assert!(!sinks.distribution_is_file);
    }
}
