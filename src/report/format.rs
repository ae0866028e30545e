use std::io::{self, Write};

use chrono::{Local, TimeZone};
use hdrhistogram::Histogram;

use super::percentiles::PercentileSet;
use crate::config::{OutputFormat, TimeRange};

// ─── Header comment lines ────────────────────────────────────────

pub const INTERVAL_LOG_TITLE: &str = "Interval percentile log";
pub const DISTRIBUTION_TITLE: &str = "Overall percentile distribution";

/// `#[<title> between 0.000 and <Infinite> seconds (relative to StartTime)]`
pub fn write_time_range(out: &mut dyn Write, title: &str, range: &TimeRange) -> io::Result<()> {
    write!(out, "#[{title} between {:.3} and", range.start_sec)?;
    if range.is_end_bounded() {
        write!(out, " {:.3}", range.end_sec)?;
    } else {
        write!(out, " <Infinite>")?;
    }
    writeln!(out, " seconds (relative to StartTime)]")
}

/// `#[StartTime: 1000000000.000 (seconds since epoch), Sun Sep 09 01:46:40 +00:00 2001]`
pub fn write_start_time(out: &mut dyn Write, start_sec: f64) -> io::Result<()> {
    let calendar = Local
        .timestamp_millis_opt((start_sec * 1000.0) as i64)
        .single()
        .map(|t| t.format("%a %b %d %H:%M:%S %Z %Y").to_string())
        .unwrap_or_default();
    writeln!(out, "#[StartTime: {start_sec:.3} (seconds since epoch), {calendar}]")
}

// ─── Row rendering ───────────────────────────────────────────────

/// One line of the interval log: the interval's own stats next to the
/// running totals at that point.
#[derive(Debug, Clone, Copy)]
pub struct IntervalRow {
    pub elapsed_sec: f64,
    pub interval: PercentileSet,
    pub total: PercentileSet,
}

/// Output layout, chosen once per run.
pub trait RowRenderer {
    /// Column legend written once, before the first interval row.
    fn legend(&self) -> &'static str;

    fn write_row(&self, out: &mut dyn Write, row: &IntervalRow) -> io::Result<()>;

    /// Full percentile distribution of `hist`, one row per quantile step.
    fn write_distribution(
        &self,
        out: &mut dyn Write,
        hist: &Histogram<u64>,
        ticks_per_half: u32,
        unit_ratio: f64,
    ) -> io::Result<()>;
}

pub fn renderer_for(format: OutputFormat) -> Box<dyn RowRenderer + Send> {
    match format {
        OutputFormat::Plain => Box::new(PlainRenderer),
        OutputFormat::Csv => Box::new(CsvRenderer),
    }
}

/// Fixed-width columns with `I:` / `T:` group labels.
pub struct PlainRenderer;

/// Unlabelled comma separated values with a quoted header.
pub struct CsvRenderer;

impl RowRenderer for PlainRenderer {
    fn legend(&self) -> &'static str {
        "Time: IntervalPercentiles:count ( 50% 90% Max ) TotalPercentiles:count ( 50% 90% 99% 99.9% 99.99% Max )"
    }

    fn write_row(&self, out: &mut dyn Write, row: &IntervalRow) -> io::Result<()> {
        let (i, t) = (&row.interval, &row.total);
        writeln!(
            out,
            "{:4.3}: I:{} ( {:7.3} {:7.3} {:7.3} ) T:{} ( {:7.3} {:7.3} {:7.3} {:7.3} {:7.3} {:7.3} )",
            row.elapsed_sec, i.count, i.p50, i.p90, i.max, t.count, t.p50, t.p90, t.p99, t.p999, t.p9999, t.max,
        )
    }

    fn write_distribution(
        &self,
        out: &mut dyn Write,
        hist: &Histogram<u64>,
        ticks_per_half: u32,
        unit_ratio: f64,
    ) -> io::Result<()> {
        let prec = hist.sigfig() as usize;
        writeln!(out, "{:>12} {:>14} {:>10} {:>14}\n", "Value", "Percentile", "TotalCount", "1/(1-Percentile)")?;

        for row in distribution_rows(hist, ticks_per_half, unit_ratio) {
            if row.is_last() {
                writeln!(out, "{:12.prec$} {:2.12} {:10}", row.value, row.quantile, row.total_count)?;
            } else {
                writeln!(
                    out,
                    "{:12.prec$} {:2.12} {:10} {:14.2}",
                    row.value,
                    row.quantile,
                    row.total_count,
                    1.0 / (1.0 - row.quantile),
                )?;
            }
        }

        writeln!(
            out,
            "#[Mean    = {:12.prec$}, StdDeviation   = {:12.prec$}]",
            hist.mean() / unit_ratio,
            hist.stdev() / unit_ratio,
        )?;
        writeln!(
            out,
            "#[Max     = {:12.prec$}, Total count    = {:12}]",
            hist.max() as f64 / unit_ratio,
            hist.len(),
        )?;
        writeln!(
            out,
            "#[Buckets = {:12}, SubBuckets     = {:12}]",
            hist.buckets(),
            sub_bucket_count(hist.sigfig()),
        )
    }
}

impl RowRenderer for CsvRenderer {
    fn legend(&self) -> &'static str {
        "\"Timestamp\",\"Int_Count\",\"Int_50%\",\"Int_90%\",\"Int_Max\",\"Total_Count\",\
         \"Total_50%\",\"Total_90%\",\"Total_99%\",\"Total_99.9%\",\"Total_99.99%\",\"Total_Max\""
    }

    fn write_row(&self, out: &mut dyn Write, row: &IntervalRow) -> io::Result<()> {
        let (i, t) = (&row.interval, &row.total);
        writeln!(
            out,
            "{:.3},{},{:.3},{:.3},{:.3},{},{:.3},{:.3},{:.3},{:.3},{:.3},{:.3}",
            row.elapsed_sec, i.count, i.p50, i.p90, i.max, t.count, t.p50, t.p90, t.p99, t.p999, t.p9999, t.max,
        )
    }

    fn write_distribution(
        &self,
        out: &mut dyn Write,
        hist: &Histogram<u64>,
        ticks_per_half: u32,
        unit_ratio: f64,
    ) -> io::Result<()> {
        let prec = hist.sigfig() as usize;
        writeln!(out, "\"Value\",\"Percentile\",\"TotalCount\",\"1/(1-Percentile)\"")?;

        for row in distribution_rows(hist, ticks_per_half, unit_ratio) {
            if row.is_last() {
                writeln!(out, "{:.prec$},{:.12},{},Infinity", row.value, row.quantile, row.total_count)?;
            } else {
                writeln!(
                    out,
                    "{:.prec$},{:.12},{},{:.2}",
                    row.value,
                    row.quantile,
                    row.total_count,
                    1.0 / (1.0 - row.quantile),
                )?;
            }
        }
        Ok(())
    }
}

// ─── Distribution table ──────────────────────────────────────────

struct DistributionRow {
    value: f64,
    quantile: f64,
    total_count: u64,
}

impl DistributionRow {
    fn is_last(&self) -> bool {
        self.quantile >= 1.0
    }
}

fn distribution_rows(hist: &Histogram<u64>, ticks_per_half: u32, unit_ratio: f64) -> Vec<DistributionRow> {
    if hist.len() == 0 {
        return Vec::new();
    }

    let mut total_count = 0u64;
    hist.iter_quantiles(ticks_per_half)
        .map(|iv| {
            total_count += iv.count_since_last_iteration();
            DistributionRow {
                value: iv.value_iterated_to() as f64 / unit_ratio,
                quantile: iv.quantile_iterated_to(),
                total_count,
            }
        })
        .collect()
}

/// Sub-bucket count implied by the precision, as reported in the table footer.
fn sub_bucket_count(sigfig: u8) -> u64 {
    let largest_single_unit = 2.0 * 10f64.powi(sigfig as i32);
    let magnitude = (largest_single_unit.log2().ceil() as u32).max(1);
    1 << magnitude
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> IntervalRow {
        IntervalRow {
            elapsed_sec: 1.5,
            interval: PercentileSet {
                count: 10,
                p50: 1.5,
                p90: 1.9,
                p99: 2.0,
                p999: 2.0,
                p9999: 2.0,
                max: 2.0,
            },
            total: PercentileSet {
                count: 20,
                p50: 1.25,
                p90: 1.75,
                p99: 2.0,
                p999: 2.0,
                p9999: 2.0,
                max: 2.0,
            },
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample_histogram() -> Histogram<u64> {
        let mut hist = Histogram::<u64>::new_with_bounds(20_000, 3_600_000_000_000, 2).unwrap();
        for v in 1..=100u64 {
            hist.record(v * 100_000).unwrap();
        }
        hist
    }

    #[test]
    fn plain_row_layout() {
        let text = render(|out| PlainRenderer.write_row(out, &row()));
        assert_eq!(
            text,
            "1.500: I:10 (   1.500   1.900   2.000 ) T:20 (   1.250   1.750   2.000   2.000   2.000   2.000 )\n"
        );
    }

    #[test]
    fn csv_row_layout() {
        let text = render(|out| CsvRenderer.write_row(out, &row()));
        assert_eq!(text, "1.500,10,1.500,1.900,2.000,20,1.250,1.750,2.000,2.000,2.000,2.000\n");
        assert_eq!(CsvRenderer.legend().split(',').count(), 12);
    }

    #[test]
    fn time_range_header() {
        let unbounded = render(|out| write_time_range(out, INTERVAL_LOG_TITLE, &TimeRange::unbounded()));
        assert_eq!(
            unbounded,
            "#[Interval percentile log between 0.000 and <Infinite> seconds (relative to StartTime)]\n"
        );

        let bounded = render(|out| write_time_range(out, DISTRIBUTION_TITLE, &TimeRange::new(2.0, 5.25)));
        assert_eq!(
            bounded,
            "#[Overall percentile distribution between 2.000 and 5.250 seconds (relative to StartTime)]\n"
        );
    }

    #[test]
    fn start_time_header() {
        let text = render(|out| write_start_time(out, 1_000_000_000.0));
        assert!(text.starts_with("#[StartTime: 1000000000.000 (seconds since epoch), "));
        assert!(text.contains("2001"));
        assert!(text.ends_with("]\n"));
    }

    #[test]
    fn plain_distribution_has_table_and_footer() {
        let hist = sample_histogram();
        let text = render(|out| PlainRenderer.write_distribution(out, &hist, 5, 1_000_000.0));
        let lines: Vec<&str> = text.lines().collect();

        assert!(lines[0].trim_start().starts_with("Value"));
        assert!(lines[1].is_empty());
        assert!(lines.iter().any(|l| l.starts_with("#[Mean    =")));
        assert!(lines.iter().any(|l| l.starts_with("#[Max     =") && l.trim_end().ends_with("100]")));
        assert!(lines.iter().any(|l| l.starts_with("#[Buckets =")));

        // last data row carries the full count and no 1/(1-p) column
        let last = lines.iter().rev().find(|l| !l.starts_with('#')).unwrap();
        let cols: Vec<&str> = last.split_whitespace().collect();
        assert_eq!(cols.len(), 3);
        assert_eq!(cols[1], "1.000000000000");
        assert_eq!(cols[2], "100");
    }

    #[test]
    fn csv_distribution_ends_with_infinity() {
        let hist = sample_histogram();
        let text = render(|out| CsvRenderer.write_distribution(out, &hist, 5, 1_000_000.0));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "\"Value\",\"Percentile\",\"TotalCount\",\"1/(1-Percentile)\"");
        assert!(lines.last().unwrap().ends_with(",100,Infinity"));
        assert!(lines.iter().all(|l| !l.starts_with('#')));
    }

    #[test]
    fn empty_distribution() {
        let hist = Histogram::<u64>::new_with_bounds(20_000, 3_600_000_000_000, 2).unwrap();
        let plain = render(|out| PlainRenderer.write_distribution(out, &hist, 5, 1_000_000.0));
        assert!(plain.contains("Total count    =            0]"));

        let csv = render(|out| CsvRenderer.write_distribution(out, &hist, 5, 1_000_000.0));
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn sub_buckets_follow_precision() {
        assert_eq!(sub_bucket_count(2), 256);
        assert_eq!(sub_bucket_count(3), 2048);
        assert_eq!(sub_bucket_count(0), 2);
    }
}
