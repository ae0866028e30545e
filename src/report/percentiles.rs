use hdrhistogram::Histogram;

/// The fixed percentile breakdown printed for every interval row.
/// Values are already divided by the value-unit ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileSet {
    pub count: u64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub p999: f64,
    pub p9999: f64,
    pub max: f64,
}

impl PercentileSet {
    /// Extract a percentile set from an HdrHistogram, scaling every value
    /// by `1 / unit_ratio`. Returns zeroed values if the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>, unit_ratio: f64) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        let scaled = |value: u64| value as f64 / unit_ratio;
        Self {
            count: hist.len(),
            p50: scaled(hist.value_at_percentile(50.0)),
            p90: scaled(hist.value_at_percentile(90.0)),
            p99: scaled(hist.value_at_percentile(99.0)),
            p999: scaled(hist.value_at_percentile(99.9)),
            p9999: scaled(hist.value_at_percentile(99.99)),
            max: scaled(hist.max()),
        }
    }

    /// All-zero placeholder used before any samples are recorded.
    pub fn empty() -> Self {
        Self {
            count: 0,
            p50: 0.0,
            p90: 0.0,
            p99: 0.0,
            p999: 0.0,
            p9999: 0.0,
            max: 0.0,
        }
    }
}
