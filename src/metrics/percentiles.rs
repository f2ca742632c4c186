use hdrhistogram::Histogram;
use serde::Serialize;

/// Latency breakdown of `collect()` calls, all values in microseconds.
/// Zeroed until the first refresh completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min_us: u64,
    pub max_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub p999_us: u64,
    pub count: u64,
}

impl PercentileSet {
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }

        Self {
            min_us: hist.min(),
            max_us: hist.max(),
            mean_us: hist.mean(),
            p50_us: hist.value_at_quantile(0.50),
            p95_us: hist.value_at_quantile(0.95),
            p99_us: hist.value_at_quantile(0.99),
            p999_us: hist.value_at_quantile(0.999),
            count: hist.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_is_zeroed() {
        let hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
        assert_eq!(PercentileSet::from_histogram(&hist), PercentileSet::default());
    }

    #[test]
    fn quantiles_follow_recorded_values() {
        let mut hist = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
        for v in 1..=100 {
            hist.record(v * 1_000).unwrap();
        }

        let set = PercentileSet::from_histogram(&hist);
        assert_eq!(set.count, 100);
        assert!(hist.equivalent(set.min_us, 1_000));
        assert!(hist.equivalent(set.max_us, 100_000));
        assert!(hist.equivalent(set.p50_us, 50_000));
        assert!(set.p95_us >= set.p50_us);
        assert!(set.p999_us >= set.p99_us);
    }
}
