use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Named metrics exposed to the planner's monitoring.
#[derive(Default, Clone)]
pub struct MetricRegistry {
    counters: BTreeMap<String, Arc<Counter>>,
    histograms: BTreeMap<String, Arc<Histogram>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_counter(&mut self, name: &str, counter: Arc<Counter>) -> &mut Self {
        self.counters.insert(name.to_string(), counter);
        self
    }

    pub fn register_histogram(&mut self, name: &str, histogram: Arc<Histogram>) -> &mut Self {
        self.histograms.insert(name.to_string(), histogram);
        self
    }

    pub fn get_counter(&self, name: &str) -> Option<Arc<Counter>> {
        self.counters.get(name).cloned()
    }

    pub fn get_histogram(&self, name: &str) -> Option<Arc<Histogram>> {
        self.histograms.get(name).cloned()
    }

    /// Names of every registered metric, in order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.counters.keys().chain(self.histograms.keys()).map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Default)]
pub struct Counter {
    atomic: AtomicU64,
}

impl Counter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self) -> u64 {
        self.atomic.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, amount: u64) {
        self.atomic.fetch_add(amount, Ordering::Relaxed);
    }
}

/// Largest power of two with its own bucket. Bigger values land in the last bucket.
const MAX_EXPONENT: u32 = 20;

/// Thread-safe histogram of sizes (OR branches, AND members...).
///
/// Bucket `0` holds zeros and bucket `i > 0` holds the values in `(2^(i-2), 2^(i-1)]`.
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            buckets: (0..MAX_EXPONENT + 2).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            max: AtomicU64::new(0),
        })
    }

    fn bucket_index(value: u64) -> usize {
        if value == 0 {
            return 0;
        }
        let exponent = u64::BITS - (value - 1).leading_zeros();
        1 + exponent.min(MAX_EXPONENT) as usize
    }

    fn upper_bound(index: usize) -> u64 {
        if index == 0 { 0 } else { 1 << (index - 1) }
    }

    pub fn record(&self, value: u64) {
        self.buckets[Self::bucket_index(value)].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.max.fetch_max(value, Ordering::Relaxed);
    }

    /// Upper bound of the bucket holding the given quantile (`0.0..=1.0`), `None` if nothing
    /// was recorded.
    pub fn estimate_quantile(&self, quantile: f64) -> Option<u64> {
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return None;
        }
        let target = ((quantile * total as f64).ceil() as u64).max(1);
        let mut cumulative = 0;
        for (index, bucket) in self.buckets.iter().enumerate() {
            cumulative += bucket.load(Ordering::Relaxed);
            if cumulative >= target {
                return Some(Self::upper_bound(index));
            }
        }
        Some(Self::upper_bound(self.buckets.len() - 1))
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let sum = self.sum.load(Ordering::Relaxed);
        HistogramSnapshot {
            count,
            sum,
            max: self.max.load(Ordering::Relaxed),
            mean: if count > 0 { sum as f64 / count as f64 } else { 0.0 },
            buckets: self
                .buckets
                .iter()
                .enumerate()
                .map(|(index, c)| (Self::upper_bound(index), c.load(Ordering::Relaxed)))
                .filter(|(_, c)| *c > 0)
                .collect(),
        }
    }
}

/// Point in time view of a [`Histogram`].
#[derive(Debug, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: u64,
    pub max: u64,
    pub mean: f64,
    /// Non empty buckets as `(upper_bound, count)`.
    pub buckets: Vec<(u64, u64)>,
}

/// Metrics maintained by condition normalization. Clones share the same counters.
#[derive(Clone)]
pub struct ConditionMetrics {
    pub normalizations: Arc<Counter>,
    /// Normalizations which hit the DNF size limit and kept the unoptimized tree.
    pub dnf_fallbacks: Arc<Counter>,
    /// AND clauses dropped because they could never match.
    pub impossible_branches: Arc<Counter>,
    /// OR branches left by each normalization.
    pub branches: Arc<Histogram>,
}

impl ConditionMetrics {
    pub fn new() -> Self {
        Self {
            normalizations: Counter::new(),
            dnf_fallbacks: Counter::new(),
            impossible_branches: Counter::new(),
            branches: Histogram::new(),
        }
    }

    pub fn register_metrics(&self, registry: &mut MetricRegistry) {
        registry
            .register_counter("condition.normalizations", self.normalizations.clone())
            .register_counter("condition.dnf_fallbacks", self.dnf_fallbacks.clone())
            .register_counter("condition.impossible_branches", self.impossible_branches.clone())
            .register_histogram("condition.branches", self.branches.clone());
    }
}

impl Default for ConditionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub fn assert_counter_eq(registry: &MetricRegistry, name: &str, expected: u64) {
    match registry.get_counter(name) {
        Some(counter) => assert_eq!(counter.get(), expected, "Counter '{}' mismatch", name),
        None => panic!("Counter '{}' not found in registry", name),
    }
}
