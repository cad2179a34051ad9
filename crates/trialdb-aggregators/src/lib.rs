//! Metric aggregation containers for TrialDB.
//!
//! Every metric, metadata field, and chronometer on a trial is backed by an
//! aggregation container that decides how much history to keep:
//!
//! - [`ValueAggregator`] — keeps only the latest value
//! - [`RingAggregator`] — keeps the `n` most recent numeric samples
//! - [`StatAggregator`] — keeps running mean/stddev/min/max, not the history
//! - [`TimeSeriesAggregator`] — keeps the entire history
//!
//! All containers expose the same capability through [`Aggregate`]:
//! `append` a value, read back a representative `value`, and `to_json` for
//! persistence. Containers are created lazily by the store from an
//! [`AggregatorSpec`], which is the serializable factory callers pass
//! through protocol operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// The uniform capability all aggregation containers implement.
pub trait Aggregate {
    /// Fold one observation into the container.
    fn append(&mut self, value: Value);

    /// The last (or otherwise representative) observed value.
    fn value(&self) -> Option<Value>;

    /// JSON-compatible representation used by snapshot persistence.
    fn to_json(&self) -> Value;
}

/// Keeps only the latest observed value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueAggregator {
    value: Option<Value>,
}

impl ValueAggregator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Aggregate for ValueAggregator {
    fn append(&mut self, value: Value) {
        self.value = Some(value);
    }

    fn value(&self) -> Option<Value> {
        self.value.clone()
    }

    fn to_json(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }
}

/// Keeps the `capacity` most recent numeric samples.
///
/// Once full, new samples overwrite the oldest. Non-numeric values are
/// dropped with a warning; the ring only holds `f64`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RingAggregator {
    capacity: usize,
    samples: Vec<f64>,
    cursor: usize,
}

impl RingAggregator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: Vec::new(),
            cursor: 0,
        }
    }

    /// Samples in arrival order, oldest first.
    pub fn history(&self) -> Vec<f64> {
        if self.samples.len() < self.capacity {
            self.samples.clone()
        } else {
            let mut out = Vec::with_capacity(self.capacity);
            out.extend_from_slice(&self.samples[self.cursor..]);
            out.extend_from_slice(&self.samples[..self.cursor]);
            out
        }
    }
}

impl Aggregate for RingAggregator {
    fn append(&mut self, value: Value) {
        let Some(sample) = value.as_f64() else {
            warn!(?value, "ring aggregator dropped non-numeric value");
            return;
        };
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.cursor] = sample;
            self.cursor = (self.cursor + 1) % self.capacity;
        }
    }

    fn value(&self) -> Option<Value> {
        let last = if self.samples.len() < self.capacity {
            self.samples.last()
        } else {
            let idx = (self.cursor + self.capacity - 1) % self.capacity;
            self.samples.get(idx)
        };
        last.copied().map(Value::from)
    }

    fn to_json(&self) -> Value {
        Value::from(self.history())
    }
}

/// Running mean/stddev/min/max without keeping the history.
///
/// The first `skip` observations are treated as warm-up and excluded from
/// the statistics (useful when the first iterations of a training loop are
/// dominated by one-time setup cost). Variance uses Welford's online
/// update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatAggregator {
    skip: usize,
    seen: usize,
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl StatAggregator {
    pub fn new(skip: usize) -> Self {
        Self {
            skip,
            seen: 0,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Observations folded into the statistics (excludes warm-up).
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

impl Aggregate for StatAggregator {
    fn append(&mut self, value: Value) {
        let Some(sample) = value.as_f64() else {
            warn!(?value, "stat aggregator dropped non-numeric value");
            return;
        };
        self.seen += 1;
        if self.seen <= self.skip {
            return;
        }
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }

    fn value(&self) -> Option<Value> {
        (self.count > 0).then(|| Value::from(self.mean))
    }

    fn to_json(&self) -> Value {
        if self.count == 0 {
            return serde_json::json!({
                "count": 0,
                "mean": Value::Null,
                "stddev": Value::Null,
                "min": Value::Null,
                "max": Value::Null,
            });
        }
        serde_json::json!({
            "count": self.count,
            "mean": self.mean,
            "stddev": self.stddev(),
            "min": self.min,
            "max": self.max,
        })
    }
}

/// Keeps the entire observation history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesAggregator {
    series: Vec<Value>,
}

impl TimeSeriesAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self) -> &[Value] {
        &self.series
    }
}

impl Aggregate for TimeSeriesAggregator {
    fn append(&mut self, value: Value) {
        self.series.push(value);
    }

    fn value(&self) -> Option<Value> {
        self.series.last().cloned()
    }

    fn to_json(&self) -> Value {
        Value::from(self.series.clone())
    }
}

/// A concrete aggregation container embedded in a trial.
///
/// Entities hold this enum rather than a trait object so they stay
/// `Clone + Serialize + Deserialize` and round-trip through the snapshot
/// file unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregator {
    Value(ValueAggregator),
    Ring(RingAggregator),
    Stat(StatAggregator),
    TimeSeries(TimeSeriesAggregator),
}

impl Aggregate for Aggregator {
    fn append(&mut self, value: Value) {
        match self {
            Self::Value(a) => a.append(value),
            Self::Ring(a) => a.append(value),
            Self::Stat(a) => a.append(value),
            Self::TimeSeries(a) => a.append(value),
        }
    }

    fn value(&self) -> Option<Value> {
        match self {
            Self::Value(a) => a.value(),
            Self::Ring(a) => a.value(),
            Self::Stat(a) => a.value(),
            Self::TimeSeries(a) => a.value(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Value(a) => a.to_json(),
            Self::Ring(a) => a.to_json(),
            Self::Stat(a) => a.to_json(),
            Self::TimeSeries(a) => a.to_json(),
        }
    }
}

/// Serializable factory for aggregation containers.
///
/// Protocol operations carry a spec instead of a container so the store can
/// create the container lazily, on the first observation for a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatorSpec {
    Value,
    Ring { capacity: usize },
    Stat { skip: usize },
    TimeSeries,
}

impl AggregatorSpec {
    /// Instantiate the container this spec describes.
    pub fn build(&self) -> Aggregator {
        match *self {
            Self::Value => Aggregator::Value(ValueAggregator::new()),
            Self::Ring { capacity } => Aggregator::Ring(RingAggregator::new(capacity)),
            Self::Stat { skip } => Aggregator::Stat(StatAggregator::new(skip)),
            Self::TimeSeries => Aggregator::TimeSeries(TimeSeriesAggregator::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_keeps_only_latest() {
        let mut agg = ValueAggregator::new();
        assert_eq!(agg.value(), None);
        agg.append(json!(1));
        agg.append(json!("two"));
        assert_eq!(agg.value(), Some(json!("two")));
        assert_eq!(agg.to_json(), json!("two"));
    }

    #[test]
    fn ring_overwrites_oldest_once_full() {
        let mut agg = RingAggregator::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            agg.append(json!(v));
        }
        assert_eq!(agg.history(), vec![3.0, 4.0, 5.0]);
        assert_eq!(agg.value(), Some(json!(5.0)));
    }

    #[test]
    fn ring_partial_fill() {
        let mut agg = RingAggregator::new(4);
        agg.append(json!(7.5));
        assert_eq!(agg.history(), vec![7.5]);
        assert_eq!(agg.value(), Some(json!(7.5)));
    }

    #[test]
    fn ring_drops_non_numeric() {
        let mut agg = RingAggregator::new(2);
        agg.append(json!("nope"));
        assert!(agg.history().is_empty());
    }

    #[test]
    fn stat_running_moments() {
        let mut agg = StatAggregator::new(0);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            agg.append(json!(v));
        }
        assert_eq!(agg.count(), 8);
        assert!((agg.mean() - 5.0).abs() < 1e-9);
        // Sample stddev of the classic sequence is ~2.138.
        assert!((agg.stddev() - 2.138089935).abs() < 1e-6);
        assert_eq!(agg.min(), 2.0);
        assert_eq!(agg.max(), 9.0);
    }

    #[test]
    fn stat_skips_warmup() {
        let mut agg = StatAggregator::new(2);
        for v in [100.0, 100.0, 1.0, 3.0] {
            agg.append(json!(v));
        }
        assert_eq!(agg.count(), 2);
        assert!((agg.mean() - 2.0).abs() < 1e-9);
        assert_eq!(agg.max(), 3.0);
    }

    #[test]
    fn time_series_keeps_everything() {
        let mut agg = TimeSeriesAggregator::new();
        agg.append(json!(1));
        agg.append(json!([2, "x"]));
        assert_eq!(agg.series().len(), 2);
        assert_eq!(agg.value(), Some(json!([2, "x"])));
        assert_eq!(agg.to_json(), json!([1, [2, "x"]]));
    }

    #[test]
    fn spec_builds_matching_container() {
        assert!(matches!(AggregatorSpec::Value.build(), Aggregator::Value(_)));
        assert!(matches!(
            AggregatorSpec::Ring { capacity: 10 }.build(),
            Aggregator::Ring(_)
        ));
        assert!(matches!(
            AggregatorSpec::Stat { skip: 1 }.build(),
            Aggregator::Stat(_)
        ));
        assert!(matches!(
            AggregatorSpec::TimeSeries.build(),
            Aggregator::TimeSeries(_)
        ));
    }

    #[test]
    fn aggregator_serde_roundtrip() {
        let mut agg = AggregatorSpec::Stat { skip: 1 }.build();
        for v in [1.0, 2.0, 3.0] {
            agg.append(json!(v));
        }
        let encoded = serde_json::to_string(&agg).unwrap();
        let decoded: Aggregator = serde_json::from_str(&encoded).unwrap();
        assert_eq!(agg, decoded);
    }

    #[test]
    fn spec_serde_roundtrip() {
        let spec = AggregatorSpec::Ring { capacity: 16 };
        let encoded = serde_json::to_string(&spec).unwrap();
        let decoded: AggregatorSpec = serde_json::from_str(&encoded).unwrap();
        assert_eq!(spec, decoded);
    }
}
