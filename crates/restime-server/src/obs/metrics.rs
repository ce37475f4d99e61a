//! Resource metrics registry.
//!
//! Counters and histograms with dynamic labels backed by `DashMap`. Label
//! sets keep the order of the timer key (resource identity, status, then
//! tags in parameter order), so rendering is stable per series. Histogram
//! buckets are fixed in microseconds to avoid floating point math.

use dashmap::DashMap;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use restime_core::error::{RestimeError, Result};
use restime_core::timer::status_class;
use restime_core::{MetricSink, TimerKey};

type LabelSet = Vec<(String, String)>;

/// Labels every series carries before the call tags.
const RESERVED_LABELS: [&str; 6] = ["resource", "metric", "method", "status", "class", "le"];

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// Turn a tag name into a valid, non-reserved label name.
fn label_name(tag: &str) -> String {
    let mut name: String = tag
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    if RESERVED_LABELS.contains(&name.as_str()) {
        name.insert_str(0, "tag_");
    }
    name
}

fn render_labels(key: &LabelSet) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelSet, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &LabelSet) {
        if let Some(counter) = self.map.get(labels) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let counter = self.map.entry(labels.clone()).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &LabelSet) -> u64 {
        self.map.get(labels).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Render in Prometheus text exposition format.
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} counter", name);
        for r in self.map.iter() {
            let val = r.value().load(Ordering::Relaxed);
            let _ = writeln!(out, "{}{{{}}} {}", name, render_labels(r.key()), val);
        }
    }
}

// Fixed Buckets in Microseconds (µs)
// 100us, 500us, 1ms, 5ms, 10ms, 50ms, 100ms, 500ms, 1s
const BUCKETS_MICROS: [u64; 9] = [100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; 9],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelSet, AtomicHistogram>,
}

impl HistogramVec {
    /// Observe a duration and increment cumulative buckets (microsecond scale).
    pub fn observe(&self, labels: &LabelSet, duration: Duration) {
        let hist = match self.map.get(labels) {
            Some(h) => h,
            None => self.map.entry(labels.clone()).or_default().downgrade(),
        };
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(micros, Ordering::Relaxed);

        for (bucket, &le) in hist.buckets.iter().zip(BUCKETS_MICROS.iter()) {
            if micros <= le {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &LabelSet) -> u64 {
        self.map.get(labels).map(|h| h.count.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Render in Prometheus text exposition format (unit: microseconds).
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {} histogram", name);
        for r in self.map.iter() {
            let hist = r.value();
            let label_str = render_labels(r.key());
            let prefix = if label_str.is_empty() { String::new() } else { format!("{},", label_str) };

            for (bucket, &le) in hist.buckets.iter().zip(BUCKETS_MICROS.iter()) {
                let count = bucket.load(Ordering::Relaxed);
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, count);
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, count);

            let sum = hist.sum.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_sum{{{}}} {}", name, label_str, sum);
            let _ = writeln!(out, "{}_count{{{}}} {}", name, label_str, count);
        }
    }
}

/// Per-resource request counters and latency histograms.
pub struct ResourceMetrics {
    namespace: String,
    requests: CounterVec,
    durations: HistogramVec, // In Microseconds
}

impl ResourceMetrics {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            requests: CounterVec::default(),
            durations: HistogramVec::default(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Label set of one series: resource identity, status, then call tags.
    pub fn labels(key: &TimerKey, status: u16) -> LabelSet {
        let mut labels: LabelSet = vec![
            ("resource".into(), key.resource_path.clone()),
            ("metric".into(), key.metric_name.clone()),
            ("method".into(), key.http_method.clone()),
            ("status".into(), status.to_string()),
            ("class".into(), status_class(status).into()),
        ];
        for (tag, value) in key.tags.iter() {
            labels.push((label_name(tag), value.to_string()));
        }
        labels
    }

    /// Distinct tag names of one resource must export as distinct labels.
    pub fn check_tag_labels<'a>(tags: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let mut by_label: HashMap<String, &str> = HashMap::new();
        for tag in tags {
            match by_label.entry(label_name(tag)) {
                Entry::Occupied(e) if *e.get() != tag => {
                    return Err(RestimeError::InvalidConfig(format!(
                        "tags {:?} and {tag:?} both export as label {:?}",
                        e.get(),
                        e.key()
                    )));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(e) => {
                    e.insert(tag);
                }
            }
        }
        Ok(())
    }

    /// Number of requests recorded for `key` with `status`.
    pub fn requests(&self, key: &TimerKey, status: u16) -> u64 {
        self.requests.get(&Self::labels(key, status))
    }

    /// Number of latency observations for `key` with `status`.
    pub fn observations(&self, key: &TimerKey, status: u16) -> u64 {
        self.durations.count(&Self::labels(key, status))
    }

    /// Render all series.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.requests.render(&format!("{}_resource_requests_total", self.namespace), &mut out);
        self.durations.render(&format!("{}_resource_duration_micros", self.namespace), &mut out); // Explicit unit
        out
    }
}

impl MetricSink for ResourceMetrics {
    fn update(&self, key: &TimerKey, status: u16, elapsed: Duration) {
        let labels = Self::labels(key, status);
        self.requests.inc(&labels);
        self.durations.observe(&labels, elapsed);
    }
}
