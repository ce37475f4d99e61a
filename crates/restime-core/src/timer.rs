//! Timer identity and the metric sink contract.

use std::time::Duration;

use crate::tag::MetricTags;

/// Identifies one timer series: static resource identity plus call tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerKey {
    pub resource_path: String,
    pub metric_name: String,
    pub http_method: String,
    pub tags: MetricTags,
}

/// Status group label: `1xx` .. `5xx`; anything else is `unknown`.
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "unknown",
    }
}

/// Accumulates per-key timing statistics.
///
/// Implementations must accept concurrent updates of the same key.
pub trait MetricSink: Send + Sync {
    fn update(&self, key: &TimerKey, status: u16, elapsed: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_groups() {
        assert_eq!(status_class(204), "2xx");
        assert_eq!(status_class(404), "4xx");
        assert_eq!(status_class(503), "5xx");
        assert_eq!(status_class(0), "unknown");
    }
}
