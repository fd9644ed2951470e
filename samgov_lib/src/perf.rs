//! Derived performance figures and structured telemetry for fetch runs.

use serde::Serialize;

use crate::dedup::MergedResult;
use crate::fetcher::PerformanceMetrics;

/// Event name for the per-run telemetry record.
pub const PERFORMANCE_EVENT: &str = "sam_fetch_performance";
/// Event name for the daily rollup record.
pub const DAILY_SUMMARY_EVENT: &str = "sam_fetch_daily_summary";

const LOW_CACHE_HIT_RATE_PCT: f64 = 20.0;
const MIN_QUERIES_FOR_CACHE_CHECK: u64 = 5;
const HIGH_DEDUP_RATE: f64 = 0.20;
const SLOW_AVG_MS: u64 = 3000;
const HIGH_FAILURE_RATE: f64 = 0.20;

/// Flattened metrics for one complete fetch run. Everything defaults to
/// zero so partially-populated runs still summarize cleanly.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchMetrics {
    pub total_duration_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub codes_queried: u64,
    pub codes_succeeded: u64,
    pub codes_failed: u64,
    pub count_before_dedup: u64,
    pub total_after_dedup: u64,
    pub duplicates_removed: u64,
}

impl FetchMetrics {
    /// Combines fetcher timing with merge results into one record.
    pub fn from_parts(performance: &PerformanceMetrics, merged: &MergedResult) -> Self {
        Self {
            total_duration_ms: performance.total_duration_ms,
            cache_hits: performance.cache_hits,
            cache_misses: performance.cache_misses,
            codes_queried: merged.codes_queried as u64,
            codes_succeeded: merged.codes_succeeded as u64,
            codes_failed: merged.codes_failed as u64,
            count_before_dedup: merged.count_before_dedup as u64,
            total_after_dedup: merged.total_after_dedup as u64,
            duplicates_removed: merged.duplicates_removed as u64,
        }
    }

    fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 * 100.0 / total as f64
        }
    }

    fn dedup_rate(&self) -> f64 {
        if self.count_before_dedup == 0 {
            0.0
        } else {
            self.duplicates_removed as f64 / self.count_before_dedup as f64
        }
    }

    fn average_per_code_ms(&self) -> u64 {
        if self.codes_queried == 0 {
            0
        } else {
            ((self.total_duration_ms as f64) / (self.codes_queried as f64)).round() as u64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationSummary {
    pub total_ms: u64,
    pub average_per_code_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodesSummary {
    pub queried: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunitiesSummary {
    pub before_dedup: u64,
    pub after_dedup: u64,
    pub duplicates_removed: u64,
    pub deduplication_rate: String,
}

/// Nested presentation view of a run's metrics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub duration: DurationSummary,
    pub cache: CacheSummary,
    pub codes: CodesSummary,
    pub opportunities: OpportunitiesSummary,
}

/// Externally-aggregated daily rollup figures. Producing the aggregate is
/// a batch-job concern elsewhere; only the logging contract lives here.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAggregate {
    pub total_fetches: u64,
    pub total_opportunities: u64,
    pub total_api_calls: u64,
    pub total_cache_hits: u64,
    pub average_duration_ms: u64,
    pub average_cache_hit_rate: f64,
    pub total_failures: u64,
}

/// Formats a percentage rounded to one decimal, trimming a trailing `.0`
/// so whole numbers render bare ("25%", "66.7%"). Existing log consumers
/// parse this exact shape.
pub fn format_percent(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded == rounded.trunc() {
        format!("{}%", rounded.trunc() as i64)
    } else {
        format!("{:.1}%", rounded)
    }
}

/// Nested summary of a run, with zero defaults throughout.
pub fn summary(metrics: &FetchMetrics) -> PerformanceSummary {
    PerformanceSummary {
        duration: DurationSummary {
            total_ms: metrics.total_duration_ms,
            average_per_code_ms: metrics.average_per_code_ms(),
        },
        cache: CacheSummary {
            hits: metrics.cache_hits,
            misses: metrics.cache_misses,
            hit_rate: format_percent(metrics.cache_hit_rate()),
        },
        codes: CodesSummary {
            queried: metrics.codes_queried,
            succeeded: metrics.codes_succeeded,
            failed: metrics.codes_failed,
        },
        opportunities: OpportunitiesSummary {
            before_dedup: metrics.count_before_dedup,
            after_dedup: metrics.total_after_dedup,
            duplicates_removed: metrics.duplicates_removed,
            deduplication_rate: format_percent(metrics.dedup_rate() * 100.0),
        },
    }
}

/// Independent anomaly checks; any subset may fire for one run.
pub fn analyze_performance(metrics: &FetchMetrics) -> Vec<String> {
    let mut warnings = Vec::new();

    let total_queries = metrics.cache_hits + metrics.cache_misses;
    if total_queries >= MIN_QUERIES_FOR_CACHE_CHECK
        && metrics.cache_hit_rate() < LOW_CACHE_HIT_RATE_PCT
    {
        warnings.push(format!(
            "Low cache hit rate: {} across {} queries",
            format_percent(metrics.cache_hit_rate()),
            total_queries
        ));
    }

    if metrics.dedup_rate() > HIGH_DEDUP_RATE {
        warnings.push(format!(
            "High deduplication rate: {} ({} of {} records were duplicates); classification codes may overlap too much, consider narrowing",
            format_percent(metrics.dedup_rate() * 100.0),
            metrics.duplicates_removed,
            metrics.count_before_dedup
        ));
    }

    let average = metrics.average_per_code_ms();
    if average > SLOW_AVG_MS {
        warnings.push(format!(
            "Slow average query duration: {}ms per code",
            average
        ));
    }

    if metrics.codes_queried > 0 {
        let failure_rate = metrics.codes_failed as f64 / metrics.codes_queried as f64;
        if failure_rate > HIGH_FAILURE_RATE {
            warnings.push(format!(
                "High failure rate: {} of {} classification code queries failed",
                metrics.codes_failed, metrics.codes_queried
            ));
        }
    }

    warnings
}

/// Emits the per-run telemetry record.
pub fn log(metrics: &FetchMetrics) {
    tracing::info!(
        event = PERFORMANCE_EVENT,
        total_duration_ms = metrics.total_duration_ms,
        cache_hits = metrics.cache_hits,
        cache_misses = metrics.cache_misses,
        cache_hit_rate = format_percent(metrics.cache_hit_rate()).as_str(),
        codes_queried = metrics.codes_queried,
        codes_succeeded = metrics.codes_succeeded,
        codes_failed = metrics.codes_failed,
        count_before_dedup = metrics.count_before_dedup,
        total_after_dedup = metrics.total_after_dedup,
        duplicates_removed = metrics.duplicates_removed,
        deduplication_rate = format_percent(metrics.dedup_rate() * 100.0).as_str(),
        "opportunity fetch completed"
    );
}

/// Emits one anomaly warning with the metric context attached.
pub fn log_warning(metrics: &FetchMetrics, reason: &str) {
    tracing::warn!(
        event = PERFORMANCE_EVENT,
        reason,
        total_duration_ms = metrics.total_duration_ms,
        codes_queried = metrics.codes_queried,
        codes_failed = metrics.codes_failed,
        cache_hit_rate = format_percent(metrics.cache_hit_rate()).as_str(),
        "fetch performance anomaly"
    );
}

/// Emits the daily rollup record.
pub fn log_daily_summary(aggregate: &DailyAggregate) {
    tracing::info!(
        event = DAILY_SUMMARY_EVENT,
        total_fetches = aggregate.total_fetches,
        total_opportunities = aggregate.total_opportunities,
        total_api_calls = aggregate.total_api_calls,
        total_cache_hits = aggregate.total_cache_hits,
        average_duration_ms = aggregate.average_duration_ms,
        average_cache_hit_rate = format_percent(aggregate.average_cache_hit_rate).as_str(),
        total_failures = aggregate.total_failures,
        "daily fetch summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_formatting_quirk() {
        assert_eq!(format_percent(66.6666), "66.7%");
        assert_eq!(format_percent(25.0), "25%");
        assert_eq!(format_percent(0.0), "0%");
        assert_eq!(format_percent(100.0), "100%");
        assert_eq!(format_percent(33.333), "33.3%");
        assert_eq!(format_percent(99.96), "100%");
    }

    #[test]
    fn two_hits_of_three_queries_formats_as_66_7() {
        let metrics = FetchMetrics {
            cache_hits: 2,
            cache_misses: 1,
            ..Default::default()
        };
        assert_eq!(summary(&metrics).cache.hit_rate, "66.7%");
    }

    #[test]
    fn summary_of_empty_metrics_is_all_zero() {
        let s = summary(&FetchMetrics::default());
        assert_eq!(s.duration.total_ms, 0);
        assert_eq!(s.duration.average_per_code_ms, 0);
        assert_eq!(s.cache.hit_rate, "0%");
        assert_eq!(s.opportunities.deduplication_rate, "0%");
    }

    #[test]
    fn average_per_code_rounds_to_nearest() {
        let metrics = FetchMetrics {
            total_duration_ms: 1000,
            codes_queried: 3,
            ..Default::default()
        };
        assert_eq!(summary(&metrics).duration.average_per_code_ms, 333);

        let metrics = FetchMetrics {
            total_duration_ms: 1001,
            codes_queried: 2,
            ..Default::default()
        };
        assert_eq!(summary(&metrics).duration.average_per_code_ms, 501);
    }

    #[test]
    fn low_hit_rate_requires_minimum_sample() {
        // 0 of 3 queries: under the sample floor, no warning.
        let metrics = FetchMetrics {
            cache_hits: 0,
            cache_misses: 3,
            ..Default::default()
        };
        assert!(analyze_performance(&metrics).is_empty());

        // 0 of 5 queries: warning fires.
        let metrics = FetchMetrics {
            cache_hits: 0,
            cache_misses: 5,
            ..Default::default()
        };
        let warnings = analyze_performance(&metrics);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Low cache hit rate"));
    }

    #[test]
    fn high_dedup_rate_warning() {
        let metrics = FetchMetrics {
            count_before_dedup: 40,
            total_after_dedup: 30,
            duplicates_removed: 10,
            ..Default::default()
        };
        let warnings = analyze_performance(&metrics);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("High deduplication rate: 25%"));

        // Exactly 20% does not fire; the check is strictly greater-than.
        let metrics = FetchMetrics {
            count_before_dedup: 10,
            total_after_dedup: 8,
            duplicates_removed: 2,
            ..Default::default()
        };
        assert!(analyze_performance(&metrics).is_empty());
    }

    #[test]
    fn slow_query_and_failure_rate_warnings() {
        let metrics = FetchMetrics {
            total_duration_ms: 20000,
            codes_queried: 5,
            codes_succeeded: 3,
            codes_failed: 2,
            ..Default::default()
        };
        let warnings = analyze_performance(&metrics);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("Slow average query duration: 4000ms"));
        assert!(warnings[1].contains("High failure rate: 2 of 5"));
    }

    #[test]
    fn independent_checks_can_all_fire() {
        let metrics = FetchMetrics {
            total_duration_ms: 50000,
            cache_hits: 0,
            cache_misses: 10,
            codes_queried: 10,
            codes_succeeded: 5,
            codes_failed: 5,
            count_before_dedup: 100,
            total_after_dedup: 50,
            duplicates_removed: 50,
        };
        assert_eq!(analyze_performance(&metrics).len(), 4);
    }
}
