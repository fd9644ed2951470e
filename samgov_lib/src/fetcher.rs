//! Sequential multi-code orchestration over the API client and cache.
//!
//! Codes are queried one at a time, in input order, with a fixed delay
//! between network calls to stay under the upstream rate limit. Running
//! codes concurrently would trip 429s far more often than the delay
//! costs, so fan-out is deliberately not offered here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use samgov_api::types::FetchResult;
use samgov_api::Client;

use crate::cache::OpportunitiesCache;
use crate::perf::format_percent;
use crate::resolver::ResolvedQuerySpec;

/// Spacing between consecutive upstream calls.
pub const INTER_CALL_DELAY: Duration = Duration::from_millis(500);

/// Timing and cache accounting for one code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMetric {
    pub code: String,
    pub duration_ms: u64,
    pub count: usize,
    pub cached: bool,
}

/// Aggregated run metrics. `cache_misses` counts actual API call
/// attempts, successful or not.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub total_duration_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub per_code: Vec<CodeMetric>,
}

/// Everything a multi-code run produced. `results` matches the input code
/// order; when `cancelled` is set only the codes attempted so far are
/// present.
#[derive(Debug)]
pub struct FetchOutcome {
    pub results: Vec<FetchResult>,
    pub performance: PerformanceMetrics,
    pub cancelled: bool,
}

/// Presentation view of an outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSummary {
    pub codes_queried: usize,
    pub codes_succeeded: usize,
    pub codes_failed: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: String,
    pub total_duration_ms: u64,
}

impl FetchOutcome {
    /// Derived counts for presentation and logging.
    pub fn summary(&self) -> FetchSummary {
        let codes_succeeded = self.results.iter().filter(|r| r.success).count();
        let total_queries = self.performance.cache_hits + self.performance.cache_misses;
        let hit_rate = if total_queries == 0 {
            0.0
        } else {
            self.performance.cache_hits as f64 * 100.0 / total_queries as f64
        };
        FetchSummary {
            codes_queried: self.results.len(),
            codes_succeeded,
            codes_failed: self.results.len() - codes_succeeded,
            cache_hits: self.performance.cache_hits,
            cache_misses: self.performance.cache_misses,
            cache_hit_rate: format_percent(hit_rate),
            total_duration_ms: self.performance.total_duration_ms,
        }
    }

    /// Codes whose query failed, in input order.
    pub fn failed_codes(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.code.clone())
            .collect()
    }
}

/// Fetches a set of classification codes through the cache and client.
pub struct OpportunityFetcher {
    client: Client,
    cache: OpportunitiesCache,
    inter_call_delay: Duration,
}

impl OpportunityFetcher {
    pub fn new(client: Client, cache: OpportunitiesCache) -> Self {
        Self {
            client,
            cache,
            inter_call_delay: INTER_CALL_DELAY,
        }
    }

    /// Overrides the inter-call delay, e.g. zero for tests.
    pub fn with_inter_call_delay(mut self, delay: Duration) -> Self {
        self.inter_call_delay = delay;
        self
    }

    /// Queries every code, in order. One code's failure never aborts the
    /// loop; each failure becomes one failed entry in the results.
    pub async fn fetch_all(
        &self,
        codes: &[String],
        spec: &ResolvedQuerySpec,
        api_key: &str,
    ) -> FetchOutcome {
        self.fetch_all_inner(codes, spec, api_key, None).await
    }

    /// Like [`fetch_all`](Self::fetch_all), but checks `cancel` between
    /// per-code iterations. Results collected before cancellation are
    /// kept so the caller can still dedup and report them.
    pub async fn fetch_all_with_cancel(
        &self,
        codes: &[String],
        spec: &ResolvedQuerySpec,
        api_key: &str,
        cancel: &AtomicBool,
    ) -> FetchOutcome {
        self.fetch_all_inner(codes, spec, api_key, Some(cancel)).await
    }

    async fn fetch_all_inner(
        &self,
        codes: &[String],
        spec: &ResolvedQuerySpec,
        api_key: &str,
        cancel: Option<&AtomicBool>,
    ) -> FetchOutcome {
        let query = spec.to_search_query();
        let run_started = Instant::now();
        let mut results = Vec::with_capacity(codes.len());
        let mut metrics = PerformanceMetrics::default();
        let mut cancelled = false;
        let mut made_network_call = false;

        for code in codes {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    tracing::info!(
                        "Fetch cancelled after {} of {} codes",
                        results.len(),
                        codes.len()
                    );
                    cancelled = true;
                    break;
                }
            }

            let started = Instant::now();
            let cached_hit = if spec.bypass_cache {
                None
            } else {
                self.cache.get(code, spec)
            };

            let (result, was_cached) = match cached_hit {
                Some(hit) => {
                    tracing::debug!("Cache hit for code {}", code);
                    (hit, true)
                }
                None => {
                    // Space out network calls only; cache hits cost nothing
                    // against the rate limit.
                    if made_network_call && !self.inter_call_delay.is_zero() {
                        tokio::time::sleep(self.inter_call_delay).await;
                    }
                    made_network_call = true;
                    let result = self.client.fetch(code, &query, api_key).await;
                    if result.success {
                        self.cache.put(code, spec, &result);
                    }
                    (result, false)
                }
            };

            if was_cached {
                metrics.cache_hits += 1;
            } else {
                metrics.cache_misses += 1;
            }
            metrics.per_code.push(CodeMetric {
                code: code.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
                count: result.count,
                cached: was_cached,
            });
            results.push(result);
        }

        metrics.total_duration_ms = run_started.elapsed().as_millis() as u64;
        FetchOutcome {
            results,
            performance: metrics,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samgov_api::types::ErrorKind;

    fn outcome(results: Vec<FetchResult>, hits: u64, misses: u64) -> FetchOutcome {
        FetchOutcome {
            results,
            performance: PerformanceMetrics {
                total_duration_ms: 1200,
                cache_hits: hits,
                cache_misses: misses,
                per_code: vec![],
            },
            cancelled: false,
        }
    }

    #[test]
    fn summary_counts_and_hit_rate() {
        let results = vec![
            FetchResult::succeeded("111110", vec![], 0),
            FetchResult::failed("222220", ErrorKind::ServerError, "boom", Some(500)),
            FetchResult::succeeded("333330", vec![], 0),
        ];
        let summary = outcome(results, 2, 1).summary();
        assert_eq!(summary.codes_queried, 3);
        assert_eq!(summary.codes_succeeded, 2);
        assert_eq!(summary.codes_failed, 1);
        assert_eq!(summary.cache_hit_rate, "66.7%");
    }

    #[test]
    fn whole_number_hit_rate_has_no_decimal() {
        let summary = outcome(vec![], 1, 3).summary();
        assert_eq!(summary.cache_hit_rate, "25%");
    }

    #[test]
    fn empty_run_summary() {
        let summary = outcome(vec![], 0, 0).summary();
        assert_eq!(summary.codes_queried, 0);
        assert_eq!(summary.cache_hit_rate, "0%");
    }

    #[test]
    fn failed_codes_in_order() {
        let results = vec![
            FetchResult::failed("111110", ErrorKind::RateLimit, "limit", Some(429)),
            FetchResult::succeeded("222220", vec![], 0),
            FetchResult::failed("333330", ErrorKind::NetworkError, "net", None),
        ];
        assert_eq!(
            outcome(results, 0, 3).failed_codes(),
            vec!["111110".to_string(), "333330".to_string()]
        );
    }
}
