//! HTTP client for the SAM.gov opportunity search endpoint.

use std::time::Duration;

use rand::Rng;
use url::Url;

use crate::query::SearchQuery;
use crate::types::{ErrorKind, FetchResult, Opportunity, SearchResponse};

const DEFAULT_BASE_URL: &str = "https://api.sam.gov";
const SEARCH_PATH: &str = "/opportunities/v2/search";

/// Server-side page size requested per call. Display-level truncation is a
/// downstream concern, so this stays fixed regardless of the caller's limit.
const PAGE_SIZE: u32 = 500;

/// Retry tuning for rate-limited requests. Defaults come from the
/// `SAMGOV_RETRY_*` environment variables when set.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Extra attempts after the first request, 429 responses only.
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RetryConfig {
    pub fn from_env() -> Self {
        Self {
            max_retries: env_usize("SAMGOV_RETRY_MAX", 3),
            base_delay_ms: env_u64("SAMGOV_RETRY_BASE_MS", 1000),
            max_delay_ms: env_u64("SAMGOV_RETRY_MAX_MS", 30000),
        }
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(30) as u32;
        let exp = 1u64 << shift;
        let base = self
            .base_delay_ms
            .saturating_mul(exp)
            .min(self.max_delay_ms);
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_millis((base as f64 * jitter) as u64)
    }
}

/// Client for single classification-code queries.
///
/// Each request builds a fresh `reqwest::Client` with a 30-second timeout.
/// [`Client::fetch`] never returns an error: every outcome, including
/// exhausted retries and malformed payloads, is a categorized
/// [`FetchResult`].
pub struct Client {
    /// Base URL for the API. Defaults to `https://api.sam.gov`.
    base_api_url: String,
    retry: RetryConfig,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Creates a new client pointing at the production SAM.gov API.
    pub fn new() -> Self {
        Self {
            base_api_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::from_env(),
        }
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_api_url: base_url.to_string(),
            retry: RetryConfig::from_env(),
        }
    }

    /// Overrides the retry tuning, e.g. to make backoff instant in tests.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn build_url(&self, code: &str, query: &SearchQuery, api_key: &str) -> Result<Url, url::ParseError> {
        let url = Url::parse(format!("{}{}", &self.base_api_url, SEARCH_PATH).as_str())?;
        let mut url = {
            let mut with_key = url;
            with_key.query_pairs_mut().append_pair("api_key", api_key);
            query.add_to_url(&with_key)
        };
        url.query_pairs_mut()
            .append_pair("ncode", code)
            .append_pair("limit", &PAGE_SIZE.to_string());
        Ok(url)
    }

    /// Runs one classification-code query. Retries up to
    /// `retry.max_retries` additional times on 429 with exponential,
    /// jittered backoff; every other failure is returned on the first hit.
    pub async fn fetch(&self, code: &str, query: &SearchQuery, api_key: &str) -> FetchResult {
        let url = match self.build_url(code, query, api_key) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Invalid URL constructed for code {}: {}", code, e);
                return FetchResult::failed(
                    code,
                    ErrorKind::NetworkError,
                    format!("Network error: invalid request URL: {}", e),
                    None,
                );
            }
        };

        let mut attempt = 0usize;
        loop {
            let client = match reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
            {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!("Failed to build HTTP client: {}", e);
                    return FetchResult::failed(
                        code,
                        ErrorKind::NetworkError,
                        format!("Network error: {}", e),
                        None,
                    );
                }
            };

            let resp = match client
                .get(url.clone())
                .header("accept", "application/json")
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!("Network failure querying code {}: {}", code, e);
                    return FetchResult::failed(
                        code,
                        ErrorKind::NetworkError,
                        format!("Network error: {}", e),
                        None,
                    );
                }
            };

            let status = resp.status().as_u16();
            if status == 429 {
                attempt += 1;
                if attempt > self.retry.max_retries {
                    tracing::warn!(
                        "Rate limit persisted for code {} after {} attempts",
                        code,
                        attempt
                    );
                    return FetchResult::failed(
                        code,
                        ErrorKind::RateLimit,
                        format!("Rate limit exceeded after {} attempts", attempt),
                        Some(429),
                    );
                }
                let delay = self.retry.delay_for_attempt(attempt);
                tracing::warn!(
                    "Rate limited on code {} (attempt {}/{}), retrying in {:.1}s",
                    code,
                    attempt,
                    self.retry.max_retries,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !(200..300).contains(&status) {
                let kind = ErrorKind::from_status(status);
                tracing::warn!(
                    "SAM.gov API request failed for code {}: {} ({})",
                    code,
                    status,
                    kind
                );
                return FetchResult::failed(
                    code,
                    kind,
                    "SAM.gov API request failed",
                    Some(status),
                );
            }

            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("Failed to read response body for code {}: {}", code, e);
                    return FetchResult::failed(
                        code,
                        ErrorKind::NetworkError,
                        format!("Network error: {}", e),
                        None,
                    );
                }
            };

            return parse_success_body(code, &body);
        }
    }
}

/// Parses a 2xx body. A body that is not a JSON object (or does not match
/// the expected shape) is a data error; a well-formed object with no
/// `opportunitiesData` is an empty success.
fn parse_success_body(code: &str, body: &str) -> FetchResult {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Unparseable response body for code {}: {}", code, e);
            return FetchResult::failed(
                code,
                ErrorKind::DataError,
                "Unexpected response structure from API",
                Some(200),
            );
        }
    };
    if !value.is_object() {
        tracing::warn!("Non-object response body for code {}", code);
        return FetchResult::failed(
            code,
            ErrorKind::DataError,
            "Unexpected response structure from API",
            Some(200),
        );
    }
    let parsed: SearchResponse = match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Unexpected response shape for code {}: {}", code, e);
            return FetchResult::failed(
                code,
                ErrorKind::DataError,
                "Unexpected response structure from API",
                Some(200),
            );
        }
    };

    let total_records = parsed.total_records.unwrap_or(0);
    let opportunities: Vec<Opportunity> = parsed
        .opportunities_data
        .unwrap_or_default()
        .into_iter()
        .map(Opportunity::from_raw)
        .collect();
    FetchResult::succeeded(code, opportunities, total_records)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|val| val.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_all_query_parameters() {
        let client = Client::with_base_url("https://example.com");
        let query = SearchQuery {
            posted_from: "10/20/2025".to_string(),
            posted_to: "11/19/2025".to_string(),
            notice_type_codes: vec!["o".to_string(), "p".to_string()],
            state: Some("CO".to_string()),
        };
        let url = client.build_url("541330", &query, "test-key").unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(pairs.contains(&("api_key".to_string(), "test-key".to_string())));
        assert!(pairs.contains(&("ncode".to_string(), "541330".to_string())));
        assert!(pairs.contains(&("ptype".to_string(), "o,p".to_string())));
        assert!(pairs.contains(&("state".to_string(), "CO".to_string())));
        assert!(pairs.contains(&("limit".to_string(), "500".to_string())));
        assert!(url.path().ends_with("/opportunities/v2/search"));
    }

    #[test]
    fn parse_ignores_missing_opportunities_data() {
        let result = parse_success_body("541330", r#"{"totalRecords": 0}"#);
        assert!(result.success);
        assert_eq!(result.count, 0);
        assert_eq!(result.total_records, 0);
        assert!(!result.cached);
    }

    #[test]
    fn parse_rejects_non_object_body() {
        let result = parse_success_body("541330", r#"[1, 2, 3]"#);
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::DataError));
        assert_eq!(
            result.error.as_deref(),
            Some("Unexpected response structure from API")
        );
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let result = parse_success_body("541330", "{not json");
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::DataError));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
        };
        // Jitter is 0.8-1.2x, so bound-check rather than compare exact values.
        let first = cfg.delay_for_attempt(1).as_millis() as u64;
        let second = cfg.delay_for_attempt(2).as_millis() as u64;
        let third = cfg.delay_for_attempt(3).as_millis() as u64;
        assert!((800..=1200).contains(&first), "first delay {first}");
        assert!((1600..=2400).contains(&second), "second delay {second}");
        assert!((3200..=4800).contains(&third), "third delay {third}");

        let capped = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 1500,
        };
        assert!(capped.delay_for_attempt(3).as_millis() as u64 <= 1800);
    }
}
