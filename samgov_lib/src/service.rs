//! End-to-end fetch runs: resolve, fetch, dedup, envelope, log, snapshot.

use std::sync::atomic::AtomicBool;

use serde_json::{json, Map, Value};

use samgov_api::types::Opportunity;

use crate::dedup;
use crate::error::ValidationError;
use crate::fetcher::{FetchOutcome, OpportunityFetcher};
use crate::perf::{self, FetchMetrics};
use crate::resolver::{ParameterResolver, ResolvedQuerySpec};
use crate::response::{self, ResponseEnvelope};
use crate::state::StateFileManager;

/// Drives one complete fetch run and hands back the envelope. This is the
/// single entry point callers (CLI command, scheduled job, admin action)
/// use; they never talk to the stages directly.
pub struct OpportunityService {
    resolver: ParameterResolver,
    fetcher: OpportunityFetcher,
    state: StateFileManager,
    api_key: String,
}

impl OpportunityService {
    pub fn new(
        resolver: ParameterResolver,
        fetcher: OpportunityFetcher,
        state: StateFileManager,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            state,
            api_key: api_key.into(),
        }
    }

    /// Runs the pipeline. Validation problems come back as a failure
    /// envelope; they are caller errors, not exceptions.
    pub async fn run(&self, raw_params: &Value) -> ResponseEnvelope {
        let spec = match self.resolver.resolve(raw_params) {
            Ok(spec) => spec,
            Err(e) => return validation_failure(e),
        };
        let outcome = self
            .fetcher
            .fetch_all(&spec.naics_codes, &spec, &self.api_key)
            .await;
        self.conclude(&spec, outcome)
    }

    /// Like [`run`](Self::run), with a cancellation flag checked between
    /// per-code fetches. Results collected before cancellation still flow
    /// through dedup and into the envelope.
    pub async fn run_with_cancel(
        &self,
        raw_params: &Value,
        cancel: &AtomicBool,
    ) -> ResponseEnvelope {
        let spec = match self.resolver.resolve(raw_params) {
            Ok(spec) => spec,
            Err(e) => return validation_failure(e),
        };
        let outcome = self
            .fetcher
            .fetch_all_with_cancel(&spec.naics_codes, &spec, &self.api_key, cancel)
            .await;
        self.conclude(&spec, outcome)
    }

    fn conclude(&self, spec: &ResolvedQuerySpec, outcome: FetchOutcome) -> ResponseEnvelope {
        let merged = dedup::merge(&outcome.results);
        let metrics = FetchMetrics::from_parts(&outcome.performance, &merged);
        let warnings = perf::analyze_performance(&metrics);
        perf::log(&metrics);
        for reason in &warnings {
            perf::log_warning(&metrics, reason);
        }

        let mut metadata = spec.metadata.clone();
        metadata.insert("naicsQueried".to_string(), json!(merged.codes_queried));
        metadata.insert("naicsSucceeded".to_string(), json!(merged.codes_succeeded));
        metadata.insert("naicsFailed".to_string(), json!(merged.codes_failed));
        metadata.insert("performance".to_string(), json!(perf::summary(&metrics)));
        if outcome.cancelled {
            metadata.insert("cancelled".to_string(), json!(true));
        }
        response::add_deduplication_stats(&mut metadata, &merged.stats());
        response::add_warnings(&mut metadata, &warnings);

        // The fixed 500-record upstream page size is independent of the
        // caller's display limit; the truncation happens here.
        let display: Vec<Opportunity> = merged
            .opportunities
            .iter()
            .take(spec.limit)
            .cloned()
            .collect();

        let errors = response::extract_errors(&outcome.results);
        let envelope = ResponseEnvelope::build(display, metadata, errors);

        let summary = outcome.summary();
        self.state.save(
            &Value::Object(spec.metadata.clone()),
            &json!(summary),
            &outcome.failed_codes(),
        );
        envelope
    }
}

fn validation_failure(e: ValidationError) -> ResponseEnvelope {
    tracing::warn!("Parameter validation failed: {}", e);
    ResponseEnvelope::failure(&e.to_string(), Map::new(), Vec::new())
}
