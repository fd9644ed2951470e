//! Assembly of the success / partial-success / failure response envelope.
//!
//! Everything here is pure: no I/O, no clock, no logging.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use samgov_api::types::{FetchResult, Opportunity};

use crate::dedup::DedupStats;

/// Overall status of a fetch run, derived from per-code outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
    Failure,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::Failure => "failure",
        };
        write!(f, "{}", s)
    }
}

/// `failed == 0` is success, `succeeded == 0` is failure, anything else
/// is partial. Note the order: zero of each resolves to success, so
/// callers deriving from metadata must populate the counts.
pub fn determine_status(succeeded: u64, failed: u64) -> RunStatus {
    if failed == 0 {
        RunStatus::Success
    } else if succeeded == 0 {
        RunStatus::Failure
    } else {
        RunStatus::PartialSuccess
    }
}

/// One normalized error in an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEntry {
    pub fn from_message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            error_type: None,
            details: None,
        }
    }

    /// Normalizes a loose error value: a raw string, a map with a
    /// `message` key, or a map with the legacy `error` alias. An object
    /// with neither becomes "Unknown error".
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(message) => Self::from_message(message.clone()),
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .or_else(|| map.get("error"))
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string();
                Self {
                    message,
                    code: map.get("code").and_then(Value::as_u64).map(|c| c as u16),
                    error_type: map.get("type").and_then(Value::as_str).map(str::to_string),
                    details: map.get("details").cloned(),
                }
            }
            _ => Self::from_message("Unknown error"),
        }
    }
}

/// The envelope handed back to callers. Fields are private; downstream
/// presentation code goes through the accessors, which hand back empty
/// defaults for absent optional sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    status: RunStatus,
    /// Absent entirely on failure, distinguishing "no data" from
    /// "empty data".
    #[serde(skip_serializing_if = "Option::is_none")]
    opportunities: Option<Vec<Opportunity>>,
    metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<ErrorEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ResponseEnvelope {
    /// A fully successful run. Injects `metadata.totalCount`.
    pub fn success(opportunities: Vec<Opportunity>, mut metadata: Map<String, Value>) -> Self {
        metadata.insert("totalCount".to_string(), json!(opportunities.len()));
        Self {
            status: RunStatus::Success,
            opportunities: Some(opportunities),
            metadata,
            errors: None,
            error: None,
        }
    }

    /// A run where some codes failed but usable data remains. Injects
    /// `metadata.totalCount` and `metadata.errorsCount`.
    pub fn partial_success(
        opportunities: Vec<Opportunity>,
        mut metadata: Map<String, Value>,
        errors: Vec<ErrorEntry>,
    ) -> Self {
        metadata.insert("totalCount".to_string(), json!(opportunities.len()));
        metadata.insert("errorsCount".to_string(), json!(errors.len()));
        Self {
            status: RunStatus::PartialSuccess,
            opportunities: Some(opportunities),
            metadata,
            errors: Some(errors),
            error: None,
        }
    }

    /// A run that produced nothing. The primary message is surfaced both
    /// as the top-level `error` and as the first entry of `errors`.
    pub fn failure(
        primary_message: &str,
        metadata: Map<String, Value>,
        extra_errors: Vec<ErrorEntry>,
    ) -> Self {
        let mut errors = vec![ErrorEntry::from_message(primary_message)];
        errors.extend(extra_errors);
        Self {
            status: RunStatus::Failure,
            opportunities: None,
            metadata,
            errors: Some(errors),
            error: Some(primary_message.to_string()),
        }
    }

    /// Auto-selects a constructor from `metadata.naicsSucceeded` and
    /// `metadata.naicsFailed`, both read with 0 defaults. Absent counts
    /// therefore resolve to success.
    pub fn build(
        opportunities: Vec<Opportunity>,
        metadata: Map<String, Value>,
        errors: Vec<ErrorEntry>,
    ) -> Self {
        let succeeded = metadata
            .get("naicsSucceeded")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let failed = metadata
            .get("naicsFailed")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        match determine_status(succeeded, failed) {
            RunStatus::Success => Self::success(opportunities, metadata),
            RunStatus::PartialSuccess => Self::partial_success(opportunities, metadata, errors),
            RunStatus::Failure => {
                let (primary, rest) = match errors.split_first() {
                    Some((first, rest)) => (first.message.clone(), rest.to_vec()),
                    None => (
                        "All classification code queries failed".to_string(),
                        Vec::new(),
                    ),
                };
                Self::failure(&primary, metadata, rest)
            }
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn is_partial_success(&self) -> bool {
        self.status == RunStatus::PartialSuccess
    }

    pub fn is_failure(&self) -> bool {
        self.status == RunStatus::Failure
    }

    /// Opportunities, or an empty slice when the envelope carries none.
    pub fn opportunities(&self) -> &[Opportunity] {
        self.opportunities.as_deref().unwrap_or_default()
    }

    /// Whether an `opportunities` section is present at all. A failure
    /// envelope has none; an empty success has an empty one.
    pub fn has_opportunities_section(&self) -> bool {
        self.opportunities.is_some()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Errors, or an empty slice when the envelope carries none.
    pub fn errors(&self) -> &[ErrorEntry] {
        self.errors.as_deref().unwrap_or_default()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Derives the `errors` list straight from per-code failures.
pub fn extract_errors(fetch_results: &[FetchResult]) -> Vec<ErrorEntry> {
    fetch_results
        .iter()
        .filter(|r| !r.success)
        .map(|r| ErrorEntry {
            message: r
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
            code: r.status_code,
            error_type: r.error_kind.map(|k| k.to_string()),
            details: Some(json!({ "naicsCode": r.code })),
        })
        .collect()
}

/// Adds analyzer warnings to the metadata. No-op when there are none.
pub fn add_warnings(metadata: &mut Map<String, Value>, warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    metadata.insert("warnings".to_string(), json!(warnings));
}

/// Adds dedup figures to the metadata. No-op when nothing was removed.
pub fn add_deduplication_stats(metadata: &mut Map<String, Value>, stats: &DedupStats) {
    if stats.duplicates_removed == 0 {
        return;
    }
    metadata.insert("deduplication".to_string(), json!(stats));
}
