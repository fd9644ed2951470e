//! Per-code fetch outcomes and the raw search response wire shape.

use serde::{Deserialize, Serialize};

use super::opportunity::{Opportunity, RawOpportunity};

/// Category of a failed fetch, preserved alongside the HTTP status so
/// callers can branch programmatically without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Authentication,
    EndpointNotFound,
    ServerError,
    ClientError,
    NetworkError,
    DataError,
}

impl ErrorKind {
    /// Maps a non-success HTTP status to its failure category.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::Authentication,
            404 => Self::EndpointNotFound,
            500..=599 => Self::ServerError,
            _ => Self::ClientError,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimit => "rate_limit",
            Self::Authentication => "authentication",
            Self::EndpointNotFound => "endpoint_not_found",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::NetworkError => "network_error",
            Self::DataError => "data_error",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one classification-code query, successful or not.
///
/// Serializable so it can be cached whole and read back; the cache layer
/// forces `cached` to true on hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResult {
    pub success: bool,
    /// The classification code this result answers for.
    pub code: String,
    #[serde(default)]
    pub opportunities: Vec<Opportunity>,
    pub count: usize,
    /// Total matching records reported by the API, which may exceed the
    /// returned page.
    pub total_records: i64,
    #[serde(default)]
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(rename = "errorType", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FetchResult {
    /// A successful fetch, fresh from the network.
    pub fn succeeded(code: &str, opportunities: Vec<Opportunity>, total_records: i64) -> Self {
        Self {
            success: true,
            code: code.to_string(),
            count: opportunities.len(),
            total_records,
            opportunities,
            cached: false,
            error: None,
            status_code: None,
            error_kind: None,
        }
    }

    /// A failed fetch with its category, message, and HTTP status if any.
    pub fn failed(
        code: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            success: false,
            code: code.to_string(),
            opportunities: Vec::new(),
            count: 0,
            total_records: 0,
            cached: false,
            error: Some(message.into()),
            status_code,
            error_kind: Some(kind),
        }
    }
}

/// Wire shape of a search response. A missing `opportunitiesData` field is
/// an empty page, not an error.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub total_records: Option<i64>,
    pub opportunities_data: Option<Vec<RawOpportunity>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_from_status() {
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimit);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Authentication);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Authentication);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::EndpointNotFound);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(400), ErrorKind::ClientError);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::RateLimit).unwrap(),
            "\"rate_limit\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::EndpointNotFound).unwrap(),
            "\"endpoint_not_found\""
        );
        assert_eq!(ErrorKind::DataError.to_string(), "data_error");
    }

    #[test]
    fn fetch_result_round_trips_through_json() {
        let result = FetchResult::failed("541330", ErrorKind::Authentication, "denied", Some(401));
        let json = serde_json::to_string(&result).unwrap();
        let back: FetchResult = serde_json::from_str(&json).unwrap();
        assert!(!back.success);
        assert_eq!(back.code, "541330");
        assert_eq!(back.status_code, Some(401));
        assert_eq!(back.error_kind, Some(ErrorKind::Authentication));
    }

    #[test]
    fn error_type_field_name_on_the_wire() {
        let result = FetchResult::failed("236220", ErrorKind::RateLimit, "slow down", Some(429));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errorType"], "rate_limit");
        assert_eq!(json["statusCode"], 429);
    }
}
