//! Validation errors for the parameter resolver.

/// A caller-input problem found during parameter resolution. One variant
/// per failure cause so callers and tests can branch on what went wrong
/// instead of parsing messages.
///
/// These are always programming or configuration errors and are never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("query parameters must be a JSON object")]
    ParamsNotObject,
    #[error("{param} must be a non-empty array")]
    OverrideNotArray { param: &'static str },
    #[error("{param} entries must be strings")]
    CodeNotString { param: &'static str },
    #[error("invalid NAICS code '{code}': expected exactly 6 digits")]
    InvalidNaicsCode { code: String },
    #[error("No codes available")]
    NoCodesAvailable,
    #[error("notice_types must be an array of strings")]
    NoticeTypesNotArray,
    #[error("invalid state code '{value}': expected 2 letters")]
    InvalidState { value: String },
    #[error("invalid date '{value}': expected YYYY-MM-DD or MM/DD/YYYY")]
    InvalidDate { value: String },
    #[error("days_back must be an integer between 1 and 365, got {value}")]
    InvalidDaysBack { value: String },
    #[error("limit must be an integer between 1 and 1000, got {value}")]
    InvalidLimit { value: String },
}
