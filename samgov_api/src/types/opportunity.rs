//! Normalized opportunity records and the raw wire shape they come from.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opportunity record exactly as the API returns it. Every field is
/// optional; upstream omits fields freely depending on notice type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOpportunity {
    pub notice_id: Option<String>,
    pub solicitation_number: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub notice_type: Option<String>,
    pub posted_date: Option<String>,
    #[serde(rename = "responseDeadLine")]
    pub response_dead_line: Option<String>,
    pub naics_code: Option<String>,
    pub classification_code: Option<String>,
    pub full_parent_path_name: Option<String>,
    pub department: Option<String>,
    pub sub_tier: Option<String>,
    pub office: Option<String>,
    pub type_of_set_aside_description: Option<String>,
    pub type_of_set_aside: Option<String>,
    pub ui_link: Option<String>,
    pub last_modified_date: Option<String>,
    /// Either a structured object with `state.code` or a free-text
    /// "City, ST" string, depending on record age.
    pub place_of_performance: Option<Value>,
}

/// A normalized opportunity. Created once per raw record and never mutated
/// afterwards, except for the `source_code` tag injected during merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    /// Identity key for deduplication. Nullable; records without one are
    /// never deduplicated.
    pub notice_id: Option<String>,
    pub solicitation_number: Option<String>,
    pub title: String,
    pub notice_type: String,
    /// `YYYY-MM-DD` or null.
    pub posted_date: Option<String>,
    /// `YYYY-MM-DD` or null.
    pub response_deadline: Option<String>,
    pub naics_code: Option<String>,
    pub psc_code: Option<String>,
    pub state_code: Option<String>,
    pub agency_name: Option<String>,
    pub set_aside_type: Option<String>,
    pub sam_url: Option<String>,
    /// Raw passthrough, used only as the dedup tie-breaker.
    pub last_modified_date: Option<String>,
    /// The classification code whose query produced the kept copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_code: Option<String>,
}

impl Opportunity {
    /// Normalizes a raw API record: defaults for missing title/notice type,
    /// dates to `YYYY-MM-DD`, agency name by candidate-field priority, and
    /// state from either the structured field or "City, ST" text.
    pub fn from_raw(raw: RawOpportunity) -> Self {
        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let notice_type = raw
            .notice_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string());
        let agency_name = [
            raw.full_parent_path_name,
            raw.department,
            raw.sub_tier,
            raw.office,
        ]
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty());
        let set_aside_type = raw
            .type_of_set_aside_description
            .filter(|v| !v.trim().is_empty())
            .or(raw.type_of_set_aside)
            .filter(|v| !v.trim().is_empty());

        Self {
            notice_id: raw.notice_id,
            solicitation_number: raw.solicitation_number,
            title,
            notice_type,
            posted_date: normalize_date(raw.posted_date.as_deref()),
            response_deadline: normalize_date(raw.response_dead_line.as_deref()),
            naics_code: raw.naics_code,
            psc_code: raw.classification_code,
            state_code: extract_state(raw.place_of_performance.as_ref()),
            agency_name,
            set_aside_type,
            sam_url: raw.ui_link,
            last_modified_date: raw.last_modified_date,
            source_code: None,
        }
    }
}

/// Normalizes the handful of date shapes the API emits to `YYYY-MM-DD`.
/// Unparseable input becomes `None` rather than passing through.
fn normalize_date(input: Option<&str>) -> Option<String> {
    let raw = input?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date().format("%Y-%m-%d").to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%m/%d/%Y") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    None
}

/// Pulls a two-letter state code out of the place-of-performance field,
/// which is either `{"state": {"code": "CO"}}` or a "Denver, CO" string.
fn extract_state(pop: Option<&Value>) -> Option<String> {
    match pop? {
        Value::Object(map) => map
            .get("state")
            .and_then(|s| s.get("code"))
            .and_then(|c| c.as_str())
            .map(str::trim)
            .filter(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
            .map(str::to_uppercase),
        Value::String(text) => {
            let tail = text.rsplit(',').next()?.trim();
            if tail.len() == 2 && tail.chars().all(|ch| ch.is_ascii_alphabetic()) {
                Some(tail.to_uppercase())
            } else {
                None
            }
        }
        _ => None,
    }
}
