//! Parameter resolution: a loosely-typed JSON parameter bag becomes a
//! typed, immutable query spec, or a [`ValidationError`] naming exactly
//! what was wrong.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use samgov_api::SearchQuery;

use crate::codes::{
    notice_type_code, CodeSource, CodeType, DEFAULT_NAICS_CODES, DEFAULT_NOTICE_TYPE_LABELS,
    DEFAULT_PSC_CODES, FALLBACK_NOTICE_TYPE_CODES,
};
use crate::error::ValidationError;

/// Wire format for posted-date bounds.
const WIRE_DATE_FORMAT: &str = "%m/%d/%Y";

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;
const MAX_DAYS_BACK: i64 = 365;

/// Resolver tuning. The defaults here are deployment configuration, not
/// caller input, so they are injected rather than read from globals.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Default place-of-performance state when the caller says nothing.
    pub default_state: Option<String>,
    /// Fallback NAICS codes when the code store has none.
    pub default_naics: Vec<String>,
    /// Fallback PSC codes when the code store has none.
    pub default_psc: Vec<String>,
    /// Posted-date window applied when neither `days_back` nor explicit
    /// dates are supplied.
    pub default_days_back: i64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_state: Some("CO".to_string()),
            default_naics: DEFAULT_NAICS_CODES.iter().map(|s| s.to_string()).collect(),
            default_psc: DEFAULT_PSC_CODES.iter().map(|s| s.to_string()).collect(),
            default_days_back: 30,
        }
    }
}

/// Fully-resolved query parameters. Immutable once produced; resolution is
/// pure and deterministic given identical input and clock.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuerySpec {
    /// Primary classification codes (6-digit NAICS), never empty.
    pub naics_codes: Vec<String>,
    /// Secondary classification codes (PSC), possibly empty.
    pub psc_codes: Vec<String>,
    pub notice_type_labels: Vec<String>,
    /// Single-letter wire codes mapped from the labels.
    pub notice_type_codes: Vec<String>,
    /// Two-letter uppercased state, or `None` for nationwide.
    pub state: Option<String>,
    /// `MM/DD/YYYY`.
    pub posted_from: String,
    /// `MM/DD/YYYY`.
    pub posted_to: String,
    pub limit: usize,
    pub keywords: Option<String>,
    pub bypass_cache: bool,
    /// Human-readable echo of the above for responses and debugging.
    pub metadata: Map<String, Value>,
}

impl ResolvedQuerySpec {
    /// The per-code search parameters sent upstream.
    pub fn to_search_query(&self) -> SearchQuery {
        SearchQuery {
            posted_from: self.posted_from.clone(),
            posted_to: self.posted_to.clone(),
            notice_type_codes: self.notice_type_codes.clone(),
            state: self.state.clone(),
        }
    }

    /// Canonical serialization of the parameters that shape a single
    /// code's upstream call. `limit` and `bypass_cache` are deliberately
    /// excluded so they never fragment the cache; the code lists are
    /// excluded because each cache entry is already keyed by its own code.
    pub(crate) fn cache_key_params(&self) -> String {
        format!(
            "from{}:to{}:pt[{}]:st{}:kw{}",
            self.posted_from,
            self.posted_to,
            self.notice_type_codes.join(","),
            self.state.as_deref().unwrap_or("-"),
            self.keywords.as_deref().unwrap_or("-"),
        )
    }
}

/// Turns raw caller parameters into a [`ResolvedQuerySpec`].
pub struct ParameterResolver {
    code_source: Arc<dyn CodeSource>,
    config: ResolverConfig,
}

impl ParameterResolver {
    pub fn new(code_source: Arc<dyn CodeSource>) -> Self {
        Self {
            code_source,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Resolves against the current date.
    pub fn resolve(&self, params: &Value) -> Result<ResolvedQuerySpec, ValidationError> {
        self.resolve_at(params, Utc::now().date_naive())
    }

    /// Resolves with an explicit "today", keeping date arithmetic
    /// deterministic under test.
    pub fn resolve_at(
        &self,
        params: &Value,
        today: NaiveDate,
    ) -> Result<ResolvedQuerySpec, ValidationError> {
        let map = match params {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            _ => return Err(ValidationError::ParamsNotObject),
        };

        let naics_codes = self.resolve_naics(&map)?;
        let psc_codes = self.resolve_psc(&map)?;
        let (notice_type_labels, notice_type_codes) = resolve_notice_types(&map)?;
        let state = self.resolve_state(&map)?;
        let (posted_from, posted_to) = self.resolve_date_range(&map, today)?;
        let limit = resolve_limit(&map)?;
        let keywords = map
            .get("keywords")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let bypass_cache = map
            .get("bypass_cache")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut metadata = Map::new();
        metadata.insert(
            "dateRange".to_string(),
            json!(format!("{} - {}", posted_from, posted_to)),
        );
        metadata.insert("naicsCodes".to_string(), json!(naics_codes));
        metadata.insert("pscCodes".to_string(), json!(psc_codes));
        metadata.insert(
            "state".to_string(),
            json!(state.as_deref().unwrap_or("nationwide")),
        );
        metadata.insert("noticeTypes".to_string(), json!(notice_type_labels));
        metadata.insert("keywords".to_string(), json!(keywords));

        Ok(ResolvedQuerySpec {
            naics_codes,
            psc_codes,
            notice_type_labels,
            notice_type_codes,
            state,
            posted_from,
            posted_to,
            limit,
            keywords,
            bypass_cache,
            metadata,
        })
    }

    fn resolve_naics(&self, map: &Map<String, Value>) -> Result<Vec<String>, ValidationError> {
        if let Some(value) = map.get("naics_override") {
            let codes = parse_override(value, "naics_override")?;
            for code in &codes {
                if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
                    return Err(ValidationError::InvalidNaicsCode { code: code.clone() });
                }
            }
            return Ok(codes);
        }
        let stored = self.code_source.enabled_codes(CodeType::Naics);
        let codes = if stored.is_empty() {
            self.config.default_naics.clone()
        } else {
            stored
        };
        if codes.is_empty() {
            return Err(ValidationError::NoCodesAvailable);
        }
        Ok(codes)
    }

    fn resolve_psc(&self, map: &Map<String, Value>) -> Result<Vec<String>, ValidationError> {
        if let Some(value) = map.get("psc_override") {
            return parse_override(value, "psc_override");
        }
        let stored = self.code_source.enabled_codes(CodeType::Psc);
        if stored.is_empty() {
            Ok(self.config.default_psc.clone())
        } else {
            Ok(stored)
        }
    }

    fn resolve_state(&self, map: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
        let Some(value) = map.get("state") else {
            return Ok(self.config.default_state.clone());
        };
        // An explicit null or empty string means nationwide.
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
                    Ok(Some(trimmed.to_uppercase()))
                } else {
                    Err(ValidationError::InvalidState {
                        value: trimmed.to_string(),
                    })
                }
            }
            other => Err(ValidationError::InvalidState {
                value: other.to_string(),
            }),
        }
    }

    fn resolve_date_range(
        &self,
        map: &Map<String, Value>,
        today: NaiveDate,
    ) -> Result<(String, String), ValidationError> {
        if let Some(value) = map.get("days_back") {
            let days = value
                .as_i64()
                .ok_or_else(|| ValidationError::InvalidDaysBack {
                    value: value.to_string(),
                })?;
            if !(1..=MAX_DAYS_BACK).contains(&days) {
                return Err(ValidationError::InvalidDaysBack {
                    value: days.to_string(),
                });
            }
            let from = today - Duration::days(days);
            return Ok((to_wire_date(from), to_wire_date(today)));
        }

        if map.contains_key("posted_from") || map.contains_key("posted_to") {
            let from = match map.get("posted_from") {
                Some(value) => parse_date(value)?,
                None => today - Duration::days(self.config.default_days_back),
            };
            let to = match map.get("posted_to") {
                Some(value) => parse_date(value)?,
                None => today,
            };
            return Ok((to_wire_date(from), to_wire_date(to)));
        }

        let from = today - Duration::days(self.config.default_days_back);
        Ok((to_wire_date(from), to_wire_date(today)))
    }
}

fn parse_override(value: &Value, param: &'static str) -> Result<Vec<String>, ValidationError> {
    let Some(entries) = value.as_array() else {
        return Err(ValidationError::OverrideNotArray { param });
    };
    if entries.is_empty() {
        return Err(ValidationError::OverrideNotArray { param });
    }
    let mut codes = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(code) = entry.as_str() else {
            return Err(ValidationError::CodeNotString { param });
        };
        codes.push(code.to_string());
    }
    Ok(codes)
}

fn resolve_notice_types(
    map: &Map<String, Value>,
) -> Result<(Vec<String>, Vec<String>), ValidationError> {
    let labels: Vec<String> = match map.get("notice_types") {
        None => DEFAULT_NOTICE_TYPE_LABELS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        Some(value) => {
            let Some(entries) = value.as_array() else {
                return Err(ValidationError::NoticeTypesNotArray);
            };
            let mut labels = Vec::with_capacity(entries.len());
            for entry in entries {
                let Some(label) = entry.as_str() else {
                    return Err(ValidationError::NoticeTypesNotArray);
                };
                labels.push(label.to_string());
            }
            labels
        }
    };

    // Unmapped labels are dropped; an empty mapped set falls back to the
    // fixed default codeset.
    let mut codes: Vec<String> = labels
        .iter()
        .filter_map(|label| notice_type_code(label))
        .map(str::to_string)
        .collect();
    if codes.is_empty() {
        codes = FALLBACK_NOTICE_TYPE_CODES
            .iter()
            .map(|s| s.to_string())
            .collect();
    }
    Ok((labels, codes))
}

fn resolve_limit(map: &Map<String, Value>) -> Result<usize, ValidationError> {
    let Some(value) = map.get("limit") else {
        return Ok(DEFAULT_LIMIT);
    };
    let limit = value.as_i64().ok_or_else(|| ValidationError::InvalidLimit {
        value: value.to_string(),
    })?;
    if !(1..=MAX_LIMIT as i64).contains(&limit) {
        return Err(ValidationError::InvalidLimit {
            value: limit.to_string(),
        });
    }
    Ok(limit as usize)
}

fn parse_date(value: &Value) -> Result<NaiveDate, ValidationError> {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let Some(raw) = value.as_str() else {
        return Err(ValidationError::InvalidDate { value: rendered });
    };
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.date_naive());
    }
    NaiveDate::parse_from_str(raw, WIRE_DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate { value: rendered })
}

fn to_wire_date(date: NaiveDate) -> String {
    date.format(WIRE_DATE_FORMAT).to_string()
}
