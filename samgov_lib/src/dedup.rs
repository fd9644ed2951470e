//! Merging per-code result sets into one deduplicated opportunity list.

use std::collections::HashMap;

use serde::Serialize;

use samgov_api::types::{FetchResult, Opportunity};

use crate::perf::format_percent;

/// Duplicate share beyond which a run gets a structured warning.
const HIGH_DUPLICATE_RATE: f64 = 0.20;

/// The merged, deduplicated output of a multi-code run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedResult {
    /// Survivors, densely indexed, ordered by first-seen position.
    pub opportunities: Vec<Opportunity>,
    pub count_before_dedup: usize,
    pub total_after_dedup: usize,
    pub duplicates_removed: usize,
    pub codes_queried: usize,
    pub codes_succeeded: usize,
    pub codes_failed: usize,
}

/// Percentage view of a merge, for logging and telemetry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupStats {
    pub count_before_dedup: usize,
    pub total_after_dedup: usize,
    pub duplicates_removed: usize,
    pub deduplication_rate: String,
    pub codes_queried: usize,
    pub codes_succeeded: usize,
    pub codes_failed: usize,
}

impl MergedResult {
    pub fn stats(&self) -> DedupStats {
        let rate = if self.count_before_dedup == 0 {
            0.0
        } else {
            self.duplicates_removed as f64 * 100.0 / self.count_before_dedup as f64
        };
        DedupStats {
            count_before_dedup: self.count_before_dedup,
            total_after_dedup: self.total_after_dedup,
            duplicates_removed: self.duplicates_removed,
            deduplication_rate: format_percent(rate),
            codes_queried: self.codes_queried,
            codes_succeeded: self.codes_succeeded,
            codes_failed: self.codes_failed,
        }
    }
}

/// Merges per-code results into one deduplicated set.
///
/// Only successful results contribute opportunities; failures count
/// toward `codes_failed` only. Identity is `notice_id`: records with a
/// missing or empty one are kept verbatim, every time, since a missing
/// identity must not cause silent data loss. Among records sharing an id
/// the greatest `last_modified_date` wins (string compare, the format is
/// fixed); a record with a date beats one without; otherwise the first
/// seen stays. The survivor keeps the first-seen slot and carries its own
/// `source_code`.
pub fn merge(fetch_results: &[FetchResult]) -> MergedResult {
    let mut kept: Vec<Opportunity> = Vec::new();
    let mut slot_by_id: HashMap<String, usize> = HashMap::new();
    let mut count_before = 0usize;
    let mut codes_succeeded = 0usize;
    let mut codes_failed = 0usize;

    for result in fetch_results {
        if !result.success {
            codes_failed += 1;
            continue;
        }
        codes_succeeded += 1;
        for opportunity in &result.opportunities {
            count_before += 1;
            let mut tagged = opportunity.clone();
            tagged.source_code = Some(result.code.clone());

            let id = tagged
                .notice_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            match id {
                None => kept.push(tagged),
                Some(id) => match slot_by_id.get(&id) {
                    None => {
                        slot_by_id.insert(id, kept.len());
                        kept.push(tagged);
                    }
                    Some(&slot) => {
                        if supersedes(&tagged, &kept[slot]) {
                            kept[slot] = tagged;
                        }
                    }
                },
            }
        }
    }

    let total_after = kept.len();
    let duplicates_removed = count_before - total_after;
    if count_before > 0 {
        let rate = duplicates_removed as f64 / count_before as f64;
        if rate > HIGH_DUPLICATE_RATE {
            tracing::warn!(
                duplicates_removed,
                count_before,
                rate = format_percent(rate * 100.0).as_str(),
                "High duplicate rate across classification code queries; codes may overlap too much, consider narrowing"
            );
        }
    }

    MergedResult {
        opportunities: kept,
        count_before_dedup: count_before,
        total_after_dedup: total_after,
        duplicates_removed,
        codes_queried: fetch_results.len(),
        codes_succeeded,
        codes_failed,
    }
}

/// Whether `candidate` should replace `incumbent` for the same notice id.
fn supersedes(candidate: &Opportunity, incumbent: &Opportunity) -> bool {
    match (&candidate.last_modified_date, &incumbent.last_modified_date) {
        (Some(c), Some(i)) => c > i,
        (Some(_), None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use samgov_api::types::ErrorKind;

    fn opp(notice_id: Option<&str>, last_modified: Option<&str>) -> Opportunity {
        Opportunity {
            notice_id: notice_id.map(str::to_string),
            solicitation_number: None,
            title: "Untitled".to_string(),
            notice_type: "Unknown".to_string(),
            posted_date: None,
            response_deadline: None,
            naics_code: None,
            psc_code: None,
            state_code: None,
            agency_name: None,
            set_aside_type: None,
            sam_url: None,
            last_modified_date: last_modified.map(str::to_string),
            source_code: None,
        }
    }

    fn success(code: &str, opportunities: Vec<Opportunity>) -> FetchResult {
        let total = opportunities.len() as i64;
        FetchResult::succeeded(code, opportunities, total)
    }

    #[test]
    fn newest_last_modified_wins() {
        let results = vec![
            success("111110", vec![opp(Some("n1"), Some("2025-01-10T00:00:00Z"))]),
            success("222220", vec![opp(Some("n1"), Some("2025-01-15T00:00:00Z"))]),
        ];
        let merged = merge(&results);
        assert_eq!(merged.total_after_dedup, 1);
        assert_eq!(merged.duplicates_removed, 1);
        assert_eq!(
            merged.opportunities[0].last_modified_date.as_deref(),
            Some("2025-01-15T00:00:00Z")
        );
        // The survivor carries the code that produced it.
        assert_eq!(merged.opportunities[0].source_code.as_deref(), Some("222220"));
    }

    #[test]
    fn dated_copy_beats_undated_regardless_of_position() {
        let results = vec![
            success("111110", vec![opp(Some("n1"), None)]),
            success("222220", vec![opp(Some("n1"), Some("2025-01-01T00:00:00Z"))]),
        ];
        let merged = merge(&results);
        assert_eq!(merged.opportunities[0].source_code.as_deref(), Some("222220"));

        // And the mirror image: the dated first copy survives.
        let results = vec![
            success("111110", vec![opp(Some("n1"), Some("2025-01-01T00:00:00Z"))]),
            success("222220", vec![opp(Some("n1"), None)]),
        ];
        let merged = merge(&results);
        assert_eq!(merged.opportunities[0].source_code.as_deref(), Some("111110"));
    }

    #[test]
    fn neither_dated_keeps_first_seen() {
        let results = vec![
            success("111110", vec![opp(Some("n1"), None)]),
            success("222220", vec![opp(Some("n1"), None)]),
        ];
        let merged = merge(&results);
        assert_eq!(merged.total_after_dedup, 1);
        assert_eq!(merged.opportunities[0].source_code.as_deref(), Some("111110"));
    }

    #[test]
    fn missing_notice_ids_are_never_deduplicated() {
        let results = vec![
            success("111110", vec![opp(None, None), opp(Some(""), None)]),
            success("222220", vec![opp(None, None)]),
        ];
        let merged = merge(&results);
        assert_eq!(merged.count_before_dedup, 3);
        assert_eq!(merged.total_after_dedup, 3);
        assert_eq!(merged.duplicates_removed, 0);
    }

    #[test]
    fn failed_results_contribute_nothing_but_bookkeeping() {
        let results = vec![
            success("111110", vec![opp(Some("n1"), None)]),
            FetchResult::failed("222220", ErrorKind::Authentication, "denied", Some(401)),
        ];
        let merged = merge(&results);
        assert_eq!(merged.codes_queried, 2);
        assert_eq!(merged.codes_succeeded, 1);
        assert_eq!(merged.codes_failed, 1);
        assert_eq!(merged.total_after_dedup, 1);
    }

    #[test]
    fn survivor_order_is_first_seen() {
        let results = vec![
            success(
                "111110",
                vec![
                    opp(Some("a"), Some("2025-01-01T00:00:00Z")),
                    opp(Some("b"), None),
                ],
            ),
            success(
                "222220",
                vec![
                    opp(Some("c"), None),
                    // Newer copy of "a" replaces it in place, not at the end.
                    opp(Some("a"), Some("2025-02-01T00:00:00Z")),
                ],
            ),
        ];
        let merged = merge(&results);
        let ids: Vec<_> = merged
            .opportunities
            .iter()
            .map(|o| o.notice_id.as_deref().unwrap())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged.opportunities[0].source_code.as_deref(), Some("222220"));
    }

    #[test]
    fn output_never_exceeds_input() {
        let results = vec![
            success("111110", vec![opp(Some("x"), None), opp(Some("y"), None)]),
            success("222220", vec![opp(Some("x"), None), opp(None, None)]),
        ];
        let merged = merge(&results);
        assert!(merged.opportunities.len() <= merged.count_before_dedup);
        assert_eq!(
            merged.duplicates_removed,
            merged.count_before_dedup - merged.total_after_dedup
        );
    }

    #[test]
    fn stats_formats_rates() {
        let results = vec![
            success("111110", vec![opp(Some("x"), None), opp(Some("y"), None)]),
            success(
                "222220",
                vec![opp(Some("x"), Some("2025-01-01T00:00:00Z")), opp(Some("z"), None)],
            ),
        ];
        let stats = merge(&results).stats();
        assert_eq!(stats.count_before_dedup, 4);
        assert_eq!(stats.total_after_dedup, 3);
        assert_eq!(stats.deduplication_rate, "25%");

        let empty = merge(&[]).stats();
        assert_eq!(empty.deduplication_rate, "0%");
    }
}
