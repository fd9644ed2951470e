//! Rendering of envelopes and snapshots as tables or JSON.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use samgov_lib::state::AnnotatedSnapshot;
use samgov_lib::types::Opportunity;
use samgov_lib::ResponseEnvelope;

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Tabled)]
struct OpportunityRow {
    #[tabled(rename = "Posted")]
    posted: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Type")]
    notice_type: String,
    #[tabled(rename = "NAICS")]
    naics: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Agency")]
    agency: String,
    #[tabled(rename = "Deadline")]
    deadline: String,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "File")]
    filename: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Size")]
    size: u64,
    #[tabled(rename = "Failed Codes")]
    failed_codes: String,
}

fn dash(value: Option<&str>) -> String {
    value.filter(|s| !s.is_empty()).unwrap_or("-").to_string()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(1)).collect();
        format!("{}\u{2026}", cut)
    }
}

fn build_rows(opportunities: &[Opportunity]) -> Vec<OpportunityRow> {
    opportunities
        .iter()
        .map(|o| OpportunityRow {
            posted: dash(o.posted_date.as_deref()),
            title: truncate(&o.title, 48),
            notice_type: o.notice_type.clone(),
            naics: dash(o.naics_code.as_deref()),
            state: dash(o.state_code.as_deref()),
            agency: truncate(&dash(o.agency_name.as_deref()), 32),
            deadline: dash(o.response_deadline.as_deref()),
        })
        .collect()
}

/// Prints a whole envelope in the chosen format. The JSON form is the
/// envelope verbatim; the table form adds a status/summary footer.
pub fn print_envelope(envelope: &ResponseEnvelope, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(envelope)?);
        }
        OutputFormat::Table => {
            let opportunities = envelope.opportunities();
            if opportunities.is_empty() {
                println!("No opportunities returned.");
            } else {
                let mut table = Table::new(build_rows(opportunities));
                table.with(Style::sharp());
                println!("{}", table);
            }
            println!("Status: {}", envelope.status());
            if let Some(total) = envelope.metadata().get("totalCount") {
                println!("Total:  {}", total);
            }
            for error in envelope.errors() {
                match error.code {
                    Some(code) => println!("Error ({}): {}", code, error.message),
                    None => println!("Error: {}", error.message),
                }
            }
        }
    }
    Ok(())
}

pub fn print_json_value(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_snapshot_list(snapshots: &[AnnotatedSnapshot]) {
    let rows: Vec<SnapshotRow> = snapshots
        .iter()
        .map(|s| SnapshotRow {
            filename: s.filename.clone(),
            modified: format_time(&s.modified),
            size: s.size,
            failed_codes: if s.snapshot.failed_codes.is_empty() {
                "-".to_string()
            } else {
                s.snapshot.failed_codes.join(", ")
            },
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::sharp());
    println!("{}", table);
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}
