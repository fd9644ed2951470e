//! The `fetch` subcommand: runs one multi-code opportunity fetch.

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Args;
use serde_json::{json, Map, Value};

use samgov_lib::codes::StaticCodeSource;
use samgov_lib::samgov_api::Client;
use samgov_lib::{
    OpportunitiesCache, OpportunityFetcher, OpportunityService, ParameterResolver,
    StateFileManager,
};

use crate::output::{print_envelope, OutputFormat};

/// Arguments for the `fetch` subcommand. Everything is optional; the
/// resolver's defaults apply to whatever is omitted.
#[derive(Args)]
pub struct FetchArgs {
    /// Override NAICS codes (comma-separated 6-digit codes)
    #[arg(long)]
    pub naics: Option<String>,

    /// Override PSC codes (comma-separated)
    #[arg(long)]
    pub psc: Option<String>,

    /// Fetch opportunities posted in the last N days
    #[arg(long, conflicts_with_all = ["since", "until"])]
    pub days: Option<i64>,

    /// Posted on/after this date (YYYY-MM-DD)
    #[arg(long, conflicts_with = "days")]
    pub since: Option<String>,

    /// Posted on/before this date (YYYY-MM-DD)
    #[arg(long, conflicts_with = "days")]
    pub until: Option<String>,

    /// Place-of-performance state (2-letter code)
    #[arg(long, conflicts_with = "nationwide")]
    pub state: Option<String>,

    /// Search nationwide instead of the configured default state
    #[arg(long)]
    pub nationwide: bool,

    /// Maximum opportunities to return (1-1000)
    #[arg(long)]
    pub limit: Option<i64>,

    /// Keyword filter, echoed into the run metadata
    #[arg(long)]
    pub keywords: Option<String>,

    /// Skip the response cache for this run
    #[arg(long)]
    pub bypass_cache: bool,
}

impl FetchArgs {
    /// Builds the loosely-typed parameter bag the resolver consumes. The
    /// resolver owns validation; this is a straight translation.
    fn to_params(&self) -> Value {
        let mut params = Map::new();
        if let Some(naics) = &self.naics {
            params.insert("naics_override".to_string(), csv_to_array(naics));
        }
        if let Some(psc) = &self.psc {
            params.insert("psc_override".to_string(), csv_to_array(psc));
        }
        if let Some(days) = self.days {
            params.insert("days_back".to_string(), json!(days));
        }
        if let Some(since) = &self.since {
            params.insert("posted_from".to_string(), json!(since));
        }
        if let Some(until) = &self.until {
            params.insert("posted_to".to_string(), json!(until));
        }
        if self.nationwide {
            params.insert("state".to_string(), Value::Null);
        } else if let Some(state) = &self.state {
            params.insert("state".to_string(), json!(state));
        }
        if let Some(limit) = self.limit {
            params.insert("limit".to_string(), json!(limit));
        }
        if let Some(keywords) = &self.keywords {
            params.insert("keywords".to_string(), json!(keywords));
        }
        if self.bypass_cache {
            params.insert("bypass_cache".to_string(), json!(true));
        }
        Value::Object(params)
    }
}

pub async fn run(args: &FetchArgs, state_dir: &str, format: &OutputFormat) -> Result<()> {
    let Ok(api_key) = std::env::var("SAM_API_KEY") else {
        bail!("SAM_API_KEY is not set; get a key at https://sam.gov and export it or add it to .env");
    };

    let resolver = ParameterResolver::new(Arc::new(StaticCodeSource::empty()));
    let fetcher = OpportunityFetcher::new(Client::new(), OpportunitiesCache::in_memory());
    let state = StateFileManager::local(state_dir);
    let service = OpportunityService::new(resolver, fetcher, state, api_key);

    let envelope = service.run(&args.to_params()).await;
    print_envelope(&envelope, format)?;

    if envelope.is_failure() {
        bail!("fetch failed: {}", envelope.error().unwrap_or("unknown error"));
    }
    Ok(())
}

fn csv_to_array(csv: &str) -> Value {
    json!(csv
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>())
}
