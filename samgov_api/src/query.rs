//! Query construction for the opportunity search endpoint.

use url::Url;

/// Parameters for one opportunity search, shared by every classification
/// code in a run. Dates are already in the `MM/DD/YYYY` wire format.
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    /// Start of the posted-date window (`MM/DD/YYYY`).
    pub posted_from: String,
    /// End of the posted-date window (`MM/DD/YYYY`).
    pub posted_to: String,
    /// Single-letter notice-type codes, comma-joined on the wire.
    pub notice_type_codes: Vec<String>,
    /// Optional two-letter place-of-performance state filter.
    pub state: Option<String>,
}

impl SearchQuery {
    /// Appends the search parameters to the given URL, returning the
    /// modified URL. The classification code, API key, and page size are
    /// appended by the client since they vary per call.
    pub fn add_to_url(&self, url: &Url) -> Url {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("postedFrom", &self.posted_from);
        url.query_pairs_mut()
            .append_pair("postedTo", &self.posted_to);
        if !self.notice_type_codes.is_empty() {
            url.query_pairs_mut()
                .append_pair("ptype", &self.notice_type_codes.join(","));
        }
        if let Some(state) = &self.state {
            url.query_pairs_mut().append_pair("state", state.as_str());
        }
        url
    }
}
