mod fetch;
mod opportunity;

pub use self::fetch::{ErrorKind, FetchResult, SearchResponse};
pub use self::opportunity::{Opportunity, RawOpportunity};
