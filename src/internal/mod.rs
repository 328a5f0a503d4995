//! # Internal API Module
//!
//! Undocumented endpoints of the Spotify backend that the web player uses
//! for track credits and synced lyrics.
//!
//! ## Access
//!
//! The endpoints only answer requests that look like they come from a web
//! player session. The request headers of such a session are captured once
//! (browser developer tools, "copy request headers" as JSON) and handed to a
//! [`crate::management::HeaderManager`]. Whenever the backend answers 401 the
//! workers pause until the capture file has been replaced.
//!
//! ## Output
//!
//! Every response becomes one [`ResponseRecord`] line. Usable responses go to
//! `<resource>.jsonl`, everything else to `<resource>_errors.jsonl` next to
//! it. Both files are read again on the next run: IDs with a response are
//! skipped, and so are IDs whose logged error was a 403 or 404.
//!
//! [`ResponseRecord`]: crate::types::ResponseRecord

mod credits;
mod fetch;
mod market;
mod record;

use std::collections::BTreeMap;

use clap::ValueEnum;

pub use credits::CreditTables;
pub use credits::credit_rows;
pub use credits::process_credits;
pub use fetch::FetchOptions;
pub use fetch::FetchSummary;
pub use fetch::InternalFetcher;
pub use fetch::InternalSink;
pub use fetch::fetch_resource;
pub use market::current_market;
pub use market::ids_for_market;

use crate::types::ResponseRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resource {
    Credits,
    Lyrics,
}

impl Resource {
    pub fn name(&self) -> &'static str {
        match self {
            Resource::Credits => "credits",
            Resource::Lyrics => "lyrics",
        }
    }

    /// Endpoint for `track_id` below `api_url` (usually
    /// [`crate::config::internal_apiurl`]).
    pub fn url(&self, api_url: &str, track_id: &str) -> String {
        let base = api_url;
        match self {
            Resource::Credits => format!(
                "{}/track-credits-view/v0/experimental/{}/credits",
                base, track_id
            ),
            Resource::Lyrics => format!("{}/color-lyrics/v2/track/{}", base, track_id),
        }
    }

    /// Lyrics are only served to logged-in sessions.
    pub fn requires_login(&self) -> bool {
        matches!(self, Resource::Lyrics)
    }

    pub fn default_parallelism(&self) -> usize {
        match self {
            Resource::Credits => 100,
            Resource::Lyrics => 50,
        }
    }
}

/// Number of records per status code.
pub fn status_counts(records: &[ResponseRecord]) -> BTreeMap<u16, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.status_code).or_insert(0) += 1;
    }
    counts
}
