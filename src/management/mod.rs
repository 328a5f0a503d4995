mod auth;
mod headers;
mod state;

pub use auth::ClientCredentials;
pub use auth::TokenManager;
pub use headers::HeaderManager;
pub use headers::parse_headers;
pub use state::PERMANENT_STATUSES;
pub use state::StateManager;
pub use state::already_downloaded;
pub use state::error_ids_to_skip;
pub use state::existing_track_ids;
pub use state::read_jsonl;
pub use state::remove_incomplete_downloads;
