use std::{collections::HashSet, path::Path};

use reqwest::Client;
use serde::Deserialize;

use crate::{
    config,
    error::{ApiError, StateError},
    output,
};

#[derive(Deserialize)]
struct IpInfo {
    country: Option<String>,
}

/// Country of the public IP address this process connects from.
///
/// Lyrics are only served for tracks available in the market of the
/// requesting session, which follows the IP address.
pub async fn current_market() -> Result<String, ApiError> {
    let url = format!("{}/json", config::ipinfo_url());
    let res = Client::new().get(&url).send().await?;
    if !res.status().is_success() {
        return Err(ApiError::Status {
            status: res.status().as_u16(),
            url,
        });
    }

    res.json::<IpInfo>()
        .await?
        .country
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Malformed("ipinfo response has no country".to_string()))
}

/// Track IDs listed for `market` in a `track_id,market` CSV or Parquet file.
pub fn ids_for_market(path: &Path, market: &str) -> Result<HashSet<String>, StateError> {
    Ok(output::read_rows(path, &["track_id", "market"])?
        .into_iter()
        .filter(|row| row[1].eq_ignore_ascii_case(market))
        .map(|mut row| row.swap_remove(0))
        .collect())
}
