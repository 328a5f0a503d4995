use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    config,
    error::ApiError,
    management::TokenManager,
    pool::MAX_RETRY_AFTER,
    types::{Album, Artist, Track},
    utils, warning,
};

const DEFAULT_MAX_ATTEMPTS: u32 = 8;
const GATEWAY_RETRY_WAIT: Duration = Duration::from_secs(10);
const RATE_LIMIT_FALLBACK_WAIT: Duration = Duration::from_secs(5);

/// Result of one batch request. The Web API answers unknown IDs with `null`
/// in place of the object; those IDs end up in `invalid_ids`.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    pub items: Vec<T>,
    pub invalid_ids: Vec<String>,
    pub raw: Value,
}

/// Client for the batch metadata endpoints of the Spotify Web API.
pub struct WebApiClient {
    client: Client,
    tokens: TokenManager,
    base_url: String,
    max_attempts: u32,
}

impl WebApiClient {
    pub async fn new() -> Self {
        Self::with_tokens(TokenManager::load().await, config::spotify_apiurl())
    }

    pub fn with_tokens(tokens: TokenManager, base_url: String) -> Self {
        Self {
            client: Client::new(),
            tokens,
            base_url,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Up to 50 tracks.
    pub async fn several_tracks(&mut self, ids: &[String]) -> Result<Batch<Track>, ApiError> {
        self.several("tracks", ids).await
    }

    /// Up to 20 albums.
    pub async fn several_albums(&mut self, ids: &[String]) -> Result<Batch<Album>, ApiError> {
        self.several("albums", ids).await
    }

    /// Up to 50 artists.
    pub async fn several_artists(&mut self, ids: &[String]) -> Result<Batch<Artist>, ApiError> {
        self.several("artists", ids).await
    }

    async fn several<T: DeserializeOwned>(
        &mut self,
        endpoint: &str,
        ids: &[String],
    ) -> Result<Batch<T>, ApiError> {
        let url = format!(
            "{base}/{endpoint}?ids={ids}",
            base = self.base_url,
            endpoint = endpoint,
            ids = ids.join(",")
        );
        let raw = self.get_json(&url).await?;
        let entries = raw
            .get(endpoint)
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::Malformed(format!("response has no '{}' array", endpoint)))?;

        let mut items = Vec::with_capacity(entries.len());
        let mut invalid_ids = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            if entry.is_null() {
                if let Some(id) = ids.get(i) {
                    invalid_ids.push(id.clone());
                }
                continue;
            }
            let item = serde_json::from_value::<T>(entry.clone())
                .map_err(|e| ApiError::Malformed(e.to_string()))?;
            items.push(item);
        }

        Ok(Batch {
            items,
            invalid_ids,
            raw,
        })
    }

    /// GETs `url` with a valid token.
    ///
    /// 401 drops the cached token and retries, 429 waits for `Retry-After`
    /// (at most two minutes), 502/503 wait ten seconds and other server
    /// errors back off randomly. Gives up after `max_attempts`.
    pub async fn get_json(&mut self, url: &str) -> Result<Value, ApiError> {
        for attempt in 1..=self.max_attempts {
            let token = self.tokens.get_valid_token().await?;
            let res = match self.client.get(url).bearer_auth(&token).send().await {
                Ok(res) => res,
                Err(e) if attempt < self.max_attempts => {
                    warning!("Request to {} failed: {}. Retrying...", url, e);
                    sleep(utils::random_duration(
                        Duration::from_secs(1),
                        Duration::from_secs(5),
                    ))
                    .await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match res.status() {
                StatusCode::OK => return Ok(res.json::<Value>().await?),
                StatusCode::UNAUTHORIZED => {
                    self.tokens.invalidate();
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    let wait = utils::retry_after(res.headers()).unwrap_or(RATE_LIMIT_FALLBACK_WAIT);
                    if wait > MAX_RETRY_AFTER {
                        warning!(
                            "Retry-After has reached an abnormal high of {} seconds. Waiting {} seconds instead.",
                            wait.as_secs(),
                            MAX_RETRY_AFTER.as_secs()
                        );
                    }
                    sleep(wait.min(MAX_RETRY_AFTER)).await;
                }
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => {
                    sleep(GATEWAY_RETRY_WAIT).await;
                }
                status if status.is_server_error() => {
                    sleep(utils::random_duration(
                        Duration::from_secs(1),
                        Duration::from_secs(5),
                    ))
                    .await;
                }
                status => {
                    return Err(ApiError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
            }
        }

        Err(ApiError::Exhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
        })
    }
}
