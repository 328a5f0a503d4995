use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use reqwest::header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::{sync::RwLock, time::sleep};

use crate::{error::StateError, warning};

const DEFAULT_REFRESH_POLLS: u32 = 60;
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

enum HeaderSource {
    File(PathBuf),
    Fixed,
}

/// Request headers captured from a browser session.
///
/// Internal endpoints only answer requests that carry the headers a logged-in
/// web player sends (authorization, client token, app version). The user
/// captures them into a JSON object file (`{"authorization": "Bearer ...",
/// ...}`). When the endpoint starts answering 401, [`HeaderManager::refresh`]
/// waits for the file to be re-captured and swaps the headers in.
pub struct HeaderManager {
    source: HeaderSource,
    headers: RwLock<HeaderMap>,
    refresh_polls: u32,
    refresh_interval: Duration,
}

impl HeaderManager {
    pub async fn from_file(path: &Path) -> Result<Self, StateError> {
        let headers = Self::read_file(path).await?;
        Ok(Self {
            source: HeaderSource::File(path.to_path_buf()),
            headers: RwLock::new(headers),
            refresh_polls: DEFAULT_REFRESH_POLLS,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        })
    }

    /// Headers consisting of a single bearer token that cannot be refreshed.
    pub fn from_bearer(token: &str) -> Result<Self, StateError> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|e| StateError::CriticalError(format!("invalid token: {}", e)))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(Self::from_map(headers))
    }

    pub fn from_map(headers: HeaderMap) -> Self {
        Self {
            source: HeaderSource::Fixed,
            headers: RwLock::new(headers),
            refresh_polls: DEFAULT_REFRESH_POLLS,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_refresh_wait(mut self, polls: u32, interval: Duration) -> Self {
        self.refresh_polls = polls;
        self.refresh_interval = interval;
        self
    }

    pub async fn current(&self) -> HeaderMap {
        self.headers.read().await.clone()
    }

    /// Re-reads the capture file until it holds headers different from the
    /// ones in use, then switches to them.
    pub async fn refresh(&self) -> Result<(), StateError> {
        let HeaderSource::File(path) = &self.source else {
            return Err(StateError::CriticalError(
                "credentials were rejected and cannot be refreshed; capture a headers file and pass it with --headers".to_string(),
            ));
        };

        warning!(
            "Request headers were rejected. Re-capture them into '{}' to continue.",
            path.display()
        );

        for poll in 0..=self.refresh_polls {
            if poll > 0 {
                sleep(self.refresh_interval).await;
            }

            let fresh = match Self::read_file(path).await {
                Ok(fresh) => fresh,
                Err(_) => continue,
            };

            let mut headers = self.headers.write().await;
            if *headers != fresh {
                *headers = fresh;
                return Ok(());
            }
        }

        Err(StateError::CriticalError(format!(
            "headers in '{}' did not change",
            path.display()
        )))
    }

    async fn read_file(path: &Path) -> Result<HeaderMap, StateError> {
        let content = async_fs::read_to_string(path).await?;
        parse_headers(&content)
    }
}

/// Parses a JSON object of header names to values.
///
/// HTTP/2 pseudo headers (`:authority`, ...) are skipped, and so are headers
/// that describe the captured request itself (`content-length`) or ask for a
/// compressed body (`accept-encoding`).
pub fn parse_headers(json: &str) -> Result<HeaderMap, StateError> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Object(entries) = value else {
        return Err(StateError::CriticalError(
            "captured headers must be a JSON object".to_string(),
        ));
    };

    let mut headers = HeaderMap::new();
    for (name, value) in entries {
        if name.starts_with(':') {
            continue;
        }

        let Some(value) = value.as_str() else {
            continue;
        };

        let Ok(name) = HeaderName::from_bytes(name.to_lowercase().as_bytes()) else {
            continue;
        };

        if name == ACCEPT_ENCODING || name == CONTENT_LENGTH {
            continue;
        }

        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(name, value);
        }
    }

    if headers.is_empty() {
        return Err(StateError::CriticalError(
            "captured headers file contains no usable headers".to_string(),
        ));
    }

    Ok(headers)
}
