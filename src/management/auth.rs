use std::path::PathBuf;

use chrono::Utc;
use reqwest::Client;

use crate::{
    config,
    error::ApiError,
    types::{Token, TokenResponse},
};

/// Seconds before expiry at which a token is considered stale.
const EXPIRY_BUFFER: u64 = 240;

/// Client ID, secret and token endpoint used to request a token.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl ClientCredentials {
    /// Reads `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET` and the token URL
    /// from the environment.
    pub fn from_env() -> Result<Self, ApiError> {
        Ok(Self {
            client_id: config::spotify_client_id()?,
            client_secret: config::spotify_client_secret()?,
            token_url: config::spotify_apitoken_url(),
        })
    }
}

/// Client-credentials token for the Spotify Web API, cached on disk between
/// runs.
pub struct TokenManager {
    token: Option<Token>,
    cache: Option<PathBuf>,
    credentials: Option<ClientCredentials>,
}

impl TokenManager {
    /// In-memory manager without a cache file. Credentials come from the
    /// environment unless set with [`TokenManager::with_credentials`].
    pub fn new(token: Option<Token>) -> Self {
        TokenManager {
            token,
            cache: None,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Loads the cached token from the data directory, or starts empty when
    /// there is none. New tokens are written back to the same file.
    pub async fn load() -> Self {
        let path = Self::token_path();
        let token = match async_fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<Token>(&content).ok(),
            Err(_) => None,
        };
        Self {
            token,
            cache: Some(path),
            credentials: None,
        }
    }

    pub async fn persist(&self) -> Result<(), String> {
        let (Some(token), Some(path)) = (&self.token, &self.cache) else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(token).map_err(|e| e.to_string())?;
        async_fs::write(path, json).await.map_err(|e| e.to_string())
    }

    /// Returns an access token, requesting a new one when the current one is
    /// missing or about to expire.
    pub async fn get_valid_token(&mut self) -> Result<String, ApiError> {
        if let Some(token) = &self.token {
            if !Self::is_expired(token, Utc::now().timestamp() as u64) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        self.token = Some(token);
        // cache write failures are not fatal
        let _ = self.persist().await;
        Ok(access_token)
    }

    /// Drops the current token so the next call requests a fresh one.
    pub fn invalidate(&mut self) {
        self.token = None;
    }

    pub fn is_expired(token: &Token, now: u64) -> bool {
        now + EXPIRY_BUFFER >= token.obtained_at + token.expires_in
    }

    async fn request_token(&self) -> Result<Token, ApiError> {
        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => ClientCredentials::from_env()?,
        };
        let url = credentials.token_url;

        let res = Client::new()
            .post(&url)
            .basic_auth(credentials.client_id, Some(credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(ApiError::Status {
                status: res.status().as_u16(),
                url,
            });
        }

        let json = res.json::<TokenResponse>().await?;
        Ok(Token {
            access_token: json.access_token,
            token_type: json.token_type,
            expires_in: json.expires_in.unwrap_or(3600),
            obtained_at: Utc::now().timestamp() as u64,
        })
    }

    fn token_path() -> PathBuf {
        let mut path = config::data_dir();
        path.push("cache/token.json");
        path
    }
}
