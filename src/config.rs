//! Configuration management for the chart harvester.
//!
//! Values come from environment variables and a `.env` file stored in the
//! platform-specific local data directory. The lookup order is:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (endpoint URLs only; credentials have none)

use std::{env, path::PathBuf};

use crate::error::ConfigError;

const APP_DIR: &str = "sporcharts";

const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
const DEFAULT_API_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const DEFAULT_CHARTS_API_URL: &str = "https://charts-spotify-com-service.spotify.com/auth/v0/charts";
const DEFAULT_INTERNAL_API_URL: &str = "https://spclient.wg.spotify.com";
const DEFAULT_IPINFO_URL: &str = "https://ipinfo.io";
const DEFAULT_S3_ENDPOINT_URL: &str = "https://s3.eu-central-2.wasabisys.com";
const DEFAULT_S3_REGION: &str = "eu-central-2";

/// Loads environment variables from the `.env` file in the local data directory.
///
/// The directory is created when missing so that `build.rs` and the user
/// have a place to drop the file. A missing `.env` file is not an error:
/// every value can also be provided through the process environment.
///
/// # Directory Structure
///
/// - Linux: `~/.local/share/sporcharts/.env`
/// - macOS: `~/Library/Application Support/sporcharts/.env`
/// - Windows: `%LOCALAPPDATA%/sporcharts/.env`
///
/// # Errors
///
/// Returns an error if the directory cannot be created or if an existing
/// `.env` file cannot be parsed.
pub async fn load_env() -> Result<(), ConfigError> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent).await?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| ConfigError::EnvError(e.to_string()))?;
    }
    Ok(())
}

/// Returns the application directory inside the local data directory.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Returns the client ID of the registered Spotify application.
///
/// Used for the client-credentials token exchange of the Web API.
pub fn spotify_client_id() -> Result<String, ConfigError> {
    required("SPOTIFY_CLIENT_ID")
}

/// Returns the client secret of the registered Spotify application.
///
/// The secret should never be written to logs or output files.
pub fn spotify_client_secret() -> Result<String, ConfigError> {
    required("SPOTIFY_CLIENT_SECRET")
}

/// Returns the Spotify Web API base URL (e.g. `https://api.spotify.com/v1`).
pub fn spotify_apiurl() -> String {
    optional("SPOTIFY_API_URL", DEFAULT_API_URL)
}

/// Returns the Spotify token exchange URL.
pub fn spotify_apitoken_url() -> String {
    optional("SPOTIFY_API_TOKEN_URL", DEFAULT_API_TOKEN_URL)
}

/// Returns the base URL of the charts backend that serves one chart per
/// alias and date.
pub fn charts_apiurl() -> String {
    optional("SPOTIFY_CHARTS_API_URL", DEFAULT_CHARTS_API_URL)
}

/// Returns the bearer token captured from a logged-in charts.spotify.com
/// session, if one is configured.
pub fn charts_token() -> Option<String> {
    env::var("SPOTIFY_CHARTS_TOKEN")
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Returns the base URL of the internal Spotify backend.
pub fn internal_apiurl() -> String {
    optional("SPOTIFY_INTERNAL_API_URL", DEFAULT_INTERNAL_API_URL)
}

/// Returns the base URL of the IP geolocation service used for market lookups.
pub fn ipinfo_url() -> String {
    optional("IPINFO_URL", DEFAULT_IPINFO_URL)
}

/// Returns the access key ID for the S3-compatible bucket used by `upload`.
pub fn s3_access_key_id() -> Result<String, ConfigError> {
    required("S3_ACCESS_KEY_ID")
}

pub fn s3_secret_access_key() -> Result<String, ConfigError> {
    required("S3_SECRET_ACCESS_KEY")
}

/// Returns the S3 endpoint, Wasabi's `eu-central-2` unless overridden.
pub fn s3_endpoint_url() -> String {
    optional("S3_ENDPOINT_URL", DEFAULT_S3_ENDPOINT_URL)
}

pub fn s3_region() -> String {
    optional("S3_REGION", DEFAULT_S3_REGION)
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn optional(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}
