use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub obtained_at: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChartRequest {
    pub region: String,
    pub date: NaiveDate,
}

/// One row of a downloaded daily chart file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    pub rank: u32,
    pub uri: String,
    pub artist_names: String,
    pub track_name: String,
    pub source: String,
    pub peak_rank: u32,
    pub previous_rank: i64,
    pub days_on_chart: u32,
    pub streams: u64,
}

/// One row of the combined chart dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedChartRow {
    pub date: String,
    pub region_code: String,
    pub track_id: String,
    pub pos: u32,
    pub artist_names: String,
    pub track_name: String,
    pub source: String,
    pub peak_rank: u32,
    pub previous_rank: i64,
    pub days_on_chart: u32,
    pub streams: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartsApiResponse {
    #[serde(default)]
    pub entries: Vec<ChartsApiEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartsApiEntry {
    pub chart_entry_data: ChartEntryData,
    pub track_metadata: ChartTrackMetadata,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntryData {
    pub current_rank: u32,
    #[serde(default = "new_entry_rank")]
    pub previous_rank: i64,
    #[serde(default)]
    pub peak_rank: u32,
    #[serde(default)]
    pub appearances_on_chart: u32,
    #[serde(default)]
    pub ranking_metric: Option<RankingMetric>,
}

fn new_entry_rank() -> i64 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingMetric {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartTrackMetadata {
    pub track_name: String,
    pub track_uri: String,
    #[serde(default)]
    pub artists: Vec<NamedEntry>,
    #[serde(default)]
    pub labels: Vec<NamedEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedEntry {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Web API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlbumRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Copyright {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Followers {
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub album: AlbumRef,
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub available_markets: Vec<String>,
    pub disc_number: u32,
    pub track_number: u32,
    pub duration_ms: u64,
    pub explicit: bool,
    pub preview_url: Option<String>,
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub external_urls: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub album_type: String,
    pub release_date: String,
    pub release_date_precision: String,
    pub total_tracks: u32,
    pub label: Option<String>,
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub available_markets: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub copyrights: Vec<Copyright>,
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub external_urls: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub followers: Followers,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: BTreeMap<String, String>,
}

/// Artist credited on a track or album, with its 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistLink {
    pub owner_id: String,
    pub artist_id: String,
    pub pos: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketLink {
    pub owner_id: String,
    pub market: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRow {
    pub owner_id: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyrightRow {
    pub album_id: String,
    pub text: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreRow {
    pub artist_id: String,
    pub genre: String,
}

// ---------------------------------------------------------------------------
// Internal API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Text,
}

/// One logged response of an internal endpoint, written as a JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub status_code: u16,
    pub content: Value,
    pub content_type: ContentType,
    pub url: String,
    pub track_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsContent {
    #[serde(default)]
    pub role_credits: Vec<RoleCredits>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCredits {
    pub role_title: String,
    #[serde(default)]
    pub artists: Vec<CreditedArtist>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditedArtist {
    #[serde(default)]
    pub uri: Option<String>,
    pub name: String,
    #[serde(default)]
    pub subroles: Vec<String>,
    #[serde(default)]
    pub external_url: Option<String>,
    #[serde(default)]
    pub creator_uri: Option<String>,
}

/// A flattened credit: one artist in one role of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRow {
    pub track_id: String,
    pub artist_id: Option<String>,
    pub name: String,
    pub pos: u32,
    pub role: String,
    pub subroles: Vec<String>,
    pub external_url: Option<String>,
    pub creator_uri: Option<String>,
}

// ---------------------------------------------------------------------------
// Console tables
// ---------------------------------------------------------------------------

#[derive(Tabled)]
pub struct StatusTableRow {
    pub status: String,
    pub count: usize,
}

#[derive(Tabled)]
pub struct SummaryTableRow {
    pub metric: String,
    pub value: String,
}
