//! # Spotify Web API Module
//!
//! Track, album and artist metadata from the official Spotify Web API,
//! flattened into relational CSV tables.
//!
//! ## Overview
//!
//! Only the three batch endpoints are used:
//!
//! | entity  | endpoint               | batch size |
//! |---------|------------------------|------------|
//! | tracks  | `GET /tracks?ids=...`  | 50         |
//! | albums  | `GET /albums?ids=...`  | 20         |
//! | artists | `GET /artists?ids=...` | 50         |
//!
//! Requests are authorized with a client-credentials token managed by
//! [`crate::management::TokenManager`].
//!
//! ## Output Layout
//!
//! Every entity is written into its own directory. Nested JSON becomes its
//! own table keyed by the owner ID, and `metadata.csv` keeps the remaining
//! scalar fields:
//!
//! ```text
//! <output>/tracks/   metadata.csv  artists.csv  markets.csv
//! <output>/albums/   metadata.csv  images.csv   artists.csv  markets.csv  copyrights.csv
//! <output>/artists/  metadata.csv  genres.csv   images.csv
//! ```
//!
//! Each directory also receives `responses.jsonl` with the raw batch
//! responses and the time they were fetched.
//!
//! ## Resumption
//!
//! IDs already present in `metadata.csv` are skipped, and new rows are
//! appended to the existing files. The tables are written after every batch,
//! so an interrupted run loses at most the batch in flight. `metadata.csv` is
//! appended last, after the tables that hang off it, so an ID only counts as
//! done once all of its rows are on disk.
//!
//! IDs the Web API answered with `null` are listed in `invalid_ids.csv` and
//! skipped as well.
//!
//! ## Pipeline
//!
//! [`fetch_all`] chains the three entities: tracks from the input, then the
//! albums referenced by those tracks, then every artist credited on the
//! tracks or albums.

mod albums;
mod artists;
mod client;
mod tracks;

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    time::Duration,
};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;

pub use albums::album_record;
pub use albums::process_albums;
pub use artists::artist_record;
pub use artists::process_artists;
pub use client::Batch;
pub use client::WebApiClient;
pub use tracks::process_tracks;
pub use tracks::track_record;

use crate::{
    Res,
    output::{self, JsonlWriter, Record, Table, TableSet},
    types::{ArtistLink, ArtistRef, Image, ImageRow, MarketLink},
    utils, warning,
};

/// External ID kinds that always get a column, so that files appended batch
/// by batch keep a stable header.
const KNOWN_EXTERNAL_IDS: [&str; 3] = ["isrc", "ean", "upc"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Tracks,
    Albums,
    Artists,
}

impl Entity {
    pub fn name(&self) -> &'static str {
        match self {
            Entity::Tracks => "tracks",
            Entity::Albums => "albums",
            Entity::Artists => "artists",
        }
    }

    /// Column holding the entity's ID in inputs and in `metadata.csv`.
    pub fn id_column(&self) -> &'static str {
        match self {
            Entity::Tracks => "track_id",
            Entity::Albums => "album_id",
            Entity::Artists => "artist_id",
        }
    }

    pub fn batch_size(&self) -> usize {
        match self {
            Entity::Albums => 20,
            Entity::Tracks | Entity::Artists => 50,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MetadataSummary {
    pub requested: usize,
    pub already_present: usize,
    /// IDs skipped because an earlier run found them invalid.
    pub known_invalid: usize,
    pub fetched: usize,
    pub invalid_ids: Vec<String>,
}

#[derive(Serialize)]
struct RawResponse<'a> {
    timestamp: String,
    source: &'a str,
    response: &'a Value,
}

/// Fetches metadata for every ID not yet in `<output_dir>/metadata.csv` and
/// appends the resulting tables.
pub async fn fetch_metadata(
    client: &mut WebApiClient,
    entity: Entity,
    mut ids: Vec<String>,
    output_dir: &Path,
) -> Res<MetadataSummary> {
    utils::remove_duplicates(&mut ids);
    let requested = ids.len();

    let existing = read_id_set(&output_dir.join("metadata.csv"), entity.id_column())?;
    ids.retain(|id| !existing.contains(id));
    let already_present = requested - ids.len();

    let invalid_path = output_dir.join("invalid_ids.csv");
    let known_invalid = read_id_set(&invalid_path, entity.id_column())?;
    ids.retain(|id| !known_invalid.contains(id));

    let mut summary = MetadataSummary {
        requested,
        already_present,
        known_invalid: requested - already_present - ids.len(),
        ..MetadataSummary::default()
    };
    if ids.is_empty() {
        return Ok(summary);
    }

    let mut raw_log = JsonlWriter::open(&output_dir.join("responses.jsonl"))?;
    let pb = ProgressBar::new(ids.len() as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.blue} [{bar:30.blue/white}] {pos}/{len} {prefix} ({eta})",
    ) {
        pb.set_style(style.progress_chars("=> ").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_prefix(entity.name());
    pb.enable_steady_tick(Duration::from_millis(100));

    for chunk in ids.chunks(entity.batch_size()) {
        let (tables, invalid, raw) = match entity {
            Entity::Tracks => {
                let batch = client.several_tracks(chunk).await?;
                (process_tracks(&batch.items), batch.invalid_ids, batch.raw)
            }
            Entity::Albums => {
                let batch = client.several_albums(chunk).await?;
                (process_albums(&batch.items), batch.invalid_ids, batch.raw)
            }
            Entity::Artists => {
                let batch = client.several_artists(chunk).await?;
                (process_artists(&batch.items), batch.invalid_ids, batch.raw)
            }
        };

        raw_log.append(&RawResponse {
            timestamp: utils::utc_timestamp(),
            source: entity.name(),
            response: &raw,
        })?;

        for (table, columns) in tables.append_to(output_dir)? {
            pb.suspend(|| {
                warning!(
                    "Columns {} are not in {}.csv and were dropped",
                    columns.join(", "),
                    table
                )
            });
        }

        if !invalid.is_empty() {
            let mut table = Table::new([entity.id_column()]);
            for id in &invalid {
                table.push_row(vec![id.clone()]);
            }
            table.append_csv(&invalid_path)?;
        }

        summary.fetched += chunk.len().saturating_sub(invalid.len());
        summary.invalid_ids.extend(invalid);
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    Ok(summary)
}

/// Runs tracks, albums and artists one after the other.
///
/// Each stage reads its IDs from the files the previous stage wrote, so a
/// partially completed pipeline can simply be started again.
pub async fn fetch_all(
    client: &mut WebApiClient,
    track_ids: Vec<String>,
    output_dir: &Path,
) -> Res<Vec<(Entity, MetadataSummary)>> {
    let tracks_dir = entity_dir(output_dir, Entity::Tracks);
    let albums_dir = entity_dir(output_dir, Entity::Albums);
    let artists_dir = entity_dir(output_dir, Entity::Artists);

    let mut summaries = Vec::new();

    let summary = fetch_metadata(client, Entity::Tracks, track_ids, &tracks_dir).await?;
    summaries.push((Entity::Tracks, summary));

    let album_ids = read_ids(&tracks_dir.join("metadata.csv"), "album_id")?;
    let summary = fetch_metadata(client, Entity::Albums, album_ids, &albums_dir).await?;
    summaries.push((Entity::Albums, summary));

    let mut artist_ids = read_ids(&albums_dir.join("artists.csv"), "artist_id")?;
    artist_ids.extend(read_ids(&tracks_dir.join("artists.csv"), "artist_id")?);
    let summary = fetch_metadata(client, Entity::Artists, artist_ids, &artists_dir).await?;
    summaries.push((Entity::Artists, summary));

    Ok(summaries)
}

pub fn entity_dir(output_dir: &Path, entity: Entity) -> PathBuf {
    output_dir.join(entity.name())
}

/// Distinct IDs of `column`; a missing file yields none.
fn read_ids(path: &Path, column: &str) -> Res<Vec<String>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    Ok(output::read_column(path, column)?)
}

fn read_id_set(path: &Path, column: &str) -> Res<HashSet<String>> {
    Ok(read_ids(path, column)?.into_iter().collect())
}

/// Credited artists with their 1-based position.
pub fn artist_links(owner_id: &str, artists: &[ArtistRef]) -> Vec<ArtistLink> {
    artists
        .iter()
        .enumerate()
        .map(|(i, artist)| ArtistLink {
            owner_id: owner_id.to_string(),
            artist_id: artist.id.clone(),
            pos: i as u32 + 1,
        })
        .collect()
}

pub fn market_links(owner_id: &str, markets: &[String]) -> Vec<MarketLink> {
    markets
        .iter()
        .map(|market| MarketLink {
            owner_id: owner_id.to_string(),
            market: market.clone(),
        })
        .collect()
}

pub fn image_rows(owner_id: &str, images: &[Image]) -> Vec<ImageRow> {
    images
        .iter()
        .map(|image| ImageRow {
            owner_id: owner_id.to_string(),
            url: image.url.clone(),
            width: image.width,
            height: image.height,
        })
        .collect()
}

pub fn artist_table(owner_column: &str, links: &[ArtistLink]) -> Table {
    let mut table = Table::new([owner_column, "artist_id", "pos"]);
    for link in links {
        table.push_row(vec![
            link.owner_id.clone(),
            link.artist_id.clone(),
            link.pos.to_string(),
        ]);
    }
    table
}

pub fn market_table(owner_column: &str, links: &[MarketLink]) -> Table {
    let mut table = Table::new([owner_column, "market"]);
    for link in links {
        table.push_row(vec![link.owner_id.clone(), link.market.clone()]);
    }
    table
}

pub fn image_table(owner_column: &str, rows: &[ImageRow]) -> Table {
    let mut table = Table::new([owner_column, "url", "width", "height"]);
    for row in rows {
        table.push_row(vec![
            row.owner_id.clone(),
            row.url.clone(),
            row.width.map(|w| w.to_string()).unwrap_or_default(),
            row.height.map(|h| h.to_string()).unwrap_or_default(),
        ]);
    }
    table
}

/// Adds `<platform>_id` columns (the known kinds always, others when
/// present) followed by the external URLs.
pub fn push_external(
    record: &mut Record,
    external_ids: &BTreeMap<String, String>,
    external_urls: &BTreeMap<String, String>,
) {
    for kind in KNOWN_EXTERNAL_IDS {
        record.push_opt(format!("{}_id", kind), external_ids.get(kind));
    }
    for (kind, id) in external_ids {
        if !KNOWN_EXTERNAL_IDS.contains(&kind.as_str()) {
            record.push(format!("{}_id", kind), id);
        }
    }
    push_external_urls(record, external_urls);
}

/// Adds a `<source>_url` column for every non-spotify external URL.
pub fn push_external_urls(record: &mut Record, external_urls: &BTreeMap<String, String>) {
    for (source, url) in external_urls {
        if source != "spotify" {
            record.push(format!("{}_url", source), url);
        }
    }
}
