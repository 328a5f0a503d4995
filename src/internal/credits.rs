use std::path::Path;

use crate::{
    error::StateError,
    output::{FileFormat, Table},
    types::{CreditRow, CreditsContent, ResponseRecord},
    utils,
};

/// Credits split by role.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CreditTables {
    pub writers: Vec<CreditRow>,
    pub producers: Vec<CreditRow>,
    pub performers: Vec<CreditRow>,
    /// Producers whose subroles are not exactly `["producer"]`.
    pub irregular_producers: Vec<CreditRow>,
    /// Records whose content is not a credits document.
    pub unreadable: usize,
}

/// Flattens one credits document. Role titles are plural in the response
/// ("Writers") and singular in the rows; subroles keep their first
/// occurrence only.
pub fn credit_rows(track_id: &str, content: &CreditsContent) -> Vec<CreditRow> {
    let mut rows = Vec::new();
    for role in &content.role_credits {
        let title = role.role_title.strip_suffix('s').unwrap_or(&role.role_title);
        for (i, artist) in role.artists.iter().enumerate() {
            let mut subroles = artist.subroles.clone();
            utils::remove_duplicates(&mut subroles);
            rows.push(CreditRow {
                track_id: track_id.to_string(),
                artist_id: artist
                    .uri
                    .as_deref()
                    .and_then(|uri| uri.strip_prefix("spotify:artist:"))
                    .map(str::to_string),
                name: artist.name.clone(),
                pos: i as u32 + 1,
                role: title.to_string(),
                subroles,
                external_url: artist.external_url.clone(),
                creator_uri: artist.creator_uri.clone(),
            });
        }
    }
    rows
}

/// Builds the writer, producer and performer tables from successful credits
/// responses.
pub fn process_credits(records: &[ResponseRecord]) -> CreditTables {
    let mut tables = CreditTables::default();

    for record in records.iter().filter(|r| !r.is_error()) {
        let content = match serde_json::from_value::<CreditsContent>(record.content.clone()) {
            Ok(content) => content,
            Err(_) => {
                tables.unreadable += 1;
                continue;
            }
        };

        for row in credit_rows(&record.track_id, &content) {
            match row.role.as_str() {
                "Writer" => tables.writers.push(row),
                "Producer" => {
                    if row.subroles != ["producer"] {
                        tables.irregular_producers.push(row.clone());
                    }
                    tables.producers.push(row);
                }
                "Performer" => tables.performers.push(row),
                _ => {}
            }
        }
    }

    tables
}

impl CreditTables {
    /// Writes `writers`, `producers` and `performers` into `dir` as CSV or
    /// Parquet files. Subroles are stored as a JSON array; only writers
    /// carry the external URL and creator URI of the credited artist.
    pub fn write(&self, dir: &Path, format: FileFormat) -> Result<(), StateError> {
        std::fs::create_dir_all(dir)?;
        let path = |name: &str| dir.join(format!("{}.{}", name, format.extension()));
        credit_table(&self.writers, &WRITER_COLUMNS)?.write(&path("writers"))?;
        credit_table(&self.producers, &PRODUCER_COLUMNS)?.write(&path("producers"))?;
        credit_table(&self.performers, &PERFORMER_COLUMNS)?.write(&path("performers"))?;
        Ok(())
    }
}

const WRITER_COLUMNS: [&str; 7] = [
    "track_id",
    "artist_id",
    "name",
    "pos",
    "subroles",
    "external_url",
    "creator_uri",
];
const PRODUCER_COLUMNS: [&str; 4] = ["track_id", "artist_id", "name", "pos"];
const PERFORMER_COLUMNS: [&str; 5] = ["track_id", "artist_id", "name", "pos", "subroles"];

fn credit_table(rows: &[CreditRow], columns: &[&str]) -> Result<Table, StateError> {
    let mut table = Table::new(columns.iter().copied());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            let value = match *column {
                "track_id" => row.track_id.clone(),
                "artist_id" => row.artist_id.clone().unwrap_or_default(),
                "name" => row.name.clone(),
                "pos" => row.pos.to_string(),
                "subroles" => serde_json::to_string(&row.subroles)?,
                "external_url" => row.external_url.clone().unwrap_or_default(),
                "creator_uri" => row.creator_uri.clone().unwrap_or_default(),
                _ => String::new(),
            };
            values.push(value);
        }
        table.push_row(values);
    }
    Ok(table)
}
