use std::path::{Path, PathBuf};

use tabled::Table;

use crate::{
    config, error, info, output,
    spotify::{self, Entity, MetadataSummary, WebApiClient},
    success,
    types::SummaryTableRow,
    utils, warning,
};

pub async fn tracks(input: PathBuf, output_dir: PathBuf) {
    let ids = read_ids_or_exit(&[input], "track_id");
    run_entity(Entity::Tracks, ids, &output_dir).await;
}

pub async fn albums(input: PathBuf, output_dir: PathBuf) {
    let ids = read_ids_or_exit(&[input], "album_id");
    run_entity(Entity::Albums, ids, &output_dir).await;
}

/// Artists can be read from several files at once, e.g. the `artists.csv`
/// tables of tracks and albums.
pub async fn artists(inputs: Vec<PathBuf>, output_dir: PathBuf) {
    let ids = read_ids_or_exit(&inputs, "artist_id");
    run_entity(Entity::Artists, ids, &output_dir).await;
}

/// Tracks, then their albums, then every artist of both.
pub async fn all(input: PathBuf, output_dir: PathBuf) {
    let ids = read_ids_or_exit(&[input], "track_id");
    let mut client = client_or_exit().await;

    let summaries = match spotify::fetch_all(&mut client, ids, &output_dir).await {
        Ok(summaries) => summaries,
        Err(e) => error!("Fetching metadata failed: {}", e),
    };

    for (entity, summary) in &summaries {
        print_summary(*entity, summary);
    }
    success!("Metadata saved to '{}'", output_dir.display());
}

async fn run_entity(entity: Entity, ids: Vec<String>, output_dir: &Path) {
    info!("Found {} unique {} IDs", ids.len(), entity.name());
    let mut client = client_or_exit().await;

    let summary = match spotify::fetch_metadata(&mut client, entity, ids, output_dir).await {
        Ok(summary) => summary,
        Err(e) => error!("Fetching {} metadata failed: {}", entity.name(), e),
    };

    print_summary(entity, &summary);
    success!("{} metadata saved to '{}'", entity.name(), output_dir.display());
}

async fn client_or_exit() -> WebApiClient {
    if let Err(e) = config::spotify_client_id().and_then(|_| config::spotify_client_secret()) {
        error!("{}. Add it to the environment or the .env file.", e);
    }
    WebApiClient::new().await
}

fn read_ids_or_exit(paths: &[PathBuf], column: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for path in paths {
        info!("Reading {} values from '{}'", column, path.display());
        match output::read_column(path, column) {
            Ok(values) => ids.extend(values),
            Err(e) => error!("Cannot read '{}': {}", path.display(), e),
        }
    }
    utils::remove_duplicates(&mut ids);
    ids
}

fn print_summary(entity: Entity, summary: &MetadataSummary) {
    let rows = vec![
        SummaryTableRow {
            metric: "requested".to_string(),
            value: summary.requested.to_string(),
        },
        SummaryTableRow {
            metric: "already present".to_string(),
            value: summary.already_present.to_string(),
        },
        SummaryTableRow {
            metric: "known invalid".to_string(),
            value: summary.known_invalid.to_string(),
        },
        SummaryTableRow {
            metric: "fetched".to_string(),
            value: summary.fetched.to_string(),
        },
        SummaryTableRow {
            metric: "invalid IDs".to_string(),
            value: summary.invalid_ids.len().to_string(),
        },
    ];
    println!("{}\n{}", entity.name(), Table::new(rows));

    if !summary.invalid_ids.is_empty() {
        warning!(
            "The Web API returned nothing for these {} IDs: {}",
            entity.name(),
            summary.invalid_ids.join(", ")
        );
    }
}
