use std::path::PathBuf;

use tabled::Table;

use crate::{
    config, error, info,
    internal::{self, FetchOptions, Resource},
    management::{HeaderManager, read_jsonl},
    output::FileFormat,
    success,
    types::{ResponseRecord, StatusTableRow},
    warning,
};

pub async fn fetch(
    resource: Resource,
    input: PathBuf,
    output: Option<PathBuf>,
    headers: PathBuf,
    markets: Option<PathBuf>,
    parallel: Option<usize>,
    max_attempts: u32,
) {
    if resource.requires_login() {
        warning!(
            "The {} endpoint needs headers captured from a logged-in session",
            resource.name()
        );
    }

    let headers = match HeaderManager::from_file(&headers).await {
        Ok(headers) => headers,
        Err(e) => error!("Cannot load request headers from '{}': {}", headers.display(), e),
    };

    let options = FetchOptions {
        resource,
        api_url: config::internal_apiurl(),
        input,
        output,
        markets,
        parallel,
        max_attempts,
    };
    info!("Output file: '{}'", options.output_path().display());

    let summary = match internal::fetch_resource(options, headers).await {
        Ok(summary) => summary,
        Err(e) => error!("Fetching {} failed: {}", resource.name(), e),
    };

    info!("Found {} track IDs in input file", summary.input_ids);
    if let (Some(market), Some(available)) = (&summary.market, summary.available_in_market) {
        info!("{} tracks are available in market '{}'", available, market);
    }

    if summary.report.total() == 0 {
        success!("No track IDs left to fetch data for!");
        return;
    }

    let rows: Vec<StatusTableRow> = summary
        .report
        .statuses
        .iter()
        .map(|(status, count)| StatusTableRow {
            status: status.clone(),
            count: *count,
        })
        .collect();
    println!("{}", Table::new(rows));

    success!(
        "{} responses saved to '{}', {} errors logged to '{}'",
        summary.written,
        summary.output.display(),
        summary.failed,
        summary.error_log.display()
    );
}

/// Turns a credits response log into writer, producer and performer tables.
pub async fn credits(input: PathBuf, output_dir: PathBuf, format: FileFormat) {
    let records: Vec<ResponseRecord> = match read_jsonl(&input).await {
        Ok(records) => records,
        Err(e) => error!("Cannot read '{}': {}", input.display(), e),
    };
    info!("Processing {} credits responses", records.len());

    let tables = internal::process_credits(&records);
    if tables.unreadable > 0 {
        warning!("{} responses are not credits documents", tables.unreadable);
    }
    if !tables.irregular_producers.is_empty() {
        warning!(
            "{} producer credits have subroles other than [\"producer\"]",
            tables.irregular_producers.len()
        );
    }

    if let Err(e) = tables.write(&output_dir, format) {
        error!("Cannot write credits to '{}': {}", output_dir.display(), e);
    }

    success!(
        "Stored {} writers, {} producers and {} performers in '{}'",
        tables.writers.len(),
        tables.producers.len(),
        tables.performers.len(),
        output_dir.display()
    );
}
