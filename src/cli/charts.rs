use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use tabled::Table;

use crate::{
    charts::{self, DownloadOptions},
    config, error, info,
    management::HeaderManager,
    output::FileFormat,
    success,
    types::StatusTableRow,
    utils, warning,
};

/// First day with daily regional charts.
const FIRST_CHART_DATE: &str = "2017-01-01";

/// Downloads every missing daily chart for the given regions and dates.
///
/// Charts are requested from the charts backend with the bearer token in
/// `SPOTIFY_CHARTS_TOKEN`, or with the captured request headers in
/// `headers` when given (which can then be re-captured while the download
/// is running if the session expires).
pub async fn download(
    start: Option<String>,
    end: Option<String>,
    regions: String,
    output_dir: PathBuf,
    workers: usize,
    headers: Option<PathBuf>,
    max_attempts: u32,
) {
    let start = parse_or_exit(start.as_deref().unwrap_or(FIRST_CHART_DATE));
    let end = match end {
        Some(end) => parse_or_exit(&end),
        None => Utc::now().date_naive(),
    };

    let regions = match charts::read_region_codes(&regions) {
        Ok(regions) if !regions.is_empty() => regions,
        Ok(_) => error!("No region codes found in '{}'", regions),
        Err(e) => error!("Cannot read region codes from '{}': {}", regions, e),
    };

    let headers = load_chart_headers(headers.as_deref()).await;

    info!(
        "Fetching charts for {} regions from {} to {}",
        regions.len(),
        start,
        end
    );
    info!("Using '{}' as download directory", output_dir.display());

    let options = DownloadOptions {
        api_url: config::charts_apiurl(),
        regions,
        start,
        end,
        output_dir,
        workers,
        max_attempts,
    };

    let summary = match charts::download_charts(options, headers).await {
        Ok(summary) => summary,
        Err(e) => error!("Chart download failed: {}", e),
    };

    if summary.removed_partials > 0 {
        warning!(
            "Removed {} incomplete downloads",
            summary.removed_partials
        );
    }
    info!(
        "{} of {} charts already downloaded",
        summary.already_present, summary.requested
    );

    if summary.report.total() == 0 {
        success!("All charts already downloaded.");
        return;
    }

    let rows = vec![
        StatusTableRow {
            status: "downloaded".to_string(),
            count: summary.written,
        },
        StatusTableRow {
            status: "placeholder (no chart)".to_string(),
            count: summary.placeholders,
        },
        StatusTableRow {
            status: "failed".to_string(),
            count: summary.failed,
        },
    ];
    println!("{}", Table::new(rows));

    if summary.failed > 0 {
        warning!(
            "{} charts could not be downloaded; see chart_errors.jsonl. They are retried on the next run.",
            summary.failed
        );
    } else {
        success!("Downloaded {} charts.", summary.written + summary.placeholders);
    }
}

/// Combines a download directory into one dataset. The extension of
/// `output` selects CSV or Parquet.
pub async fn combine(input_dir: PathBuf, output: PathBuf, start: Option<String>, end: Option<String>) {
    let start = start.as_deref().map(parse_or_exit);
    let end = end.as_deref().map(parse_or_exit);

    if let Err(e) = FileFormat::from_path(&output) {
        error!("{}", e);
    }

    if !input_dir.is_dir() {
        error!("'{}' is not a directory", input_dir.display());
    }

    let (rows, summary) = match charts::combine_csv_files(&input_dir, start, end) {
        Ok(result) => result,
        Err(e) => error!("Cannot combine charts in '{}': {}", input_dir.display(), e),
    };

    for name in &summary.unreadable {
        warning!("Skipped unreadable file '{}'", name);
    }

    println!("{}", Table::new(summary.table_rows()));

    if let Err(e) = charts::write_combined(&rows, &output) {
        error!("Cannot write '{}': {}", output.display(), e);
    }
    success!("Saved combined data to '{}'", output.display());
}

async fn load_chart_headers(path: Option<&Path>) -> HeaderManager {
    if let Some(path) = path {
        return match HeaderManager::from_file(path).await {
            Ok(headers) => headers,
            Err(e) => error!("Cannot load request headers from '{}': {}", path.display(), e),
        };
    }

    let Some(token) = config::charts_token() else {
        error!("Set SPOTIFY_CHARTS_TOKEN or pass captured request headers with --headers");
    };

    match HeaderManager::from_bearer(&token) {
        Ok(headers) => headers,
        Err(e) => error!("Invalid SPOTIFY_CHARTS_TOKEN: {}", e),
    }
}

fn parse_or_exit(value: &str) -> NaiveDate {
    match utils::parse_date(value) {
        Ok(date) => date,
        Err(e) => error!("{}", e),
    }
}
