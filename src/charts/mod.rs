//! # Charts Module
//!
//! Daily regional chart rankings from Spotify's charts backend.
//!
//! ## Files
//!
//! Every chart lives in its own file named
//! `regional-<region>-daily-<YYYY-MM-DD>.csv` inside a download directory.
//! The file name is the completion marker: a chart whose file exists is never
//! requested again. Charts the backend does not have (a country that was not
//! charted yet on a given day) get a header-only placeholder file so they are
//! not retried either.
//!
//! ## Operations
//!
//! - [`download_charts`] fetches every missing (region, date) chart through the
//!   shared worker pool.
//! - [`combine_csv_files`] merges a download directory into one dataset with
//!   `date` and `region_code` columns.

mod combine;
mod download;

use std::{collections::HashSet, fs, path::Path};

use chrono::NaiveDate;

pub use combine::COMBINED_COLUMNS;
pub use combine::CombineSummary;
pub use combine::combine_csv_files;
pub use combine::is_duplicate_download;
pub use combine::read_chart_file;
pub use combine::write_combined;
pub use download::ChartFetcher;
pub use download::ChartResponse;
pub use download::ChartSink;
pub use download::DownloadOptions;
pub use download::DownloadSummary;
pub use download::chart_rows_from_api;
pub use download::download_charts;
pub use download::write_chart_file;

use crate::{
    error::StateError,
    output,
    types::ChartRequest,
    utils::{self, normalize_region},
};

/// Column set of a chart file as the charts website exports it.
pub const CHART_COLUMNS: [&str; 9] = [
    "rank",
    "uri",
    "artist_names",
    "track_name",
    "source",
    "peak_rank",
    "previous_rank",
    "days_on_chart",
    "streams",
];

/// `<api_url>/regional-<region>-daily/<date>`, where `api_url` is usually
/// [`crate::config::charts_apiurl`].
pub fn chart_url(api_url: &str, region: &str, date: NaiveDate) -> String {
    format!(
        "{base}/{alias}/{date}",
        base = api_url,
        alias = utils::chart_alias(region),
        date = date.format("%Y-%m-%d")
    )
}

/// Resolves the `--regions` argument.
///
/// Accepts a comma separated list of codes, a text file with one code per
/// line, or a CSV file with a `code` column. Codes are normalized (`ww`
/// becomes `global`) and deduplicated.
pub fn read_region_codes(arg: &str) -> Result<Vec<String>, StateError> {
    let path = Path::new(arg);
    let raw: Vec<String> = if path.is_file() {
        if path.extension().is_some_and(|ext| ext == "csv") {
            output::read_column(path, "code")?
        } else {
            fs::read_to_string(path)?
                .lines()
                .map(str::to_string)
                .collect()
        }
    } else {
        arg.split(',').map(str::to_string).collect()
    };

    let mut codes: Vec<String> = raw
        .iter()
        .map(|c| normalize_region(c))
        .filter(|c| !c.is_empty())
        .collect();
    utils::remove_duplicates(&mut codes);
    Ok(codes)
}

/// Every (region, date) combination, region-major.
pub fn chart_requests(regions: &[String], start: NaiveDate, end: NaiveDate) -> Vec<ChartRequest> {
    let dates = utils::date_range(start, end);
    regions
        .iter()
        .flat_map(|region| {
            dates.iter().map(move |date| ChartRequest {
                region: region.clone(),
                date: *date,
            })
        })
        .collect()
}

/// What a download directory currently holds.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadDirStatus {
    pub charts: usize,
    pub placeholders: usize,
    pub partial: usize,
    pub duplicates: usize,
    pub regions: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Counts chart files, placeholders, leftovers of interrupted downloads and
/// browser duplicates in `dir`.
pub fn inspect_download_dir(dir: &Path) -> Result<DownloadDirStatus, StateError> {
    let mut status = DownloadDirStatus::default();
    let mut regions = HashSet::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();

        if name.ends_with(".part") {
            status.partial += 1;
            continue;
        }
        if is_duplicate_download(&name) {
            status.duplicates += 1;
            continue;
        }
        let Some((region, date)) = utils::parse_chart_filename(&name) else {
            continue;
        };

        let mut reader = csv::Reader::from_path(entry.path())?;
        if reader.records().next().is_none() {
            status.placeholders += 1;
        } else {
            status.charts += 1;
        }

        regions.insert(region);
        status.first_date = Some(status.first_date.map_or(date, |d| d.min(date)));
        status.last_date = Some(status.last_date.map_or(date, |d| d.max(date)));
    }

    status.regions = regions.len();
    Ok(status)
}
