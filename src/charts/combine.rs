use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;

use crate::{
    error::StateError,
    output::{self, FileFormat, Table},
    types::{ChartRow, CombinedChartRow, SummaryTableRow},
    utils, warning,
};

/// Column set of the combined dataset.
pub const COMBINED_COLUMNS: [&str; 11] = [
    "date",
    "region_code",
    "track_id",
    "pos",
    "artist_names",
    "track_name",
    "source",
    "peak_rank",
    "previous_rank",
    "days_on_chart",
    "streams",
];

static DUPLICATE_DOWNLOAD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\(\d+\)\.csv$").ok());

/// Browsers save repeated downloads as `name (1).csv`.
pub fn is_duplicate_download(name: &str) -> bool {
    DUPLICATE_DOWNLOAD
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CombineSummary {
    pub files: usize,
    pub skipped_duplicates: usize,
    pub unreadable: Vec<String>,
    pub rows: usize,
    pub unique_tracks: usize,
    pub unique_regions: usize,
    pub unique_dates: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

impl CombineSummary {
    fn from_rows(rows: &[CombinedChartRow]) -> Self {
        let tracks: HashSet<&str> = rows.iter().map(|r| r.track_id.as_str()).collect();
        let regions: HashSet<&str> = rows.iter().map(|r| r.region_code.as_str()).collect();
        let dates: HashSet<&str> = rows.iter().map(|r| r.date.as_str()).collect();

        Self {
            rows: rows.len(),
            unique_tracks: tracks.len(),
            unique_regions: regions.len(),
            unique_dates: dates.len(),
            first_date: dates.iter().min().map(|d| d.to_string()),
            last_date: dates.iter().max().map(|d| d.to_string()),
            ..Self::default()
        }
    }

    pub fn table_rows(&self) -> Vec<SummaryTableRow> {
        let row = |metric: &str, value: String| SummaryTableRow {
            metric: metric.to_string(),
            value,
        };

        vec![
            row("files", self.files.to_string()),
            row("ignored duplicates", self.skipped_duplicates.to_string()),
            row("unreadable files", self.unreadable.len().to_string()),
            row("rows", self.rows.to_string()),
            row("unique tracks", self.unique_tracks.to_string()),
            row("unique regions", self.unique_regions.to_string()),
            row("unique dates", self.unique_dates.to_string()),
            row("first date", self.first_date.clone().unwrap_or_default()),
            row("last date", self.last_date.clone().unwrap_or_default()),
        ]
    }
}

/// Reads one chart file and tags its rows with the date and region taken
/// from the file name.
pub fn read_chart_file(path: &Path) -> Result<Vec<CombinedChartRow>, StateError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (region, date) = utils::parse_chart_filename(&name).ok_or_else(|| {
        StateError::CriticalError(format!("'{}' is not a chart file name", name))
    })?;

    let region_code = utils::dataset_region(&region);
    let date = date.format("%Y-%m-%d").to_string();

    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<ChartRow>() {
        let row = row?;
        rows.push(CombinedChartRow {
            date: date.clone(),
            region_code: region_code.clone(),
            track_id: utils::id_from_uri(&row.uri).to_string(),
            pos: row.rank,
            artist_names: row.artist_names,
            track_name: row.track_name,
            source: row.source,
            peak_rank: row.peak_rank,
            previous_rank: row.previous_rank,
            days_on_chart: row.days_on_chart,
            streams: row.streams,
        });
    }
    Ok(rows)
}

/// Combines every chart file in `dir` into one dataset sorted by date,
/// region and position, keeping only dates within `[start, end]`.
pub fn combine_csv_files(
    dir: &Path,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(Vec<CombinedChartRow>, CombineSummary), StateError> {
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_file() && name.ends_with(".csv") {
            names.push(name);
        }
    }
    names.sort();

    let total = names.len();
    names.retain(|name| !is_duplicate_download(name));
    let skipped_duplicates = total - names.len();
    if skipped_duplicates > 0 {
        warning!(
            "{} duplicate files found among the {} files in '{}'. They will be ignored.",
            skipped_duplicates,
            total,
            dir.display()
        );
    }

    let start = start.map(|d| d.format("%Y-%m-%d").to_string());
    let end = end.map(|d| d.format("%Y-%m-%d").to_string());

    let pb = ProgressBar::new(names.len() as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.blue/white}] {pos}/{len} files ({eta})")
    {
        pb.set_style(style.progress_chars("=> ").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut rows = Vec::new();
    let mut unreadable = Vec::new();
    for name in &names {
        let path: PathBuf = dir.join(name);
        match read_chart_file(&path) {
            Ok(file_rows) => rows.extend(file_rows.into_iter().filter(|r| {
                start.as_ref().is_none_or(|s| r.date >= *s)
                    && end.as_ref().is_none_or(|e| r.date <= *e)
            })),
            Err(e) => {
                pb.suspend(|| warning!("Cannot read '{}': {}", path.display(), e));
                unreadable.push(name.clone());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    rows.sort_by(|a, b| {
        (a.date.as_str(), a.region_code.as_str(), a.pos)
            .cmp(&(b.date.as_str(), b.region_code.as_str(), b.pos))
    });

    let summary = CombineSummary {
        files: names.len(),
        skipped_duplicates,
        unreadable,
        ..CombineSummary::from_rows(&rows)
    };
    Ok((rows, summary))
}

/// Writes the combined dataset as CSV or Parquet, depending on the extension
/// of `path`.
pub fn write_combined(rows: &[CombinedChartRow], path: &Path) -> Result<(), StateError> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => write_combined_csv(rows, path),
        FileFormat::Parquet => combined_table(rows).write(path),
    }
}

fn write_combined_csv(rows: &[CombinedChartRow], path: &Path) -> Result<(), StateError> {
    output::ensure_parent(path)?;
    let tmp = output::part_path(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)?;
        writer.write_record(COMBINED_COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

fn combined_table(rows: &[CombinedChartRow]) -> Table {
    let mut table = Table::new(COMBINED_COLUMNS);
    for row in rows {
        table.push_row(vec![
            row.date.clone(),
            row.region_code.clone(),
            row.track_id.clone(),
            row.pos.to_string(),
            row.artist_names.clone(),
            row.track_name.clone(),
            row.source.clone(),
            row.peak_rank.to_string(),
            row.previous_rank.to_string(),
            row.days_on_chart.to_string(),
            row.streams.to_string(),
        ]);
    }
    table
}
