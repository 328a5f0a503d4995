use std::path::PathBuf;

use tabled::Table;

use crate::{
    charts, error, info, internal,
    management::read_jsonl,
    types::{ResponseRecord, StatusTableRow},
    warning,
};

/// Shows what a chart download directory or a JSONL response log contains.
///
/// # Example Usage
///
/// ```bash
/// sporcharts info --charts-dir data/charts
/// sporcharts info --jsonl data/credits_errors.jsonl
/// ```
pub async fn info(charts_dir: Option<PathBuf>, jsonl: Option<PathBuf>) {
    if charts_dir.is_none() && jsonl.is_none() {
        warning!("Nothing to show. Pass --charts-dir or --jsonl.");
        return;
    }

    if let Some(dir) = charts_dir {
        let status = match charts::inspect_download_dir(&dir) {
            Ok(status) => status,
            Err(e) => error!("Cannot inspect '{}': {}", dir.display(), e),
        };

        let row = |status: &str, count: usize| StatusTableRow {
            status: status.to_string(),
            count,
        };
        let rows = vec![
            row("charts", status.charts),
            row("placeholders", status.placeholders),
            row("incomplete downloads", status.partial),
            row("browser duplicates", status.duplicates),
            row("regions", status.regions),
        ];
        println!("{}", Table::new(rows));

        if let (Some(first), Some(last)) = (status.first_date, status.last_date) {
            info!("Charts cover {} to {}", first, last);
        }
    }

    if let Some(path) = jsonl {
        let records: Vec<ResponseRecord> = match read_jsonl(&path).await {
            Ok(records) => records,
            Err(e) => error!("Cannot read '{}': {}", path.display(), e),
        };

        let rows: Vec<StatusTableRow> = internal::status_counts(&records)
            .into_iter()
            .map(|(status, count)| StatusTableRow {
                status: status.to_string(),
                count,
            })
            .collect();
        info!("{} records in '{}'", records.len(), path.display());
        println!("{}", Table::new(rows));
    }
}
