use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::{CHART_COLUMNS, chart_requests, chart_url};
use crate::{
    Res,
    error::StateError,
    management::{HeaderManager, already_downloaded, remove_incomplete_downloads},
    output::{self, JsonlWriter},
    pool::{self, Completion, Fetcher, PoolConfig, PoolReport, Sink, Verdict},
    types::{ChartRequest, ChartRow, ChartsApiResponse},
    utils,
};

pub struct DownloadOptions {
    /// Base URL of the charts backend.
    pub api_url: String,
    pub regions: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub output_dir: PathBuf,
    pub workers: usize,
    pub max_attempts: u32,
}

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub requested: usize,
    pub already_present: usize,
    pub removed_partials: usize,
    pub written: usize,
    pub placeholders: usize,
    pub failed: usize,
    pub report: PoolReport,
}

/// Outcome of one chart request.
#[derive(Debug)]
pub struct ChartResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    /// Parsed rows; only present for a 200 whose body could be read.
    pub rows: Option<Vec<ChartRow>>,
    pub parse_error: Option<String>,
}

pub struct ChartFetcher {
    client: Client,
    headers: HeaderManager,
    api_url: String,
}

impl ChartFetcher {
    pub fn new(headers: HeaderManager, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            headers,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl Fetcher for ChartFetcher {
    type Item = ChartRequest;
    type Response = ChartResponse;

    async fn fetch(&self, item: &ChartRequest) -> Res<ChartResponse> {
        let url = chart_url(&self.api_url, &item.region, item.date);
        let headers = self.headers.current().await;
        let res = self.client.get(&url).headers(headers).send().await?;

        let status = res.status();
        let retry_after = utils::retry_after(res.headers());
        if status != StatusCode::OK {
            return Ok(ChartResponse {
                status: status.as_u16(),
                retry_after,
                rows: None,
                parse_error: None,
            });
        }

        let body = res.text().await?;
        let (rows, parse_error) = match serde_json::from_str::<ChartsApiResponse>(&body) {
            Ok(api) => (Some(chart_rows_from_api(api)), None),
            Err(e) => (None, Some(e.to_string())),
        };

        Ok(ChartResponse {
            status: status.as_u16(),
            retry_after,
            rows,
            parse_error,
        })
    }

    fn classify(&self, _item: &ChartRequest, result: &Res<ChartResponse>) -> Verdict {
        match result {
            Err(_) => Verdict::Retry(None),
            Ok(res) if res.status == 200 && res.rows.is_none() => Verdict::Failed,
            Ok(res) => pool::classify_status(res.status, res.retry_after),
        }
    }

    async fn refresh(&self) -> Res<()> {
        self.headers.refresh().await?;
        Ok(())
    }

    fn status_label(&self, response: &ChartResponse) -> Option<String> {
        Some(response.status.to_string())
    }
}

/// Converts a charts backend response to the website's CSV rows.
pub fn chart_rows_from_api(response: ChartsApiResponse) -> Vec<ChartRow> {
    response
        .entries
        .into_iter()
        .map(|entry| {
            let data = entry.chart_entry_data;
            let track = entry.track_metadata;
            let streams = data
                .ranking_metric
                .map(|m| m.value.replace(',', "").trim().parse::<u64>().unwrap_or(0))
                .unwrap_or(0);

            ChartRow {
                rank: data.current_rank,
                uri: track.track_uri,
                artist_names: join_names(track.artists.iter().map(|a| a.name.as_str())),
                track_name: track.track_name,
                source: join_names(track.labels.iter().map(|l| l.name.as_str())),
                peak_rank: data.peak_rank,
                previous_rank: data.previous_rank,
                days_on_chart: data.appearances_on_chart,
                streams,
            }
        })
        .collect()
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

/// Writes a chart file atomically. An empty `rows` slice produces a
/// header-only placeholder.
pub fn write_chart_file(
    dir: &Path,
    region: &str,
    date: NaiveDate,
    rows: &[ChartRow],
) -> Result<PathBuf, StateError> {
    let path = dir.join(utils::chart_filename(region, date));
    let tmp = output::part_path(&path);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)?;
        writer.write_record(CHART_COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, &path)?;
    Ok(path)
}

#[derive(Serialize)]
struct ChartErrorRecord {
    region: String,
    date: String,
    url: String,
    status_code: Option<u16>,
    outcome: String,
    error: Option<String>,
    attempts: u32,
    timestamp: String,
}

/// Writes chart files and logs everything that did not produce one to
/// `chart_errors.jsonl`.
pub struct ChartSink {
    dir: PathBuf,
    api_url: String,
    errors: JsonlWriter,
    pub written: usize,
    pub placeholders: usize,
}

impl ChartSink {
    pub fn open(dir: &Path, api_url: impl Into<String>) -> Result<Self, StateError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            api_url: api_url.into(),
            errors: JsonlWriter::open(&dir.join("chart_errors.jsonl"))?,
            written: 0,
            placeholders: 0,
        })
    }

    pub fn failed(&self) -> usize {
        self.errors.written()
    }
}

impl Sink<ChartRequest, ChartResponse> for ChartSink {
    fn accept(&mut self, completion: Completion<ChartRequest, ChartResponse>) -> Res<()> {
        let Completion {
            item,
            response,
            error,
            kind,
            attempts,
        } = completion;
        let status = response.as_ref().map(|r| r.status);

        if let Some(res) = response {
            if let Some(rows) = res.rows {
                write_chart_file(&self.dir, &item.region, item.date, &rows)?;
                self.written += 1;
                return Ok(());
            }

            if res.status == 404 {
                write_chart_file(&self.dir, &item.region, item.date, &[])?;
                self.placeholders += 1;
                return Ok(());
            }

            if let Some(parse_error) = res.parse_error {
                return self.log(item, status, kind.to_string(), Some(parse_error), attempts);
            }
        }

        self.log(item, status, kind.to_string(), error, attempts)
    }
}

impl ChartSink {
    fn log(
        &mut self,
        item: ChartRequest,
        status_code: Option<u16>,
        outcome: String,
        error: Option<String>,
        attempts: u32,
    ) -> Res<()> {
        let record = ChartErrorRecord {
            url: chart_url(&self.api_url, &item.region, item.date),
            region: item.region,
            date: item.date.format("%Y-%m-%d").to_string(),
            status_code,
            outcome,
            error,
            attempts,
            timestamp: utils::utc_timestamp(),
        };
        self.errors.append(&record)?;
        Ok(())
    }
}

/// Downloads every chart of `options` that has no file in the output
/// directory yet.
pub async fn download_charts(options: DownloadOptions, headers: HeaderManager) -> Res<DownloadSummary> {
    fs::create_dir_all(&options.output_dir)?;

    let removed_partials = remove_incomplete_downloads(&options.output_dir)?;
    let existing = already_downloaded(&options.output_dir)?;
    let all = chart_requests(&options.regions, options.start, options.end);
    let requested = all.len();

    let pending: Vec<ChartRequest> = all
        .into_iter()
        .filter(|r| !existing.contains(&utils::chart_filename(&r.region, r.date)))
        .collect();

    let mut summary = DownloadSummary {
        requested,
        already_present: requested - pending.len(),
        removed_partials,
        ..DownloadSummary::default()
    };

    if pending.is_empty() {
        return Ok(summary);
    }

    let fetcher = Arc::new(ChartFetcher::new(headers, options.api_url.clone()));
    let mut sink = ChartSink::open(&options.output_dir, options.api_url.clone())?;
    let config = PoolConfig {
        max_attempts: options.max_attempts,
        ..PoolConfig::new("charts", options.workers)
    };

    summary.report = pool::run(fetcher, pending, &mut sink, config).await?;
    summary.written = sink.written;
    summary.placeholders = sink.placeholders;
    summary.failed = sink.failed();
    Ok(summary)
}
