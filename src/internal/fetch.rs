use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use reqwest::Client;

use super::{Resource, current_market, ids_for_market};
use crate::{
    Res,
    error::StateError,
    management::{HeaderManager, StateManager},
    output::{self, JsonlWriter},
    pool::{self, Completion, Fetcher, PoolConfig, PoolReport, Sink, Verdict},
    types::ResponseRecord,
    utils,
};

/// Random delay before each request, so parallel workers do not fire at
/// the same instant.
const REQUEST_JITTER: Duration = Duration::from_millis(300);

pub struct FetchOptions {
    pub resource: Resource,
    /// Base URL of the internal backend.
    pub api_url: String,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub markets: Option<PathBuf>,
    pub parallel: Option<usize>,
    pub max_attempts: u32,
}

impl FetchOptions {
    /// `<resource>.jsonl` next to the input file unless given explicitly.
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => self
                .input
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(format!("{}.jsonl", self.resource.name())),
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub input_ids: usize,
    pub market: Option<String>,
    pub available_in_market: Option<usize>,
    pub pending: usize,
    pub written: usize,
    pub failed: usize,
    pub output: PathBuf,
    pub error_log: PathBuf,
    pub report: PoolReport,
}

pub struct InternalFetcher {
    client: Client,
    resource: Resource,
    headers: HeaderManager,
    api_url: String,
}

impl InternalFetcher {
    pub fn new(resource: Resource, headers: HeaderManager, api_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            resource,
            headers,
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl Fetcher for InternalFetcher {
    type Item = String;
    type Response = ResponseRecord;

    async fn fetch(&self, track_id: &String) -> Res<ResponseRecord> {
        let url = self.resource.url(&self.api_url, track_id);
        let headers = self.headers.current().await;
        let res = self.client.get(&url).headers(headers).send().await?;
        let status = res.status().as_u16();
        let body = res.text().await?;
        Ok(ResponseRecord::new(status, &body, &url, track_id))
    }

    fn classify(&self, _track_id: &String, result: &Res<ResponseRecord>) -> Verdict {
        let record = match result {
            Ok(record) => record,
            Err(_) => return Verdict::Retry(None),
        };

        if record.status_code == 200 {
            return if record.is_error() {
                Verdict::Failed
            } else {
                Verdict::Success
            };
        }

        match pool::classify_status(record.status_code, None) {
            // other 2xx carry no usable body
            Verdict::Success => Verdict::Failed,
            verdict => verdict,
        }
    }

    async fn refresh(&self) -> Res<()> {
        self.headers.refresh().await?;
        Ok(())
    }

    fn status_label(&self, record: &ResponseRecord) -> Option<String> {
        Some(record.status_code.to_string())
    }
}

/// Routes records to the response log or the error log.
pub struct InternalSink {
    resource: Resource,
    api_url: String,
    output: JsonlWriter,
    errors: JsonlWriter,
}

impl InternalSink {
    pub fn open(
        resource: Resource,
        api_url: impl Into<String>,
        output: &Path,
        error_log: &Path,
    ) -> Result<Self, StateError> {
        Ok(Self {
            resource,
            api_url: api_url.into(),
            output: JsonlWriter::open(output)?,
            errors: JsonlWriter::open(error_log)?,
        })
    }

    pub fn written(&self) -> usize {
        self.output.written()
    }

    pub fn failed(&self) -> usize {
        self.errors.written()
    }
}

impl Sink<String, ResponseRecord> for InternalSink {
    fn accept(&mut self, completion: Completion<String, ResponseRecord>) -> Res<()> {
        let succeeded = completion.succeeded();
        let record = match completion.response {
            Some(record) => record,
            None => ResponseRecord::from_error(
                completion.error.as_deref().unwrap_or("no response"),
                &self.resource.url(&self.api_url, &completion.item),
                &completion.item,
            ),
        };

        if succeeded {
            self.output.append(&record)?;
        } else {
            self.errors.append(&record)?;
        }
        Ok(())
    }
}

/// Fetches `options.resource` for every track ID in the input that has
/// neither a response nor a permanent error yet.
pub async fn fetch_resource(options: FetchOptions, headers: HeaderManager) -> Res<FetchSummary> {
    let mut ids = output::read_column(&options.input, "track_id")?;
    utils::remove_duplicates(&mut ids);

    let mut summary = FetchSummary {
        input_ids: ids.len(),
        ..FetchSummary::default()
    };

    if let Some(markets) = &options.markets {
        let market = current_market().await?;
        let available = ids_for_market(markets, &market)?;
        if available.is_empty() {
            return Err(format!(
                "no track IDs found for market '{}' in '{}'",
                market,
                markets.display()
            )
            .into());
        }
        ids.retain(|id| available.contains(id));
        summary.available_in_market = Some(ids.len());
        summary.market = Some(market);
    }

    let output_path = options.output_path();
    let state = StateManager::for_output(&output_path);
    let pending = state.pending(ids).await?;
    summary.pending = pending.len();
    summary.output = state.output().to_path_buf();
    summary.error_log = state.error_log().to_path_buf();

    if pending.is_empty() {
        return Ok(summary);
    }

    let workers = options
        .parallel
        .unwrap_or_else(|| options.resource.default_parallelism());
    let fetcher = Arc::new(InternalFetcher::new(
        options.resource,
        headers,
        options.api_url.clone(),
    ));
    let mut sink = InternalSink::open(
        options.resource,
        options.api_url.clone(),
        state.output(),
        state.error_log(),
    )?;
    let config = PoolConfig {
        max_attempts: options.max_attempts,
        request_jitter: REQUEST_JITTER,
        ..PoolConfig::new(options.resource.name(), workers)
    };

    summary.report = pool::run(fetcher, pending, &mut sink, config).await?;
    summary.written = sink.written();
    summary.failed = sink.failed();
    Ok(summary)
}
