//! Bounded-queue worker pool shared by every downloader.
//!
//! A pool run owns three kinds of tasks:
//!
//! ```text
//! feeder ──(bounded queue)──> worker × N ──(completions)──> sink (caller task)
//! ```
//!
//! The feeder pushes items into a bounded `flume` channel and closes it by
//! dropping the sender once every item is queued; workers stop when the
//! queue is closed and drained. Each worker fetches one item at a time and
//! asks the [`Fetcher`] to classify the attempt. Retries, credential
//! refreshes and back-off happen inside the worker. Every item ends up as
//! exactly one [`Completion`] handed to the [`Sink`], which runs on the
//! caller's task and therefore owns its output files without locking.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::{sync::Mutex, time::sleep};

use crate::{Res, utils, warning};

/// How an attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Usable result; hand it to the sink.
    Success,
    /// Transient failure; try again after the given wait (or the configured
    /// random back-off).
    Retry(Option<Duration>),
    /// Credentials are stale; refresh them and try again.
    Refresh,
    /// The item can never succeed (e.g. 403/404); log it and do not retry in
    /// later runs either.
    Permanent,
    /// The attempt failed in a way that retrying now will not fix.
    Failed,
}

/// Longest server-requested wait the pool honours before retrying.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// Maps an HTTP status to a verdict the same way for every endpoint.
///
/// | status    | verdict               |
/// |-----------|-----------------------|
/// | 2xx       | `Success`             |
/// | 401       | `Refresh`             |
/// | 429       | `Retry(Retry-After)`  |
/// | 403, 404  | `Permanent`           |
/// | 5xx       | `Retry(None)`         |
/// | other     | `Failed`              |
pub fn classify_status(status: u16, retry_after: Option<Duration>) -> Verdict {
    match status {
        200..=299 => Verdict::Success,
        401 => Verdict::Refresh,
        429 => Verdict::Retry(retry_after.map(|wait| wait.min(MAX_RETRY_AFTER))),
        403 | 404 => Verdict::Permanent,
        500..=599 => Verdict::Retry(None),
        _ => Verdict::Failed,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompletionKind {
    Succeeded,
    Permanent,
    Failed,
    Exhausted,
}

impl fmt::Display for CompletionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompletionKind::Succeeded => "succeeded",
            CompletionKind::Permanent => "permanent failure",
            CompletionKind::Failed => "failed",
            CompletionKind::Exhausted => "retries exhausted",
        };
        write!(f, "{}", s)
    }
}

/// Final result for one item.
#[derive(Debug)]
pub struct Completion<I, R> {
    pub item: I,
    /// Response of the last attempt, when the last attempt got one.
    pub response: Option<R>,
    /// Error of the last attempt, when it did not get a response.
    pub error: Option<String>,
    pub kind: CompletionKind,
    pub attempts: u32,
}

impl<I, R> Completion<I, R> {
    pub fn succeeded(&self) -> bool {
        self.kind == CompletionKind::Succeeded
    }
}

/// Fetches one item and classifies the outcome.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Item: Send + Sync + 'static;
    type Response: Send + 'static;

    /// Performs a single attempt.
    async fn fetch(&self, item: &Self::Item) -> Res<Self::Response>;

    /// Decides what to do with an attempt.
    fn classify(&self, item: &Self::Item, result: &Res<Self::Response>) -> Verdict;

    /// Re-acquires credentials after a [`Verdict::Refresh`]. The pool calls
    /// this at most once per credential generation.
    async fn refresh(&self) -> Res<()> {
        Ok(())
    }

    /// Short label for status statistics (usually the HTTP status code).
    fn status_label(&self, _response: &Self::Response) -> Option<String> {
        None
    }
}

/// Consumes completions. Runs on the task that called [`run`].
pub trait Sink<I, R> {
    fn accept(&mut self, completion: Completion<I, R>) -> Res<()>;
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub label: String,
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_backoff: (Duration, Duration),
    pub request_jitter: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            label: "items".to_string(),
            workers: 4,
            queue_capacity: 8,
            max_attempts: 8,
            retry_backoff: (Duration::from_secs(1), Duration::from_secs(5)),
            request_jitter: Duration::ZERO,
        }
    }
}

impl PoolConfig {
    pub fn new(label: impl Into<String>, workers: usize) -> Self {
        Self {
            label: label.into(),
            workers,
            queue_capacity: workers.saturating_mul(2).max(1),
            ..Self::default()
        }
    }

    fn backoff(&self) -> Duration {
        utils::random_duration(self.retry_backoff.0, self.retry_backoff.1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub kinds: BTreeMap<CompletionKind, usize>,
    pub statuses: BTreeMap<String, usize>,
    pub attempts: u64,
}

impl PoolReport {
    pub fn total(&self) -> usize {
        self.kinds.values().sum()
    }

    pub fn count(&self, kind: CompletionKind) -> usize {
        self.kinds.get(&kind).copied().unwrap_or(0)
    }

    pub fn status_summary(&self) -> String {
        self.statuses
            .iter()
            .map(|(status, count)| format!("{}: {}", status, count))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn record(&mut self, kind: CompletionKind, status: String, attempts: u32) {
        *self.kinds.entry(kind).or_insert(0) += 1;
        *self.statuses.entry(status).or_insert(0) += 1;
        self.attempts += attempts as u64;
    }
}

/// Serializes credential refreshes across workers. Workers remember the
/// generation they fetched with; only the first worker to report a stale
/// generation refreshes, the others just retry with the new credentials.
///
/// A failed refresh is remembered for its generation, so workers that saw
/// the same credentials get the error back instead of refreshing again.
#[derive(Default)]
pub struct RefreshGate {
    generation: AtomicU64,
    failed: Mutex<Option<(u64, String)>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the credentials currently in use.
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Refreshes the credentials of generation `seen` unless another worker
    /// already did (or already failed to).
    pub async fn refresh<F: Fetcher>(&self, fetcher: &F, seen: u64) -> Res<()> {
        let mut failed = self.failed.lock().await;
        if self.current() != seen {
            return Ok(());
        }
        if let Some((generation, error)) = failed.as_ref() {
            if *generation == seen {
                return Err(error.clone().into());
            }
        }

        match fetcher.refresh().await {
            Ok(()) => {
                self.generation.fetch_add(1, Ordering::SeqCst);
                *failed = None;
                Ok(())
            }
            Err(e) => {
                warning!("Credential refresh failed: {}", e);
                *failed = Some((seen, e.to_string()));
                Err(e)
            }
        }
    }
}

/// Runs every item through the pool and hands each completion to `sink`.
///
/// Returns once all items have completed, or with the first sink error (the
/// remaining workers are aborted in that case).
pub async fn run<F, S>(
    fetcher: Arc<F>,
    items: Vec<F::Item>,
    sink: &mut S,
    config: PoolConfig,
) -> Res<PoolReport>
where
    F: Fetcher,
    S: Sink<F::Item, F::Response>,
{
    if config.workers == 0 {
        return Err("worker pool needs at least one worker".into());
    }

    let mut report = PoolReport::default();
    if items.is_empty() {
        return Ok(report);
    }

    let total = items.len() as u64;
    let capacity = config.queue_capacity.max(1);
    let (queue_tx, queue_rx) = flume::bounded::<F::Item>(capacity);
    let (done_tx, done_rx) = flume::bounded::<Completion<F::Item, F::Response>>(capacity);
    let gate = Arc::new(RefreshGate::new());
    let config = Arc::new(config);

    let feeder = tokio::spawn(async move {
        for item in items {
            if queue_tx.send_async(item).await.is_err() {
                break;
            }
        }
    });

    let mut handles = Vec::with_capacity(config.workers);
    for _ in 0..config.workers {
        let fetcher = Arc::clone(&fetcher);
        let gate = Arc::clone(&gate);
        let config = Arc::clone(&config);
        let queue = queue_rx.clone();
        let done = done_tx.clone();
        handles.push(tokio::spawn(async move {
            while let Ok(item) = queue.recv_async().await {
                let completion = process(fetcher.as_ref(), &gate, &config, item).await;
                if done.send_async(completion).await.is_err() {
                    break;
                }
            }
        }));
    }
    drop(queue_rx);
    drop(done_tx);

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.blue} [{bar:30.blue/white}] {pos}/{len} {prefix} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("=> ").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb.set_prefix(config.label.clone());
    pb.enable_steady_tick(Duration::from_millis(100));

    while let Ok(completion) = done_rx.recv_async().await {
        let status = completion
            .response
            .as_ref()
            .and_then(|r| fetcher.status_label(r))
            .unwrap_or_else(|| "error".to_string());
        report.record(completion.kind, status, completion.attempts);
        pb.inc(1);
        pb.set_message(report.status_summary());

        if let Err(e) = sink.accept(completion) {
            pb.abandon();
            feeder.abort();
            for handle in &handles {
                handle.abort();
            }
            return Err(e);
        }
    }

    pb.finish_and_clear();
    feeder.await?;
    for handle in handles {
        handle.await?;
    }

    Ok(report)
}

async fn process<F: Fetcher>(
    fetcher: &F,
    gate: &RefreshGate,
    config: &PoolConfig,
    item: F::Item,
) -> Completion<F::Item, F::Response> {
    let mut attempts = 0;

    loop {
        attempts += 1;
        if !config.request_jitter.is_zero() {
            sleep(utils::random_duration(Duration::ZERO, config.request_jitter)).await;
        }

        let generation = gate.current();
        let result = fetcher.fetch(&item).await;
        let verdict = fetcher.classify(&item, &result);
        let out_of_attempts = attempts >= config.max_attempts;

        let kind = match verdict {
            Verdict::Success => CompletionKind::Succeeded,
            Verdict::Permanent => CompletionKind::Permanent,
            Verdict::Failed => CompletionKind::Failed,
            Verdict::Retry(_) | Verdict::Refresh if out_of_attempts => CompletionKind::Exhausted,
            Verdict::Retry(wait) => {
                sleep(wait.unwrap_or_else(|| config.backoff())).await;
                continue;
            }
            Verdict::Refresh => {
                if gate.refresh(fetcher, generation).await.is_err() {
                    sleep(config.backoff()).await;
                }
                continue;
            }
        };

        let (response, error) = match result {
            Ok(response) => (Some(response), None),
            Err(e) => (None, Some(e.to_string())),
        };

        return Completion {
            item,
            response,
            error,
            kind,
            attempts,
        };
    }
}
