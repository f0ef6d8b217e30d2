//! Job progress events and where they go.
//!
//! Reporting never blocks the pipeline and never fails a job: the HTTP
//! reporter queues events for a background task, the channel reporter drops
//! events when its buffer is full.

use crate::error::{Result, ScribeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pipeline stage as seen by an observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Segmenting,
    Transcribing,
    Aligning,
    Diarizing,
    Done,
    Failed,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Segmenting => "segmenting",
            Stage::Transcribing => "transcribing",
            Stage::Aligning => "aligning",
            Stage::Diarizing => "diarizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    /// Percent range the stage occupies.
    pub fn band(self) -> (u8, u8) {
        match self {
            Stage::Segmenting => (0, 20),
            Stage::Transcribing => (20, 80),
            Stage::Aligning => (80, 85),
            Stage::Diarizing => (85, 95),
            Stage::Done => (100, 100),
            Stage::Failed => (0, 100),
        }
    }

    /// Callback `status` field: "processing", "complete" or "error".
    pub fn status(self) -> &'static str {
        match self {
            Stage::Done => "complete",
            Stage::Failed => "error",
            _ => "processing",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Percent for starting window `index` (zero-based) of `total`.
pub fn transcribing_percent(index: usize, total: usize) -> u8 {
    let (low, high) = Stage::Transcribing.band();
    if total == 0 {
        return low;
    }
    let span = (high - low) as usize;
    (low as usize + span * index.min(total) / total) as u8
}

/// Which window is being processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// One-based window number.
    pub current: usize,
    pub total: usize,
    /// Window bounds in seconds.
    pub time_range: (f64, f64),
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub stage: Stage,
    pub percent: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_info: Option<SegmentInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
}

impl JobProgress {
    pub fn new(job_id: &str, stage: Stage, percent: u8, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage,
            percent: percent.min(100),
            message: message.into(),
            segment_info: None,
            eta_seconds: None,
        }
    }

    pub fn with_segment(mut self, info: SegmentInfo) -> Self {
        self.segment_info = Some(info);
        self
    }

    pub fn with_eta(mut self, eta: Option<Duration>) -> Self {
        self.eta_seconds = eta.map(|d| d.as_secs());
        self
    }

    /// JSON body posted to the callback URL.
    pub fn to_callback(&self) -> CallbackPayload<'_> {
        CallbackPayload {
            job_id: &self.job_id,
            status: self.stage.status(),
            progress: self.percent,
            stage: self.stage.label(),
            message: &self.message,
            segment_info: self.segment_info.as_ref(),
            eta_seconds: self.eta_seconds,
        }
    }
}

/// Wire format of a progress callback.
#[derive(Debug, Serialize)]
pub struct CallbackPayload<'a> {
    pub job_id: &'a str,
    pub status: &'static str,
    pub progress: u8,
    pub stage: &'static str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_info: Option<&'a SegmentInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
}

/// Receives progress events. Must return promptly.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress: &JobProgress);
}

impl<T: ProgressReporter + ?Sized> ProgressReporter for Arc<T> {
    fn report(&self, progress: &JobProgress) {
        (**self).report(progress)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn report(&self, _progress: &JobProgress) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, progress: &JobProgress) {
        match &progress.segment_info {
            Some(info) => tracing::debug!(
                job_id = %progress.job_id,
                stage = %progress.stage,
                percent = progress.percent,
                window = info.current,
                windows = info.total,
                "{}",
                progress.message
            ),
            None => tracing::info!(
                job_id = %progress.job_id,
                stage = %progress.stage,
                percent = progress.percent,
                "{}",
                progress.message
            ),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectorReporter {
    events: Mutex<Vec<JobProgress>>,
}

impl CollectorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobProgress> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn percents(&self) -> Vec<u8> {
        self.events().iter().map(|e| e.percent).collect()
    }
}

impl ProgressReporter for CollectorReporter {
    fn report(&self, progress: &JobProgress) {
        if let Ok(mut events) = self.events.lock() {
            events.push(progress.clone());
        }
    }
}

/// Forwards events over a bounded crossbeam channel, dropping them when full.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: crossbeam_channel::Sender<JobProgress>,
}

impl ChannelReporter {
    pub fn new(tx: crossbeam_channel::Sender<JobProgress>) -> Self {
        Self { tx }
    }

    /// Reporter plus the receiving end, with room for `capacity` events.
    pub fn bounded(capacity: usize) -> (Self, crossbeam_channel::Receiver<JobProgress>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self::new(tx), rx)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, progress: &JobProgress) {
        if let Err(crossbeam_channel::TrySendError::Full(dropped)) =
            self.tx.try_send(progress.clone())
        {
            tracing::debug!(stage = %dropped.stage, "progress channel full, event dropped");
        }
    }
}

/// Sends every event to several reporters.
#[derive(Default, Clone)]
pub struct MultiReporter {
    reporters: Vec<Arc<dyn ProgressReporter>>,
}

impl MultiReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl ProgressReporter for MultiReporter {
    fn report(&self, progress: &JobProgress) {
        for reporter in &self.reporters {
            reporter.report(progress);
        }
    }
}

/// POSTs events as JSON to a callback URL from a background task.
///
/// Events are delivered in order, each with its own timeout. Delivery
/// failures are logged and dropped.
pub struct HttpReporter {
    url: String,
    queue: Mutex<Option<tokio::sync::mpsc::UnboundedSender<JobProgress>>>,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl fmt::Debug for HttpReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpReporter").field("url", &self.url).finish()
    }
}

impl HttpReporter {
    /// Start the delivery task on `runtime`.
    pub fn spawn(url: &str, timeout: Duration, runtime: &tokio::runtime::Handle) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ScribeError::invalid_input(format!(
                "callback URL must be http(s): {url}"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScribeError::CallbackDelivery {
                message: format!("cannot build HTTP client: {}", e),
            })?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let worker = runtime.spawn(deliver(client, url.to_string(), rx));

        Ok(Self {
            url: url.to_string(),
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop accepting events and wait up to `wait` for queued ones to go out.
    pub async fn finish(&self, wait: Duration) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker
            && tokio::time::timeout(wait, worker).await.is_err()
        {
            tracing::warn!(url = %self.url, "progress callbacks still pending at shutdown");
        }
    }
}

impl ProgressReporter for HttpReporter {
    fn report(&self, progress: &JobProgress) {
        let Ok(queue) = self.queue.lock() else {
            return;
        };
        if let Some(tx) = queue.as_ref()
            && tx.send(progress.clone()).is_err()
        {
            tracing::debug!(url = %self.url, "progress delivery task has stopped");
        }
    }
}

async fn deliver(
    client: reqwest::Client,
    url: String,
    mut rx: tokio::sync::mpsc::UnboundedReceiver<JobProgress>,
) {
    while let Some(progress) = rx.recv().await {
        if let Err(e) = post(&client, &url, &progress).await {
            tracing::warn!(
                job_id = %progress.job_id,
                stage = %progress.stage,
                error = %e,
                "progress callback dropped"
            );
        }
    }
}

async fn post(client: &reqwest::Client, url: &str, progress: &JobProgress) -> Result<()> {
    let body = serde_json::to_vec(&progress.to_callback())?;
    let response = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| ScribeError::CallbackDelivery {
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScribeError::CallbackDelivery {
            message: format!("observer answered {}", status),
        });
    }
    Ok(())
}
