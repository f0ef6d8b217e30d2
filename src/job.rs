//! Job orchestration: one recording in, one transcript or one error out.
//!
//! Stages run strictly in order on the calling thread:
//! segmenting, transcribing, aligning, diarizing. Only fatal errors end a
//! job early; window, alignment and diarization failures are absorbed.

use crate::audio::{AudioBuffer, AudioExtractor, MediaExtractor, MediaInfo};
use crate::config::{ChunkingConfig, Config, RuntimeConfig};
use crate::defaults;
use crate::enrich::{self, Aligner, CharRateAligner, Diarizer, Enrichment, SpeakerBounds};
use crate::error::{JobError, Result, ScribeError};
use crate::progress::{
    JobProgress, LogReporter, ProgressReporter, SegmentInfo, Stage, transcribing_percent,
};
use crate::recognition::{EngineLoader, RawSegmentResult, RecognitionSession, normalize_language};
use crate::segmenter::{SegmentPlan, Segmenter, Strategy};
use crate::stitcher::{Stitcher, TranscriptSegment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-job request parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOptions {
    pub job_id: String,
    pub model: String,
    /// `None` or "auto" detects the language from the first window.
    pub language: Option<String>,
    pub strategy: Strategy,
    pub diarize: bool,
    pub speakers: SpeakerBounds,
    /// Access token for diarization backends that need one.
    pub hf_token: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            job_id: new_job_id(),
            model: defaults::DEFAULT_MODEL.to_string(),
            language: None,
            strategy: Strategy::Auto,
            diarize: false,
            speakers: SpeakerBounds::default(),
            hf_token: None,
        }
    }
}

impl JobOptions {
    /// Options from the loaded configuration with a fresh job id.
    pub fn from_config(config: &Config) -> Self {
        Self {
            job_id: new_job_id(),
            model: config.transcription.model.clone(),
            language: normalize_language(Some(&config.transcription.language)),
            strategy: config.chunking.strategy,
            diarize: config.diarization.enabled,
            speakers: SpeakerBounds {
                min: config.diarization.min_speakers,
                max: config.diarization.max_speakers,
            },
            hf_token: config.diarization.hf_token.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ScribeError::invalid_input("model name is empty"));
        }
        self.speakers.validate()
    }
}

pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Segmenting,
    Transcribing,
    Aligning,
    Diarizing,
    Done,
    Failed,
}

impl JobState {
    /// Legal moves: forward along the pipeline (diarizing may be skipped),
    /// or to `Failed` from any non-terminal state.
    pub fn can_transition(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, Segmenting)
                | (Segmenting, Transcribing)
                | (Transcribing, Aligning)
                | (Aligning, Diarizing)
                | (Aligning, Done)
                | (Diarizing, Done)
        ) || (next == Failed && !self.is_terminal())
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    pub fn stage(self) -> Option<Stage> {
        match self {
            JobState::Created => None,
            JobState::Segmenting => Some(Stage::Segmenting),
            JobState::Transcribing => Some(Stage::Transcribing),
            JobState::Aligning => Some(Stage::Aligning),
            JobState::Diarizing => Some(Stage::Diarizing),
            JobState::Done => Some(Stage::Done),
            JobState::Failed => Some(Stage::Failed),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage() {
            Some(stage) => f.write_str(stage.label()),
            None => f.write_str("created"),
        }
    }
}

/// How one window went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSummary {
    pub id: usize,
    pub start: f64,
    pub end: f64,
    pub num_segments: usize,
    pub failed: bool,
}

/// Final result of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub job_id: String,
    pub filename: String,
    pub language: Option<String>,
    pub segments: Vec<TranscriptSegment>,
    /// Audio duration in seconds.
    pub duration: f64,
    /// Wall-clock seconds spent on the job.
    pub processing_time: f64,
    /// `duration / processing_time`; above 1 is faster than real time.
    pub realtime_factor: f64,
    pub num_segments: usize,
    pub num_chunks: usize,
    pub chunking_strategy: Strategy,
    pub resolved_strategy: Strategy,
    pub chunks: Vec<ChunkSummary>,
    pub media: MediaInfo,
}

impl Transcript {
    /// Ids of windows that produced no result because transcription failed.
    pub fn failed_chunks(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|c| c.failed)
            .map(|c| c.id)
            .collect()
    }

    /// Segment texts joined with spaces.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Current state plus the reporter that hears about changes.
struct JobTracker<'a> {
    job_id: &'a str,
    state: JobState,
    percent: u8,
    reporter: &'a dyn ProgressReporter,
}

impl<'a> JobTracker<'a> {
    fn new(job_id: &'a str, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            job_id,
            state: JobState::Created,
            percent: 0,
            reporter,
        }
    }

    fn enter(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(ScribeError::Other(format!(
                "illegal job transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(job_id = %self.job_id, from = %self.state, to = %next, "job state");
        self.state = next;
        Ok(())
    }

    fn report(&mut self, percent: u8, message: impl Into<String>) {
        self.emit(JobProgress::new(self.job_id, self.stage(), percent, message));
    }

    fn emit(&mut self, progress: JobProgress) {
        self.percent = progress.percent;
        self.reporter.report(&progress);
    }

    fn stage(&self) -> Stage {
        self.state.stage().unwrap_or(Stage::Segmenting)
    }

    fn fail(&mut self, error: &ScribeError) {
        if self.state.is_terminal() {
            return;
        }
        self.state = JobState::Failed;
        let percent = self.percent;
        self.report(percent, error.to_string());
    }
}

/// Runs jobs against one runtime configuration.
///
/// The recognition model is loaded once per job and released when its last
/// window is done.
pub struct Orchestrator<'rt> {
    runtime: &'rt RuntimeConfig,
    loader: Arc<dyn EngineLoader>,
    extractor: Arc<dyn AudioExtractor>,
    segmenter: Segmenter,
    stitcher: Stitcher,
    aligner: Option<Arc<dyn Aligner>>,
    diarizer: Option<Arc<dyn Diarizer>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<'rt> Orchestrator<'rt> {
    pub fn new(runtime: &'rt RuntimeConfig, loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            runtime,
            loader,
            extractor: Arc::new(MediaExtractor::default()),
            segmenter: Segmenter::default(),
            stitcher: Stitcher::default(),
            aligner: Some(Arc::new(CharRateAligner)),
            diarizer: None,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_chunking(mut self, config: ChunkingConfig) -> Self {
        self.segmenter = Segmenter::new(config);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn AudioExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_stitcher(mut self, stitcher: Stitcher) -> Self {
        self.stitcher = stitcher;
        self
    }

    /// Replace the word aligner; `None` skips alignment.
    pub fn with_aligner(mut self, aligner: Option<Arc<dyn Aligner>>) -> Self {
        self.aligner = aligner;
        self
    }

    pub fn with_diarizer(mut self, diarizer: Arc<dyn Diarizer>) -> Self {
        self.diarizer = Some(diarizer);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        self.runtime
    }

    /// Transcribe a media file.
    ///
    /// Intermediate audio files are deleted before this returns.
    pub fn run(&self, path: &Path, options: &JobOptions) -> std::result::Result<Transcript, JobError> {
        let started = Instant::now();
        let mut tracker = JobTracker::new(&options.job_id, self.reporter.as_ref());
        let result = tracker.enter(JobState::Segmenting).and_then(|()| {
            options.validate()?;
            tracker.report(0, format!("Extracting audio from {}", path.display()));
            let extracted = self.extractor.extract(path)?;
            self.process(
                &mut tracker,
                &extracted.audio,
                extracted.info.clone(),
                options,
                started,
            )
        });
        self.finish(&mut tracker, result)
    }

    /// Transcribe audio that is already decoded.
    pub fn run_on_audio(
        &self,
        audio: &AudioBuffer,
        media: MediaInfo,
        options: &JobOptions,
    ) -> std::result::Result<Transcript, JobError> {
        let started = Instant::now();
        let mut tracker = JobTracker::new(&options.job_id, self.reporter.as_ref());
        let result = tracker.enter(JobState::Segmenting).and_then(|()| {
            options.validate()?;
            self.process(&mut tracker, audio, media, options, started)
        });
        self.finish(&mut tracker, result)
    }

    fn finish(
        &self,
        tracker: &mut JobTracker<'_>,
        result: Result<Transcript>,
    ) -> std::result::Result<Transcript, JobError> {
        match result {
            Ok(transcript) => {
                tracing::info!(
                    job_id = %transcript.job_id,
                    duration = transcript.duration,
                    chunks = transcript.num_chunks,
                    segments = transcript.num_segments,
                    realtime_factor = transcript.realtime_factor,
                    "job complete"
                );
                Ok(transcript)
            }
            Err(error) => {
                tracing::error!(job_id = %tracker.job_id, stage = %tracker.state, error = %error, "job failed");
                tracker.fail(&error);
                Err(JobError::from(error))
            }
        }
    }

    fn process(
        &self,
        tracker: &mut JobTracker<'_>,
        audio: &AudioBuffer,
        media: MediaInfo,
        options: &JobOptions,
        started: Instant,
    ) -> Result<Transcript> {
        if audio.is_empty() {
            return Err(ScribeError::invalid_input(format!(
                "{} contains no audio",
                media.filename
            )));
        }
        let duration = audio.duration_secs();

        tracker.report(0, "Analyzing audio");
        let plan = self.segmenter.plan(duration, options.strategy, Some(audio))?;
        tracing::info!(
            job_id = %options.job_id,
            strategy = %plan.resolved,
            windows = plan.len(),
            duration,
            "audio segmented"
        );

        tracker.enter(JobState::Transcribing)?;
        let raw = self.transcribe_windows(tracker, audio, &plan, options)?;
        // A supplied language was passed to every window; echo it.
        let language = normalize_language(options.language.as_deref()).or_else(|| {
            raw.iter()
                .find_map(|r| normalize_language(r.detected_language.as_deref()))
        });

        let mut segments = self.stitcher.stitch(&raw);

        tracker.enter(JobState::Aligning)?;
        let (aligning_percent, _) = Stage::Aligning.band();
        tracker.report(aligning_percent, "Aligning words");
        if let Some(aligner) = &self.aligner
            && !segments.is_empty()
        {
            let lang = language.as_deref().unwrap_or(defaults::FALLBACK_LANGUAGE);
            if let Enrichment::Applied(aligned) =
                enrich::align::align(aligner.as_ref(), &segments, audio, lang)
            {
                segments = aligned;
            }
        }

        if let Some(diarizer) = self.diarizer_for(options) {
            tracker.enter(JobState::Diarizing)?;
            let (diarizing_percent, _) = Stage::Diarizing.band();
            tracker.report(diarizing_percent, "Identifying speakers");
            if let Enrichment::Applied(labelled) =
                enrich::diarize::diarize(diarizer.as_ref(), audio, options.speakers, &segments)?
            {
                segments = labelled;
            }
        }

        let processing_time = started.elapsed().as_secs_f64().max(1e-6);
        let chunks = raw
            .iter()
            .map(|r| ChunkSummary {
                id: r.segment_id,
                start: r.start,
                end: r.end,
                num_segments: r.segments.len(),
                failed: r.failed,
            })
            .collect();

        tracker.enter(JobState::Done)?;
        tracker.report(100, "Transcription complete");

        Ok(Transcript {
            job_id: options.job_id.clone(),
            filename: media.filename.clone(),
            language,
            num_segments: segments.len(),
            segments,
            duration,
            processing_time,
            realtime_factor: duration / processing_time,
            num_chunks: plan.len(),
            chunking_strategy: plan.requested,
            resolved_strategy: plan.resolved,
            chunks,
            media,
        })
    }

    /// Open one session and run every window through it in order.
    fn transcribe_windows(
        &self,
        tracker: &mut JobTracker<'_>,
        audio: &AudioBuffer,
        plan: &SegmentPlan,
        options: &JobOptions,
    ) -> Result<Vec<RawSegmentResult>> {
        let total = plan.len();
        tracker.report(
            transcribing_percent(0, total),
            format!("Loading model {}", options.model),
        );
        let mut session = RecognitionSession::open(
            self.loader.as_ref(),
            &options.model,
            self.runtime,
            options.language.as_deref(),
        )?;

        let started = Instant::now();
        let mut results = Vec::with_capacity(total);
        for (index, window) in plan.segments.iter().enumerate() {
            let eta = (index > 0).then(|| {
                let per_window = started.elapsed() / index as u32;
                per_window * (total - index) as u32
            });
            tracker.emit(
                JobProgress::new(
                    &options.job_id,
                    Stage::Transcribing,
                    transcribing_percent(index, total),
                    format!("Transcribing window {}/{}", index + 1, total),
                )
                .with_segment(SegmentInfo {
                    current: index + 1,
                    total,
                    time_range: (window.start, window.end),
                })
                .with_eta(eta),
            );

            let slice = audio.slice(window.start, window.end);
            match session.transcribe(window, slice) {
                Ok(result) => {
                    tracing::debug!(
                        job_id = %options.job_id,
                        window = window.id,
                        segments = result.segments.len(),
                        "window transcribed"
                    );
                    results.push(result);
                }
                Err(error) => {
                    tracing::warn!(
                        job_id = %options.job_id,
                        window = window.id,
                        start = window.start,
                        end = window.end,
                        error = %error,
                        "window failed, continuing with an empty result"
                    );
                    results.push(RawSegmentResult::empty(window));
                }
            }
        }

        tracing::debug!(
            job_id = %options.job_id,
            elapsed = ?started.elapsed(),
            language = session.language().unwrap_or("unknown"),
            "transcription stage finished"
        );
        session.close();
        Ok(results)
    }

    /// The diarizer to use, if this job asked for speakers and can have them.
    fn diarizer_for(&self, options: &JobOptions) -> Option<Arc<dyn Diarizer>> {
        if !options.diarize {
            return None;
        }
        let Some(diarizer) = &self.diarizer else {
            tracing::warn!(job_id = %options.job_id, "diarization requested but no backend installed, skipping");
            return None;
        };
        let has_token = options.hf_token.as_deref().is_some_and(|t| !t.is_empty());
        if diarizer.requires_token() && !has_token {
            tracing::warn!(job_id = %options.job_id, "diarization backend needs HF_TOKEN, skipping");
            return None;
        }
        Some(Arc::clone(diarizer))
    }
}

/// Default time budget for draining progress callbacks at shutdown.
pub const CALLBACK_DRAIN: Duration = Duration::from_secs(5);
