//! One loaded model reused across every window of a job.

use crate::config::RuntimeConfig;
use crate::error::{Result, ScribeError};
use crate::recognition::{EngineLoader, RawSegmentResult, RecognitionEngine, normalize_language};
use crate::segmenter::AudioSegment;
use std::fmt;
use std::time::Instant;

/// Exclusive handle on a loaded recognition engine.
///
/// The engine is released exactly once: by [`close`](Self::close) or, if the
/// session is dropped early, by `Drop`.
pub struct RecognitionSession {
    engine: Option<Box<dyn RecognitionEngine>>,
    model: String,
    language: Option<String>,
    windows: usize,
}

impl fmt::Debug for RecognitionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognitionSession")
            .field("model", &self.model)
            .field("language", &self.language)
            .field("windows", &self.windows)
            .field("open", &self.engine.is_some())
            .finish()
    }
}

impl RecognitionSession {
    /// Load the model. `language` of `None` or "auto" enables detection on
    /// the first window that reports one.
    pub fn open(
        loader: &dyn EngineLoader,
        model: &str,
        runtime: &RuntimeConfig,
        language: Option<&str>,
    ) -> Result<Self> {
        let started = Instant::now();
        let engine = loader.load(model, runtime).map_err(|e| match e {
            e @ (ScribeError::ModelNotFound { .. } | ScribeError::SessionOpen { .. }) => e,
            other => ScribeError::SessionOpen {
                message: other.to_string(),
            },
        })?;

        tracing::info!(
            model,
            device = %runtime.device,
            compute_type = %runtime.compute_type,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recognition session opened"
        );

        Ok(Self {
            engine: Some(engine),
            model: model.to_string(),
            language: normalize_language(language),
            windows: 0,
        })
    }

    /// Transcribe one window's audio.
    ///
    /// Until a language is known the engine detects it; the first detected
    /// language is then passed explicitly to every later window.
    pub fn transcribe(&mut self, window: &AudioSegment, audio: &[i16]) -> Result<RawSegmentResult> {
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| ScribeError::Other("recognition session already closed".to_string()))?;

        let output = engine
            .transcribe(audio, self.language.as_deref())
            .map_err(|e| ScribeError::WindowTranscription {
                window: window.id,
                message: e.to_string(),
            })?;
        self.windows += 1;

        if self.language.is_none()
            && let Some(detected) = normalize_language(output.language.as_deref())
        {
            tracing::info!(window = window.id, language = %detected, "language detected");
            self.language = Some(detected);
        }

        Ok(RawSegmentResult::from_output(window, output))
    }

    /// Language passed to the engine for the next window.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Windows transcribed successfully so far.
    pub fn windows_transcribed(&self) -> usize {
        self.windows
    }

    pub fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    /// Release the engine and its device memory.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.release();
            tracing::debug!(
                model = %self.model,
                windows = self.windows,
                "recognition session closed"
            );
        }
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        self.release();
    }
}
