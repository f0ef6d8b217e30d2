//! Speech recognition: engine traits, per-window results and the job session.

pub mod scripted;
pub mod session;
pub mod whisper;

pub use scripted::{EngineStats, ScriptedEngine, ScriptedLoader};
pub use session::RecognitionSession;
pub use whisper::WhisperLoader;

use crate::config::RuntimeConfig;
use crate::defaults;
use crate::error::Result;
use crate::segmenter::AudioSegment;
use serde::{Deserialize, Serialize};

/// Text with timestamps relative to the start of the window it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl LocalSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// What an engine returns for one slice of audio.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineOutput {
    pub segments: Vec<LocalSegment>,
    /// Language the engine detected, when it was asked to detect one.
    pub language: Option<String>,
}

/// Result of transcribing one window.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSegmentResult {
    pub segment_id: usize,
    pub start: f64,
    pub end: f64,
    pub segments: Vec<LocalSegment>,
    pub detected_language: Option<String>,
    /// Set when the window failed and this is a placeholder.
    pub failed: bool,
}

impl RawSegmentResult {
    pub fn from_output(window: &AudioSegment, output: EngineOutput) -> Self {
        Self {
            segment_id: window.id,
            start: window.start,
            end: window.end,
            segments: output.segments,
            detected_language: output.language,
            failed: false,
        }
    }

    /// Placeholder for a window whose transcription failed.
    pub fn empty(window: &AudioSegment) -> Self {
        Self {
            segment_id: window.id,
            start: window.start,
            end: window.end,
            segments: Vec::new(),
            detected_language: None,
            failed: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// A loaded recognition model.
///
/// Engines are driven from one thread at a time and may keep per-model state
/// between calls.
pub trait RecognitionEngine: Send {
    /// Transcribe 16kHz mono PCM.
    ///
    /// With `language` set the engine must not run detection.
    fn transcribe(&mut self, audio: &[i16], language: Option<&str>) -> Result<EngineOutput>;

    /// Free model memory. Called once when the owning session ends.
    fn release(&mut self) {}
}

/// Loads a model onto the configured device.
pub trait EngineLoader: Send + Sync {
    fn load(&self, model: &str, runtime: &RuntimeConfig) -> Result<Box<dyn RecognitionEngine>>;
}

/// `None` for empty or "auto", lowercased code otherwise.
pub fn normalize_language(language: Option<&str>) -> Option<String> {
    language
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case(defaults::AUTO_LANGUAGE))
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_language_means_detect() {
        assert_eq!(normalize_language(None), None);
        assert_eq!(normalize_language(Some("auto")), None);
        assert_eq!(normalize_language(Some("AUTO")), None);
        assert_eq!(normalize_language(Some("  ")), None);
        assert_eq!(normalize_language(Some("DE")), Some("de".to_string()));
    }

    #[test]
    fn empty_result_keeps_window_bounds() {
        let window = AudioSegment {
            id: 2,
            start: 40.0,
            end: 70.0,
        };
        let result = RawSegmentResult::empty(&window);
        assert_eq!(result.segment_id, 2);
        assert_eq!((result.start, result.end), (40.0, 70.0));
        assert!(result.is_empty());
        assert!(result.failed);
    }

    #[test]
    fn engine_trait_is_object_safe() {
        let mut engine: Box<dyn RecognitionEngine> =
            Box::new(ScriptedEngine::new().with_language("fr"));
        let output = engine.transcribe(&[0i16; 1600], None).unwrap();
        assert_eq!(output.language.as_deref(), Some("fr"));
    }
}
