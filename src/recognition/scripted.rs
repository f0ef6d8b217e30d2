//! Scripted recognition engine for tests and dry runs.

use crate::config::RuntimeConfig;
use crate::defaults;
use crate::error::{Result, ScribeError};
use crate::recognition::{EngineLoader, EngineOutput, LocalSegment, RecognitionEngine};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Counters shared between a scripted engine, its clones and the test.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    loads: AtomicUsize,
    calls: AtomicUsize,
    detections: AtomicUsize,
    releases: AtomicUsize,
    languages: Mutex<Vec<Option<String>>>,
}

impl EngineStats {
    /// Models loaded (including failed attempts).
    pub fn loads(&self) -> usize {
        self.inner.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Calls made without a language, i.e. detection runs.
    pub fn detections(&self) -> usize {
        self.inner.detections.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    /// The language argument of every call, in order.
    pub fn languages_passed(&self) -> Vec<Option<String>> {
        self.inner
            .languages
            .lock()
            .map(|languages| languages.clone())
            .unwrap_or_default()
    }
}

/// Engine that replays configured results.
///
/// Without a script for a call it returns one segment spanning the whole
/// slice with the text `window <n>`.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    language: String,
    failing_calls: Vec<usize>,
    scripts: HashMap<usize, Vec<LocalSegment>>,
    call: usize,
    stats: EngineStats,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            language: defaults::FALLBACK_LANGUAGE.to_string(),
            failing_calls: Vec::new(),
            scripts: HashMap::new(),
            call: 0,
            stats: EngineStats::default(),
        }
    }

    /// Language reported by detection.
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    /// Fail the call with this zero-based index.
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.failing_calls.push(call);
        self
    }

    /// Return these segments for the call with this zero-based index.
    pub fn with_segments(mut self, call: usize, segments: Vec<LocalSegment>) -> Self {
        self.scripts.insert(call, segments);
        self
    }

    /// Handle for observing this engine after it moves into a session.
    pub fn stats(&self) -> EngineStats {
        self.stats.clone()
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn transcribe(&mut self, audio: &[i16], language: Option<&str>) -> Result<EngineOutput> {
        let call = self.call;
        self.call += 1;

        let stats = &self.stats.inner;
        stats.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut languages) = stats.languages.lock() {
            languages.push(language.map(str::to_string));
        }
        if language.is_none() {
            stats.detections.fetch_add(1, Ordering::SeqCst);
        }

        if self.failing_calls.contains(&call) {
            return Err(ScribeError::Other(format!("scripted failure on call {call}")));
        }

        let segments = match self.scripts.get(&call) {
            Some(segments) => segments.clone(),
            None if audio.is_empty() => Vec::new(),
            None => {
                let duration = audio.len() as f64 / defaults::SAMPLE_RATE as f64;
                vec![LocalSegment::new(0.0, duration, format!("window {call}"))]
            }
        };

        Ok(EngineOutput {
            segments,
            language: Some(language.unwrap_or(self.language.as_str()).to_string()),
        })
    }

    fn release(&mut self) {
        self.stats.inner.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out clones of a scripted engine.
#[derive(Debug, Clone)]
pub struct ScriptedLoader {
    template: ScriptedEngine,
    fail_open: bool,
}

impl ScriptedLoader {
    pub fn new(template: ScriptedEngine) -> Self {
        Self {
            template,
            fail_open: false,
        }
    }

    /// Make every load fail like an unavailable device.
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn stats(&self) -> EngineStats {
        self.template.stats()
    }
}

impl EngineLoader for ScriptedLoader {
    fn load(&self, model: &str, _runtime: &RuntimeConfig) -> Result<Box<dyn RecognitionEngine>> {
        self.template.stats.inner.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(ScribeError::SessionOpen {
                message: format!("scripted engine refused to load {model}"),
            });
        }
        Ok(Box::new(self.template.clone()))
    }
}
