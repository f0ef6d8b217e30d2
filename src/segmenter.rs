//! Splits a recording into ordered, possibly overlapping processing windows.
//!
//! Every plan covers `[0, duration)` without gaps. Fixed-size windows overlap
//! by the configured amount; windows cut inside a pause do not overlap.

use crate::audio::AudioBuffer;
use crate::audio::energy::EnergyDetector;
use crate::config::ChunkingConfig;
use crate::error::{Result, ScribeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chunking strategy selected by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Single window for short inputs, `vad` otherwise.
    #[default]
    Auto,
    /// Cut at pauses between speech.
    Vad,
    /// Fixed-size overlapping windows.
    Time,
    /// Cut inside long stretches below a level floor.
    Silence,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Auto,
        Strategy::Vad,
        Strategy::Time,
        Strategy::Silence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Auto => "auto",
            Strategy::Vad => "vad",
            Strategy::Time => "time",
            Strategy::Silence => "silence",
        }
    }
}

impl FromStr for Strategy {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Strategy::Auto),
            "vad" => Ok(Strategy::Vad),
            "time" => Ok(Strategy::Time),
            "silence" => Ok(Strategy::Silence),
            other => Err(ScribeError::invalid_input(format!(
                "unknown chunking strategy '{other}' (expected auto, vad, time or silence)"
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One processing window, in seconds from the start of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Zero-based position in the plan.
    pub id: usize,
    pub start: f64,
    pub end: f64,
}

impl AudioSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Windows for a job plus the strategy that actually produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPlan {
    pub requested: Strategy,
    pub resolved: Strategy,
    pub segments: Vec<AudioSegment>,
}

impl SegmentPlan {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Produces window boundaries for a known duration.
pub trait ChunkingStrategy {
    /// `(start, end)` pairs in order, covering `[0, duration)`.
    fn windows(&self, duration: f64) -> Vec<(f64, f64)>;
}

/// One window spanning the whole input.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleWindow;

impl ChunkingStrategy for SingleWindow {
    fn windows(&self, duration: f64) -> Vec<(f64, f64)> {
        vec![(0.0, duration)]
    }
}

/// Fixed-size windows with a constant overlap; the last one is truncated.
#[derive(Debug, Clone, Copy)]
pub struct TimeStrategy {
    pub chunk_duration: f64,
    pub overlap_duration: f64,
}

impl ChunkingStrategy for TimeStrategy {
    fn windows(&self, duration: f64) -> Vec<(f64, f64)> {
        let step = self.chunk_duration - self.overlap_duration;
        let mut windows = Vec::new();
        let mut start = 0.0;
        loop {
            let end = (start + self.chunk_duration).min(duration);
            windows.push((start, end));
            if end >= duration {
                break;
            }
            start += step;
        }
        windows
    }
}

/// Windows that end inside detected pauses.
///
/// A window ends at the last pause midpoint within `chunk_duration`; failing
/// that, at the first one within `max_window`. With no pause in reach it falls
/// back to a fixed-size window that overlaps the next one.
#[derive(Debug, Clone)]
pub struct BoundaryStrategy {
    cuts: Vec<f64>,
    pub chunk_duration: f64,
    pub overlap_duration: f64,
    pub max_window: f64,
}

impl BoundaryStrategy {
    /// Analyse `audio` for pauses with the given detector.
    pub fn detect(
        detector: &EnergyDetector,
        audio: &AudioBuffer,
        chunk_duration: f64,
        overlap_duration: f64,
        max_window: f64,
    ) -> Self {
        let cuts = detector
            .quiet_spans(audio)
            .iter()
            .map(|span| span.midpoint())
            .collect();
        Self::with_cuts(cuts, chunk_duration, overlap_duration, max_window)
    }

    /// Build from already known cut points (seconds, ascending).
    pub fn with_cuts(
        cuts: Vec<f64>,
        chunk_duration: f64,
        overlap_duration: f64,
        max_window: f64,
    ) -> Self {
        Self {
            cuts,
            chunk_duration,
            overlap_duration,
            max_window: max_window.max(chunk_duration),
        }
    }

    pub fn cuts(&self) -> &[f64] {
        &self.cuts
    }

    fn next_cut(&self, start: f64) -> Option<f64> {
        // Avoid slivers right after the previous boundary
        let earliest = start + self.chunk_duration / 4.0;
        let preferred = start + self.chunk_duration;
        let latest = start + self.max_window;

        self.cuts
            .iter()
            .copied()
            .filter(|&cut| cut >= earliest && cut <= preferred)
            .next_back()
            .or_else(|| {
                self.cuts
                    .iter()
                    .copied()
                    .find(|&cut| cut > preferred && cut <= latest)
            })
    }
}

impl ChunkingStrategy for BoundaryStrategy {
    fn windows(&self, duration: f64) -> Vec<(f64, f64)> {
        let mut windows = Vec::new();
        let mut start = 0.0;
        loop {
            if duration - start <= self.chunk_duration {
                windows.push((start, duration));
                break;
            }
            match self.next_cut(start).filter(|&cut| cut < duration) {
                Some(cut) => {
                    windows.push((start, cut));
                    start = cut;
                }
                None => {
                    let end = start + self.chunk_duration;
                    windows.push((start, end));
                    start = end - self.overlap_duration;
                }
            }
        }
        windows
    }
}

/// Chooses and runs a chunking strategy for a job.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: ChunkingConfig,
}

impl Segmenter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Plan windows for `duration` seconds of audio.
    ///
    /// Boundary strategies need the decoded audio; without it they fall back
    /// to fixed-size windows.
    pub fn plan(
        &self,
        duration: f64,
        strategy: Strategy,
        audio: Option<&AudioBuffer>,
    ) -> Result<SegmentPlan> {
        let config = &self.config;
        validate(duration, config.chunk_duration, config.overlap_duration)?;

        let resolved = match strategy {
            Strategy::Auto if duration < config.auto_threshold => Strategy::Auto,
            Strategy::Auto => Strategy::Vad,
            other => other,
        };
        let time = TimeStrategy {
            chunk_duration: config.chunk_duration,
            overlap_duration: config.overlap_duration,
        };
        let max_window = config.chunk_duration * config.max_window_factor;

        let (resolved, windows) = match (resolved, audio) {
            (Strategy::Auto, _) => (Strategy::Auto, SingleWindow.windows(duration)),
            (Strategy::Time, _) => (Strategy::Time, time.windows(duration)),
            (Strategy::Vad, Some(audio)) => {
                let detector = EnergyDetector::speech(config.vad_threshold, config.vad_min_silence);
                let boundary = BoundaryStrategy::detect(
                    &detector,
                    audio,
                    config.chunk_duration,
                    config.overlap_duration,
                    max_window,
                );
                (Strategy::Vad, boundary.windows(duration))
            }
            (Strategy::Silence, Some(audio)) => {
                let detector = EnergyDetector::silence(
                    config.silence_threshold_db,
                    config.silence_min_duration,
                );
                let boundary = BoundaryStrategy::detect(
                    &detector,
                    audio,
                    config.chunk_duration,
                    config.overlap_duration,
                    max_window,
                );
                (Strategy::Silence, boundary.windows(duration))
            }
            (boundary, None) => {
                tracing::debug!(
                    strategy = %boundary,
                    "no decoded audio for boundary detection, using fixed-size windows"
                );
                (Strategy::Time, time.windows(duration))
            }
        };

        let segments = number(windows);
        tracing::debug!(
            requested = %strategy,
            resolved = %resolved,
            windows = segments.len(),
            duration,
            "segmentation planned"
        );
        Ok(SegmentPlan {
            requested: strategy,
            resolved,
            segments,
        })
    }
}

/// Windows for `duration` seconds with default thresholds and no audio analysis.
pub fn segment(
    duration: f64,
    strategy: Strategy,
    chunk_duration: f64,
    overlap_duration: f64,
) -> Result<Vec<AudioSegment>> {
    let config = ChunkingConfig {
        chunk_duration,
        overlap_duration,
        ..ChunkingConfig::default()
    };
    Ok(Segmenter::new(config)
        .plan(duration, strategy, None)?
        .segments)
}

fn validate(duration: f64, chunk_duration: f64, overlap_duration: f64) -> Result<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(ScribeError::invalid_input(format!(
            "audio duration must be positive, got {duration}"
        )));
    }
    if !chunk_duration.is_finite() || chunk_duration <= 0.0 {
        return Err(ScribeError::invalid_input(format!(
            "chunk duration must be positive, got {chunk_duration}"
        )));
    }
    if !(0.0..chunk_duration).contains(&overlap_duration) {
        return Err(ScribeError::invalid_input(format!(
            "overlap {overlap_duration} must be non-negative and shorter than chunk {chunk_duration}"
        )));
    }
    Ok(())
}

fn number(windows: Vec<(f64, f64)>) -> Vec<AudioSegment> {
    windows
        .into_iter()
        .filter(|(start, end)| end > start)
        .enumerate()
        .map(|(id, (start, end))| AudioSegment { id, start, end })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn bounds(segments: &[AudioSegment]) -> Vec<(f64, f64)> {
        segments.iter().map(|s| (s.start, s.end)).collect()
    }

    fn assert_covers(segments: &[AudioSegment], duration: f64) {
        assert!(!segments.is_empty());
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments.last().unwrap().end, duration);
        for pair in segments.windows(2) {
            assert!(
                pair[1].start <= pair[0].end,
                "gap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
            assert!(pair[1].start > pair[0].start);
        }
        for (i, s) in segments.iter().enumerate() {
            assert_eq!(s.id, i);
            assert!(s.start < s.end, "empty window {s:?}");
        }
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("VAD".parse::<Strategy>().unwrap(), Strategy::Vad);
        assert_eq!(" time ".parse::<Strategy>().unwrap(), Strategy::Time);
        for strategy in Strategy::ALL {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
    }

    #[test]
    fn unknown_strategy_is_invalid_input() {
        let err = "chunky".parse::<Strategy>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn time_windows_step_by_chunk_minus_overlap() {
        let segments = segment(70.0, Strategy::Time, 30.0, 10.0).unwrap();
        assert_eq!(
            bounds(&segments),
            vec![(0.0, 30.0), (20.0, 50.0), (40.0, 70.0)]
        );
    }

    #[test]
    fn time_last_window_is_truncated() {
        let segments = segment(45.0, Strategy::Time, 30.0, 10.0).unwrap();
        assert_eq!(bounds(&segments), vec![(0.0, 30.0), (20.0, 45.0)]);
    }

    #[test]
    fn time_without_overlap_is_contiguous() {
        let segments = segment(65.0, Strategy::Time, 30.0, 0.0).unwrap();
        assert_eq!(
            bounds(&segments),
            vec![(0.0, 30.0), (30.0, 60.0), (60.0, 65.0)]
        );
    }

    #[test]
    fn short_input_is_a_single_window() {
        let segments = segment(10.0, Strategy::Time, 30.0, 10.0).unwrap();
        assert_eq!(bounds(&segments), vec![(0.0, 10.0)]);
    }

    #[test]
    fn auto_below_threshold_is_one_window() {
        let plan = Segmenter::default()
            .plan(30.0, Strategy::Auto, None)
            .unwrap();
        assert_eq!(plan.resolved, Strategy::Auto);
        assert_eq!(bounds(&plan.segments), vec![(0.0, 30.0)]);
    }

    #[test]
    fn auto_above_threshold_delegates_to_vad() {
        let audio = crate::audio::silence(700.0);
        let plan = Segmenter::default()
            .plan(700.0, Strategy::Auto, Some(&audio))
            .unwrap();
        assert_eq!(plan.requested, Strategy::Auto);
        assert_eq!(plan.resolved, Strategy::Vad);
        assert!(plan.len() > 1);
        assert_covers(&plan.segments, 700.0);
    }

    #[test]
    fn boundary_strategy_without_audio_falls_back_to_time() {
        let plan = Segmenter::default()
            .plan(100.0, Strategy::Silence, None)
            .unwrap();
        assert_eq!(plan.resolved, Strategy::Time);
        assert_covers(&plan.segments, 100.0);
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        for duration in [0.0, -1.0, f64::NAN] {
            let err = segment(duration, Strategy::Time, 30.0, 10.0).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "duration {duration}");
        }
    }

    #[test]
    fn overlap_must_be_shorter_than_chunk() {
        assert!(segment(100.0, Strategy::Time, 30.0, 30.0).is_err());
        assert!(segment(100.0, Strategy::Time, 30.0, -1.0).is_err());
        assert!(segment(100.0, Strategy::Time, 0.0, 0.0).is_err());
    }

    #[test]
    fn boundary_prefers_last_cut_within_chunk() {
        let strategy = BoundaryStrategy::with_cuts(vec![12.0, 25.0, 40.0, 70.0], 30.0, 10.0, 60.0);
        let windows = strategy.windows(90.0);
        assert_eq!(windows, vec![(0.0, 25.0), (25.0, 40.0), (40.0, 70.0), (70.0, 90.0)]);
    }

    #[test]
    fn boundary_reaches_past_chunk_up_to_max_window() {
        let strategy = BoundaryStrategy::with_cuts(vec![45.0], 30.0, 10.0, 60.0);
        assert_eq!(strategy.windows(70.0), vec![(0.0, 45.0), (45.0, 70.0)]);
    }

    #[test]
    fn boundary_falls_back_to_fixed_windows_on_loud_audio() {
        let strategy = BoundaryStrategy::with_cuts(Vec::new(), 30.0, 10.0, 60.0);
        assert_eq!(
            strategy.windows(70.0),
            vec![(0.0, 30.0), (20.0, 50.0), (40.0, 70.0)]
        );
    }

    #[test]
    fn boundary_ignores_cuts_too_close_to_window_start() {
        let strategy = BoundaryStrategy::with_cuts(vec![2.0, 28.0], 30.0, 10.0, 60.0);
        assert_eq!(strategy.windows(50.0), vec![(0.0, 28.0), (28.0, 50.0)]);
    }

    #[test]
    fn boundary_windows_never_exceed_max_window() {
        let strategy = BoundaryStrategy::with_cuts(vec![100.0], 30.0, 10.0, 60.0);
        for (start, end) in strategy.windows(200.0) {
            assert!(end - start <= 60.0 + 1e-9, "window {start}..{end} too long");
        }
    }

    #[test]
    fn vad_cuts_at_pauses_in_real_audio() {
        // 20 s speech, 1 s pause, 20 s speech
        let mut samples: Vec<i16> = (0..320_000)
            .map(|i| if i % 2 == 0 { 8000 } else { -8000 })
            .collect();
        samples.extend(std::iter::repeat_n(0i16, 16_000));
        samples.extend((0..320_000).map(|i| if i % 2 == 0 { 8000 } else { -8000 }));
        let audio = AudioBuffer::new(samples, 16000);
        let duration = audio.duration_secs();

        let plan = Segmenter::default()
            .plan(duration, Strategy::Vad, Some(&audio))
            .unwrap();

        assert_eq!(plan.len(), 2, "{:?}", plan.segments);
        let cut = plan.segments[0].end;
        assert!((20.0..21.0).contains(&cut), "cut at {cut}");
        assert_eq!(plan.segments[1].start, cut);
        assert_covers(&plan.segments, duration);
    }
}
