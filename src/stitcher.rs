//! Merges per-window recognition results into one transcript timeline.
//!
//! Handles:
//! - Shifting window-local timestamps to absolute ones
//! - Whisper annotation markers (`[MUSIC]`, `(inaudible)`, `*laughs*`)
//! - Duplicates in the overlap between consecutive windows (later window wins)
//! - Repeated words where a kept segment meets the next one

use crate::recognition::RawSegmentResult;
use serde::{Deserialize, Serialize};

/// A word with absolute timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Stitched, globally timestamped transcript unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<Word>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            words: Vec::new(),
            speaker: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Configuration for the stitcher.
#[derive(Debug, Clone)]
pub struct StitcherConfig {
    /// Whether to remove repeated words where trimmed segments meet.
    pub deduplicate_boundaries: bool,
    /// Minimum length for a single repeated word to count as a duplicate.
    pub min_word_length: usize,
    /// Longest run of repeated words that is removed.
    pub max_repeat_words: usize,
}

impl Default for StitcherConfig {
    fn default() -> Self {
        Self {
            deduplicate_boundaries: true,
            min_word_length: 2,
            max_repeat_words: 8,
        }
    }
}

/// Combines window results in order.
#[derive(Debug, Clone, Default)]
pub struct Stitcher {
    config: StitcherConfig,
}

impl Stitcher {
    pub fn new(config: StitcherConfig) -> Self {
        Self { config }
    }

    /// Stitch window results into a sorted, non-overlapping segment list.
    pub fn stitch(&self, results: &[RawSegmentResult]) -> Vec<TranscriptSegment> {
        let mut ordered: Vec<&RawSegmentResult> = results.iter().collect();
        ordered.sort_by_key(|r| r.segment_id);

        let mut out: Vec<TranscriptSegment> = Vec::new();
        let mut covered_until = f64::NEG_INFINITY;
        let mut replaced = 0usize;

        for result in ordered {
            let current = globalize(result);

            // Earlier-window segments lying wholly in the overlap are replaced
            // by whatever this window heard at the same time.
            if result.start < covered_until && !current.is_empty() {
                let zone_start = result.start;
                let zone_end = covered_until;
                let split = out.partition_point(|s| s.start < zone_start);
                let tail = out.split_off(split);
                let before = tail.len();
                out.extend(tail.into_iter().filter(|earlier| {
                    let inside = earlier.end <= zone_end;
                    let reheard = current
                        .iter()
                        .any(|c| c.start < earlier.end && c.end > earlier.start);
                    !(inside && reheard)
                }));
                replaced += before - (out.len() - split);
            }

            // Merge by start time; earlier segments that were not re-heard may
            // still sit after this one in the overlap zone.
            for mut segment in current {
                let at = out.partition_point(|s| s.start <= segment.start);
                if let Some(prev) = at.checked_sub(1).map(|i| &out[i]) {
                    if segment.end <= prev.end {
                        continue;
                    }
                    if segment.start < prev.end {
                        segment.start = prev.end;
                        if self.config.deduplicate_boundaries {
                            segment.text = self.drop_repeated_words(&prev.text, &segment.text);
                        }
                        if segment.text.is_empty() {
                            continue;
                        }
                    }
                }
                if let Some(next) = out.get(at)
                    && segment.end > next.start
                {
                    segment.end = next.start.max(segment.start);
                }
                out.insert(at, segment);
            }
            covered_until = covered_until.max(result.end);
        }

        if replaced > 0 {
            tracing::debug!(replaced, "overlap duplicates replaced by later windows");
        }
        out
    }

    /// Remove leading words of `next` that repeat the trailing words of `kept`.
    fn drop_repeated_words(&self, kept: &str, next: &str) -> String {
        let kept_words: Vec<&str> = kept.split_whitespace().collect();
        let next_words: Vec<&str> = next.split_whitespace().collect();
        let limit = self
            .config
            .max_repeat_words
            .min(kept_words.len())
            .min(next_words.len());

        let repeated = (1..=limit)
            .rev()
            .find(|&k| {
                let tail = &kept_words[kept_words.len() - k..];
                let head = &next_words[..k];
                let same = tail
                    .iter()
                    .zip(head)
                    .all(|(a, b)| normalize_word(a) == normalize_word(b));
                same && (k > 1 || normalize_word(head[0]).len() >= self.config.min_word_length)
            })
            .unwrap_or(0);

        next_words[repeated..].join(" ")
    }
}

/// Stitch with default settings.
pub fn stitch(results: &[RawSegmentResult]) -> Vec<TranscriptSegment> {
    Stitcher::default().stitch(results)
}

/// Shift a window's sub-segments to absolute time, clipped to the window.
fn globalize(result: &RawSegmentResult) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = result
        .segments
        .iter()
        .filter_map(|local| {
            let text = clean_transcription(&local.text);
            if text.is_empty() {
                return None;
            }
            let start = (result.start + local.start).clamp(result.start, result.end);
            let end = (result.start + local.end).clamp(start, result.end);
            Some(TranscriptSegment::new(start, end, text))
        })
        .collect();
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}

fn normalize_word(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Remove Whisper annotations like `[BLANK_AUDIO]`, `(inaudible)`, `*sighs*`.
///
/// Unmatched openers are kept as text.
pub fn clean_transcription(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        let close = match ch {
            '[' => ']',
            '(' => ')',
            '*' => '*',
            _ => {
                result.push(ch);
                continue;
            }
        };
        let mut buf = String::new();
        let mut found_close = false;
        while let Some(&inner) = chars.peek() {
            chars.next();
            if inner == close {
                found_close = true;
                break;
            }
            buf.push(inner);
        }
        if !found_close {
            result.push(ch);
            result.push_str(&buf);
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}
