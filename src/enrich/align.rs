//! Word-level timestamps for stitched segments.

use crate::audio::AudioBuffer;
use crate::enrich::{Enrichment, recover};
use crate::error::{Result, ScribeError};
use crate::stitcher::{TranscriptSegment, Word};

/// Produces per-word timestamps for a whole transcript.
///
/// Runs once over the full stitched list with the full audio, so the
/// implementation sees complete context.
pub trait Aligner: Send + Sync {
    fn align(
        &self,
        segments: &[TranscriptSegment],
        audio: &AudioBuffer,
        language: &str,
    ) -> Result<Vec<TranscriptSegment>>;
}

/// Spreads each segment's duration over its words by character count.
///
/// Needs no model; confidences are left empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharRateAligner;

impl Aligner for CharRateAligner {
    fn align(
        &self,
        segments: &[TranscriptSegment],
        _audio: &AudioBuffer,
        _language: &str,
    ) -> Result<Vec<TranscriptSegment>> {
        Ok(segments
            .iter()
            .map(|segment| {
                let mut aligned = segment.clone();
                aligned.words = spread_words(segment);
                aligned
            })
            .collect())
    }
}

fn spread_words(segment: &TranscriptSegment) -> Vec<Word> {
    let tokens: Vec<&str> = segment.text.split_whitespace().collect();
    let weights: Vec<usize> = tokens
        .iter()
        .map(|t| t.chars().filter(|c| c.is_alphanumeric()).count().max(1))
        .collect();
    let total: usize = weights.iter().sum();
    if total == 0 {
        return Vec::new();
    }

    let per_weight = segment.duration().max(0.0) / total as f64;
    let mut cursor = segment.start;
    tokens
        .iter()
        .zip(&weights)
        .enumerate()
        .map(|(i, (token, &weight))| {
            let start = cursor;
            let end = if i + 1 == tokens.len() {
                segment.end
            } else {
                start + per_weight * weight as f64
            };
            cursor = end;
            Word {
                word: token.to_string(),
                start,
                end,
                confidence: None,
                speaker: None,
            }
        })
        .collect()
}

/// Run `aligner` and check that it kept the transcript intact.
///
/// An aligner that changes the number of segments or their text is treated
/// as a failed alignment. Failures never propagate.
pub fn align(
    aligner: &dyn Aligner,
    segments: &[TranscriptSegment],
    audio: &AudioBuffer,
    language: &str,
) -> Enrichment<Vec<TranscriptSegment>> {
    let result = aligner.align(segments, audio, language).and_then(|aligned| {
        let intact = aligned.len() == segments.len()
            && aligned.iter().zip(segments).all(|(a, s)| a.text == s.text);
        if intact {
            Ok(aligned)
        } else {
            Err(ScribeError::Alignment {
                message: format!(
                    "aligner returned {} segments that do not match the {} stitched ones",
                    aligned.len(),
                    segments.len()
                ),
            })
        }
    });
    recover("aligning", result)
}
