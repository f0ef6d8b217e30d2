//! Speaker labels from diarization intervals.

use crate::audio::AudioBuffer;
use crate::enrich::{Enrichment, recover};
use crate::error::{Result, ScribeError};
use crate::stitcher::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// A span of audio attributed to one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationInterval {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

impl DiarizationInterval {
    pub fn new(start: f64, end: f64, speaker: impl Into<String>) -> Self {
        Self {
            start,
            end,
            speaker: speaker.into(),
        }
    }

    fn overlap(&self, start: f64, end: f64) -> f64 {
        (self.end.min(end) - self.start.max(start)).max(0.0)
    }
}

/// Optional hint for how many speakers to expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerBounds {
    pub min: Option<u32>,
    pub max: Option<u32>,
}

impl SpeakerBounds {
    pub fn new(min: Option<u32>, max: Option<u32>) -> Result<Self> {
        let bounds = Self { min, max };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min, self.max)
            && min > max
        {
            return Err(ScribeError::invalid_input(format!(
                "min_speakers ({min}) exceeds max_speakers ({max})"
            )));
        }
        if self.max == Some(0) {
            return Err(ScribeError::invalid_input("max_speakers must be at least 1"));
        }
        Ok(())
    }
}

/// Speaker identification backend.
pub trait Diarizer: Send + Sync {
    /// Whether the backend needs an access token to load its models.
    fn requires_token(&self) -> bool {
        false
    }

    fn diarize(
        &self,
        audio: &AudioBuffer,
        bounds: SpeakerBounds,
    ) -> Result<Vec<DiarizationInterval>>;
}

/// Interval with the largest overlap with `[start, end]`.
///
/// Ties go to the interval that starts first; no overlap means no speaker.
/// A zero-length span matches every interval that contains its instant.
pub fn best_interval(
    intervals: &[DiarizationInterval],
    start: f64,
    end: f64,
) -> Option<&DiarizationInterval> {
    let point = end <= start;
    let mut best: Option<(&DiarizationInterval, f64)> = None;
    for interval in intervals {
        let overlap = interval.overlap(start, end);
        let matches = if point {
            interval.start <= start && start <= interval.end
        } else {
            overlap > 0.0
        };
        if !matches {
            continue;
        }
        best = match best {
            Some((current, current_overlap))
                if current_overlap > overlap
                    || (current_overlap == overlap && current.start <= interval.start) =>
            {
                Some((current, current_overlap))
            }
            _ => Some((interval, overlap)),
        };
    }
    best.map(|(interval, _)| interval)
}

/// Label every word, and every segment, with its best-overlapping speaker.
pub fn assign_speakers(
    intervals: &[DiarizationInterval],
    mut segments: Vec<TranscriptSegment>,
) -> Vec<TranscriptSegment> {
    for segment in &mut segments {
        for word in &mut segment.words {
            word.speaker = best_interval(intervals, word.start, word.end).map(|i| i.speaker.clone());
        }
        segment.speaker =
            best_interval(intervals, segment.start, segment.end).map(|i| i.speaker.clone());
    }
    segments
}

/// Run `diarizer` over the full audio and label `segments`.
pub fn diarize(
    diarizer: &dyn Diarizer,
    audio: &AudioBuffer,
    bounds: SpeakerBounds,
    segments: &[TranscriptSegment],
) -> Result<Enrichment<Vec<TranscriptSegment>>> {
    bounds.validate()?;
    let result = diarizer.diarize(audio, bounds).map(|mut intervals| {
        intervals.sort_by(|a, b| a.start.total_cmp(&b.start));
        tracing::debug!(intervals = intervals.len(), "diarization intervals");
        assign_speakers(&intervals, segments.to_vec())
    });
    Ok(recover("diarizing", result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stitcher::Word;

    struct FixedDiarizer(Vec<DiarizationInterval>);

    impl Diarizer for FixedDiarizer {
        fn diarize(
            &self,
            _audio: &AudioBuffer,
            _bounds: SpeakerBounds,
        ) -> Result<Vec<DiarizationInterval>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDiarizer;

    impl Diarizer for FailingDiarizer {
        fn diarize(
            &self,
            _audio: &AudioBuffer,
            _bounds: SpeakerBounds,
        ) -> Result<Vec<DiarizationInterval>> {
            Err(ScribeError::Diarization {
                message: "embedding model crashed".to_string(),
            })
        }
    }

    fn word(text: &str, start: f64, end: f64) -> Word {
        Word {
            word: text.to_string(),
            start,
            end,
            confidence: None,
            speaker: None,
        }
    }

    #[test]
    fn picks_interval_with_most_overlap() {
        let intervals = vec![
            DiarizationInterval::new(0.0, 2.0, "SPEAKER_00"),
            DiarizationInterval::new(2.0, 10.0, "SPEAKER_01"),
        ];
        let best = best_interval(&intervals, 1.5, 4.0).unwrap();
        assert_eq!(best.speaker, "SPEAKER_01");
    }

    #[test]
    fn ties_go_to_earliest_interval() {
        let intervals = vec![
            DiarizationInterval::new(2.0, 4.0, "SPEAKER_01"),
            DiarizationInterval::new(0.0, 2.0, "SPEAKER_00"),
        ];
        let best = best_interval(&intervals, 1.0, 3.0).unwrap();
        assert_eq!(best.speaker, "SPEAKER_00");
    }

    #[test]
    fn no_overlap_means_no_speaker() {
        let intervals = vec![DiarizationInterval::new(0.0, 1.0, "SPEAKER_00")];
        assert!(best_interval(&intervals, 1.0, 2.0).is_none());
        assert!(best_interval(&[], 0.0, 1.0).is_none());
    }

    #[test]
    fn point_word_takes_the_covering_interval() {
        let intervals = vec![
            DiarizationInterval::new(0.0, 3.0, "SPEAKER_00"),
            DiarizationInterval::new(3.0, 6.0, "SPEAKER_01"),
        ];
        assert_eq!(best_interval(&intervals, 4.0, 4.0).unwrap().speaker, "SPEAKER_01");
        // on a shared edge the earlier interval wins
        assert_eq!(best_interval(&intervals, 3.0, 3.0).unwrap().speaker, "SPEAKER_00");
        assert!(best_interval(&intervals, 7.0, 7.0).is_none());

        let mut segment = TranscriptSegment::new(4.0, 4.0, "blip");
        segment.words = vec![word("blip", 4.0, 4.0)];
        let labelled = assign_speakers(&intervals, vec![segment]);
        assert_eq!(labelled[0].words[0].speaker.as_deref(), Some("SPEAKER_01"));
        assert_eq!(labelled[0].speaker.as_deref(), Some("SPEAKER_01"));
    }

    #[test]
    fn words_and_segments_are_labelled() {
        let mut segment = TranscriptSegment::new(0.0, 4.0, "hello there friend");
        segment.words = vec![
            word("hello", 0.0, 1.0),
            word("there", 1.0, 2.5),
            word("friend", 3.0, 4.0),
        ];
        let intervals = vec![
            DiarizationInterval::new(0.0, 2.8, "SPEAKER_00"),
            DiarizationInterval::new(2.8, 5.0, "SPEAKER_01"),
        ];

        let labelled = assign_speakers(&intervals, vec![segment]);

        let speakers: Vec<_> = labelled[0]
            .words
            .iter()
            .map(|w| w.speaker.as_deref())
            .collect();
        assert_eq!(
            speakers,
            vec![Some("SPEAKER_00"), Some("SPEAKER_00"), Some("SPEAKER_01")]
        );
        assert_eq!(labelled[0].speaker.as_deref(), Some("SPEAKER_00"));
    }

    #[test]
    fn segments_without_words_use_segment_span() {
        let segments = vec![
            TranscriptSegment::new(0.0, 3.0, "first"),
            TranscriptSegment::new(5.0, 9.0, "second"),
        ];
        let intervals = vec![
            DiarizationInterval::new(0.0, 4.0, "A"),
            DiarizationInterval::new(4.0, 9.0, "B"),
        ];

        let labelled = assign_speakers(&intervals, segments);

        assert_eq!(labelled[0].speaker.as_deref(), Some("A"));
        assert_eq!(labelled[1].speaker.as_deref(), Some("B"));
        assert!(labelled[1].words.is_empty());
    }

    #[test]
    fn diarizer_failure_leaves_transcript_alone() {
        let audio = crate::audio::silence(1.0);
        let segments = vec![TranscriptSegment::new(0.0, 1.0, "x")];
        let outcome = diarize(&FailingDiarizer, &audio, SpeakerBounds::default(), &segments)
            .unwrap();
        assert!(!outcome.is_applied());
    }

    #[test]
    fn diarizer_rejecting_its_input_is_omitted() {
        struct PickyDiarizer;

        impl Diarizer for PickyDiarizer {
            fn diarize(
                &self,
                _audio: &AudioBuffer,
                _bounds: SpeakerBounds,
            ) -> Result<Vec<DiarizationInterval>> {
                Err(ScribeError::invalid_input("audio too short for embeddings"))
            }
        }

        let audio = crate::audio::silence(1.0);
        let segments = vec![TranscriptSegment::new(0.0, 1.0, "x")];
        let outcome =
            diarize(&PickyDiarizer, &audio, SpeakerBounds::default(), &segments).unwrap();
        assert!(outcome.reason().unwrap().contains("too short"));
    }

    #[test]
    fn unsorted_intervals_are_handled() {
        let audio = crate::audio::silence(4.0);
        let segments = vec![TranscriptSegment::new(0.0, 2.0, "x")];
        let diarizer = FixedDiarizer(vec![
            DiarizationInterval::new(1.0, 2.0, "late"),
            DiarizationInterval::new(0.0, 1.0, "early"),
        ]);

        let labelled = diarize(&diarizer, &audio, SpeakerBounds::default(), &segments)
            .unwrap()
            .applied()
            .unwrap();

        assert_eq!(labelled[0].speaker.as_deref(), Some("early"));
    }

    #[test]
    fn inverted_bounds_are_invalid_input() {
        assert!(SpeakerBounds::new(Some(3), Some(2)).is_err());
        assert!(SpeakerBounds::new(Some(2), Some(3)).is_ok());
        assert!(SpeakerBounds::new(None, Some(0)).is_err());

        let audio = crate::audio::silence(1.0);
        let bounds = SpeakerBounds {
            min: Some(5),
            max: Some(1),
        };
        let diarizer = FixedDiarizer(Vec::new());
        assert!(diarize(&diarizer, &audio, bounds, &[]).is_err());
    }
}
