//! Frame energy analysis for finding pauses in decoded audio.
//!
//! Both boundary-aware chunking strategies run on this: `vad` looks for short
//! pauses between speech, `silence` for long stretches below a dBFS floor.

use crate::audio::AudioBuffer;
use crate::defaults;

/// Calculate RMS (Root Mean Square) level of audio samples.
/// Returns a value between 0.0 and 1.0.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Linear amplitude for a dBFS level (-20 dB -> 0.1).
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// A stretch of audio quieter than the detector threshold, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuietSpan {
    pub start: f64,
    pub end: f64,
}

impl QuietSpan {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Where a window boundary should go inside this pause.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// Threshold detector over fixed-length analysis frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyDetector {
    /// RMS at or below which a frame is quiet.
    pub threshold: f32,
    /// Pauses shorter than this are ignored.
    pub min_quiet_secs: f64,
    /// Loud bursts shorter than this are treated as noise inside a pause.
    pub min_loud_secs: f64,
    pub frame_ms: u32,
}

impl EnergyDetector {
    /// Speech/pause detector used by the `vad` strategy.
    pub fn speech(threshold: f32, min_silence_secs: f64) -> Self {
        Self {
            threshold,
            min_quiet_secs: min_silence_secs,
            min_loud_secs: 0.25,
            frame_ms: defaults::ENERGY_FRAME_MS,
        }
    }

    /// Level-floor detector used by the `silence` strategy.
    pub fn silence(threshold_db: f32, min_duration_secs: f64) -> Self {
        Self {
            threshold: db_to_amplitude(threshold_db),
            min_quiet_secs: min_duration_secs,
            min_loud_secs: 0.0,
            frame_ms: defaults::ENERGY_FRAME_MS,
        }
    }

    /// RMS level of every analysis frame.
    pub fn frame_levels(&self, audio: &AudioBuffer) -> Vec<f32> {
        let frame_len = self.frame_len(audio.sample_rate());
        audio
            .samples()
            .chunks(frame_len)
            .map(calculate_rms)
            .collect()
    }

    /// Pauses of at least `min_quiet_secs`, in order.
    pub fn quiet_spans(&self, audio: &AudioBuffer) -> Vec<QuietSpan> {
        if audio.is_empty() {
            return Vec::new();
        }
        let frame_secs = self.frame_len(audio.sample_rate()) as f64 / audio.sample_rate() as f64;
        let mut quiet: Vec<bool> = self
            .frame_levels(audio)
            .into_iter()
            .map(|level| level <= self.threshold)
            .collect();

        // Fold short loud blips into the surrounding pause
        let min_loud_frames = (self.min_loud_secs / frame_secs).ceil() as usize;
        if min_loud_frames > 1 {
            let mut i = 0;
            while i < quiet.len() {
                if quiet[i] {
                    i += 1;
                    continue;
                }
                let run_start = i;
                while i < quiet.len() && !quiet[i] {
                    i += 1;
                }
                let bounded = run_start > 0 && i < quiet.len();
                if bounded && i - run_start < min_loud_frames {
                    quiet[run_start..i].iter_mut().for_each(|q| *q = true);
                }
            }
        }

        let duration = audio.duration_secs();
        let mut spans = Vec::new();
        let mut run_start: Option<usize> = None;
        for (index, &is_quiet) in quiet.iter().chain(std::iter::once(&false)).enumerate() {
            match (is_quiet, run_start) {
                (true, None) => run_start = Some(index),
                (false, Some(start)) => {
                    let span = QuietSpan {
                        start: start as f64 * frame_secs,
                        end: (index as f64 * frame_secs).min(duration),
                    };
                    if span.duration() >= self.min_quiet_secs {
                        spans.push(span);
                    }
                    run_start = None;
                }
                _ => {}
            }
        }
        spans
    }

    fn frame_len(&self, sample_rate: u32) -> usize {
        ((sample_rate as u64 * self.frame_ms as u64) / 1000).max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(seconds: f64, amplitude: i16) -> Vec<i16> {
        let len = (seconds * 16000.0) as usize;
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    fn buffer(parts: &[(f64, i16)]) -> AudioBuffer {
        let samples = parts
            .iter()
            .flat_map(|&(secs, amp)| tone(secs, amp))
            .collect();
        AudioBuffer::new(samples, 16000)
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(calculate_rms(&[0; 100]), 0.0);
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_full_scale_square_is_one() {
        let rms = calculate_rms(&[i16::MAX, -i16::MAX, i16::MAX, -i16::MAX]);
        assert!((rms - 1.0).abs() < 0.001);
    }

    #[test]
    fn db_conversion() {
        assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-6);
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-6);
        assert!(db_to_amplitude(-50.0) < 0.004);
    }

    #[test]
    fn finds_pause_between_speech() {
        let audio = buffer(&[(2.0, 8000), (1.0, 0), (2.0, 8000)]);
        let spans = EnergyDetector::speech(0.02, 0.3).quiet_spans(&audio);

        assert_eq!(spans.len(), 1);
        assert!((spans[0].start - 2.0).abs() < 0.05, "{:?}", spans[0]);
        assert!((spans[0].end - 3.0).abs() < 0.05, "{:?}", spans[0]);
        assert!((spans[0].midpoint() - 2.5).abs() < 0.05);
    }

    #[test]
    fn short_pauses_are_ignored() {
        let audio = buffer(&[(1.0, 8000), (0.1, 0), (1.0, 8000)]);
        assert!(EnergyDetector::speech(0.02, 0.3).quiet_spans(&audio).is_empty());
    }

    #[test]
    fn short_blip_does_not_split_a_pause() {
        let audio = buffer(&[(1.0, 8000), (0.5, 0), (0.06, 8000), (0.5, 0), (1.0, 8000)]);
        let spans = EnergyDetector::speech(0.02, 0.3).quiet_spans(&audio);

        assert_eq!(spans.len(), 1);
        assert!(spans[0].duration() > 0.9, "{:?}", spans[0]);
    }

    #[test]
    fn trailing_silence_is_reported() {
        let audio = buffer(&[(1.0, 8000), (3.0, 0)]);
        let spans = EnergyDetector::silence(-50.0, 2.0).quiet_spans(&audio);

        assert_eq!(spans.len(), 1);
        assert!((spans[0].end - 4.0).abs() < 1e-9);
    }

    #[test]
    fn silence_detector_respects_db_floor() {
        // ~-30 dBFS is not silent at a -50 dB floor
        let audio = buffer(&[(1.0, 8000), (3.0, 1000), (1.0, 8000)]);
        assert!(EnergyDetector::silence(-50.0, 2.0).quiet_spans(&audio).is_empty());
    }

    #[test]
    fn empty_audio_has_no_spans() {
        let audio = AudioBuffer::new(Vec::new(), 16000);
        assert!(EnergyDetector::speech(0.02, 0.3).quiet_spans(&audio).is_empty());
    }
}
