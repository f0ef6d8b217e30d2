//! Audio input: decoded PCM buffers, media metadata and extractors.

pub mod energy;
pub mod ffmpeg;
pub mod wav;

use crate::defaults;
use crate::error::{Result, ScribeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Container extensions that always go through ffmpeg.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm"];

/// Mono 16-bit PCM held in memory for the whole job.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<i16>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples between `start` and `end` seconds, clamped to the buffer.
    pub fn slice(&self, start: f64, end: f64) -> &[i16] {
        let rate = self.sample_rate as f64;
        let from = ((start.max(0.0) * rate) as usize).min(self.samples.len());
        let to = ((end.max(0.0) * rate).ceil() as usize).clamp(from, self.samples.len());
        &self.samples[from..to]
    }
}

/// What the extractor learned about the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub filename: String,
    /// Lowercased file extension ("wav", "mp4", ...).
    pub format: String,
    pub audio_codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    pub source_sample_rate: u32,
    pub source_channels: u16,
    pub duration: f64,
    pub size_bytes: u64,
}

/// Decoded audio plus the scratch directory that holds any intermediate file.
///
/// Dropping this value deletes the scratch directory.
#[derive(Debug)]
pub struct ExtractedAudio {
    pub audio: AudioBuffer,
    pub info: MediaInfo,
    scratch: Option<TempDir>,
}

impl ExtractedAudio {
    pub fn new(audio: AudioBuffer, info: MediaInfo) -> Self {
        Self {
            audio,
            info,
            scratch: None,
        }
    }

    pub fn with_scratch(mut self, scratch: TempDir) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Directory holding intermediate files, if extraction created one.
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|dir| dir.path())
    }

    /// Split into the buffer and metadata, deleting scratch files now.
    pub fn into_parts(self) -> (AudioBuffer, MediaInfo) {
        (self.audio, self.info)
    }
}

/// Turns a media file into 16 kHz mono PCM.
pub trait AudioExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedAudio>;
}

/// Routes WAV files to the in-process decoder and everything else to ffmpeg.
#[derive(Debug, Clone, Default)]
pub struct MediaExtractor {
    ffmpeg: ffmpeg::FfmpegExtractor,
}

impl MediaExtractor {
    pub fn new(ffmpeg: ffmpeg::FfmpegExtractor) -> Self {
        Self { ffmpeg }
    }
}

impl AudioExtractor for MediaExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedAudio> {
        if !path.exists() {
            return Err(ScribeError::invalid_input(format!(
                "input file not found: {}",
                path.display()
            )));
        }
        match extension_of(path).as_str() {
            "wav" => wav::WavExtractor.extract(path),
            _ => self.ffmpeg.extract(path),
        }
    }
}

/// Lowercased extension, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub fn is_video(path: &Path) -> bool {
    VIDEO_EXTENSIONS.contains(&extension_of(path).as_str())
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

/// Convert i16 samples to f32 normalized to [-1.0, 1.0].
pub fn to_f32(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Silence of the given length at the pipeline sample rate.
pub fn silence(seconds: f64) -> AudioBuffer {
    let len = (seconds * defaults::SAMPLE_RATE as f64) as usize;
    AudioBuffer::new(vec![0; len], defaults::SAMPLE_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_count() {
        let buffer = AudioBuffer::new(vec![0; 48000], 16000);
        assert_eq!(buffer.duration_secs(), 3.0);
        assert_eq!(silence(2.5).len(), 40000);
    }

    #[test]
    fn slice_is_clamped_to_buffer() {
        let buffer = AudioBuffer::new((0..16000).map(|i| i as i16).collect(), 16000);
        assert_eq!(buffer.slice(0.0, 0.5).len(), 8000);
        assert_eq!(buffer.slice(0.5, 10.0).len(), 8000);
        assert_eq!(buffer.slice(0.5, 10.0)[0], 8000);
        assert!(buffer.slice(2.0, 3.0).is_empty());
        assert!(buffer.slice(0.7, 0.2).is_empty());
    }

    #[test]
    fn extension_detection_is_case_insensitive() {
        assert_eq!(extension_of(Path::new("/tmp/Talk.MP4")), "mp4");
        assert!(is_video(Path::new("clip.webm")));
        assert!(!is_video(Path::new("voice.wav")));
        assert_eq!(extension_of(Path::new("noext")), "");
    }

    #[test]
    fn missing_file_is_invalid_input() {
        let err = MediaExtractor::default()
            .extract(Path::new("/nonexistent/chunkscribe/input.wav"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn scratch_directory_is_removed_on_drop() {
        let scratch = tempfile::tempdir().unwrap();
        let scratch_path = scratch.path().to_path_buf();
        std::fs::write(scratch_path.join("audio.wav"), b"x").unwrap();

        let info = MediaInfo {
            filename: "a.mp4".to_string(),
            format: "mp4".to_string(),
            audio_codec: "aac".to_string(),
            video_codec: Some("h264".to_string()),
            source_sample_rate: 48000,
            source_channels: 2,
            duration: 1.0,
            size_bytes: 1,
        };
        let extracted = ExtractedAudio::new(silence(1.0), info).with_scratch(scratch);
        assert_eq!(extracted.scratch_path(), Some(scratch_path.as_path()));

        let (audio, _info) = extracted.into_parts();
        assert_eq!(audio.len(), 16000);
        assert!(!scratch_path.exists(), "scratch dir should be deleted");
    }

    #[test]
    fn to_f32_normalizes_range() {
        let converted = to_f32(&[0, 16384, -32768]);
        assert_eq!(converted[0], 0.0);
        assert!((converted[1] - 0.5).abs() < 0.01);
        assert_eq!(converted[2], -1.0);
    }
}
