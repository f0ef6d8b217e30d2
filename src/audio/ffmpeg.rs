//! Audio extraction for containers and compressed formats via the ffmpeg CLI.

use crate::audio::{AudioExtractor, ExtractedAudio, MediaInfo, extension_of, file_name_of, wav};
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, ScribeError};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Runs `ffmpeg` to write 16kHz mono PCM into a scratch directory.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    binary: PathBuf,
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        let binary = std::env::var_os("FFMPEG_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));
        Self { binary }
    }
}

impl FfmpegExtractor {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl AudioExtractor for FfmpegExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedAudio> {
        let scratch = tempfile::Builder::new().prefix("chunkscribe-").tempdir()?;
        let output_path = scratch.path().join("audio.wav");

        tracing::debug!(input = %path.display(), ffmpeg = %self.binary.display(), "extracting audio");

        let output = Command::new(&self.binary)
            .arg("-hide_banner")
            .arg("-nostdin")
            .arg("-y")
            .arg("-i")
            .arg(path)
            .arg("-vn") // Drop video streams
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg("1")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| ScribeError::AudioExtraction {
                message: format!("failed to run {}: {}", self.binary.display(), e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
            return Err(ScribeError::AudioExtraction {
                message: format!(
                    "ffmpeg exited with {} for {}: {}",
                    output.status,
                    path.display(),
                    tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
                ),
            });
        }

        let stream = parse_stream_info(&stderr);
        if stream.audio_codec.is_none() {
            return Err(ScribeError::invalid_input(format!(
                "{} has no audio stream",
                path.display()
            )));
        }

        let decoded = wav::decode(BufReader::new(File::open(&output_path)?))?;
        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let info = MediaInfo {
            filename: file_name_of(path),
            format: extension_of(path),
            audio_codec: stream.audio_codec.unwrap_or_default(),
            video_codec: stream.video_codec,
            source_sample_rate: stream.sample_rate.unwrap_or(decoded.source_rate),
            source_channels: stream.channels.unwrap_or(decoded.source_channels),
            duration: decoded.audio.duration_secs(),
            size_bytes,
        };
        tracing::debug!(
            codec = %info.audio_codec,
            duration = info.duration,
            scratch = %scratch.path().display(),
            "audio extracted"
        );

        Ok(ExtractedAudio::new(decoded.audio, info).with_scratch(scratch))
    }
}

/// Input stream details ffmpeg prints to stderr.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamInfo {
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Parse the `Input #0` section of ffmpeg's stderr.
///
/// Lines look like
/// `Stream #0:1(und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp`.
pub fn parse_stream_info(stderr: &str) -> StreamInfo {
    let mut info = StreamInfo::default();
    for line in stderr.lines() {
        let line = line.trim();
        if line.starts_with("Output #") {
            break;
        }
        if !line.starts_with("Stream #") {
            continue;
        }
        if let Some(rest) = line.split(": Video: ").nth(1)
            && info.video_codec.is_none()
        {
            info.video_codec = first_word(rest);
        }
        if let Some(rest) = line.split(": Audio: ").nth(1)
            && info.audio_codec.is_none()
        {
            info.audio_codec = first_word(rest);
            for field in rest.split(',').map(str::trim) {
                if let Some(hz) = field.strip_suffix(" Hz") {
                    info.sample_rate = hz.trim().parse().ok();
                } else if info.channels.is_none() {
                    info.channels = channel_count(field);
                }
            }
        }
    }
    info
}

fn first_word(s: &str) -> Option<String> {
    s.split(|c: char| c.is_whitespace() || c == ',')
        .find(|w| !w.is_empty())
        .map(str::to_string)
}

fn channel_count(layout: &str) -> Option<u16> {
    match layout {
        "mono" => Some(1),
        "stereo" => Some(2),
        "2.1" => Some(3),
        "quad" | "4.0" => Some(4),
        "5.0" | "5.0(side)" => Some(5),
        "5.1" | "5.1(side)" => Some(6),
        "7.1" => Some(8),
        other => other
            .strip_suffix(" channels")
            .and_then(|n| n.trim().parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MP4_STDERR: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'talk.mp4':
  Duration: 00:12:04.52, start: 0.000000, bitrate: 1200 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1920x1080, 30 fps
  Stream #0:1[0x2](und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s
Stream mapping:
  Stream #0:1 -> #0:0 (aac (native) -> pcm_s16le (native))
Output #0, wav, to 'audio.wav':
  Stream #0:0: Audio: pcm_s16le, 16000 Hz, mono, s16, 256 kb/s
";

    #[test]
    fn parses_input_streams_only() {
        let info = parse_stream_info(MP4_STDERR);
        assert_eq!(info.audio_codec.as_deref(), Some("aac"));
        assert_eq!(info.video_codec.as_deref(), Some("h264"));
        assert_eq!(info.sample_rate, Some(48000));
        assert_eq!(info.channels, Some(2));
    }

    #[test]
    fn audio_only_input_has_no_video_codec() {
        let stderr = "Input #0, mp3, from 'a.mp3':\n  Stream #0:0: Audio: mp3, 44100 Hz, mono, fltp, 128 kb/s\n";
        let info = parse_stream_info(stderr);
        assert_eq!(info.audio_codec.as_deref(), Some("mp3"));
        assert_eq!(info.video_codec, None);
        assert_eq!(info.sample_rate, Some(44100));
        assert_eq!(info.channels, Some(1));
    }

    #[test]
    fn numeric_channel_layouts() {
        assert_eq!(channel_count("5.1"), Some(6));
        assert_eq!(channel_count("3 channels"), Some(3));
        assert_eq!(channel_count("fltp"), None);
    }

    #[test]
    fn empty_stderr_finds_nothing() {
        assert_eq!(parse_stream_info(""), StreamInfo::default());
    }

    #[test]
    fn missing_binary_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"not really a video").unwrap();

        let extractor = FfmpegExtractor::with_binary("/nonexistent/ffmpeg-chunkscribe");
        let err = extractor.extract(&input).unwrap_err();
        assert!(
            matches!(err, ScribeError::AudioExtraction { .. }),
            "unexpected error: {err:?}"
        );
    }
}
