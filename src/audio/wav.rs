//! WAV decoding into the pipeline's 16kHz mono format.

use crate::audio::{AudioBuffer, AudioExtractor, ExtractedAudio, MediaInfo, file_name_of};
use crate::defaults::SAMPLE_RATE;
use crate::error::{Result, ScribeError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Decoded WAV data with the source format it came from.
#[derive(Debug)]
pub struct DecodedWav {
    pub audio: AudioBuffer,
    pub source_rate: u32,
    pub source_channels: u16,
    pub bits_per_sample: u16,
}

/// Decode WAV data from any reader.
/// Supports arbitrary sample rates and channels, resampling to 16kHz mono.
pub fn decode(reader: impl Read) -> Result<DecodedWav> {
    let mut wav_reader =
        hound::WavReader::new(reader).map_err(|e| ScribeError::AudioExtraction {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

    let spec = wav_reader.spec();
    let source_rate = spec.sample_rate;
    let source_channels = spec.channels;
    if source_channels == 0 || source_rate == 0 {
        return Err(ScribeError::AudioExtraction {
            message: format!(
                "Unsupported WAV layout: {} channels at {} Hz",
                source_channels, source_rate
            ),
        });
    }

    let raw_samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int if spec.bits_per_sample <= 8 => wav_reader
            .samples::<i8>()
            .map(|s| s.map(|v| i16::from(v) << 8))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let shift = spec.bits_per_sample.saturating_sub(16);
            wav_reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        hound::SampleFormat::Float => wav_reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };

    let mono_samples = downmix(raw_samples, source_channels);

    // Resample to 16kHz if needed
    let samples = if source_rate != SAMPLE_RATE {
        resample(&mono_samples, source_rate, SAMPLE_RATE)
    } else {
        mono_samples
    };

    Ok(DecodedWav {
        audio: AudioBuffer::new(samples, SAMPLE_RATE),
        source_rate,
        source_channels,
        bits_per_sample: spec.bits_per_sample,
    })
}

/// Reads `.wav` files directly, without an intermediate file.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavExtractor;

impl AudioExtractor for WavExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedAudio> {
        let file = File::open(path).map_err(|e| {
            ScribeError::invalid_input(format!("cannot open {}: {}", path.display(), e))
        })?;
        let size_bytes = file.metadata().map(|m| m.len()).unwrap_or(0);
        let decoded = decode(BufReader::new(file))?;

        let info = MediaInfo {
            filename: file_name_of(path),
            format: "wav".to_string(),
            audio_codec: format!("pcm_s{}le", decoded.bits_per_sample),
            video_codec: None,
            source_sample_rate: decoded.source_rate,
            source_channels: decoded.source_channels,
            duration: decoded.audio.duration_secs(),
            size_bytes,
        };
        Ok(ExtractedAudio::new(decoded.audio, info))
    }
}

/// Average interleaved channels into one.
fn downmix(samples: Vec<i16>, channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples;
    }
    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx.min(samples.len() - 1)]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

/// Write a 16kHz mono WAV file (fixtures, exported windows).
pub fn write_wav(path: &Path, audio: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in audio.samples() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn decode_16khz_mono_matches_exactly() {
        let input_samples = vec![100i16, 200, 300, 400, 500];
        let wav_data = make_wav_data(16000, 1, &input_samples);

        let decoded = decode(Cursor::new(wav_data)).unwrap();

        assert_eq!(decoded.audio.samples(), input_samples.as_slice());
        assert_eq!(decoded.source_rate, 16000);
        assert_eq!(decoded.source_channels, 1);
    }

    #[test]
    fn decode_8bit_scales_to_full_range() {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for s in [0i8, 64, -64, 127, -128] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode(Cursor::new(cursor.into_inner())).unwrap();

        assert_eq!(
            decoded.audio.samples(),
            &[0i16, 16384, -16384, 32512, -32768]
        );
        assert_eq!(decoded.bits_per_sample, 8);
    }

    #[test]
    fn decode_stereo_downmixes_to_mono() {
        // Stereo pairs: (100, 200), (300, 400), (-100, 100)
        let stereo_samples = vec![100i16, 200, 300, 400, -100, 100];
        let wav_data = make_wav_data(16000, 2, &stereo_samples);

        let decoded = decode(Cursor::new(wav_data)).unwrap();

        assert_eq!(decoded.audio.samples(), &[150i16, 350, 0]);
        assert_eq!(decoded.source_channels, 2);
    }

    #[test]
    fn decode_44100hz_resamples_to_16khz() {
        let input_samples = vec![1000i16; 44100]; // 1 second at 44.1kHz
        let wav_data = make_wav_data(44100, 1, &input_samples);

        let decoded = decode(Cursor::new(wav_data)).unwrap();

        let len = decoded.audio.len();
        assert!((15900..=16100).contains(&len), "unexpected length {len}");
        assert!(
            decoded
                .audio
                .samples()
                .iter()
                .all(|&s| (900..=1100).contains(&s))
        );
        assert_eq!(decoded.audio.sample_rate(), 16000);
    }

    #[test]
    fn invalid_wav_data_returns_extraction_error() {
        let result = decode(Cursor::new(vec![0u8, 1, 2, 3, 4, 5]));

        match result {
            Err(ScribeError::AudioExtraction { message }) => {
                assert!(message.contains("Failed to parse WAV file"));
            }
            other => panic!("Expected AudioExtraction error, got {other:?}"),
        }
    }

    #[test]
    fn empty_wav_data_returns_error() {
        assert!(decode(Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn random_garbage_is_rejected() {
        let garbage: Vec<u8> = (0..500).map(|i| ((i * 17 + 42) % 256) as u8).collect();
        assert!(decode(Cursor::new(garbage)).is_err());
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![100i16, 200, 300, 400, 500];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_upsample_interpolates() {
        let resampled = resample(&[0i16, 1000, 2000], 8000, 16000);

        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[test]
    fn resample_handles_edge_cases() {
        assert!(resample(&[], 16000, 8000).is_empty());
        assert_eq!(resample(&[100i16], 16000, 8000), vec![100]);
    }

    #[test]
    fn extractor_reports_media_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.wav");
        std::fs::write(&path, make_wav_data(48000, 2, &vec![0i16; 96000])).unwrap();

        let extracted = WavExtractor.extract(&path).unwrap();

        assert_eq!(extracted.info.filename, "meeting.wav");
        assert_eq!(extracted.info.format, "wav");
        assert_eq!(extracted.info.audio_codec, "pcm_s16le");
        assert_eq!(extracted.info.source_sample_rate, 48000);
        assert_eq!(extracted.info.source_channels, 2);
        assert!((extracted.info.duration - 1.0).abs() < 0.01);
        assert!(extracted.info.size_bytes > 0);
        assert!(extracted.scratch_path().is_none());
    }

    #[test]
    fn write_then_read_keeps_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let audio = AudioBuffer::new(vec![1, -2, 3, -4], 16000);

        write_wav(&path, &audio).unwrap();
        let extracted = WavExtractor.extract(&path).unwrap();

        assert_eq!(extracted.audio, audio);
    }
}
