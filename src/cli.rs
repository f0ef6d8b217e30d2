//! Command-line interface for chunkscribe
//!
//! Provides argument parsing using clap derive macros.

use crate::segmenter::Strategy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chunked long-form transcription
#[derive(Parser, Debug)]
#[command(
    name = "chunkscribe",
    version,
    about = "Chunked long-form transcription with word timings and speaker labels"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a chunking strategy name (auto, vad, time, silence).
fn parse_strategy(s: &str) -> Result<Strategy, String> {
    s.parse::<Strategy>().map_err(|e| e.to_string())
}

/// Parse a positive number of seconds.
fn parse_seconds(s: &str) -> Result<f64, String> {
    let secs: f64 = s
        .trim()
        .trim_end_matches('s')
        .parse()
        .map_err(|_| format!("not a number of seconds: {s}"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("seconds must be a non-negative number: {s}"));
    }
    Ok(secs)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Transcribe an audio or video file and print the transcript as JSON
    Transcribe {
        /// Media file (wav, mp3, m4a, flac, ogg, mp4, mkv, mov, webm, ...)
        file: PathBuf,

        /// Whisper model (default from config: large-v3)
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,

        /// Language code (default: auto-detect from the first window)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// Chunking strategy: auto, vad, time or silence
        #[arg(long, value_name = "STRATEGY", value_parser = parse_strategy)]
        strategy: Option<Strategy>,

        /// Label speakers
        #[arg(long, overrides_with = "no_diarize")]
        diarize: bool,

        /// Skip speaker labelling even if enabled in config
        #[arg(long, overrides_with = "diarize")]
        no_diarize: bool,

        /// Expected minimum number of speakers
        #[arg(long, value_name = "N")]
        min_speakers: Option<u32>,

        /// Expected maximum number of speakers
        #[arg(long, value_name = "N")]
        max_speakers: Option<u32>,

        /// POST progress events to this URL
        #[arg(long, value_name = "URL")]
        callback_url: Option<String>,

        /// Job identifier used in progress events (default: random UUID)
        #[arg(long, value_name = "ID")]
        job_id: Option<String>,

        /// Write the transcript here instead of stdout
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Show the windows a file would be split into, without loading a model
    Plan {
        /// Media file to analyze
        file: PathBuf,

        /// Chunking strategy: auto, vad, time or silence
        #[arg(long, value_name = "STRATEGY", value_parser = parse_strategy)]
        strategy: Option<Strategy>,

        /// Target window length in seconds
        #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
        chunk_duration: Option<f64>,

        /// Overlap between consecutive windows in seconds
        #[arg(long, value_name = "SECONDS", value_parser = parse_seconds)]
        overlap: Option<f64>,
    },

    /// List known and recommended Whisper models
    Models,
}

impl Commands {
    /// Diarization override from `--diarize` / `--no-diarize`, if given.
    pub fn diarize_override(&self) -> Option<bool> {
        match self {
            Commands::Transcribe {
                diarize,
                no_diarize,
                ..
            } => match (diarize, no_diarize) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcribe_minimal() {
        let cli = Cli::try_parse_from(["chunkscribe", "transcribe", "talk.mp4"]).unwrap();
        match &cli.command {
            Commands::Transcribe {
                file,
                model,
                strategy,
                output,
                ..
            } => {
                assert_eq!(file, &PathBuf::from("talk.mp4"));
                assert!(model.is_none());
                assert!(strategy.is_none());
                assert!(output.is_none());
            }
            other => panic!("Expected Transcribe command, got {:?}", other),
        }
        assert_eq!(cli.command.diarize_override(), None);
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_transcribe_with_options() {
        let cli = Cli::try_parse_from([
            "chunkscribe",
            "transcribe",
            "meeting.wav",
            "--model",
            "small",
            "--language",
            "de",
            "--strategy",
            "silence",
            "--min-speakers",
            "2",
            "--max-speakers",
            "4",
            "--callback-url",
            "http://localhost:8000/progress",
            "--job-id",
            "job-42",
        ])
        .unwrap();

        match cli.command {
            Commands::Transcribe {
                model,
                language,
                strategy,
                min_speakers,
                max_speakers,
                callback_url,
                job_id,
                ..
            } => {
                assert_eq!(model.as_deref(), Some("small"));
                assert_eq!(language.as_deref(), Some("de"));
                assert_eq!(strategy, Some(Strategy::Silence));
                assert_eq!(min_speakers, Some(2));
                assert_eq!(max_speakers, Some(4));
                assert_eq!(
                    callback_url.as_deref(),
                    Some("http://localhost:8000/progress")
                );
                assert_eq!(job_id.as_deref(), Some("job-42"));
            }
            other => panic!("Expected Transcribe command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_strategy_fails() {
        let result =
            Cli::try_parse_from(["chunkscribe", "transcribe", "a.wav", "--strategy", "magic"]);
        assert!(result.is_err(), "unknown strategy should be rejected");
    }

    #[test]
    fn test_diarize_flags_last_one_wins() {
        let cli =
            Cli::try_parse_from(["chunkscribe", "transcribe", "a.wav", "--no-diarize"]).unwrap();
        assert_eq!(cli.command.diarize_override(), Some(false));

        let cli = Cli::try_parse_from([
            "chunkscribe",
            "transcribe",
            "a.wav",
            "--no-diarize",
            "--diarize",
        ])
        .unwrap();
        assert_eq!(cli.command.diarize_override(), Some(true));
    }

    #[test]
    fn test_parse_plan_with_overrides() {
        let cli = Cli::try_parse_from([
            "chunkscribe",
            "plan",
            "lecture.mp3",
            "--strategy",
            "time",
            "--chunk-duration",
            "20",
            "--overlap",
            "5s",
        ])
        .unwrap();
        match cli.command {
            Commands::Plan {
                strategy,
                chunk_duration,
                overlap,
                ..
            } => {
                assert_eq!(strategy, Some(Strategy::Time));
                assert_eq!(chunk_duration, Some(20.0));
                assert_eq!(overlap, Some(5.0));
            }
            other => panic!("Expected Plan command, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_seconds_rejects_garbage() {
        assert!(parse_seconds("abc").is_err());
        assert!(parse_seconds("-3").is_err());
        assert_eq!(parse_seconds("2.5"), Ok(2.5));
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "chunkscribe",
            "models",
            "--config",
            "/path/to/config.toml",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Models));
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_quiet_short_flag() {
        let cli = Cli::try_parse_from(["chunkscribe", "-q", "models"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_missing_command_fails() {
        assert!(Cli::try_parse_from(["chunkscribe"]).is_err());
    }
}
