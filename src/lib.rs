//! chunkscribe - Chunked long-form transcription
//!
//! Splits long recordings into windows, transcribes them with one loaded
//! model, stitches the overlaps and optionally adds word timings and
//! speaker labels.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod enrich;
pub mod error;
pub mod job;
pub mod progress;
pub mod recognition;
pub mod segmenter;
pub mod stitcher;

// Core seams (extract → segment → recognize → stitch → enrich)
pub use audio::{AudioBuffer, AudioExtractor, ExtractedAudio, MediaExtractor, MediaInfo};
pub use enrich::{Aligner, Diarizer, Enrichment};
pub use recognition::{EngineLoader, RecognitionEngine, RecognitionSession};

// Pipeline
pub use job::{JobOptions, JobState, Orchestrator, Transcript};
pub use segmenter::{AudioSegment, Segmenter, Strategy};
pub use stitcher::{Stitcher, TranscriptSegment, Word};

// Error handling
pub use error::{ErrorKind, JobError, Result, ScribeError};

// Config
pub use config::{ChunkingConfig, Config, RuntimeConfig};

// Progress
pub use progress::{JobProgress, ProgressReporter, Stage};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
