//! Default configuration constants for chunkscribe.
//!
//! Shared by the configuration types, the segmenter and the progress reporter
//! so the numbers live in one place.

/// Audio sample rate every engine receives, in Hz.
///
/// 16kHz is the standard for speech recognition models.
pub const SAMPLE_RATE: u32 = 16000;

/// Default recognition model name.
pub const DEFAULT_MODEL: &str = "large-v3";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Language used for alignment when nothing could be detected.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Target window length in seconds.
pub const CHUNK_DURATION_SECS: f64 = 30.0;

/// Overlap between consecutive fixed-size windows in seconds.
pub const OVERLAP_DURATION_SECS: f64 = 10.0;

/// Inputs shorter than this are transcribed as one window by the `auto` strategy.
pub const AUTO_CHUNK_THRESHOLD_SECS: f64 = 600.0;

/// Boundary strategies never emit a window longer than
/// `chunk_duration * MAX_WINDOW_FACTOR`.
pub const MAX_WINDOW_FACTOR: f64 = 2.0;

/// RMS threshold above which a frame counts as speech.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Shortest pause the `vad` strategy will cut at, in seconds.
pub const VAD_MIN_SILENCE_SECS: f64 = 0.3;

/// Level under which the `silence` strategy considers audio silent, in dBFS.
pub const SILENCE_THRESHOLD_DB: f32 = -50.0;

/// Shortest silence the `silence` strategy will cut at, in seconds.
pub const SILENCE_MIN_DURATION_SECS: f64 = 2.0;

/// Analysis frame length for energy detection, in milliseconds.
pub const ENERGY_FRAME_MS: u32 = 30;

/// Default inference batch size.
pub const BATCH_SIZE: usize = 16;

/// Time budget for one progress callback request, in milliseconds.
pub const CALLBACK_TIMEOUT_MS: u64 = 2000;

/// Model names the recognition engine is known to accept.
pub const KNOWN_MODELS: &[&str] = &[
    "tiny",
    "base",
    "small",
    "medium",
    "large-v2",
    "large-v3",
    "large-v3-turbo",
];

/// Models with the best accuracy/speed trade-off on a 24GB GPU.
pub const RECOMMENDED_MODELS: &[&str] = &["large-v3", "large-v3-turbo"];

/// Report the GPU backend compiled into this build.
///
/// Returns a human-readable name based on the compile-time feature flags.
/// If none is enabled, returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HIP/ROCm"
    } else {
        "CPU"
    }
}
