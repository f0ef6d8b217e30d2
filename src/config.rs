use crate::defaults;
use crate::error::{Result, ScribeError};
use crate::segmenter::Strategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeSection,
    pub transcription: TranscriptionConfig,
    pub chunking: ChunkingConfig,
    pub diarization: DiarizationConfig,
    pub progress: ProgressConfig,
}

/// Device and precision settings as written in the config file.
///
/// Resolved into a [`RuntimeConfig`] once at process start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeSection {
    /// "auto", "cuda" or "cpu"
    pub device: String,
    /// "float16", "float32" or "int8"; unset picks one for the device
    pub compute_type: Option<String>,
    pub batch_size: usize,
    pub threads: Option<usize>,
    pub models_dir: Option<PathBuf>,
}

/// Recognition model and language
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub model: String,
    pub language: String,
}

/// Segmenter tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub strategy: Strategy,
    pub chunk_duration: f64,
    pub overlap_duration: f64,
    pub auto_threshold: f64,
    pub max_window_factor: f64,
    pub vad_threshold: f32,
    pub vad_min_silence: f64,
    pub silence_threshold_db: f32,
    pub silence_min_duration: f64,
}

/// Speaker diarization settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiarizationConfig {
    pub enabled: bool,
    pub hf_token: Option<String>,
    pub min_speakers: Option<u32>,
    pub max_speakers: Option<u32>,
}

/// Progress callback settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    pub callback_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            device: "auto".to_string(),
            compute_type: None,
            batch_size: defaults::BATCH_SIZE,
            threads: None,
            models_dir: None,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::AUTO_LANGUAGE.to_string(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Auto,
            chunk_duration: defaults::CHUNK_DURATION_SECS,
            overlap_duration: defaults::OVERLAP_DURATION_SECS,
            auto_threshold: defaults::AUTO_CHUNK_THRESHOLD_SECS,
            max_window_factor: defaults::MAX_WINDOW_FACTOR,
            vad_threshold: defaults::VAD_THRESHOLD,
            vad_min_silence: defaults::VAD_MIN_SILENCE_SECS,
            silence_threshold_db: defaults::SILENCE_THRESHOLD_DB,
            silence_min_duration: defaults::SILENCE_MIN_DURATION_SECS,
        }
    }
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hf_token: None,
            min_speakers: None,
            max_speakers: None,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            callback_url: None,
            timeout_ms: defaults::CALLBACK_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist.
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(ScribeError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CHUNKSCRIBE_MODEL → transcription.model
    /// - CHUNKSCRIBE_LANGUAGE → transcription.language
    /// - CHUNKSCRIBE_DEVICE → runtime.device
    /// - COMPUTE_TYPE → runtime.compute_type
    /// - BATCH_SIZE → runtime.batch_size (ignored when not a number)
    /// - HF_TOKEN → diarization.hf_token (only when the file sets none)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("CHUNKSCRIBE_MODEL")
            && !model.is_empty()
        {
            self.transcription.model = model;
        }

        if let Ok(language) = std::env::var("CHUNKSCRIBE_LANGUAGE")
            && !language.is_empty()
        {
            self.transcription.language = language;
        }

        if let Ok(device) = std::env::var("CHUNKSCRIBE_DEVICE")
            && !device.is_empty()
        {
            self.runtime.device = device;
        }

        if let Ok(compute_type) = std::env::var("COMPUTE_TYPE")
            && !compute_type.is_empty()
        {
            self.runtime.compute_type = Some(compute_type);
        }

        if let Ok(batch) = std::env::var("BATCH_SIZE")
            && let Ok(batch) = batch.parse::<usize>()
            && batch > 0
        {
            self.runtime.batch_size = batch;
        }

        if self.diarization.hf_token.is_none()
            && let Ok(token) = std::env::var("HF_TOKEN")
            && !token.is_empty()
        {
            self.diarization.hf_token = Some(token);
        }

        self
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_duration.is_nan() || chunking.chunk_duration <= 0.0 {
            return Err(invalid("chunking.chunk_duration", "must be positive"));
        }
        if chunking.overlap_duration < 0.0 || chunking.overlap_duration >= chunking.chunk_duration
        {
            return Err(invalid(
                "chunking.overlap_duration",
                "must be non-negative and shorter than chunk_duration",
            ));
        }
        if chunking.max_window_factor < 1.0 {
            return Err(invalid("chunking.max_window_factor", "must be at least 1.0"));
        }
        if chunking.auto_threshold < 0.0 {
            return Err(invalid("chunking.auto_threshold", "must not be negative"));
        }
        if self.runtime.batch_size == 0 {
            return Err(invalid("runtime.batch_size", "must be positive"));
        }
        if let (Some(min), Some(max)) = (self.diarization.min_speakers, self.diarization.max_speakers)
            && min > max
        {
            return Err(invalid(
                "diarization.min_speakers",
                "must not exceed max_speakers",
            ));
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/chunkscribe/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("chunkscribe")
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> ScribeError {
    ScribeError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Compute device the recognition engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    Cpu,
}

impl Device {
    /// Pick the device this build can drive.
    pub fn detect() -> Self {
        if cfg!(any(feature = "cuda", feature = "vulkan", feature = "hipblas")) {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }

    pub fn is_gpu(self) -> bool {
        self == Device::Cuda
    }
}

impl FromStr for Device {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Device::detect()),
            "cuda" | "gpu" => Ok(Device::Cuda),
            "cpu" => Ok(Device::Cpu),
            other => Err(invalid(
                "runtime.device",
                &format!("unknown device '{other}' (expected auto, cuda or cpu)"),
            )),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cuda => f.write_str("cuda"),
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Numeric precision requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputePrecision {
    Float16,
    Float32,
    Int8,
}

impl ComputePrecision {
    /// float16 on GPU, int8 on CPU.
    pub fn default_for(device: Device) -> Self {
        if device.is_gpu() {
            ComputePrecision::Float16
        } else {
            ComputePrecision::Int8
        }
    }
}

impl FromStr for ComputePrecision {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float16" | "fp16" => Ok(ComputePrecision::Float16),
            "float32" | "fp32" => Ok(ComputePrecision::Float32),
            "int8" => Ok(ComputePrecision::Int8),
            other => Err(invalid(
                "runtime.compute_type",
                &format!("unknown compute type '{other}'"),
            )),
        }
    }
}

impl fmt::Display for ComputePrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputePrecision::Float16 => f.write_str("float16"),
            ComputePrecision::Float32 => f.write_str("float32"),
            ComputePrecision::Int8 => f.write_str("int8"),
        }
    }
}

/// Process-wide execution settings, resolved once and passed by reference
/// into the orchestrator and every recognition session it opens.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub device: Device,
    pub compute_type: ComputePrecision,
    pub batch_size: usize,
    pub threads: Option<usize>,
    pub models_dir: PathBuf,
}

impl RuntimeConfig {
    /// Resolve device and precision from the config file section.
    pub fn resolve(section: &RuntimeSection) -> Result<Self> {
        let device: Device = section.device.parse()?;
        let compute_type = match &section.compute_type {
            Some(value) => value.parse()?,
            None => ComputePrecision::default_for(device),
        };
        Ok(Self {
            device,
            compute_type,
            batch_size: section.batch_size.max(1),
            threads: section.threads,
            models_dir: section.models_dir.clone().unwrap_or_else(default_models_dir),
        })
    }

    /// Path of the model file for a model name.
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{name}.bin"))
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let device = Device::detect();
        Self {
            device,
            compute_type: ComputePrecision::default_for(device),
            batch_size: defaults::BATCH_SIZE,
            threads: None,
            models_dir: default_models_dir(),
        }
    }
}

/// `~/.cache/chunkscribe/models/` on Linux.
pub fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("chunkscribe")
        .join("models")
}
