//! Whisper-based recognition engine.
//!
//! # Feature Gate
//!
//! The engine requires the `whisper` feature and cmake:
//!
//! ```bash
//! cargo build --features whisper
//! ```
//!
//! Without it, [`WhisperLoader`] still resolves model paths but refuses to
//! open a session.

use crate::config::RuntimeConfig;
use crate::error::{Result, ScribeError};
use crate::recognition::{EngineLoader, RecognitionEngine};
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use crate::recognition::{EngineOutput, LocalSegment};
#[cfg(feature = "whisper")]
use std::sync::Once;
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Loads ggml Whisper models from the models directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhisperLoader;

impl WhisperLoader {
    /// Model file for `model`: an existing path is used as is, a catalogue
    /// name maps to `<models_dir>/ggml-<name>.bin`.
    pub fn resolve_model_path(model: &str, runtime: &RuntimeConfig) -> PathBuf {
        let as_path = Path::new(model);
        if as_path.extension().is_some() && as_path.exists() {
            return as_path.to_path_buf();
        }
        runtime.model_path(model)
    }
}

impl EngineLoader for WhisperLoader {
    fn load(&self, model: &str, runtime: &RuntimeConfig) -> Result<Box<dyn RecognitionEngine>> {
        let model_path = Self::resolve_model_path(model, runtime);
        if !model_path.exists() {
            return Err(ScribeError::ModelNotFound {
                path: model_path.to_string_lossy().to_string(),
            });
        }
        open_engine(&model_path, runtime)
    }
}

#[cfg(not(feature = "whisper"))]
fn open_engine(_model_path: &Path, _runtime: &RuntimeConfig) -> Result<Box<dyn RecognitionEngine>> {
    Err(ScribeError::SessionOpen {
        message: concat!(
            "Whisper feature not enabled. This binary was built without speech recognition.\n",
            "To fix: cargo build --release --features whisper\n",
            "If build fails with cmake errors, install: sudo apt install cmake"
        )
        .to_string(),
    })
}

#[cfg(feature = "whisper")]
fn open_engine(model_path: &Path, runtime: &RuntimeConfig) -> Result<Box<dyn RecognitionEngine>> {
    Ok(Box::new(WhisperEngine::new(model_path, runtime)?))
}

/// A loaded Whisper context.
#[cfg(feature = "whisper")]
pub struct WhisperEngine {
    context: Option<WhisperContext>,
    threads: Option<usize>,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine")
            .field("model_name", &self.model_name)
            .field("threads", &self.threads)
            .field("context", &self.context.as_ref().map(|_| "<WhisperContext>"))
            .finish()
    }
}

#[cfg(feature = "whisper")]
impl WhisperEngine {
    pub fn new(model_path: &Path, runtime: &RuntimeConfig) -> Result<Self> {
        // Route whisper.cpp output through the log hooks (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        let model_name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(runtime.device.is_gpu());
        context_params.flash_attn(runtime.device.is_gpu());
        let context = WhisperContext::new_with_params(
            model_path.to_str().ok_or_else(|| ScribeError::SessionOpen {
                message: "Invalid UTF-8 in model path".to_string(),
            })?,
            context_params,
        )
        .map_err(|e| ScribeError::SessionOpen {
            message: format!("Failed to load Whisper model: {}", e),
        })?;

        if runtime.batch_size > 1 {
            tracing::debug!(
                batch_size = runtime.batch_size,
                "whisper.cpp decodes one window at a time; batch size ignored"
            );
        }

        Ok(Self {
            context: Some(context),
            threads: runtime.threads,
            model_name,
        })
    }
}

#[cfg(feature = "whisper")]
impl RecognitionEngine for WhisperEngine {
    fn transcribe(&mut self, audio: &[i16], language: Option<&str>) -> Result<EngineOutput> {
        let context = self
            .context
            .as_ref()
            .ok_or_else(|| ScribeError::Other("Whisper context already released".to_string()))?;
        let audio_f32 = crate::audio::to_f32(audio);

        let mut state = context
            .create_state()
            .map_err(|e| ScribeError::Other(format!("Failed to create Whisper state: {}", e)))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(language);
        if let Some(threads) = self.threads {
            params.set_n_threads(threads as i32);
        }

        // Disable printing to stdout/stderr
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio_f32)
            .map_err(|e| ScribeError::Other(format!("Whisper inference failed: {}", e)))?;

        let lang_id = state.full_lang_id_from_state();
        let detected = whisper_rs::get_lang_str(lang_id)
            .map(str::to_string)
            .filter(|l| !l.is_empty());

        // Timestamps are in centiseconds
        let segments = state
            .as_iter()
            .map(|segment| {
                LocalSegment::new(
                    segment.start_timestamp() as f64 / 100.0,
                    segment.end_timestamp() as f64 / 100.0,
                    segment.to_string().trim(),
                )
            })
            .collect();

        Ok(EngineOutput {
            segments,
            language: language.map(str::to_string).or(detected),
        })
    }

    fn release(&mut self) {
        if self.context.take().is_some() {
            tracing::debug!(model = %self.model_name, "whisper context released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn runtime_in(dir: &Path) -> RuntimeConfig {
        RuntimeConfig {
            models_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn catalogue_names_resolve_into_models_dir() {
        let runtime = runtime_in(Path::new("/models"));
        assert_eq!(
            WhisperLoader::resolve_model_path("large-v3-turbo", &runtime),
            PathBuf::from("/models/ggml-large-v3-turbo.bin")
        );
    }

    #[test]
    fn existing_file_path_is_used_directly() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom-model.bin");
        std::fs::write(&custom, b"weights").unwrap();

        let runtime = runtime_in(Path::new("/models"));
        let resolved = WhisperLoader::resolve_model_path(custom.to_str().unwrap(), &runtime);
        assert_eq!(resolved, custom);
    }

    #[test]
    fn missing_model_fails_session_open() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime_in(dir.path());

        match WhisperLoader.load("tiny", &runtime) {
            Err(err @ ScribeError::ModelNotFound { .. }) => {
                assert_eq!(err.kind(), ErrorKind::SessionOpenFailure);
                assert!(err.to_string().contains("ggml-tiny.bin"));
            }
            Err(other) => panic!("expected ModelNotFound, got {other:?}"),
            Ok(_) => panic!("expected ModelNotFound, got an engine"),
        }
    }

    #[test]
    fn invalid_model_file_fails_session_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ggml-base.bin"), b"fake model data").unwrap();
        let runtime = runtime_in(dir.path());

        // Without the feature the stub refuses; with it the bogus file fails to load
        match WhisperLoader.load("base", &runtime) {
            Err(err) => assert_eq!(err.kind(), ErrorKind::SessionOpenFailure),
            Ok(_) => panic!("bogus model file must not load"),
        }
    }
}
