use std::path::Path;

use whisper_rs::{WhisperContext, WhisperContextParameters};

use crate::error::{Error, Result};

use super::logging::silence_whisper_logs;

/// Load a whisper.cpp model and return an initialized `WhisperContext`.
///
/// Model loading is centralized here so error handling and defaults stay
/// consistent across callers. A missing or unloadable model surfaces as
/// `Error::ModelUnavailable` so the service layer can answer with a clear
/// status instead of a generic failure.
pub fn load_context(model_path: &Path) -> Result<WhisperContext> {
    // whisper.cpp logs straight to stderr by default and is very noisy.
    silence_whisper_logs();

    if !model_path.is_file() {
        return Err(Error::ModelUnavailable(format!(
            "whisper model not found at {}",
            model_path.display()
        )));
    }

    let path = model_path
        .to_str()
        .ok_or_else(|| Error::ModelUnavailable("model path is not valid UTF-8".to_owned()))?;

    let ctx_params = WhisperContextParameters::default();

    WhisperContext::new_with_params(path, ctx_params)
        .map_err(|e| Error::ModelUnavailable(format!("failed to load model {path}: {e}")))
}
