//! Error type shared by the FX-decon library

use thiserror::Error;

/// Errors raised by the FX-decon engine and its collaborators
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FxDeconError {
    /// Forward or inverse FFT failed; fatal for the current `apply` call
    #[error("{0}")]
    Fft(String),
    /// Invalid engine or processor configuration
    #[error("Config error: {0}")]
    Config(String),
    /// Input buffers do not match the initialized geometry
    #[error("Shape error: {0}")]
    Shape(String),
    /// Reading or writing gather files failed
    #[error("IO error: {0}")]
    Io(String),
    /// The worker pool for parallel processing could not be set up
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<std::io::Error> for FxDeconError {
    fn from(err: std::io::Error) -> Self {
        FxDeconError::Io(err.to_string())
    }
}

impl From<hound::Error> for FxDeconError {
    fn from(err: hound::Error) -> Self {
        FxDeconError::Io(err.to_string())
    }
}

impl From<FxDeconError> for String {
    fn from(err: FxDeconError) -> Self {
        err.to_string()
    }
}
