//! FX-Decon Library
//!
//! A library for attenuating random noise in seismic trace gathers with
//! FX-domain adaptive deconvolution. Traces are transformed to the
//! frequency domain in overlapping time windows, a complex prediction filter
//! is designed per frequency across neighbouring traces, and the filtered
//! traces are rebuilt by tapered overlap-add.

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

pub mod buffers;
pub mod config;
pub mod convolution;
pub mod error;
pub mod fft;
pub mod fxdecon;
pub mod gather_io;
pub mod lu;
pub mod processor;
#[cfg(feature = "image")]
pub mod section;
pub mod synthetic;

pub use config::{FxDeconAttr, FxDeconParams, OutOfBandPolicy, OutputMode};
pub use error::FxDeconError;
pub use fxdecon::FxDecon;
pub use gather_io::Gather;
pub use num_complex::Complex64;
pub use processor::GatherProcessor;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
///
/// Sets up logging and other initialization for the library.
/// For WASM targets, this will set up browser-specific error handling.
#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub fn init() {
    #[cfg(feature = "wasm")]
    {
        console_error_panic_hook::set_once();
    }

    // Initialize logging
    #[cfg(all(not(target_arch = "wasm32"), feature = "env_logger"))]
    {
        let _ = env_logger::try_init();
    }
}

/// Result type for FX-decon operations
pub type Result<T> = std::result::Result<T, FxDeconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        init();
        // A second call must not panic on the already installed logger
        init();
        assert!(!VERSION.is_empty());
    }
}
