//! FX-decon configuration
//!
//! [`FxDeconAttr`] is the engine-level configuration expressed in samples
//! and traces. [`FxDeconParams`] is the user-facing form in physical units
//! that the processor, CLI and web front-ends work with; it converts to an
//! `FxDeconAttr` once the sample interval and trace length are known.

use crate::error::FxDeconError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with frequency bins outside `[fmin, fmax]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutOfBandPolicy {
    /// Copy the unfiltered spectrum of the trace through
    #[default]
    PassThrough,
    /// Zero the bin in the output
    Zero,
}

impl OutOfBandPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            OutOfBandPolicy::PassThrough => "pass_through",
            OutOfBandPolicy::Zero => "zero",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pass_through" | "pass" | "passthrough" => Some(OutOfBandPolicy::PassThrough),
            "zero" => Some(OutOfBandPolicy::Zero),
            _ => None,
        }
    }
}

/// Which signal the processor returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Predictable (coherent) part of the input
    #[default]
    Filtered,
    /// Input minus the filtered output, i.e. the rejected noise
    Noise,
}

impl OutputMode {
    pub fn name(&self) -> &'static str {
        match self {
            OutputMode::Filtered => "filtered",
            OutputMode::Noise => "noise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "filtered" | "filter" => Some(OutputMode::Filtered),
            "noise" | "difference" => Some(OutputMode::Noise),
            _ => None,
        }
    }
}

/// Engine configuration, immutable for the lifetime of an initialized engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxDeconAttr {
    /// Lowest filtered frequency [Hz]
    pub fmin: f64,
    /// Highest filtered frequency [Hz]
    pub fmax: f64,
    /// Nominal time window length [samples]
    pub win_len_samp: usize,
    /// Cross-fade length between adjacent time windows [samples], even
    pub taper_len_samp: usize,
    /// Traces per spatial design window
    pub ntraces_design: usize,
    /// Prediction filter half-length [traces]; filter length is twice this
    pub ntraces_filter: usize,
    /// Number of time windows
    pub num_win: usize,
    /// Taper length [s], matching `taper_len_samp`
    pub taper_len_s: f64,
    pub out_of_band: OutOfBandPolicy,
}

impl FxDeconAttr {
    /// Single-window configuration covering a whole trace of `num_samples`
    pub fn single_window(
        fmin: f64,
        fmax: f64,
        num_samples: usize,
        ntraces_design: usize,
        ntraces_filter: usize,
    ) -> Self {
        Self {
            fmin,
            fmax,
            win_len_samp: num_samples,
            taper_len_samp: 0,
            ntraces_design,
            ntraces_filter,
            num_win: 1,
            taper_len_s: 0.0,
            out_of_band: OutOfBandPolicy::PassThrough,
        }
    }

    /// Check the trace-independent constraints
    pub fn validate(&self) -> Result<()> {
        if !self.fmin.is_finite() || !self.fmax.is_finite() || self.fmin < 0.0 {
            return Err(FxDeconError::Config(format!(
                "Frequency band must be finite and non-negative, got [{}, {}] Hz",
                self.fmin, self.fmax
            )));
        }
        if self.fmax < self.fmin {
            return Err(FxDeconError::Config(format!(
                "Maximum frequency {} Hz is below minimum frequency {} Hz",
                self.fmax, self.fmin
            )));
        }
        if self.ntraces_design == 0 {
            return Err(FxDeconError::Config(
                "Design window must contain at least 1 trace".to_string(),
            ));
        }
        if self.ntraces_filter == 0 {
            return Err(FxDeconError::Config(
                "Filter half-length must be at least 1 trace".to_string(),
            ));
        }
        if self.ntraces_filter > self.ntraces_design {
            return Err(FxDeconError::Config(format!(
                "Filter half-length ({}) must not exceed the design window ({})",
                self.ntraces_filter, self.ntraces_design
            )));
        }
        if self.num_win == 0 {
            return Err(FxDeconError::Config(
                "Number of time windows must be at least 1".to_string(),
            ));
        }
        if self.num_win > 1 {
            if self.win_len_samp == 0 {
                return Err(FxDeconError::Config(
                    "Time window length must be positive".to_string(),
                ));
            }
            if self.taper_len_samp % 2 != 0 {
                return Err(FxDeconError::Config(format!(
                    "Taper length must be an even number of samples, got {}",
                    self.taper_len_samp
                )));
            }
            if self.taper_len_samp > self.win_len_samp {
                return Err(FxDeconError::Config(format!(
                    "Taper length ({}) must not exceed the window length ({})",
                    self.taper_len_samp, self.win_len_samp
                )));
            }
            if self.taper_len_samp > 0 && !(self.taper_len_s > 0.0) {
                return Err(FxDeconError::Config(
                    "Taper length in seconds must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Check that the time windows fit a trace of `num_samples`
    pub fn validate_for_trace(&self, num_samples: usize) -> Result<()> {
        self.validate()?;
        if num_samples == 0 {
            return Err(FxDeconError::Config(
                "Traces must contain at least 1 sample".to_string(),
            ));
        }
        if self.num_win > 1 {
            let needed = self.win_len_samp * (self.num_win - 1) + self.taper_len_samp / 2;
            if num_samples < needed || num_samples - needed < self.taper_len_samp / 2 {
                return Err(FxDeconError::Config(format!(
                    "{} windows of {} samples (taper {}) do not fit traces of {} samples",
                    self.num_win, self.win_len_samp, self.taper_len_samp, num_samples
                )));
            }
        }
        Ok(())
    }
}

/// User-facing FX-decon parameters in physical units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxDeconParams {
    pub fmin_hz: f64,
    pub fmax_hz: f64,
    /// Time window length [ms]; zero or longer than the trace means one window
    pub win_len_ms: f64,
    /// Cross-fade length between time windows [ms]
    pub taper_len_ms: f64,
    pub ntraces_design: usize,
    pub ntraces_filter: usize,
    pub out_of_band: OutOfBandPolicy,
    pub output_mode: OutputMode,
    /// Traces per ensemble handed to the engine; 0 processes the whole gather at once
    pub traces_per_ensemble: usize,
}

impl Default for FxDeconParams {
    fn default() -> Self {
        Self {
            fmin_hz: 5.0,
            fmax_hz: 60.0,
            win_len_ms: 500.0,
            taper_len_ms: 100.0,
            ntraces_design: 10,
            ntraces_filter: 4,
            out_of_band: OutOfBandPolicy::PassThrough,
            output_mode: OutputMode::Filtered,
            traces_per_ensemble: 0,
        }
    }
}

impl FxDeconParams {
    /// Convert to an engine configuration for traces of `num_samples` samples
    pub fn to_attr(&self, sample_interval_ms: f64, num_samples: usize) -> Result<FxDeconAttr> {
        if !(sample_interval_ms > 0.0) || !sample_interval_ms.is_finite() {
            return Err(FxDeconError::Config(format!(
                "Sample interval must be positive, got {} ms",
                sample_interval_ms
            )));
        }
        if self.win_len_ms < 0.0 || self.taper_len_ms < 0.0 {
            return Err(FxDeconError::Config(
                "Window and taper lengths must not be negative".to_string(),
            ));
        }

        let nyquist = 500.0 / sample_interval_ms;
        if self.fmin_hz > nyquist {
            log::warn!(
                "Minimum frequency {} Hz is above Nyquist ({} Hz), no bin will be filtered",
                self.fmin_hz,
                nyquist
            );
        }

        let mut win_len_samp = (self.win_len_ms / sample_interval_ms).round() as usize;
        let mut taper_len_samp = 2 * (self.taper_len_ms / sample_interval_ms / 2.0).round() as usize;

        let mut num_win = if win_len_samp == 0 || win_len_samp >= num_samples {
            1
        } else {
            ((num_samples as f64 / win_len_samp as f64).round() as usize).max(1)
        };

        if num_win > 1 && taper_len_samp > win_len_samp {
            let clamped = win_len_samp - win_len_samp % 2;
            log::warn!(
                "Taper of {} samples exceeds window of {} samples, using {}",
                taper_len_samp,
                win_len_samp,
                clamped
            );
            taper_len_samp = clamped;
        }

        if num_win == 1 {
            win_len_samp = num_samples;
            taper_len_samp = 0;
        } else if num_samples < win_len_samp * (num_win - 1) + taper_len_samp {
            // Rounding left too little room for the last window and its taper
            num_win -= 1;
            if num_win == 1 {
                win_len_samp = num_samples;
                taper_len_samp = 0;
            }
        }

        let attr = FxDeconAttr {
            fmin: self.fmin_hz,
            fmax: self.fmax_hz,
            win_len_samp,
            taper_len_samp,
            ntraces_design: self.ntraces_design,
            ntraces_filter: self.ntraces_filter,
            num_win,
            taper_len_s: taper_len_samp as f64 * sample_interval_ms / 1000.0,
            out_of_band: self.out_of_band,
        };
        attr.validate_for_trace(num_samples)?;
        Ok(attr)
    }

    /// Set a parameter by name from its string form
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let bad = |what: &str| FxDeconError::Config(format!("Invalid {}: {}", what, value));
        match name {
            "fmin" => self.fmin_hz = value.parse().map_err(|_| bad("fmin"))?,
            "fmax" => self.fmax_hz = value.parse().map_err(|_| bad("fmax"))?,
            "window" | "win_len" => self.win_len_ms = value.parse().map_err(|_| bad("window"))?,
            "taper" | "taper_len" => {
                self.taper_len_ms = value.parse().map_err(|_| bad("taper"))?
            }
            "design" | "ntraces_design" => {
                self.ntraces_design = value.parse().map_err(|_| bad("design"))?
            }
            "filter" | "ntraces_filter" => {
                self.ntraces_filter = value.parse().map_err(|_| bad("filter"))?
            }
            "ensemble" | "traces_per_ensemble" => {
                self.traces_per_ensemble = value.parse().map_err(|_| bad("ensemble"))?
            }
            "out_of_band" => {
                self.out_of_band = OutOfBandPolicy::parse(value).ok_or_else(|| bad("out_of_band"))?
            }
            "output" | "output_mode" => {
                self.output_mode = OutputMode::parse(value).ok_or_else(|| bad("output"))?
            }
            _ => {
                return Err(FxDeconError::Config(format!(
                    "Unknown parameter: {}",
                    name
                )))
            }
        }
        Ok(())
    }
}

impl fmt::Display for FxDeconParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Frequency band: {:.1} - {:.1} Hz", self.fmin_hz, self.fmax_hz)?;
        writeln!(f, "  Time window: {:.1} ms", self.win_len_ms)?;
        writeln!(f, "  Taper: {:.1} ms", self.taper_len_ms)?;
        writeln!(f, "  Design window: {} traces", self.ntraces_design)?;
        writeln!(f, "  Filter half-length: {} traces", self.ntraces_filter)?;
        writeln!(f, "  Out-of-band bins: {}", self.out_of_band.name())?;
        writeln!(f, "  Output: {}", self.output_mode.name())?;
        if self.traces_per_ensemble == 0 {
            write!(f, "  Ensemble: whole gather")
        } else {
            write!(f, "  Ensemble: {} traces", self.traces_per_ensemble)
        }
    }
}

/// Named parameter sets
pub mod presets {
    use super::*;

    /// Preset information structure
    pub struct PresetInfo {
        pub id: usize,
        pub name: &'static str,
        pub description: &'static str,
        pub params: FxDeconParams,
    }

    /// Default
    pub fn default() -> FxDeconParams {
        FxDeconParams::default()
    }

    /// Short filter over a wide design window, removes little signal
    pub fn gentle() -> FxDeconParams {
        FxDeconParams {
            ntraces_design: 20,
            ntraces_filter: 2,
            ..FxDeconParams::default()
        }
    }

    /// Long filter, strong noise rejection
    pub fn aggressive() -> FxDeconParams {
        FxDeconParams {
            win_len_ms: 300.0,
            taper_len_ms: 60.0,
            ntraces_design: 12,
            ntraces_filter: 6,
            ..FxDeconParams::default()
        }
    }

    /// Band limited to low frequencies, long windows
    pub fn low_frequency() -> FxDeconParams {
        FxDeconParams {
            fmin_hz: 2.0,
            fmax_hz: 30.0,
            win_len_ms: 1000.0,
            taper_len_ms: 200.0,
            ..FxDeconParams::default()
        }
    }

    /// List all presets with detailed info
    pub fn list_presets() -> Vec<PresetInfo> {
        vec![
            PresetInfo {
                id: 0,
                name: "default",
                description: "5-60 Hz, 500 ms windows, design=10, filter=4",
                params: default(),
            },
            PresetInfo {
                id: 1,
                name: "gentle",
                description: "5-60 Hz, 500 ms windows, design=20, filter=2",
                params: gentle(),
            },
            PresetInfo {
                id: 2,
                name: "aggressive",
                description: "5-60 Hz, 300 ms windows, design=12, filter=6",
                params: aggressive(),
            },
            PresetInfo {
                id: 3,
                name: "low_frequency",
                description: "2-30 Hz, 1000 ms windows, design=10, filter=4",
                params: low_frequency(),
            },
        ]
    }

    /// Look up a preset by name or numeric id
    pub fn get_preset(name: &str) -> Option<FxDeconParams> {
        let presets = list_presets();
        if let Ok(id) = name.parse::<usize>() {
            return presets.into_iter().find(|p| p.id == id).map(|p| p.params);
        }
        presets
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.params)
    }
}
