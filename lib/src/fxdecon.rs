//! FX-domain adaptive deconvolution engine
//!
//! For every time window the traces of an ensemble are transformed to the
//! frequency domain. The ensemble is then cut into spatial design windows;
//! per frequency, a complex prediction filter is estimated from the spatial
//! autocorrelation of the design window and applied across traces. Filtered
//! spectra are transformed back and merged across time windows with a
//! linear cross-fade.
//!
//! Typical use:
//!
//! ```no_run
//! use fxdecon_lib::{FxDecon, FxDeconAttr};
//!
//! let traces = vec![vec![0.0_f32; 500]; 24];
//! let mut output = vec![vec![0.0_f32; 500]; 24];
//! let mut engine = FxDecon::new();
//! engine
//!     .initialize(4.0, 500, FxDeconAttr::single_window(5.0, 60.0, 500, 10, 4))
//!     .unwrap();
//! engine.apply(&traces, &mut output).unwrap();
//! ```

use crate::buffers::{resize_vec, Grid};
use crate::config::{FxDeconAttr, OutOfBandPolicy};
use crate::convolution::{cconv, cxcor};
use crate::error::FxDeconError;
use crate::fft::{FftFormat, FftTools};
use crate::lu::{lu_back_sub, lu_decomposition};
use crate::Result;
use num_complex::Complex64;
use std::fmt;
use std::io::Write;

/// Position of a spatial design window within the ensemble
///
/// Governs how the guard traces around the window are filled: the first
/// window replicates the first trace on its leading edge, the last window
/// replicates the last trace on its trailing edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    First,
    Interior,
    Last,
    /// The ensemble holds a single design window.
    ///
    /// The window absorbs every trace of the ensemble, which may exceed
    /// `ntraces_design`. Rows map to real traces wherever one exists; only
    /// the guard rows past the last trace replicate it.
    Only,
}

impl WindowPosition {
    pub fn classify(jx: usize, num_windows: usize) -> Self {
        match (jx == 0, jx + 1 >= num_windows) {
            (true, true) => WindowPosition::Only,
            (true, false) => WindowPosition::First,
            (false, true) => WindowPosition::Last,
            (false, false) => WindowPosition::Interior,
        }
    }

    /// Input trace copied into row `itrc` of the padded spatial window.
    ///
    /// `ntrwu` is the number of traces in window `jx`; the padded window
    /// holds `ntrwu + 2 * ntraces_filter` rows.
    pub fn source_trace(
        self,
        itrc: usize,
        jx: usize,
        ntrwu: usize,
        ntraces_design: usize,
        ntraces_filter: usize,
        num_traces: usize,
    ) -> usize {
        let last = num_traces - 1;
        match self {
            WindowPosition::First => {
                if itrc < ntraces_filter {
                    0
                } else {
                    itrc - ntraces_filter
                }
            }
            WindowPosition::Interior => itrc + jx * ntraces_design - ntraces_filter,
            WindowPosition::Last => {
                if itrc < ntrwu + ntraces_filter {
                    itrc + jx * ntraces_design - ntraces_filter
                } else {
                    last
                }
            }
            WindowPosition::Only => {
                if itrc < ntraces_filter {
                    0
                } else {
                    (itrc - ntraces_filter).min(last)
                }
            }
        }
    }
}

/// Allocation bookkeeping of the engine's working buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceStats {
    /// Number of times the working buffers were (re)allocated
    pub allocation_cycles: usize,
    /// Number of times the working buffers were released
    pub release_cycles: usize,
    /// Trace count the current buffers are sized for, 0 when none are held
    pub allocated_traces: usize,
    /// Zero pivots replaced during the last `apply`
    pub degenerate_pivots: usize,
}

/// FX-decon engine
///
/// Owns all working buffers. One instance processes one ensemble at a time;
/// independent instances can run on separate threads.
pub struct FxDecon {
    attr: FxDeconAttr,
    fft: Option<FftTools>,

    sample_interval_ms: f64,
    sample_int_s: f64,
    num_samples_in: usize,
    num_samples_fft: usize,
    num_freq: usize,
    freq_step_hz: f64,
    num_samples_win_f: usize,
    num_samples_win_i: usize,
    ntraces_fdataw: usize,

    fdata: Grid<Complex64>,
    fdataw: Grid<Complex64>,
    ffreq: Grid<Complex64>,
    rmatrix: Vec<f64>,
    sfreq: Vec<Complex64>,
    autocorr: Vec<Complex64>,
    gvector: Vec<f64>,
    fvector: Vec<Complex64>,
    sfreqout: Vec<Complex64>,
    info: Vec<f64>,
    ipvt: Vec<usize>,
    tidataw: Vec<f64>,
    ttodataw: Vec<f64>,
    buffer_real_imag: Vec<f64>,

    stats: ResourceStats,
}

impl Default for FxDecon {
    fn default() -> Self {
        Self::new()
    }
}

impl FxDecon {
    /// Create an engine; [`initialize`](Self::initialize) must be called before [`apply`](Self::apply)
    pub fn new() -> Self {
        Self {
            attr: FxDeconAttr::single_window(0.0, 0.0, 0, 1, 1),
            fft: None,
            sample_interval_ms: 0.0,
            sample_int_s: 0.0,
            num_samples_in: 0,
            num_samples_fft: 0,
            num_freq: 0,
            freq_step_hz: 0.0,
            num_samples_win_f: 0,
            num_samples_win_i: 0,
            ntraces_fdataw: 0,
            fdata: Grid::new(),
            fdataw: Grid::new(),
            ffreq: Grid::new(),
            rmatrix: Vec::new(),
            sfreq: Vec::new(),
            autocorr: Vec::new(),
            gvector: Vec::new(),
            fvector: Vec::new(),
            sfreqout: Vec::new(),
            info: Vec::new(),
            ipvt: Vec::new(),
            tidataw: Vec::new(),
            ttodataw: Vec::new(),
            buffer_real_imag: Vec::new(),
            stats: ResourceStats::default(),
        }
    }

    /// Configure the engine for traces of `num_samples_in` samples.
    ///
    /// Re-initializing drops any buffers sized for the previous setup.
    pub fn initialize(
        &mut self,
        sample_interval_ms: f64,
        num_samples_in: usize,
        attr: FxDeconAttr,
    ) -> Result<()> {
        if !(sample_interval_ms > 0.0) || !sample_interval_ms.is_finite() {
            return Err(FxDeconError::Config(format!(
                "Sample interval must be positive, got {} ms",
                sample_interval_ms
            )));
        }
        attr.validate_for_trace(num_samples_in)?;

        self.free_mem();

        let fft = FftTools::new(num_samples_in);
        self.num_samples_fft = fft.num_samples_fft();
        self.num_freq = fft.num_freq();
        self.fft = Some(fft);

        self.attr = attr;
        self.sample_interval_ms = sample_interval_ms;
        self.sample_int_s = sample_interval_ms / 1000.0;
        self.num_samples_in = num_samples_in;
        self.freq_step_hz = 1000.0 / (self.num_samples_fft as f64 * sample_interval_ms);

        self.num_samples_win_f = attr.win_len_samp + attr.taper_len_samp / 2;
        self.num_samples_win_i = attr.win_len_samp + attr.taper_len_samp;
        self.ntraces_fdataw = 2 * attr.ntraces_design + 2 * attr.ntraces_filter;

        log::debug!(
            "FX-decon initialized: {} samples ({} FFT), {} windows, design {} traces, filter {} traces",
            num_samples_in,
            self.num_samples_fft,
            attr.num_win,
            attr.ntraces_design,
            attr.ntraces_filter
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.fft.is_some()
    }

    pub fn attr(&self) -> &FxDeconAttr {
        &self.attr
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples_in
    }

    pub fn num_samples_fft(&self) -> usize {
        self.num_samples_fft
    }

    pub fn num_freq(&self) -> usize {
        self.num_freq
    }

    pub fn freq_step_hz(&self) -> f64 {
        self.freq_step_hz
    }

    pub fn resource_stats(&self) -> ResourceStats {
        self.stats
    }

    /// Widest design window an ensemble of `num_traces` produces; the last
    /// window absorbs the remainder of the integer division.
    fn max_traces_per_window(&self, num_traces: usize) -> usize {
        let design = self.attr.ntraces_design;
        let num_windows = (num_traces / design).max(1);
        if num_windows == 1 {
            num_traces
        } else {
            num_traces - (num_windows - 1) * design
        }
    }

    /// Size the working buffers for `num_traces`; a no-op when the trace
    /// count matches the current allocation.
    fn initialize_internal(&mut self, num_traces: usize) {
        if num_traces == self.stats.allocated_traces {
            return;
        }
        self.free_mem();

        let nfilt = self.attr.ntraces_filter;
        let max_ntrwu = self.max_traces_per_window(num_traces);
        let padded = max_ntrwu + 2 * nfilt;
        let nmat = 2 * nfilt;

        self.fdata.resize(num_traces, self.num_freq);
        self.fdataw.resize(padded, self.num_freq);
        self.ffreq.resize(max_ntrwu, self.num_freq);
        resize_vec(&mut self.rmatrix, nmat * nmat);
        resize_vec(&mut self.sfreq, padded);
        resize_vec(&mut self.autocorr, nfilt + 1);
        resize_vec(&mut self.gvector, nmat);
        resize_vec(&mut self.fvector, 2 * nfilt + 1);
        resize_vec(&mut self.sfreqout, max_ntrwu);
        resize_vec(&mut self.info, 4 * self.attr.ntraces_design.max(nfilt));
        resize_vec(&mut self.ipvt, 4 * self.attr.ntraces_design.max(nfilt));
        resize_vec(&mut self.tidataw, self.num_samples_fft);
        resize_vec(&mut self.ttodataw, self.num_samples_fft);
        resize_vec(&mut self.buffer_real_imag, 2 * self.num_samples_fft);

        self.stats.allocated_traces = num_traces;
        self.stats.allocation_cycles += 1;
        log::debug!(
            "FX-decon buffers allocated for {} traces ({} per design window)",
            num_traces,
            max_ntrwu
        );
    }

    /// Release all working buffers
    fn free_mem(&mut self) {
        if self.stats.allocated_traces == 0 {
            return;
        }
        self.fdata.release();
        self.fdataw.release();
        self.ffreq.release();
        self.rmatrix = Vec::new();
        self.sfreq = Vec::new();
        self.autocorr = Vec::new();
        self.gvector = Vec::new();
        self.fvector = Vec::new();
        self.sfreqout = Vec::new();
        self.info = Vec::new();
        self.ipvt = Vec::new();
        self.tidataw = Vec::new();
        self.ttodataw = Vec::new();
        self.buffer_real_imag = Vec::new();

        self.stats.allocated_traces = 0;
        self.stats.release_cycles += 1;
    }

    /// Start sample and length of time window `iwin`
    fn time_window(&self, iwin: usize) -> (usize, usize) {
        let num_win = self.attr.num_win;
        if num_win == 1 {
            return (0, self.num_samples_in);
        }
        let half_taper = self.attr.taper_len_samp / 2;
        let win_len = self.attr.win_len_samp;

        let len = if iwin == 0 {
            self.num_samples_win_f
        } else if iwin < num_win - 1 {
            self.num_samples_win_i
        } else {
            self.num_samples_in - win_len * iwin + half_taper
        };
        let start = if iwin == 0 {
            0
        } else {
            iwin * win_len - half_taper
        };
        (start, len)
    }

    /// Filter one ensemble.
    ///
    /// `samples_in` and `samples_out` hold one buffer per trace, each with
    /// the sample count passed to [`initialize`](Self::initialize).
    /// `samples_out` is overwritten. An FFT failure aborts the call and
    /// leaves `samples_out` partially written.
    pub fn apply<I, O>(&mut self, samples_in: &[I], samples_out: &mut [O]) -> Result<()>
    where
        I: AsRef<[f32]>,
        O: AsMut<[f32]>,
    {
        let mut fft = self.fft.take().ok_or_else(|| {
            FxDeconError::Config("FX-decon engine used before initialize()".to_string())
        })?;
        let result = self.apply_with(&mut fft, samples_in, samples_out);
        self.fft = Some(fft);
        result
    }

    fn apply_with<I, O>(
        &mut self,
        fft: &mut FftTools,
        samples_in: &[I],
        samples_out: &mut [O],
    ) -> Result<()>
    where
        I: AsRef<[f32]>,
        O: AsMut<[f32]>,
    {
        let num_traces = samples_in.len();
        let num_samples = self.num_samples_in;

        if samples_out.len() != num_traces {
            return Err(FxDeconError::Shape(format!(
                "Expected {} output traces, got {}",
                num_traces,
                samples_out.len()
            )));
        }
        for (itrc, (trace_in, trace_out)) in
            samples_in.iter().zip(samples_out.iter_mut()).enumerate()
        {
            let len_in = trace_in.as_ref().len();
            let len_out = trace_out.as_mut().len();
            if len_in != num_samples || len_out != num_samples {
                return Err(FxDeconError::Shape(format!(
                    "Trace {} has {} input / {} output samples, expected {}",
                    itrc, len_in, len_out, num_samples
                )));
            }
        }
        for trace_out in samples_out.iter_mut() {
            trace_out.as_mut().fill(0.0);
        }
        if num_traces == 0 {
            return Ok(());
        }

        self.initialize_internal(num_traces);
        self.stats.degenerate_pivots = 0;

        let design = self.attr.ntraces_design;
        let num_win_spatial = (num_traces / design).max(1);

        log::debug!(
            "FX-decon apply: {} traces, {} time windows, {} spatial windows",
            num_traces,
            self.attr.num_win,
            num_win_spatial
        );

        for iwin in 0..self.attr.num_win {
            let (win_start, win_len) = self.time_window(iwin);

            // Stage A: spectra of every trace in this time window
            for (itrc, trace) in samples_in.iter().enumerate() {
                let slice = &trace.as_ref()[win_start..win_start + win_len];
                for (dst, &src) in self.tidataw.iter_mut().zip(slice.iter()) {
                    *dst = src as f64;
                }
                fft.forward(&self.tidataw[..win_len])?;

                let row = self.fdata.row_mut(itrc);
                for (k, value) in row.iter_mut().enumerate() {
                    *value = Complex64::new(fft.real_data()[k], fft.imag_data()[k]);
                }
            }

            for jx in 0..num_win_spatial {
                // Stage B: per-frequency prediction filtering
                let ntrwu = self.filter_spatial_window(jx, num_win_spatial, num_traces);

                // Stage C: back to time and overlap-add
                for itrc in 0..ntrwu {
                    self.inverse_trace(fft, itrc, win_len)?;
                    let trace_out = samples_out[jx * design + itrc].as_mut();
                    self.overlap_add(iwin, win_start, win_len, trace_out);
                }
            }
        }

        if self.stats.degenerate_pivots > 0 {
            log::debug!(
                "FX-decon: {} singular pivots replaced while solving filter equations",
                self.stats.degenerate_pivots
            );
        }
        Ok(())
    }

    /// Fill the padded spatial window `jx` and filter every frequency of it
    /// into `ffreq`. Returns the number of traces in the window.
    fn filter_spatial_window(&mut self, jx: usize, num_win_spatial: usize, num_traces: usize) -> usize {
        let design = self.attr.ntraces_design;
        let nfilt = self.attr.ntraces_filter;
        let position = WindowPosition::classify(jx, num_win_spatial);
        let ntrwu = match position {
            WindowPosition::Last | WindowPosition::Only => num_traces - jx * design,
            WindowPosition::First | WindowPosition::Interior => design,
        };

        self.fdataw.resize(ntrwu + 2 * nfilt, self.num_freq);
        for itrc in 0..self.fdataw.rows() {
            let src = position.source_trace(itrc, jx, ntrwu, design, nfilt, num_traces);
            self.fdataw.row_mut(itrc).copy_from_slice(self.fdata.row(src));
        }

        self.ffreq.resize(ntrwu, self.num_freq);
        for ifq in 0..self.ffreq.cols() {
            let freq = ifq as f64 * self.freq_step_hz;
            if freq >= self.attr.fmin && freq <= self.attr.fmax {
                let pivots = self.filter_frequency(ifq, ntrwu);
                self.stats.degenerate_pivots += pivots;
            } else {
                for itrc in 0..self.ffreq.rows() {
                    self.ffreq[(itrc, ifq)] = match self.attr.out_of_band {
                        OutOfBandPolicy::PassThrough => self.fdataw[(itrc + nfilt, ifq)],
                        OutOfBandPolicy::Zero => Complex64::new(0.0, 0.0),
                    };
                }
            }
        }
        ntrwu
    }

    /// Design and apply the prediction filter for one frequency of the
    /// current spatial window. Returns the number of zero pivots replaced.
    fn filter_frequency(&mut self, ifq: usize, ntrwu: usize) -> usize {
        let nf = self.attr.ntraces_filter;
        let nmat = 2 * nf;
        let width = ntrwu + 2 * nf;

        for (itrc, value) in self.sfreq[..width].iter_mut().enumerate() {
            *value = self.fdataw[(itrc, ifq)];
        }

        let sfreq = &self.sfreq[..width];
        cxcor(sfreq, 0, sfreq, 0, 0, &mut self.autocorr[..nf + 1]);

        // Complex Toeplitz system written as a real block system:
        // [ Re  -Im ] [x_re]   [g_re]
        // [ Im   Re ] [x_im] = [g_im]
        let ac = &self.autocorr;
        let r = &mut self.rmatrix;
        for i in 0..nf {
            for j in 0..nf {
                let re = ac[i.abs_diff(j)].re;
                let im = if i < j { -ac[j - i].im } else { ac[i - j].im };
                r[i * nmat + j] = re;
                r[(i + nf) * nmat + j + nf] = re;
                r[(i + nf) * nmat + j] = im;
                r[i * nmat + j + nf] = -im;
            }
            self.gvector[i] = ac[i + 1].re;
            self.gvector[i + nf] = ac[i + 1].im;
        }

        let degenerate = lu_decomposition(&mut self.rmatrix, nmat, &mut self.ipvt, &mut self.info);
        lu_back_sub(&self.rmatrix, nmat, &self.ipvt, &mut self.gvector);

        let g = &self.gvector;
        for ifv in 0..nf {
            let ig = nf - 1 - ifv;
            self.fvector[ifv] = Complex64::new(0.5 * g[ig], 0.5 * g[ig + nf]).conj();
        }
        self.fvector[nf] = Complex64::new(0.0, 0.0);
        for ifv in (nf + 1)..=(2 * nf) {
            let ig = ifv - nf - 1;
            self.fvector[ifv] = Complex64::new(0.5 * g[ig], 0.5 * g[ig + nf]);
        }

        // Output is one sample ahead: both inputs start at -nf, output at 0
        let offset = -(nf as isize);
        cconv(
            &self.fvector[..2 * nf + 1],
            offset,
            &self.sfreq[..width],
            offset,
            0,
            &mut self.sfreqout[..ntrwu],
        );

        for itrc in 0..ntrwu {
            self.ffreq[(itrc, ifq)] = self.sfreqout[itrc];
        }
        degenerate
    }

    /// Inverse transform the filtered spectrum of trace `itrc` of the
    /// current spatial window into `ttodataw[..win_len]`.
    fn inverse_trace(&mut self, fft: &mut FftTools, itrc: usize, win_len: usize) -> Result<()> {
        let nfft = self.num_samples_fft;
        self.buffer_real_imag.fill(0.0);
        for (k, value) in self.ffreq.row(itrc).iter().enumerate() {
            self.buffer_real_imag[k] = value.re;
            self.buffer_real_imag[nfft + k] = value.im;
        }
        fft.inverse(&self.buffer_real_imag, FftFormat::RealImag)?;

        for (dst, &src) in self.ttodataw[..win_len]
            .iter_mut()
            .zip(fft.real_data().iter())
        {
            *dst = 2.0 * src;
        }
        Ok(())
    }

    /// Merge `ttodataw[..win_len]` into `trace_out` starting at `win_start`
    fn overlap_add(&self, iwin: usize, win_start: usize, win_len: usize, trace_out: &mut [f32]) {
        let num_win = self.attr.num_win;
        let filtered = &self.ttodataw[..win_len];

        if num_win == 1 {
            for (dst, &src) in trace_out.iter_mut().zip(filtered.iter()) {
                *dst = src as f32;
            }
            return;
        }

        let taper = self.attr.taper_len_samp;
        let ramp = self.sample_int_s / self.attr.taper_len_s;
        let trailing_start = win_len.saturating_sub(taper);

        for (isamp, &value) in filtered.iter().enumerate() {
            let Some(dst) = trace_out.get_mut(win_start + isamp) else {
                break;
            };
            if iwin > 0 && isamp < taper {
                *dst += (value * isamp as f64 * ramp) as f32;
            } else if iwin < num_win - 1 && isamp >= trailing_start {
                let k = isamp - trailing_start;
                *dst += (value * (1.0 - k as f64 * ramp)) as f32;
            } else {
                *dst = value as f32;
            }
        }
    }

    /// Write the configuration and derived quantities to `out`
    pub fn dump<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "{}", self)
    }
}

impl fmt::Display for FxDecon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "FX-decon parameters:")?;
        writeln!(f, "  fmin:              {:.3} Hz", self.attr.fmin)?;
        writeln!(f, "  fmax:              {:.3} Hz", self.attr.fmax)?;
        writeln!(f, "  win_len_samp:      {}", self.attr.win_len_samp)?;
        writeln!(f, "  taper_len_samp:    {}", self.attr.taper_len_samp)?;
        writeln!(f, "  taper_len_s:       {:.6} s", self.attr.taper_len_s)?;
        writeln!(f, "  num_win:           {}", self.attr.num_win)?;
        writeln!(f, "  ntraces_design:    {}", self.attr.ntraces_design)?;
        writeln!(f, "  ntraces_filter:    {}", self.attr.ntraces_filter)?;
        writeln!(f, "  out_of_band:       {}", self.attr.out_of_band.name())?;
        writeln!(f, "  sample_interval:   {:.4} ms", self.sample_interval_ms)?;
        writeln!(f, "  num_samples:       {}", self.num_samples_in)?;
        writeln!(f, "  num_samples_fft:   {}", self.num_samples_fft)?;
        writeln!(f, "  num_freq:          {}", self.num_freq)?;
        writeln!(f, "  freq_step:         {:.6} Hz", self.freq_step_hz)?;
        writeln!(f, "  num_samples_win_f: {}", self.num_samples_win_f)?;
        writeln!(f, "  num_samples_win_i: {}", self.num_samples_win_i)?;
        writeln!(f, "  ntraces_fdataw:    {}", self.ntraces_fdataw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;

    fn ricker(num_samples: usize, dt_ms: f64, t0_ms: f64, freq_hz: f64) -> Vec<f32> {
        (0..num_samples)
            .map(|i| {
                let t = (i as f64 * dt_ms - t0_ms) / 1000.0;
                let a = (PI * freq_hz * t).powi(2);
                ((1.0 - 2.0 * a) * (-a).exp()) as f32
            })
            .collect()
    }

    fn run(engine: &mut FxDecon, traces: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let mut out = vec![vec![0.0_f32; traces[0].len()]; traces.len()];
        engine.apply(traces, &mut out).unwrap();
        out
    }

    fn multi_window_attr(fmin: f64, fmax: f64) -> FxDeconAttr {
        FxDeconAttr {
            fmin,
            fmax,
            win_len_samp: 40,
            taper_len_samp: 10,
            ntraces_design: 6,
            ntraces_filter: 2,
            num_win: 3,
            taper_len_s: 0.04,
            out_of_band: OutOfBandPolicy::PassThrough,
        }
    }

    fn rms(values: &[Vec<f32>]) -> f64 {
        let (sum, count) = values.iter().flatten().fold((0.0, 0usize), |(s, n), &v| {
            (s + (v as f64).powi(2), n + 1)
        });
        (sum / count as f64).sqrt()
    }

    #[test]
    fn test_window_position_classify() {
        assert_eq!(WindowPosition::classify(0, 1), WindowPosition::Only);
        assert_eq!(WindowPosition::classify(0, 3), WindowPosition::First);
        assert_eq!(WindowPosition::classify(1, 3), WindowPosition::Interior);
        assert_eq!(WindowPosition::classify(2, 3), WindowPosition::Last);
    }

    #[test]
    fn test_source_trace_mapping() {
        // 6 traces, design 2, filter 1: windows of 2 traces padded to 4 rows
        let map = |pos: WindowPosition, jx: usize| -> Vec<usize> {
            (0..4).map(|i| pos.source_trace(i, jx, 2, 2, 1, 6)).collect()
        };
        assert_eq!(map(WindowPosition::First, 0), vec![0, 0, 1, 2]);
        assert_eq!(map(WindowPosition::Interior, 1), vec![1, 2, 3, 4]);
        assert_eq!(map(WindowPosition::Last, 2), vec![3, 4, 5, 5]);

        // Single window over 3 traces, filter 2
        let only: Vec<usize> = (0..7)
            .map(|i| WindowPosition::Only.source_trace(i, 0, 3, 4, 2, 3))
            .collect();
        assert_eq!(only, vec![0, 0, 0, 1, 2, 2, 2]);

        // Single window holding 7 traces with design 4, filter 1: rows
        // past design + filter still read real traces
        let wide: Vec<usize> = (0..9)
            .map(|i| WindowPosition::Only.source_trace(i, 0, 7, 4, 1, 7))
            .collect();
        assert_eq!(wide, vec![0, 0, 1, 2, 3, 4, 5, 6, 6]);
    }

    #[test]
    fn test_spatial_edge_replication() {
        let num_samples = 16;
        let mut engine = FxDecon::new();
        engine
            .initialize(4.0, num_samples, FxDeconAttr::single_window(0.0, 1000.0, num_samples, 2, 1))
            .unwrap();
        engine.initialize_internal(6);

        for itrc in 0..6 {
            for value in engine.fdata.row_mut(itrc).iter_mut() {
                *value = Complex64::new(itrc as f64 + 1.0, -(itrc as f64));
            }
        }

        engine.filter_spatial_window(0, 3, 6);
        assert_eq!(engine.fdataw.rows(), 4);
        assert_eq!(engine.fdataw.row(0), engine.fdata.row(0));
        assert_eq!(engine.fdataw.row(1), engine.fdata.row(0));
        assert_eq!(engine.fdataw.row(3), engine.fdata.row(2));

        engine.filter_spatial_window(2, 3, 6);
        assert_eq!(engine.fdataw.row(0), engine.fdata.row(3));
        assert_eq!(engine.fdataw.row(2), engine.fdata.row(5));
        assert_eq!(engine.fdataw.row(3), engine.fdata.row(5));
    }

    #[test]
    fn test_remainder_absorbed_by_last_window() {
        let mut engine = FxDecon::new();
        engine
            .initialize(4.0, 16, FxDeconAttr::single_window(0.0, 1000.0, 16, 3, 1))
            .unwrap();
        engine.initialize_internal(7);
        assert_eq!(engine.filter_spatial_window(0, 2, 7), 3);
        assert_eq!(engine.filter_spatial_window(1, 2, 7), 4);
        assert_eq!(engine.fdataw.rows(), 6);
    }

    #[test]
    fn test_time_window_layout() {
        let mut engine = FxDecon::new();
        engine.initialize(4.0, 130, multi_window_attr(0.0, 100.0)).unwrap();
        assert_eq!(engine.time_window(0), (0, 45));
        assert_eq!(engine.time_window(1), (35, 50));
        assert_eq!(engine.time_window(2), (75, 55));
        // Last window ends exactly at the end of the trace
        let (start, len) = engine.time_window(2);
        assert_eq!(start + len, 130);
    }

    #[test]
    fn test_initialize_derived_values() {
        let mut engine = FxDecon::new();
        engine.initialize(4.0, 130, multi_window_attr(0.0, 100.0)).unwrap();
        assert_eq!(engine.num_samples_fft(), 256);
        assert_eq!(engine.num_freq(), 129);
        assert!((engine.freq_step_hz() - 1000.0 / 1024.0).abs() < 1e-12);
        assert_eq!(engine.num_samples_win_f, 45);
        assert_eq!(engine.num_samples_win_i, 50);
        assert_eq!(engine.ntraces_fdataw, 16);
    }

    #[test]
    fn test_initialize_rejects_bad_config() {
        let mut engine = FxDecon::new();
        let mut attr = multi_window_attr(0.0, 100.0);
        attr.ntraces_filter = 7;
        assert!(matches!(
            engine.initialize(4.0, 130, attr),
            Err(FxDeconError::Config(_))
        ));
        assert!(engine.initialize(0.0, 130, multi_window_attr(0.0, 100.0)).is_err());
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_out_of_band_round_trip_single_window() {
        let num_samples = 100;
        let traces: Vec<Vec<f32>> = (0..5)
            .map(|i| ricker(num_samples, 4.0, 100.0 + 8.0 * i as f64, 25.0))
            .collect();

        // Band above Nyquist (125 Hz): every bin passes through
        let mut engine = FxDecon::new();
        engine
            .initialize(4.0, num_samples, FxDeconAttr::single_window(500.0, 600.0, num_samples, 2, 1))
            .unwrap();
        let out = run(&mut engine, &traces);

        assert_eq!(out.len(), traces.len());
        for (a, b) in traces.iter().zip(out.iter()) {
            assert_eq!(a.len(), b.len());
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).abs() < 1e-5, "{} != {}", x, y);
            }
        }
    }

    #[test]
    fn test_out_of_band_round_trip_multi_window() {
        let num_samples = 130;
        let mut rng = StdRng::seed_from_u64(7);
        let traces: Vec<Vec<f32>> = (0..8)
            .map(|_| (0..num_samples).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect();

        let mut engine = FxDecon::new();
        engine
            .initialize(4.0, num_samples, multi_window_attr(500.0, 600.0))
            .unwrap();
        let out = run(&mut engine, &traces);

        for (a, b) in traces.iter().zip(out.iter()) {
            for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
                assert!((x - y).abs() < 1e-5, "sample {}: {} != {}", i, x, y);
            }
        }
    }

    #[test]
    fn test_zero_policy_silences_out_of_band() {
        let num_samples = 64;
        let traces = vec![ricker(num_samples, 4.0, 120.0, 20.0); 4];
        let mut attr = FxDeconAttr::single_window(500.0, 600.0, num_samples, 2, 1);
        attr.out_of_band = OutOfBandPolicy::Zero;

        let mut engine = FxDecon::new();
        engine.initialize(4.0, num_samples, attr).unwrap();
        let out = run(&mut engine, &traces);
        assert!(out.iter().flatten().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_flat_event_is_scaled_uniformly() {
        // Identical traces: every bin sees the same value across traces, so
        // the filter output is the input times the sum of the prediction
        // coefficients, 17/19 for a 10-trace padded window and filter 2.
        let num_samples = 130;
        let trace = ricker(num_samples, 4.0, 260.0, 20.0);
        let traces = vec![trace.clone(); 12];

        let mut engine = FxDecon::new();
        engine
            .initialize(4.0, num_samples, multi_window_attr(0.0, 1000.0))
            .unwrap();
        let out = run(&mut engine, &traces);

        let peak = trace.iter().fold(0.0_f32, |m, v| m.max(v.abs())) as f64;
        let gain = 17.0 / 19.0;
        for out_trace in &out {
            for (x, y) in trace.iter().zip(out_trace.iter()) {
                assert!(((*y as f64) - gain * (*x as f64)).abs() < 1e-4 * peak);
            }
        }
    }

    #[test]
    fn test_random_noise_is_attenuated() {
        let num_samples = 128;
        let mut rng = StdRng::seed_from_u64(42);
        let traces: Vec<Vec<f32>> = (0..24)
            .map(|_| (0..num_samples).map(|_| rng.random_range(-1.0..1.0)).collect())
            .collect();

        let mut engine = FxDecon::new();
        engine
            .initialize(
                4.0,
                num_samples,
                FxDeconAttr::single_window(0.0, 1000.0, num_samples, 12, 2),
            )
            .unwrap();
        let out = run(&mut engine, &traces);

        let ratio = rms(&out) / rms(&traces);
        assert!(ratio < 0.7, "noise only reduced to {:.3}", ratio);
        assert!(out.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_input_stays_zero() {
        let num_samples = 130;
        let traces = vec![vec![0.0_f32; num_samples]; 6];
        let mut engine = FxDecon::new();
        engine
            .initialize(4.0, num_samples, multi_window_attr(0.0, 1000.0))
            .unwrap();
        let out = run(&mut engine, &traces);

        assert!(out.iter().flatten().all(|&v| v == 0.0));
        assert!(engine.resource_stats().degenerate_pivots > 0);
    }

    #[test]
    fn test_buffers_reused_for_same_trace_count() {
        let num_samples = 64;
        let attr = FxDeconAttr::single_window(0.0, 1000.0, num_samples, 2, 1);
        let mut engine = FxDecon::new();
        engine.initialize(4.0, num_samples, attr).unwrap();

        let six = vec![vec![0.5_f32; num_samples]; 6];
        run(&mut engine, &six);
        run(&mut engine, &six);
        let stats = engine.resource_stats();
        assert_eq!(stats.allocation_cycles, 1);
        assert_eq!(stats.release_cycles, 0);
        assert_eq!(stats.allocated_traces, 6);

        let eight = vec![vec![0.5_f32; num_samples]; 8];
        run(&mut engine, &eight);
        let stats = engine.resource_stats();
        assert_eq!(stats.allocation_cycles, 2);
        assert_eq!(stats.release_cycles, 1);
        assert_eq!(stats.allocated_traces, 8);
    }

    #[test]
    fn test_out_of_band_independent_of_previous_window() {
        let num_samples = 32;
        let mut attr = FxDeconAttr::single_window(20.0, 40.0, num_samples, 2, 1);
        let mut rng = StdRng::seed_from_u64(3);

        for policy in [OutOfBandPolicy::PassThrough, OutOfBandPolicy::Zero] {
            attr.out_of_band = policy;
            let mut fill = |engine: &mut FxDecon| {
                engine.initialize(4.0, num_samples, attr).unwrap();
                engine.initialize_internal(6);
                for itrc in 0..engine.fdata.rows() {
                    for value in engine.fdata.row_mut(itrc).iter_mut() {
                        *value = Complex64::new(rng.random_range(-1.0..1.0), rng.random_range(-1.0..1.0));
                    }
                }
            };

            let mut warm = FxDecon::new();
            fill(&mut warm);
            let fdata = warm.fdata.clone();
            warm.filter_spatial_window(0, 3, 6);
            warm.filter_spatial_window(1, 3, 6);

            let mut cold = FxDecon::new();
            fill(&mut cold);
            cold.fdata = fdata.clone();
            cold.filter_spatial_window(1, 3, 6);

            assert_eq!(warm.ffreq.rows(), cold.ffreq.rows());
            for itrc in 0..warm.ffreq.rows() {
                assert_eq!(warm.ffreq.row(itrc), cold.ffreq.row(itrc));
            }

            let step = warm.freq_step_hz();
            for ifq in 0..warm.num_freq() {
                let freq = ifq as f64 * step;
                if freq >= 20.0 && freq <= 40.0 {
                    continue;
                }
                for itrc in 0..2 {
                    let expected = match policy {
                        OutOfBandPolicy::PassThrough => fdata[(2 + itrc, ifq)],
                        OutOfBandPolicy::Zero => Complex64::new(0.0, 0.0),
                    };
                    assert_eq!(warm.ffreq[(itrc, ifq)], expected);
                }
            }
        }
    }

    #[test]
    fn test_apply_errors() {
        let mut engine = FxDecon::new();
        let traces = vec![vec![0.0_f32; 16]; 2];
        let mut out = vec![vec![0.0_f32; 16]; 2];
        assert!(matches!(
            engine.apply(&traces, &mut out),
            Err(FxDeconError::Config(_))
        ));

        engine
            .initialize(4.0, 16, FxDeconAttr::single_window(0.0, 100.0, 16, 2, 1))
            .unwrap();
        let mut short = vec![vec![0.0_f32; 16]; 1];
        assert!(matches!(
            engine.apply(&traces, &mut short),
            Err(FxDeconError::Shape(_))
        ));
        let wrong_len = vec![vec![0.0_f32; 15]; 2];
        assert!(matches!(
            engine.apply(&wrong_len, &mut out),
            Err(FxDeconError::Shape(_))
        ));
        // The engine is still usable after a rejected call
        assert!(engine.apply(&traces, &mut out).is_ok());
    }

    #[test]
    fn test_dump_lists_parameters() {
        let mut engine = FxDecon::new();
        engine.initialize(4.0, 130, multi_window_attr(5.0, 60.0)).unwrap();
        let mut buffer = Vec::new();
        engine.dump(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("ntraces_design:    6"));
        assert!(text.contains("num_samples_fft:   256"));
        assert!(text.contains("num_samples_win_i: 50"));
        assert_eq!(text, engine.to_string());
    }
}
