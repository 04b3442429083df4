//! FFT collaborator for the FX-decon engine
//!
//! Wraps a real-to-complex forward transform and a complex inverse transform
//! of a fixed, zero-padded length derived from the input trace length.
//! Results are read back through [`FftTools::real_data`] and
//! [`FftTools::imag_data`].

use crate::error::FxDeconError;
use crate::Result;
use num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Layout of the buffer passed to [`FftTools::inverse`]
///
/// The buffer holds `2 * num_samples_fft` values. Entries beyond `num_freq`
/// in each half are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftFormat {
    /// Real parts of every non-negative frequency, then imaginary parts
    RealImag,
}

/// Forward/inverse FFT helper with a fixed transform length
pub struct FftTools {
    num_samples_in: usize,
    num_samples_fft: usize,
    forward_plan: Arc<dyn RealToComplex<f64>>,
    inverse_plan: Arc<dyn Fft<f64>>,
    time_buffer: Vec<f64>,
    spectrum: Vec<Complex64>,
    complex_buffer: Vec<Complex64>,
    forward_scratch: Vec<Complex64>,
    inverse_scratch: Vec<Complex64>,
    real_data: Vec<f64>,
    imag_data: Vec<f64>,
}

impl FftTools {
    /// Plan transforms for traces of `num_samples_in` samples
    pub fn new(num_samples_in: usize) -> Self {
        let num_samples_fft = Self::num_fft_samples(num_samples_in);

        let mut real_planner = RealFftPlanner::<f64>::new();
        let forward_plan = real_planner.plan_fft_forward(num_samples_fft);
        let mut complex_planner = FftPlanner::<f64>::new();
        let inverse_plan = complex_planner.plan_fft_inverse(num_samples_fft);

        let forward_scratch = forward_plan.make_scratch_vec();
        let inverse_scratch =
            vec![Complex64::new(0.0, 0.0); inverse_plan.get_inplace_scratch_len()];
        let spectrum = forward_plan.make_output_vec();

        Self {
            num_samples_in,
            num_samples_fft,
            forward_plan,
            inverse_plan,
            time_buffer: vec![0.0; num_samples_fft],
            spectrum,
            complex_buffer: vec![Complex64::new(0.0, 0.0); num_samples_fft],
            forward_scratch,
            inverse_scratch,
            real_data: Vec::with_capacity(num_samples_fft),
            imag_data: Vec::with_capacity(num_samples_fft),
        }
    }

    /// FFT length used for inputs of `num_samples_in` samples: the next power of two, at least 2
    pub fn num_fft_samples(num_samples_in: usize) -> usize {
        num_samples_in.max(2).next_power_of_two()
    }

    /// Number of input samples the transforms were planned for
    pub fn num_samples_in(&self) -> usize {
        self.num_samples_in
    }

    /// Transform length
    pub fn num_samples_fft(&self) -> usize {
        self.num_samples_fft
    }

    /// Number of non-negative frequencies
    pub fn num_freq(&self) -> usize {
        self.num_samples_fft / 2 + 1
    }

    /// Forward transform of a real buffer, zero-padded to the FFT length.
    ///
    /// The spectrum is unnormalised; read it back via [`real_data`](Self::real_data)
    /// and [`imag_data`](Self::imag_data), both `num_freq` long.
    pub fn forward(&mut self, input: &[f64]) -> Result<()> {
        if input.len() > self.num_samples_fft {
            return Err(FxDeconError::Fft(format!(
                "FFT forward transform failed: input of {} samples exceeds FFT length {}",
                input.len(),
                self.num_samples_fft
            )));
        }

        self.time_buffer[..input.len()].copy_from_slice(input);
        self.time_buffer[input.len()..].fill(0.0);

        self.forward_plan
            .process_with_scratch(
                &mut self.time_buffer,
                &mut self.spectrum,
                &mut self.forward_scratch,
            )
            .map_err(|e| FxDeconError::Fft(format!("FFT forward transform failed: {}", e)))?;

        self.real_data.clear();
        self.imag_data.clear();
        for value in &self.spectrum {
            self.real_data.push(value.re);
            self.imag_data.push(value.im);
        }
        Ok(())
    }

    /// Inverse transform of the non-negative half of a spectrum.
    ///
    /// `buffer` must hold `2 * num_samples_fft` values laid out as described
    /// by `format`. The one-sided spectrum is transformed as is, so the real
    /// part returned in [`real_data`](Self::real_data) (`num_samples_fft`
    /// long) is half of the signal the full Hermitian spectrum describes;
    /// callers scale it by 2.
    pub fn inverse(&mut self, buffer: &[f64], format: FftFormat) -> Result<()> {
        let nfft = self.num_samples_fft;
        if buffer.len() != 2 * nfft {
            return Err(FxDeconError::Fft(format!(
                "FFT inverse transform failed: expected buffer of {} values, got {}",
                2 * nfft,
                buffer.len()
            )));
        }

        let num_freq = self.num_freq();
        let (first, second) = buffer.split_at(nfft);
        for (k, value) in self.complex_buffer.iter_mut().enumerate() {
            *value = if k < num_freq {
                match format {
                    FftFormat::RealImag => Complex64::new(first[k], second[k]),
                }
            } else {
                Complex64::new(0.0, 0.0)
            };
        }
        // DC and Nyquist appear once in the full spectrum
        self.complex_buffer[0] *= 0.5;
        self.complex_buffer[nfft / 2] *= 0.5;

        self.inverse_plan
            .process_with_scratch(&mut self.complex_buffer, &mut self.inverse_scratch);

        let norm = 1.0 / nfft as f64;
        self.real_data.clear();
        self.imag_data.clear();
        for value in &self.complex_buffer {
            self.real_data.push(value.re * norm);
            self.imag_data.push(value.im * norm);
        }

        if self.real_data.iter().any(|v| !v.is_finite()) {
            return Err(FxDeconError::Fft(
                "FFT inverse transform failed: non-finite output".to_string(),
            ));
        }
        Ok(())
    }

    /// Real part of the last transform result
    pub fn real_data(&self) -> &[f64] {
        &self.real_data
    }

    /// Imaginary part of the last transform result
    pub fn imag_data(&self) -> &[f64] {
        &self.imag_data
    }
}
