//! Gather I/O using hound
//!
//! A gather is stored as a multi-channel WAV file: one channel per trace,
//! sample rate = 1000 / sample interval [ms]. Integer and float files of any
//! channel count are read; output is always 32-bit float.

use crate::error::FxDeconError;
use crate::Result;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
#[cfg(not(target_arch = "wasm32"))]
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;

/// A gather of equally long traces
#[derive(Debug, Clone, PartialEq)]
pub struct Gather {
    /// Sample interval [ms]
    pub sample_interval_ms: f64,
    /// One buffer per trace
    pub traces: Vec<Vec<f32>>,
}

impl Gather {
    pub fn new(sample_interval_ms: f64, traces: Vec<Vec<f32>>) -> Result<Self> {
        let gather = Self {
            sample_interval_ms,
            traces,
        };
        gather.validate()?;
        Ok(gather)
    }

    /// Gather of `num_traces` zero traces
    pub fn zeros(sample_interval_ms: f64, num_traces: usize, num_samples: usize) -> Self {
        Self {
            sample_interval_ms,
            traces: vec![vec![0.0; num_samples]; num_traces],
        }
    }

    /// Check for a positive interval and equal trace lengths
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_interval_ms > 0.0) || !self.sample_interval_ms.is_finite() {
            return Err(FxDeconError::Shape(format!(
                "Sample interval must be positive, got {} ms",
                self.sample_interval_ms
            )));
        }
        let num_samples = self.num_samples();
        if let Some((itrc, trace)) = self
            .traces
            .iter()
            .enumerate()
            .find(|(_, t)| t.len() != num_samples)
        {
            return Err(FxDeconError::Shape(format!(
                "Trace {} has {} samples, expected {}",
                itrc,
                trace.len(),
                num_samples
            )));
        }
        Ok(())
    }

    pub fn num_traces(&self) -> usize {
        self.traces.len()
    }

    pub fn num_samples(&self) -> usize {
        self.traces.first().map_or(0, |t| t.len())
    }

    /// Trace length [ms]
    pub fn duration_ms(&self) -> f64 {
        self.num_samples() as f64 * self.sample_interval_ms
    }

    /// Largest absolute amplitude in the gather
    pub fn max_abs(&self) -> f32 {
        self.traces
            .iter()
            .flatten()
            .fold(0.0_f32, |acc, v| acc.max(v.abs()))
    }

    /// Sample-by-sample difference `self - other`
    pub fn difference(&self, other: &Gather) -> Result<Gather> {
        if self.num_traces() != other.num_traces() || self.num_samples() != other.num_samples() {
            return Err(FxDeconError::Shape(format!(
                "Cannot subtract a {}x{} gather from a {}x{} gather",
                other.num_traces(),
                other.num_samples(),
                self.num_traces(),
                self.num_samples()
            )));
        }
        let traces = self
            .traces
            .iter()
            .zip(other.traces.iter())
            .map(|(a, b)| a.iter().zip(b.iter()).map(|(x, y)| x - y).collect())
            .collect();
        Ok(Gather {
            sample_interval_ms: self.sample_interval_ms,
            traces,
        })
    }
}

fn read_gather<R: Read>(mut reader: WavReader<R>) -> Result<Gather> {
    let spec = reader.spec();
    let num_traces = spec.channels as usize;
    if num_traces == 0 || spec.sample_rate == 0 {
        return Err(FxDeconError::Io(
            "WAV file has no channels or a zero sample rate".to_string(),
        ));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let num_samples = interleaved.len() / num_traces;
    let mut traces = vec![Vec::with_capacity(num_samples); num_traces];
    for frame in interleaved.chunks_exact(num_traces) {
        for (trace, &sample) in traces.iter_mut().zip(frame.iter()) {
            trace.push(sample);
        }
    }

    log::debug!(
        "Read gather: {} traces x {} samples at {} Hz ({}-bit {:?})",
        num_traces,
        num_samples,
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format
    );

    Gather::new(1000.0 / spec.sample_rate as f64, traces)
}

fn gather_spec(gather: &Gather) -> Result<WavSpec> {
    gather.validate()?;
    let channels = u16::try_from(gather.num_traces())
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| {
            FxDeconError::Io(format!(
                "A WAV gather holds 1 to {} traces, got {}",
                u16::MAX,
                gather.num_traces()
            ))
        })?;

    let rate = 1000.0 / gather.sample_interval_ms;
    if (rate - rate.round()).abs() > 1e-6 || rate.round() > u32::MAX as f64 {
        return Err(FxDeconError::Io(format!(
            "Sample interval {} ms does not map to an integer sample rate",
            gather.sample_interval_ms
        )));
    }

    Ok(WavSpec {
        channels,
        sample_rate: rate.round() as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    })
}

fn write_gather<W: Write + Seek>(writer: W, gather: &Gather) -> Result<()> {
    let spec = gather_spec(gather)?;
    let mut writer = WavWriter::new(writer, spec)?;
    for isamp in 0..gather.num_samples() {
        for trace in &gather.traces {
            writer.write_sample(trace[isamp])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Read a gather from a WAV file
#[cfg(not(target_arch = "wasm32"))]
pub fn read_gather_file<P: AsRef<Path>>(path: P) -> Result<Gather> {
    let reader = WavReader::open(path)?;
    read_gather(reader)
}

/// Read a gather from WAV bytes
pub fn read_gather_bytes(data: Vec<u8>) -> Result<Gather> {
    let reader = WavReader::new(Cursor::new(data))?;
    read_gather(reader)
}

/// Write a gather as a 32-bit float WAV file
#[cfg(not(target_arch = "wasm32"))]
pub fn write_gather_file<P: AsRef<Path>>(path: P, gather: &Gather) -> Result<()> {
    use std::io::BufWriter;

    let file = File::create(path)?;
    write_gather(BufWriter::new(file), gather)
}

/// Write a gather as 32-bit float WAV bytes
pub fn write_gather_bytes(gather: &Gather) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_gather(&mut cursor, gather)?;
    Ok(cursor.into_inner())
}
