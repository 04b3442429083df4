//! Gather processor
//!
//! Provides [`GatherProcessor`], which holds the parameters, the loaded
//! gather and the last result, and drives the FX-decon engine over the
//! ensembles of a gather.

use crate::config::{FxDeconAttr, FxDeconParams, OutputMode};
use crate::error::FxDeconError;
use crate::fxdecon::FxDecon;
use crate::gather_io::Gather;
use crate::Result;

/// Runs FX-decon over a whole gather
pub struct GatherProcessor {
    params: FxDeconParams,
    gather: Option<Gather>,
    result: Option<Gather>,
    threads: usize,
}

impl Default for GatherProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl GatherProcessor {
    /// Create a new processor with default parameters
    pub fn new() -> Self {
        Self::with_params(FxDeconParams::default())
    }

    pub fn with_params(params: FxDeconParams) -> Self {
        Self {
            params,
            gather: None,
            result: None,
            threads: 1,
        }
    }

    /// Get the current parameters
    pub fn params(&self) -> &FxDeconParams {
        &self.params
    }

    /// Set new parameters (clears any existing result)
    pub fn set_params(&mut self, params: FxDeconParams) {
        self.params = params;
        self.result = None;
    }

    /// Set a single parameter by name (clears any existing result)
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        self.params.set(name, value)?;
        self.result = None;
        Ok(())
    }

    /// Number of worker threads used by [`process`](Self::process)
    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads.max(1);
    }

    /// Load a gather into the processor
    pub fn load_gather(&mut self, gather: Gather) -> Result<()> {
        gather.validate()?;
        log::info!(
            "Loaded gather: {} traces x {} samples, {} ms interval",
            gather.num_traces(),
            gather.num_samples(),
            gather.sample_interval_ms
        );
        self.gather = Some(gather);
        self.result = None;
        Ok(())
    }

    /// Get the loaded gather
    pub fn gather(&self) -> Option<&Gather> {
        self.gather.as_ref()
    }

    /// Get the result of the last [`process`](Self::process) call
    pub fn result(&self) -> Option<&Gather> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<Gather> {
        self.result.take()
    }

    fn loaded_gather(&self) -> Result<&Gather> {
        self.gather
            .as_ref()
            .ok_or_else(|| FxDeconError::Config("No gather loaded".to_string()))
    }

    /// Engine parameters and derived sizes for the loaded gather
    pub fn describe_engine(&self) -> Result<String> {
        let gather = self.loaded_gather()?;
        let attr = self
            .params
            .to_attr(gather.sample_interval_ms, gather.num_samples())?;
        let mut engine = FxDecon::new();
        engine.initialize(gather.sample_interval_ms, gather.num_samples(), attr)?;
        Ok(engine.to_string())
    }

    /// Filter the loaded gather ensemble by ensemble
    pub fn process(&mut self) -> Result<()> {
        let gather = self.loaded_gather()?;
        let num_traces = gather.num_traces();
        let num_samples = gather.num_samples();
        let dt = gather.sample_interval_ms;
        let attr = self.params.to_attr(dt, num_samples)?;

        let ensemble = match self.params.traces_per_ensemble {
            0 => num_traces,
            n => n.min(num_traces),
        }
        .max(1);
        let num_ensembles = num_traces.div_ceil(ensemble);
        let threads = self.threads.min(num_ensembles).max(1);

        log::info!(
            "FX-decon: {} traces in {} ensembles, {} time windows, {:.1}-{:.1} Hz, {} thread(s)",
            num_traces,
            num_ensembles,
            attr.num_win,
            attr.fmin,
            attr.fmax,
            threads
        );

        let mut filtered = Gather::zeros(dt, num_traces, num_samples);
        let mut jobs: Vec<Ensemble<'_>> = gather
            .traces
            .chunks(ensemble)
            .zip(filtered.traces.chunks_mut(ensemble))
            .collect();

        if threads == 1 {
            run_ensembles(dt, num_samples, attr, &mut jobs)?;
        } else {
            run_parallel(threads, dt, num_samples, attr, &mut jobs)?;
        }

        let result = match self.params.output_mode {
            OutputMode::Filtered => filtered,
            OutputMode::Noise => gather.difference(&filtered)?,
        };
        log::info!(
            "FX-decon complete: output mode {}, peak amplitude {:.4}",
            self.params.output_mode.name(),
            result.max_abs()
        );
        self.result = Some(result);
        Ok(())
    }
}

/// Input traces of one ensemble and the output rows they filter into
type Ensemble<'a> = (&'a [Vec<f32>], &'a mut [Vec<f32>]);

/// Filter a group of ensembles with a single engine
fn run_ensembles(
    dt: f64,
    num_samples: usize,
    attr: FxDeconAttr,
    group: &mut [Ensemble<'_>],
) -> Result<()> {
    let mut engine = FxDecon::new();
    engine.initialize(dt, num_samples, attr)?;
    for (input, output) in group.iter_mut() {
        log::debug!("Processing ensemble of {} traces", input.len());
        engine.apply(&input[..], &mut output[..])?;
    }
    let stats = engine.resource_stats();
    log::debug!(
        "Worker done: {} buffer allocation(s), {} release(s)",
        stats.allocation_cycles,
        stats.release_cycles
    );
    Ok(())
}

/// Split the ensembles into one group per thread of a local pool, one
/// engine per group
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn run_parallel(
    threads: usize,
    dt: f64,
    num_samples: usize,
    attr: FxDeconAttr,
    jobs: &mut [Ensemble<'_>],
) -> Result<()> {
    use rayon::prelude::*;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| {
            FxDeconError::Worker(format!("Failed to build pool of {} threads: {}", threads, e))
        })?;
    log::trace!("Configured worker pool with {} threads", threads);

    let per_thread = jobs.len().div_ceil(threads).max(1);
    pool.install(|| {
        jobs.par_chunks_mut(per_thread)
            .try_for_each(|group| run_ensembles(dt, num_samples, attr, group))
    })
}

#[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
fn run_parallel(
    threads: usize,
    dt: f64,
    num_samples: usize,
    attr: FxDeconAttr,
    jobs: &mut [Ensemble<'_>],
) -> Result<()> {
    log::warn!(
        "Built without parallel support, running {} requested threads on one",
        threads
    );
    run_ensembles(dt, num_samples, attr, jobs)
}
