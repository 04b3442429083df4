//! Synthetic test gathers
//!
//! Linear events with a Ricker wavelet plus optional uniform random noise,
//! handy for trying out parameters without field data.

use crate::gather_io::Gather;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// A linear event `t(x) = t0 + dip * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearEvent {
    /// Arrival time on the first trace [ms]
    pub t0_ms: f64,
    /// Moveout per trace [ms]
    pub dip_ms_per_trace: f64,
    pub amplitude: f64,
    /// Ricker peak frequency [Hz]
    pub peak_freq_hz: f64,
}

impl LinearEvent {
    pub fn new(t0_ms: f64, dip_ms_per_trace: f64, amplitude: f64, peak_freq_hz: f64) -> Self {
        Self {
            t0_ms,
            dip_ms_per_trace,
            amplitude,
            peak_freq_hz,
        }
    }
}

/// Ricker wavelet value at time `t_s` from its peak
pub fn ricker(t_s: f64, peak_freq_hz: f64) -> f64 {
    let a = (PI * peak_freq_hz * t_s).powi(2);
    (1.0 - 2.0 * a) * (-a).exp()
}

/// Builder for synthetic gathers
#[derive(Debug, Clone)]
pub struct SyntheticGather {
    num_traces: usize,
    num_samples: usize,
    sample_interval_ms: f64,
    events: Vec<LinearEvent>,
    noise_level: f64,
    seed: u64,
}

impl Default for SyntheticGather {
    fn default() -> Self {
        Self {
            num_traces: 48,
            num_samples: 500,
            sample_interval_ms: 4.0,
            events: Vec::new(),
            noise_level: 0.0,
            seed: 0,
        }
    }
}

impl SyntheticGather {
    pub fn new(num_traces: usize, num_samples: usize, sample_interval_ms: f64) -> Self {
        Self {
            num_traces,
            num_samples,
            sample_interval_ms,
            ..Self::default()
        }
    }

    /// A flat, a dipping and a steep event over the whole gather
    pub fn demo(num_traces: usize, num_samples: usize, sample_interval_ms: f64) -> Self {
        let duration = num_samples as f64 * sample_interval_ms;
        Self::new(num_traces, num_samples, sample_interval_ms)
            .event(LinearEvent::new(0.25 * duration, 0.0, 1.0, 25.0))
            .event(LinearEvent::new(0.4 * duration, 2.0, 0.8, 20.0))
            .event(LinearEvent::new(0.1 * duration, 6.0, 0.6, 30.0))
            .noise(0.5, 1)
    }

    pub fn event(mut self, event: LinearEvent) -> Self {
        self.events.push(event);
        self
    }

    /// Uniform noise in `[-level, level)` drawn from a generator seeded with `seed`
    pub fn noise(mut self, level: f64, seed: u64) -> Self {
        self.noise_level = level;
        self.seed = seed;
        self
    }

    pub fn build(&self) -> Gather {
        let dt_s = self.sample_interval_ms / 1000.0;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let traces = (0..self.num_traces)
            .map(|itrc| {
                (0..self.num_samples)
                    .map(|isamp| {
                        let t_s = isamp as f64 * dt_s;
                        let signal: f64 = self
                            .events
                            .iter()
                            .map(|e| {
                                let arrival_s =
                                    (e.t0_ms + e.dip_ms_per_trace * itrc as f64) / 1000.0;
                                e.amplitude * ricker(t_s - arrival_s, e.peak_freq_hz)
                            })
                            .sum();
                        let noise = if self.noise_level > 0.0 {
                            rng.random_range(-self.noise_level..self.noise_level)
                        } else {
                            0.0
                        };
                        (signal + noise) as f32
                    })
                    .collect()
            })
            .collect();

        log::debug!(
            "Synthetic gather: {} traces x {} samples, {} events, noise {}",
            self.num_traces,
            self.num_samples,
            self.events.len(),
            self.noise_level
        );

        Gather {
            sample_interval_ms: self.sample_interval_ms,
            traces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ricker_peak() {
        assert_eq!(ricker(0.0, 25.0), 1.0);
        assert!(ricker(0.1, 25.0).abs() < 1e-6);
        assert!(ricker(0.01, 25.0) < 1.0);
    }

    #[test]
    fn test_flat_event_position() {
        let gather = SyntheticGather::new(4, 100, 4.0)
            .event(LinearEvent::new(200.0, 0.0, 2.0, 20.0))
            .build();
        assert_eq!(gather.num_traces(), 4);
        assert_eq!(gather.num_samples(), 100);
        for trace in &gather.traces {
            assert!((trace[50] - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_dipping_event_moves() {
        let gather = SyntheticGather::new(3, 200, 2.0)
            .event(LinearEvent::new(100.0, 10.0, 1.0, 30.0))
            .build();
        // Peak at 100 ms on trace 0, 120 ms on trace 2
        assert!((gather.traces[0][50] - 1.0).abs() < 1e-6);
        assert!((gather.traces[2][60] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_noise_is_seeded() {
        let a = SyntheticGather::new(2, 50, 4.0).noise(0.3, 9).build();
        let b = SyntheticGather::new(2, 50, 4.0).noise(0.3, 9).build();
        let c = SyntheticGather::new(2, 50, 4.0).noise(0.3, 10).build();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.traces.iter().flatten().all(|v| v.abs() <= 0.3));
    }

    #[test]
    fn test_demo_is_valid() {
        let gather = SyntheticGather::demo(24, 250, 4.0).build();
        assert!(gather.validate().is_ok());
        assert!(gather.max_abs() > 0.5);
    }
}
