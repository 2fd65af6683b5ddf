//! Instrument side of the pipeline.

use std::thread;
use std::time::Duration;

use crate::error::SamplerError;

/// Anything that can produce one reading per channel on demand.
///
/// `read_sample` is allowed to block; the acquisition loop runs exactly as
/// fast as it returns.
pub trait Sampler<const NUM_CHANNELS: usize>: Send {
    fn read_sample(&mut self) -> Result<[f64; NUM_CHANNELS], SamplerError>;
}

impl<const NUM_CHANNELS: usize, S: Sampler<NUM_CHANNELS> + ?Sized> Sampler<NUM_CHANNELS>
    for Box<S>
{
    fn read_sample(&mut self) -> Result<[f64; NUM_CHANNELS], SamplerError> {
        (**self).read_sample()
    }
}

/// Simulated dynamometer: every channel is `amplitude * sin(t)`, paced at
/// `data_rate` Hz.
pub struct MockSampler<const NUM_CHANNELS: usize> {
    amplitudes: [f64; NUM_CHANNELS],
    period: Duration,
    t: f64,
}

impl<const NUM_CHANNELS: usize> MockSampler<NUM_CHANNELS> {
    /// Fails when `data_rate` is not positive or so small that the period
    /// overflows a `Duration`.
    pub fn new(amplitudes: [f64; NUM_CHANNELS], data_rate: f64) -> Result<Self, SamplerError> {
        if !(data_rate > 0.0) {
            return Err(SamplerError::InvalidRate(data_rate));
        }
        let period = Duration::try_from_secs_f64(1.0 / data_rate)
            .map_err(|_| SamplerError::InvalidRate(data_rate))?;

        Ok(MockSampler {
            amplitudes,
            period,
            t: 0.0,
        })
    }
}

impl<const NUM_CHANNELS: usize> Sampler<NUM_CHANNELS> for MockSampler<NUM_CHANNELS> {
    fn read_sample(&mut self) -> Result<[f64; NUM_CHANNELS], SamplerError> {
        thread::sleep(self.period);
        self.t += self.period.as_secs_f64();

        let s = self.t.sin();
        Ok(self.amplitudes.map(|a| a * s))
    }
}
