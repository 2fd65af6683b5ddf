use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer_module::{SampleBuffer, Snapshot};

/// Read-only view of the live buffer, handed to whatever draws it.
#[derive(Clone)]
pub struct SnapshotReader<const NUM_CHANNELS: usize> {
    buffer: Arc<Mutex<SampleBuffer<NUM_CHANNELS>>>,
}

impl<const NUM_CHANNELS: usize> SnapshotReader<NUM_CHANNELS> {
    pub fn new(buffer: Arc<Mutex<SampleBuffer<NUM_CHANNELS>>>) -> Self {
        SnapshotReader { buffer }
    }

    /// Copies the buffer under its lock. The lock is held only for the copy.
    pub fn snapshot(&self) -> Snapshot<NUM_CHANNELS> {
        self.buffer.lock().snapshot()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSummary {
    pub last: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ChannelSummary {
    fn of(values: &[f64]) -> Option<ChannelSummary> {
        let last = *values.last()?;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }

        Some(ChannelSummary {
            last,
            min,
            max,
            mean: sum / values.len() as f64,
        })
    }
}

impl<const NUM_CHANNELS: usize> Snapshot<NUM_CHANNELS> {
    /// Per-channel statistics, `None` for an empty snapshot.
    pub fn summary(&self) -> Option<[ChannelSummary; NUM_CHANNELS]> {
        let mut out = [ChannelSummary {
            last: 0.0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
        }; NUM_CHANNELS];
        for (summary, channel) in out.iter_mut().zip(self.channels()) {
            *summary = ChannelSummary::of(channel)?;
        }
        Some(out)
    }

    /// Elapsed time covered by the snapshot, first to last sample.
    pub fn time_span(&self) -> Option<(f64, f64)> {
        Some((*self.time().first()?, *self.time().last()?))
    }
}
