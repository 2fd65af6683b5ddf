use std::collections::VecDeque;

use crate::sample::Sample;

/// FIFO of samples kept as parallel per-channel sequences.
///
/// The time sequence and every channel sequence always have the same length.
/// No capacity is enforced here; the acquisition loop checks `len()` after
/// each push and evicts.
pub struct SampleBuffer<const NUM_CHANNELS: usize> {
    time: VecDeque<f64>,
    channels: [VecDeque<f64>; NUM_CHANNELS],
}

impl<const NUM_CHANNELS: usize> SampleBuffer<NUM_CHANNELS> {
    pub fn new() -> SampleBuffer<NUM_CHANNELS> {
        SampleBuffer {
            time: VecDeque::new(),
            channels: std::array::from_fn(|_| VecDeque::new()),
        }
    }

    pub fn with_capacity(capacity: usize) -> SampleBuffer<NUM_CHANNELS> {
        SampleBuffer {
            time: VecDeque::with_capacity(capacity),
            channels: std::array::from_fn(|_| VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push_sample(&mut self, sample: Sample<NUM_CHANNELS>) {
        self.time.push_back(sample.elapsed);
        for (channel, value) in self.channels.iter_mut().zip(sample.data) {
            channel.push_back(value);
        }
    }

    /// Removes and returns the oldest sample.
    ///
    /// Panics if the buffer is empty; callers check `len()` first.
    pub fn evict_oldest(&mut self) -> Sample<NUM_CHANNELS> {
        let elapsed = match self.time.pop_front() {
            Some(elapsed) => elapsed,
            None => panic!("evict_oldest called on an empty sample buffer"),
        };

        let mut data = [0.0; NUM_CHANNELS];
        for (value, channel) in data.iter_mut().zip(self.channels.iter_mut()) {
            *value = channel
                .pop_front()
                .expect("channel sequences out of lock-step with time");
        }

        Sample::new(elapsed, data)
    }

    pub fn oldest(&self) -> Option<Sample<NUM_CHANNELS>> {
        let elapsed = *self.time.front()?;
        let mut data = [0.0; NUM_CHANNELS];
        for (value, channel) in data.iter_mut().zip(self.channels.iter()) {
            *value = *channel.front()?;
        }
        Some(Sample::new(elapsed, data))
    }

    /// Copies every sequence out. The copies share nothing with the buffer.
    pub fn snapshot(&self) -> Snapshot<NUM_CHANNELS> {
        Snapshot {
            time: self.time.iter().copied().collect(),
            channels: std::array::from_fn(|i| self.channels[i].iter().copied().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

impl<const NUM_CHANNELS: usize> Default for SampleBuffer<NUM_CHANNELS> {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a [`SampleBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<const NUM_CHANNELS: usize> {
    time: Vec<f64>,
    channels: [Vec<f64>; NUM_CHANNELS],
}

impl<const NUM_CHANNELS: usize> Snapshot<NUM_CHANNELS> {
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f64>; NUM_CHANNELS] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}
