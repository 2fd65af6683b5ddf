/// One timestamped measurement: seconds since acquisition start plus one
/// reading per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<const NUM_CHANNELS: usize> {
    pub elapsed: f64,
    pub data: [f64; NUM_CHANNELS],
}

impl<const NUM_CHANNELS: usize> Sample<NUM_CHANNELS> {
    pub fn new(elapsed: f64, data: [f64; NUM_CHANNELS]) -> Self {
        Sample { elapsed, data }
    }

    /// Row values in column order: elapsed time first, then each channel.
    pub fn row(&self) -> impl Iterator<Item = f64> + '_ {
        std::iter::once(self.elapsed).chain(self.data.iter().copied())
    }
}
