//! Continuous instrument logging: a bounded in-memory buffer that feeds a
//! live view and evicts its oldest samples into an append-only CSV log.

pub mod acquisition_module;
#[cfg(feature = "audio-input")]
pub mod audio_sampler;
pub mod buffer_module;
pub mod config;
pub mod display;
pub mod error;
pub mod sample;
pub mod sampler;
pub mod sink_module;
pub mod snapshot_module;

pub use acquisition_module::{Acquisition, AcquisitionConfig, AcquisitionState, StopHandle};
pub use buffer_module::{SampleBuffer, Snapshot};
pub use error::{AcquisitionError, SamplerError, SinkError};
pub use sample::Sample;
pub use sampler::{MockSampler, Sampler};
pub use sink_module::CsvSink;
pub use snapshot_module::SnapshotReader;
