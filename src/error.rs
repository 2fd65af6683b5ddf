//! Error types for the acquisition pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A failed read from the instrument. Read failures are treated as transient
/// by the acquisition loop until the error budget runs out.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("data rate of {0} Hz gives no representable sample period")]
    InvalidRate(f64),

    #[error("instrument read timed out")]
    Timeout,

    #[error("instrument disconnected")]
    Disconnected,

    #[error("device error: {0}")]
    Device(String),
}

/// Errors from the persisted log.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to replace latest link {link:?}: {source}")]
    LatestLink {
        link: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sink is closed")]
    Closed,
}

/// Errors that end acquisition.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("error budget of {budget} exhausted, last failure: {source}")]
    ErrorBudgetExhausted {
        budget: u32,
        #[source]
        source: SamplerError,
    },

    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("invalid acquisition config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn acquisition worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("acquisition worker panicked")]
    WorkerPanicked,
}
