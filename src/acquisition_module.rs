//! Acquisition worker and its lifecycle.
//!
//! The worker thread reads the sampler, pushes into the shared buffer and
//! writes the oldest sample to the sink whenever the buffer grows past
//! `max_items`. `Acquisition::shutdown` stops the worker, takes the sink back
//! and drains whatever is still buffered.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;
use thread_priority::{ThreadBuilder, ThreadPriority};
use tracing::{debug, error, info, warn};

use crate::buffer_module::SampleBuffer;
use crate::error::{AcquisitionError, SamplerError};
use crate::sample::Sample;
use crate::sampler::Sampler;
use crate::sink_module::CsvSink;
use crate::snapshot_module::SnapshotReader;

pub const WORKER_THREAD_NAME: &str = "data_worker";
pub const DEFAULT_ERROR_BUDGET: u32 = 1000;
pub const DEFAULT_MAX_ITEMS: usize = 1000;
/// Upper bound on `max_items`.
pub const MAX_ITEMS_LIMIT: usize = 10_000_000;
// the buffer grows past this on demand
const PREALLOCATED_ITEMS: usize = 4096;

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    /// Samples kept in memory before the oldest is written out.
    pub max_items: usize,
    /// Read failures tolerated before acquisition aborts.
    pub error_budget: u32,
    /// Run the worker at the highest thread priority.
    pub realtime_priority: bool,
}

impl AcquisitionConfig {
    /// Rejects a `max_items` outside `1..=MAX_ITEMS_LIMIT`.
    pub fn check(&self) -> Result<(), AcquisitionError> {
        if self.max_items == 0 || self.max_items > MAX_ITEMS_LIMIT {
            return Err(AcquisitionError::InvalidConfig(format!(
                "max_items must be between 1 and {}, got {}",
                MAX_ITEMS_LIMIT, self.max_items
            )));
        }
        Ok(())
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_MAX_ITEMS,
            error_budget: DEFAULT_ERROR_BUDGET,
            realtime_priority: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Running,
    Draining,
    Stopped,
}

/// Cumulative count of read failures still tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    initial: u32,
    remaining: u32,
}

impl ErrorBudget {
    pub fn new(budget: u32) -> Self {
        ErrorBudget {
            initial: budget,
            remaining: budget,
        }
    }

    /// Spends one unit. Returns `false` once nothing is left to spend.
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn initial(&self) -> u32 {
        self.initial
    }
}

/// Counters shared between the worker and whoever wants to watch it.
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    pub samples_acquired: AtomicU64,
    pub read_failures: AtomicU64,
    pub rows_written: AtomicU64,
    pub budget_remaining: AtomicU64,
}

impl AcquisitionStats {
    pub fn log_stats(&self) {
        info!(
            "Stats: samples={}, read_failures={}, rows_written={}, budget_remaining={}",
            self.samples_acquired.load(Ordering::Relaxed),
            self.read_failures.load(Ordering::Relaxed),
            self.rows_written.load(Ordering::Relaxed),
            self.budget_remaining.load(Ordering::Relaxed),
        );
    }
}

/// Cloneable handle that asks the worker to stop after its current cycle.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        StopHandle { running }
    }

    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        !self.running.load(Ordering::Acquire)
    }
}

/// What the worker thread hands back when it ends.
struct WorkerExit {
    sink: CsvSink,
    outcome: Result<(), AcquisitionError>,
}

pub struct Acquisition<const NUM_CHANNELS: usize> {
    buffer: Arc<Mutex<SampleBuffer<NUM_CHANNELS>>>,
    running: Arc<AtomicBool>,
    stats: Arc<AcquisitionStats>,
    worker: Option<JoinHandle<WorkerExit>>,
    state: AcquisitionState,
}

impl<const NUM_CHANNELS: usize> Acquisition<NUM_CHANNELS> {
    /// Opens the sink at `log_path` and starts the worker thread.
    pub fn start<S, N>(
        sampler: S,
        log_path: &Path,
        channel_names: &[N],
        config: AcquisitionConfig,
    ) -> Result<Self, AcquisitionError>
    where
        S: Sampler<NUM_CHANNELS> + 'static,
        N: AsRef<str>,
    {
        config.check()?;
        if channel_names.len() != NUM_CHANNELS {
            return Err(AcquisitionError::InvalidConfig(format!(
                "expected {} channel names, got {}",
                NUM_CHANNELS,
                channel_names.len()
            )));
        }

        let sink = CsvSink::open(log_path, channel_names)?;

        let capacity = config.max_items.min(PREALLOCATED_ITEMS) + 1;
        let buffer = Arc::new(Mutex::new(SampleBuffer::with_capacity(capacity)));
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(AcquisitionStats::default());
        stats
            .budget_remaining
            .store(config.error_budget as u64, Ordering::Relaxed);

        let mut builder = ThreadBuilder::default().name(WORKER_THREAD_NAME);
        if config.realtime_priority {
            builder = builder.priority(ThreadPriority::Max);
        }

        let worker_buffer = Arc::clone(&buffer);
        let worker_running = Arc::clone(&running);
        let worker_stats = Arc::clone(&stats);

        let worker = builder
            .spawn(move |priority_result| {
                if let Err(e) = priority_result {
                    warn!("could not raise acquisition worker priority: {:?}", e);
                }

                let mut sampler = sampler;
                let mut sink = sink;
                let mut budget = ErrorBudget::new(config.error_budget);
                let outcome = run_loop(
                    &mut sampler,
                    &mut sink,
                    &worker_buffer,
                    &worker_running,
                    &mut budget,
                    config.max_items,
                    &worker_stats,
                );
                WorkerExit { sink, outcome }
            })
            .map_err(AcquisitionError::Spawn)?;

        info!(
            "acquisition started: max_items={}, error_budget={}",
            config.max_items, config.error_budget
        );

        Ok(Acquisition {
            buffer,
            running,
            stats,
            worker: Some(worker),
            state: AcquisitionState::Running,
        })
    }

    pub fn reader(&self) -> SnapshotReader<NUM_CHANNELS> {
        SnapshotReader::new(Arc::clone(&self.buffer))
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.running))
    }

    pub fn stats(&self) -> Arc<AcquisitionStats> {
        Arc::clone(&self.stats)
    }

    /// Lifecycle as driven by this handle: `Running` until `shutdown` is
    /// called. A worker that ends on its own (error budget exhausted, sink
    /// failure) leaves this at `Running`; use `is_running` to detect that.
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// False once the worker has exited, whether asked to or not.
    pub fn is_running(&self) -> bool {
        match self.worker {
            Some(ref worker) => !worker.is_finished(),
            None => false,
        }
    }

    /// Stops the worker, writes every buffered sample and closes the sink.
    ///
    /// Blocks until done. A second call returns `Ok(())` without doing
    /// anything. If the worker had already failed, the buffer is still
    /// drained before its error is returned.
    pub fn shutdown(&mut self) -> Result<(), AcquisitionError> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => {
                debug!("shutdown called again, nothing to do");
                return Ok(());
            }
        };

        self.running.store(false, Ordering::Release);
        self.state = AcquisitionState::Draining;

        info!("waiting for acquisition worker..");
        let exit = worker.join();
        info!("acquisition worker terminated");

        let WorkerExit { mut sink, outcome } = match exit {
            Ok(exit) => exit,
            Err(_) => {
                self.state = AcquisitionState::Stopped;
                error!("acquisition worker panicked, buffered samples were not written");
                return Err(AcquisitionError::WorkerPanicked);
            }
        };

        let drained = drain(&self.buffer, &mut sink, &self.stats);
        let closed = sink.close();
        self.state = AcquisitionState::Stopped;

        drained?;
        closed?;
        info!("wrote data store to {:?}", sink.path());

        outcome
    }
}

impl<const NUM_CHANNELS: usize> Drop for Acquisition<NUM_CHANNELS> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.shutdown() {
                error!("shutdown on drop failed: {}", e);
            }
        }
    }
}

fn run_loop<S, const NUM_CHANNELS: usize>(
    sampler: &mut S,
    sink: &mut CsvSink,
    buffer: &Mutex<SampleBuffer<NUM_CHANNELS>>,
    running: &AtomicBool,
    budget: &mut ErrorBudget,
    max_items: usize,
    stats: &AcquisitionStats,
) -> Result<(), AcquisitionError>
where
    S: Sampler<NUM_CHANNELS> + ?Sized,
{
    let t_start = Instant::now();

    while running.load(Ordering::Acquire) {
        let elapsed = t_start.elapsed().as_secs_f64();

        match sampler.read_sample() {
            Ok(data) => {
                let mut buffer = buffer.lock();
                buffer.push_sample(Sample::new(elapsed, data));
                stats.samples_acquired.fetch_add(1, Ordering::Relaxed);

                if buffer.len() > max_items {
                    write_oldest(&mut buffer, sink, stats)?;
                }
            }
            Err(e) => {
                // a read cut short by shutdown is not charged to the budget
                if !running.load(Ordering::Acquire) {
                    debug!("read failed after stop request: {}", e);
                    break;
                }
                stats.read_failures.fetch_add(1, Ordering::Relaxed);
                handle_read_failure(budget, e, stats)?;
            }
        }
    }

    debug!("acquisition loop observed stop request");
    Ok(())
}

fn handle_read_failure(
    budget: &mut ErrorBudget,
    e: SamplerError,
    stats: &AcquisitionStats,
) -> Result<(), AcquisitionError> {
    if !budget.consume() {
        error!(
            "read failed with no error budget left ({} used), aborting acquisition: {}",
            budget.initial(),
            e
        );
        return Err(AcquisitionError::ErrorBudgetExhausted {
            budget: budget.initial(),
            source: e,
        });
    }

    stats
        .budget_remaining
        .store(budget.remaining() as u64, Ordering::Relaxed);
    warn!("sample read failed ({} failures left): {}", budget.remaining(), e);
    Ok(())
}

/// Writes the head of the buffer, then evicts it. A failed write leaves the
/// sample in place.
fn write_oldest<const NUM_CHANNELS: usize>(
    buffer: &mut SampleBuffer<NUM_CHANNELS>,
    sink: &mut CsvSink,
    stats: &AcquisitionStats,
) -> Result<(), AcquisitionError> {
    let oldest = match buffer.oldest() {
        Some(oldest) => oldest,
        None => return Ok(()),
    };

    sink.append_row(&oldest)?;
    buffer.evict_oldest();
    stats.rows_written.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn drain<const NUM_CHANNELS: usize>(
    buffer: &Mutex<SampleBuffer<NUM_CHANNELS>>,
    sink: &mut CsvSink,
    stats: &AcquisitionStats,
) -> Result<(), AcquisitionError> {
    let mut buffer = buffer.lock();
    info!("draining {} buffered samples", buffer.len());

    while !buffer.is_empty() {
        write_oldest(&mut buffer, sink, stats)?;
    }
    Ok(())
}
