//! End-to-end tests: scripted sampler → acquisition → CSV file.

use std::collections::VecDeque;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use dyno_logger::{
    Acquisition, AcquisitionConfig, AcquisitionError, AcquisitionState, MockSampler, Sampler,
    SamplerError, SinkError,
};

const NAMES: [&str; 3] = ["torque [Nm]", "rotation speed [1/s]", "power [W]"];

/// Plays back a fixed list of reads, then blocks until released.
struct ScriptedSampler {
    script: VecDeque<Result<[f64; 3], SamplerError>>,
    exhausted: Arc<AtomicBool>,
    release: mpsc::Receiver<()>,
}

impl Sampler<3> for ScriptedSampler {
    fn read_sample(&mut self) -> Result<[f64; 3], SamplerError> {
        match self.script.pop_front() {
            Some(result) => result,
            None => {
                self.exhausted.store(true, Ordering::SeqCst);
                let _ = self.release.recv();
                Err(SamplerError::Timeout)
            }
        }
    }
}

// release is declared first so a panicking test unblocks the worker before
// the acquisition is dropped
struct Harness {
    release: Option<mpsc::Sender<()>>,
    acquisition: Acquisition<3>,
    exhausted: Arc<AtomicBool>,
}

impl Harness {
    fn start(
        path: &Path,
        script: Vec<Result<[f64; 3], SamplerError>>,
        max_items: usize,
        error_budget: u32,
    ) -> Harness {
        let exhausted = Arc::new(AtomicBool::new(false));
        let (release_tx, release_rx) = mpsc::channel();
        let sampler = ScriptedSampler {
            script: script.into(),
            exhausted: Arc::clone(&exhausted),
            release: release_rx,
        };
        let config = AcquisitionConfig {
            max_items,
            error_budget,
            realtime_priority: false,
        };
        let acquisition = Acquisition::start(sampler, path, &NAMES[..], config).unwrap();
        Harness {
            acquisition,
            exhausted,
            release: Some(release_tx),
        }
    }

    fn wait_exhausted(&self) {
        wait_until(|| self.exhausted.load(Ordering::SeqCst));
    }

    fn shutdown(&mut self) -> Result<(), AcquisitionError> {
        self.acquisition.stop_handle().request_stop();
        self.release.take();
        self.acquisition.shutdown()
    }
}

fn wait_until<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for condition");
        thread::sleep(Duration::from_millis(1));
    }
}

fn ok(i: u32) -> Result<[f64; 3], SamplerError> {
    let v = i as f64;
    Ok([v, v * 10.0, v * 100.0])
}

fn read_rows(path: &Path) -> (Vec<String>, Vec<Vec<f64>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(|s| s.to_string()).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(|f| f.parse::<f64>().unwrap()).collect())
        .collect();
    (header, rows)
}

fn assert_time_non_decreasing(rows: &[Vec<f64>]) {
    for pair in rows.windows(2) {
        assert!(pair[0][0] <= pair[1][0], "time went backwards: {:?}", pair);
    }
}

#[test]
fn test_capacity_three_five_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let mut harness = Harness::start(&path, (1..=5).map(ok).collect(), 3, 10);

    harness.wait_exhausted();
    let stats = harness.acquisition.stats();
    assert_eq!(stats.rows_written.load(Ordering::SeqCst), 2);

    let snapshot = harness.acquisition.reader().snapshot();
    assert_eq!(snapshot.channel(0), &[3.0, 4.0, 5.0]);
    assert_eq!(snapshot.channel(1), &[30.0, 40.0, 50.0]);
    assert_eq!(snapshot.channel(2), &[300.0, 400.0, 500.0]);

    harness.shutdown().unwrap();
    assert_eq!(harness.acquisition.state(), AcquisitionState::Stopped);
    assert!(harness.acquisition.reader().is_empty());

    let (header, rows) = read_rows(&path);
    assert_eq!(
        header,
        vec!["experiment time [s]", "torque [Nm]", "rotation speed [1/s]", "power [W]"]
    );
    assert_eq!(rows.len(), 5);
    for (i, row) in rows.iter().enumerate() {
        let v = (i + 1) as f64;
        assert_eq!(&row[1..], &[v, v * 10.0, v * 100.0]);
    }
    assert_time_non_decreasing(&rows);
}

#[test]
fn test_every_sample_persisted_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let mut harness = Harness::start(&path, (1..=200).map(ok).collect(), 7, 10);

    harness.wait_exhausted();
    assert!(harness.acquisition.reader().len() <= 7);
    harness.shutdown().unwrap();

    let (_, rows) = read_rows(&path);
    let torque: Vec<f64> = rows.iter().map(|r| r[1]).collect();
    let expected: Vec<f64> = (1..=200).map(|i| i as f64).collect();
    assert_eq!(torque, expected);
    assert_time_non_decreasing(&rows);
}

#[test]
fn test_shutdown_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let mut harness = Harness::start(&path, (1..=4).map(ok).collect(), 2, 10);

    harness.wait_exhausted();
    harness.shutdown().unwrap();
    let (_, first) = read_rows(&path);

    harness.acquisition.shutdown().unwrap();
    assert_eq!(harness.acquisition.state(), AcquisitionState::Stopped);
    assert!(!harness.acquisition.is_running());
    let (_, second) = read_rows(&path);
    assert_eq!(first, second);
    assert_eq!(second.len(), 4);
}

#[test]
fn test_single_failure_skips_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let script = vec![ok(1), Err(SamplerError::Timeout), ok(2)];
    let mut harness = Harness::start(&path, script, 100, 10);

    harness.wait_exhausted();
    let stats = harness.acquisition.stats();
    assert_eq!(stats.read_failures.load(Ordering::SeqCst), 1);
    assert_eq!(stats.budget_remaining.load(Ordering::SeqCst), 9);
    assert_eq!(stats.samples_acquired.load(Ordering::SeqCst), 2);
    assert_eq!(harness.acquisition.reader().snapshot().time().len(), 2);

    harness.shutdown().unwrap();
    assert_eq!(stats.budget_remaining.load(Ordering::SeqCst), 9);

    let (_, rows) = read_rows(&path);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1], 1.0);
    assert_eq!(rows[1][1], 2.0);
}

#[test]
fn test_budget_failures_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let script = vec![
        Err(SamplerError::Timeout),
        Err(SamplerError::Device("crc".to_string())),
        ok(1),
    ];
    let mut harness = Harness::start(&path, script, 100, 2);

    harness.wait_exhausted();
    assert!(harness.acquisition.is_running());
    let stats = harness.acquisition.stats();
    assert_eq!(stats.budget_remaining.load(Ordering::SeqCst), 0);

    harness.shutdown().unwrap();
    let (_, rows) = read_rows(&path);
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_budget_exhaustion_is_fatal_but_drains() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let script = vec![
        ok(7),
        Err(SamplerError::Timeout),
        Err(SamplerError::Timeout),
        Err(SamplerError::Disconnected),
        ok(8),
    ];
    let mut harness = Harness::start(&path, script, 100, 2);

    wait_until(|| !harness.acquisition.is_running());
    assert!(!harness.exhausted.load(Ordering::SeqCst));
    // the handle only leaves Running through shutdown
    assert_eq!(harness.acquisition.state(), AcquisitionState::Running);

    let err = harness.shutdown().unwrap_err();
    match err {
        AcquisitionError::ErrorBudgetExhausted { budget, source } => {
            assert_eq!(budget, 2);
            assert!(matches!(source, SamplerError::Disconnected));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.acquisition.state(), AcquisitionState::Stopped);

    // second call after a failed run is still a no-op
    harness.acquisition.shutdown().unwrap();

    let (_, rows) = read_rows(&path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], 7.0);
}

#[test]
fn test_snapshots_consistent_with_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let config = AcquisitionConfig {
        max_items: 20,
        error_budget: 10,
        realtime_priority: false,
    };
    let mut acquisition = Acquisition::<3>::start(
        MockSampler::new([1.0, 2.0, 3.0], 2000.0).unwrap(),
        &path,
        &NAMES[..],
        config,
    )
    .unwrap();
    let reader = acquisition.reader();

    let mut last = None;
    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        let snapshot = reader.snapshot();
        assert!(snapshot.len() <= 21);
        for channel in snapshot.channels() {
            assert_eq!(channel.len(), snapshot.len());
        }
        if !snapshot.is_empty() {
            last = Some(snapshot);
        }
        thread::sleep(Duration::from_millis(5));
    }

    acquisition.shutdown().unwrap();
    let snapshot = last.expect("no samples acquired");

    let (_, rows) = read_rows(&path);
    let times: Vec<f64> = rows.iter().map(|r| r[0]).collect();
    let start = times
        .iter()
        .position(|t| *t == snapshot.time()[0])
        .expect("snapshot start not in log");
    for (i, t) in snapshot.time().iter().enumerate() {
        assert_eq!(times[start + i], *t);
        assert_eq!(rows[start + i][2], snapshot.channel(1)[i]);
    }
    assert_time_non_decreasing(&rows);
}

#[test]
fn test_start_fails_without_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("run.csv");
    let config = AcquisitionConfig::default();

    let sampler = MockSampler::new([1.0; 3], 100.0).unwrap();
    let result = Acquisition::<3>::start(sampler, &path, &NAMES[..], config);
    assert!(matches!(
        result,
        Err(AcquisitionError::Sink(SinkError::Io { .. }))
    ));
}

#[cfg(unix)]
#[test]
fn test_sink_failure_at_shutdown_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let status = std::process::Command::new("mkfifo")
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    // takes the header and hangs up, so the buffered rows hit a broken pipe
    let fifo_path = path.clone();
    let reader = thread::spawn(move || {
        let mut fifo = std::fs::File::open(&fifo_path).unwrap();
        let mut buf = [0u8; 256];
        assert!(fifo.read(&mut buf).unwrap() > 0);
    });

    let mut harness = Harness::start(&path, (1..=5).map(ok).collect(), 2, 10);
    reader.join().unwrap();
    harness.wait_exhausted();

    let err = harness.shutdown().unwrap_err();
    assert!(
        matches!(err, AcquisitionError::Sink(SinkError::Io { .. })),
        "unexpected error: {err}"
    );
    assert_eq!(harness.acquisition.state(), AcquisitionState::Stopped);
    assert!(harness.acquisition.reader().is_empty());

    // the failure is reported once
    harness.acquisition.shutdown().unwrap();
}

#[cfg(unix)]
#[test]
fn test_latest_link_points_at_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.csv");
    let mut harness = Harness::start(&path, vec![ok(1)], 5, 1);

    harness.wait_exhausted();
    harness.shutdown().unwrap();

    let latest = dir.path().join("latest");
    let (_, rows) = read_rows(&latest);
    assert_eq!(rows.len(), 1);
}
