use std::io::{self, Write};
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossterm::{cursor, execute, terminal};

use crate::acquisition_module::{AcquisitionStats, StopHandle};
use crate::snapshot_module::SnapshotReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    Invalid,
}

impl Command {
    pub fn parse(line: &str) -> Command {
        match line.trim() {
            "q" => Command::Quit,
            _ => Command::Invalid,
        }
    }
}

/// Forwards stdin lines to the returned channel from a background thread.
pub fn spawn_stdin_scanner() -> mpsc::Receiver<String> {
    let (stdin_sender, stdin_receiver) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            if stdin_sender.send(line).is_err() {
                break;
            }
        }
    });
    stdin_receiver
}

/// Terminal view of the buffered samples.
///
/// Only ever sees the buffer through a [`SnapshotReader`]; quitting the view
/// asks acquisition to stop through the [`StopHandle`].
pub struct LiveView<const NUM_CHANNELS: usize> {
    reader: SnapshotReader<NUM_CHANNELS>,
    stats: Arc<AcquisitionStats>,
    stop: StopHandle,
    channel_names: Vec<String>,
    refresh_interval: Duration,
}

impl<const NUM_CHANNELS: usize> LiveView<NUM_CHANNELS> {
    pub fn new(
        reader: SnapshotReader<NUM_CHANNELS>,
        stats: Arc<AcquisitionStats>,
        stop: StopHandle,
        channel_names: Vec<String>,
        refresh_interval: Duration,
    ) -> Self {
        LiveView {
            reader,
            stats,
            stop,
            channel_names,
            refresh_interval,
        }
    }

    /// Redraws until `q` arrives on stdin or `worker_alive` turns false.
    pub fn run<F: Fn() -> bool>(
        &self,
        stdin_receiver: &mpsc::Receiver<String>,
        worker_alive: F,
    ) -> io::Result<()> {
        execute!(io::stdout(), terminal::EnterAlternateScreen)?;
        let result = self.redraw_loop(stdin_receiver, worker_alive);
        execute!(io::stdout(), terminal::LeaveAlternateScreen)?;
        self.stop.request_stop();
        result
    }

    fn redraw_loop<F: Fn() -> bool>(
        &self,
        stdin_receiver: &mpsc::Receiver<String>,
        worker_alive: F,
    ) -> io::Result<()> {
        let mut message = None;
        loop {
            if !worker_alive() {
                return Ok(());
            }

            let mut stdout = io::stdout();
            execute!(stdout, terminal::Clear(terminal::ClearType::All))?;
            execute!(stdout, cursor::MoveTo(0, 0))?;
            stdout.write_all(self.render(message).as_bytes())?;
            stdout.flush()?;

            loop {
                match stdin_receiver.try_recv() {
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => break,
                    Ok(line) => match Command::parse(&line) {
                        Command::Quit => return Ok(()),
                        Command::Invalid => message = Some("invalid cmd"),
                    },
                }
            }

            thread::sleep(self.refresh_interval);
        }
    }

    pub fn render(&self, message: Option<&str>) -> String {
        let snapshot = self.reader.snapshot();
        let mut out = String::new();

        out.push_str("===== dyno logger =====\r\n");
        out.push_str("q - quit\r\n\r\n");

        match (snapshot.time_span(), snapshot.summary()) {
            (Some((first, last)), Some(summary)) => {
                out.push_str(&format!(
                    "buffered samples: {} ({:.2}s .. {:.2}s)\r\n",
                    snapshot.len(),
                    first,
                    last
                ));
                for (i, channel) in summary.iter().enumerate() {
                    let name = self.channel_names.get(i).map(|s| s.as_str()).unwrap_or("?");
                    out.push_str(&format!(
                        "{:<24} last {:>10.4}  min {:>10.4}  max {:>10.4}  mean {:>10.4}\r\n",
                        name, channel.last, channel.min, channel.max, channel.mean
                    ));
                }
            }
            _ => out.push_str("buffered samples: 0\r\n"),
        }

        out.push_str(&format!(
            "\r\nsamples: {}\r\nrows written: {}\r\nread failures: {} (budget left {})\r\n",
            self.stats.samples_acquired.load(Ordering::Relaxed),
            self.stats.rows_written.load(Ordering::Relaxed),
            self.stats.read_failures.load(Ordering::Relaxed),
            self.stats.budget_remaining.load(Ordering::Relaxed),
        ));

        if let Some(message) = message {
            out.push_str(message);
            out.push_str("\r\n");
        }
        out
    }
}
