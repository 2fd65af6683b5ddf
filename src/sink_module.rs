//! Append-only CSV log of evicted samples.
//!
//! Each run writes to its own file; a `latest` symlink next to it always
//! points at the file that is currently open.

use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::error::SinkError;
use crate::sample::Sample;

/// Name of the symlink that tracks the active log file.
pub const LATEST_LINK_NAME: &str = "latest";

/// Header of the elapsed-time column.
pub const TIME_COLUMN: &str = "experiment time [s]";

pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    rows_written: u64,
}

impl CsvSink {
    /// Creates (or truncates) `path`, writes the header row and repoints
    /// the `latest` link at it.
    pub fn open<S: AsRef<str>>(path: &Path, channel_names: &[S]) -> Result<CsvSink, SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let header = std::iter::once(TIME_COLUMN).chain(channel_names.iter().map(AsRef::<str>::as_ref));
        writer.write_record(header)?;
        writer.flush().map_err(|source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        update_latest_link(path)?;
        info!("logging to {:?}", path);

        Ok(CsvSink {
            path: path.to_path_buf(),
            writer: Some(writer),
            rows_written: 0,
        })
    }

    pub fn append_row<const NUM_CHANNELS: usize>(
        &mut self,
        sample: &Sample<NUM_CHANNELS>,
    ) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.write_record(sample.row().map(|v| v.to_string()))?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flushes and syncs the file. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), SinkError> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => return Ok(()),
        };

        let file = writer.into_inner().map_err(|e| SinkError::Io {
            path: self.path.clone(),
            source: e.into_error(),
        })?;
        file.sync_all().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })?;

        info!("closed {:?} ({} rows)", self.path, self.rows_written);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvSink")
            .field("path", &self.path)
            .field("rows_written", &self.rows_written)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for CsvSink {
    fn drop(&mut self) {
        if let Some(ref mut writer) = self.writer {
            if let Err(e) = writer.flush() {
                warn!("failed to flush {:?} on drop: {}", self.path, e);
            }
        }
    }
}

/// Default log location for a run started at `now`:
/// `{dir}/{YYYY-MM-DD_HH-MM-SS}.csv`.
pub fn generated_log_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}.csv", now.format("%Y-%m-%d_%H-%M-%S")))
}

/// Replaces `latest` in the directory of `target` with a link to `target`.
fn update_latest_link(target: &Path) -> Result<(), SinkError> {
    let dir = target.parent().unwrap_or_else(|| Path::new(""));
    let link = dir.join(LATEST_LINK_NAME);

    // relative target, so the link survives moving the whole directory
    let link_target = match target.file_name() {
        Some(name) => PathBuf::from(name),
        None => target.to_path_buf(),
    };

    let link_err = |source: io::Error| SinkError::LatestLink {
        link: link.clone(),
        source,
    };

    match fs::symlink_metadata(&link) {
        Ok(_) => {
            debug!("removing stale link {:?}", link);
            fs::remove_file(&link).map_err(link_err)?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(link_err(e)),
    }

    symlink(&link_target, &link).map_err(link_err)
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
