//! JSONL activity log: append-only line-delimited JSON.
//!
//! Each line is a self-contained JSON object, assembled in memory and written
//! with one `write_all` so a tailing process never sees a partial line.
//!
//! Degradation chain: primary file, then stderr with a `[DTE-JSONL]` prefix,
//! then silent discard. Logging failures never take the engine down.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::date_key::MonthDay;
use crate::store::SurfaceId;

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Event types matching the engine's activity model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Resolve,
    Navigate,
    RolloverDispatch,
    SchedulerArmed,
    SchedulerFallback,
    SchedulerFailed,
    SurfaceAdded,
    SurfaceRemoved,
    DaemonStart,
    DaemonStop,
    Error,
}

/// A single JSONL entry. Everything beyond `ts`/`event`/`severity` is
/// optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceId>,
    /// Effective date key involved in the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<MonthDay>,
    /// Dispatch trigger label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Surfaces touched by a dispatch pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surfaces: Option<u32>,
    /// Per-surface failures in a dispatch pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// A fresh entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            surface: None,
            key: None,
            trigger: None,
            surfaces: None,
            failed: None,
            error_code: None,
            details: None,
        }
    }

    #[must_use]
    pub fn surface(mut self, surface: SurfaceId) -> Self {
        self.surface = Some(surface);
        self
    }

    #[must_use]
    pub fn key(mut self, key: MonthDay) -> Self {
        self.key = Some(key);
        self
    }

    #[must_use]
    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

struct WriterInner {
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
}

/// Shared append-only JSONL writer with single-file rotation.
pub struct ActivityLog {
    path: PathBuf,
    max_size_bytes: u64,
    inner: Mutex<WriterInner>,
}

impl ActivityLog {
    pub const DEFAULT_MAX_SIZE: u64 = 8 * 1024 * 1024;

    /// Open the log at `path`, degrading to stderr when the file cannot be
    /// opened.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_max_size(path, Self::DEFAULT_MAX_SIZE)
    }

    #[must_use]
    pub fn with_max_size(path: impl Into<PathBuf>, max_size_bytes: u64) -> Self {
        let path = path.into();
        let inner = match open_append(&path) {
            Ok((file, size)) => WriterInner {
                writer: Some(BufWriter::new(file)),
                state: WriterState::Normal,
                bytes_written: size,
            },
            Err(err) => {
                let _ = writeln!(
                    io::stderr(),
                    "[DTE-JSONL] cannot open {}: {err}, using stderr",
                    path.display()
                );
                WriterInner {
                    writer: None,
                    state: WriterState::Stderr,
                    bytes_written: 0,
                }
            }
        };
        Self {
            path,
            max_size_bytes,
            inner: Mutex::new(inner),
        }
    }

    /// A logger that drops everything, for tests and dry runs.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            max_size_bytes: 0,
            inner: Mutex::new(WriterInner {
                writer: None,
                state: WriterState::Discard,
                bytes_written: 0,
            }),
        }
    }

    /// Write one entry as one atomic line.
    pub fn write(&self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(err) => {
                let _ = writeln!(io::stderr(), "[DTE-JSONL] serialize error: {err}");
                return;
            }
        };

        let mut inner = self.inner.lock();
        if inner.state == WriterState::Normal
            && inner.bytes_written + line.len() as u64 > self.max_size_bytes
        {
            self.rotate(&mut inner);
        }

        match inner.state {
            WriterState::Normal => {
                let written = inner
                    .writer
                    .as_mut()
                    .is_some_and(|w| w.write_all(line.as_bytes()).and_then(|()| w.flush()).is_ok());
                if written {
                    inner.bytes_written += line.len() as u64;
                } else {
                    inner.state = WriterState::Stderr;
                    inner.writer = None;
                    let _ = write!(io::stderr(), "[DTE-JSONL] {line}");
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[DTE-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    /// One-deep rotation: the current file becomes `.old`, replacing any
    /// previous rotation.
    fn rotate(&self, inner: &mut WriterInner) {
        if let Some(w) = inner.writer.as_mut() {
            let _ = w.flush();
        }
        inner.writer = None;

        let old = self.path.with_extension("jsonl.old");
        let _ = fs::rename(&self.path, &old);

        match open_append(&self.path) {
            Ok((file, size)) => {
                inner.writer = Some(BufWriter::new(file));
                inner.bytes_written = size;
            }
            Err(_) => {
                inner.state = WriterState::Stderr;
            }
        }
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok((file, size))
}
