//! Process-wide logging backend.
//!
//! Backs the `log` facade with a bounded in-memory ring of recent lines
//! plus an optional append-only file. The ring feeds the server's log
//! query surface; the file survives restarts.

use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use crate::error::{DeskpilotError, Result};

const RING_CAPACITY: usize = 1000;

struct Sink {
    ring: VecDeque<String>,
    file: Option<PathBuf>,
}

pub struct RingLogger {
    sink: Mutex<Sink>,
    echo_stderr: bool,
}

impl RingLogger {
    fn new(file: Option<PathBuf>, echo_stderr: bool) -> Self {
        Self {
            sink: Mutex::new(Sink {
                ring: VecDeque::with_capacity(RING_CAPACITY),
                file,
            }),
            echo_stderr,
        }
    }

    /// Most recent lines, newest first.
    fn recent(&self, count: usize) -> Vec<String> {
        let sink = self.sink.lock();
        sink.ring.iter().rev().take(count).cloned().collect()
    }

    fn append(&self, line: String) {
        let mut sink = self.sink.lock();
        if let Some(path) = &sink.file {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{line}");
            }
        }
        if sink.ring.len() >= RING_CAPACITY {
            sink.ring.pop_front();
        }
        sink.ring.push_back(line);
    }
}

impl Log for RingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!(
            "[{}] [{}] [{}] {}",
            timestamp,
            record.level(),
            record.target(),
            record.args()
        );
        if self.echo_stderr {
            eprintln!("{line}");
        }
        self.append(line);
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<RingLogger> = OnceLock::new();

/// Installs the logger. Call once at startup; a second call fails.
pub fn init(level: LevelFilter, file: Option<PathBuf>, echo_stderr: bool) -> Result<()> {
    let logger = LOGGER.get_or_init(|| RingLogger::new(file, echo_stderr));
    log::set_logger(logger).map_err(|e| DeskpilotError::Internal {
        message: format!("logger already installed: {e}"),
    })?;
    log::set_max_level(level);
    Ok(())
}

/// Most recent log lines, newest first. Empty before [`init`].
pub fn recent(count: usize) -> Vec<String> {
    LOGGER
        .get()
        .map(|logger| logger.recent(count))
        .unwrap_or_default()
}
