use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// strftime layout of the `[dd-mm-yy HH:MM:SS]` prefix on every logged line
pub const LOG_TIMESTAMP_FORMAT: &str = "%d-%m-%y %H:%M:%S";

/// Destination for human-readable status and chat lines.
///
/// Implementations must serialize concurrent writes so lines never interleave.
pub trait EventSink: Send + Sync {
    fn record(&self, text: &str);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn record(&self, text: &str) {
        (**self).record(text)
    }
}

/// Prefix `text` with the current local time
pub fn timestamped(text: &str) -> String {
    format!("[{}] {}", Local::now().format(LOG_TIMESTAMP_FORMAT), text)
}

fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writes timestamped lines to any `Write`, one flush per line
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> EventSink for WriterSink<W> {
    // Blocking write: the session's close guard records from `Drop`, where nothing
    // can be awaited. Lines are short and flushed one at a time.
    fn record(&self, text: &str) {
        let line = timestamped(text);
        let mut writer = lock_ignoring_poison(&self.writer);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            error!(error = %e, "Failed to write event line");
        }
    }
}

pub type StdoutSink = WriterSink<io::Stdout>;

/// Append-only chat history file
pub type HistorySink = WriterSink<File>;

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<File> {
    /// Open (or create) the history file for appending
    pub fn open_history(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!("Appending chat history to {}", path.display());
        Ok(Self::new(file))
    }
}

/// Routes events to the `tracing` debug level; used when events are diagnostics only
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, text: &str) {
        debug!(target: "minechat::events", "{}", text);
    }
}

/// Keeps every event in memory, without timestamps
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        lock_ignoring_poison(&self.records).clone()
    }
}

impl EventSink for MemorySink {
    fn record(&self, text: &str) {
        lock_ignoring_poison(&self.records).push(text.to_string());
    }
}
