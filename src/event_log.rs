//! Event log sink
//!
//! The user-facing record of what the monitor did. Every line is:
//!
//! 1. appended to a flat text file as `[<RFC 3339 timestamp>] <SEVERITY> <message>`
//! 2. published on a broadcast channel for live viewers
//! 3. mirrored to `tracing` for operators
//!
//! Line breaks and backslashes in messages are escaped (`\n`, `\r`, `\\`) so
//! every entry stays on a single line.
//!
//! After every append the file is pruned to the retention window. Pruning
//! rewrites the file through a temporary file in the same directory that is
//! renamed over the original, so readers never see a half-written log.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, SecondsFormat, TimeDelta};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{error, info, trace, warn};

use crate::error::MonitorResult;
use crate::util::Clock;

/// Capacity of the live line stream; slow viewers lag and skip lines
const LINE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    /// An endpoint answered or an alert went out
    Success,
    Warning,
    /// An alert was held back by quiet hours or the anti-spam cooldown
    Suppressed,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Suppressed => "SUPPRESSED",
            Severity::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Severity> {
        match value {
            "INFO" => Some(Severity::Info),
            "SUCCESS" => Some(Severity::Success),
            "WARNING" => Some(Severity::Warning),
            "SUPPRESSED" => Some(Severity::Suppressed),
            "ERROR" => Some(Severity::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub message: String,
}

impl LogEntry {
    pub fn to_line(&self) -> String {
        format!(
            "[{}] {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            self.severity,
            escape(&self.message)
        )
    }

    /// Parse a line written by [`LogEntry::to_line`]
    pub fn parse(line: &str) -> Option<LogEntry> {
        let (timestamp, rest) = split_timestamp(line)?;
        let (severity, message) = rest.split_once(' ').unwrap_or((rest, ""));
        Some(LogEntry {
            timestamp,
            severity: Severity::parse(severity)?,
            message: unescape(message),
        })
    }
}

fn escape(message: &str) -> String {
    let mut escaped = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape(message: &str) -> String {
    let mut unescaped = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some(other) => unescaped.push(other),
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

fn split_timestamp(line: &str) -> Option<(DateTime<Local>, &str)> {
    let (timestamp, rest) = line.strip_prefix('[')?.split_once("] ")?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp).ok()?;
    Some((timestamp.with_timezone(&Local), rest))
}

pub struct EventLog {
    path: PathBuf,
    retention: TimeDelta,
    clock: Arc<dyn Clock>,
    /// Serializes append + prune on the file
    file_lock: Mutex<()>,
    line_tx: broadcast::Sender<LogEntry>,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("path", &self.path)
            .field("retention", &self.retention)
            .finish()
    }
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, retention: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        let (line_tx, _) = broadcast::channel(LINE_CHANNEL_CAPACITY);
        Self {
            path: path.into(),
            retention,
            clock,
            file_lock: Mutex::new(()),
            line_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to the live stream of appended entries
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.line_tx.subscribe()
    }

    /// Append an entry stamped with the current time, then prune
    pub fn append(&self, severity: Severity, message: impl Into<String>) -> MonitorResult<()> {
        self.append_at(self.clock.now(), severity, message)
    }

    pub fn append_at(
        &self,
        now: DateTime<Local>,
        severity: Severity,
        message: impl Into<String>,
    ) -> MonitorResult<()> {
        let entry = LogEntry {
            timestamp: now,
            severity,
            message: message.into(),
        };

        mirror_to_tracing(&entry);
        // no subscribers is fine
        let _ = self.line_tx.send(entry.clone());

        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        drop(file);

        prune_file(&self.path, now, self.retention)?;
        Ok(())
    }

    /// Best-effort append: I/O faults are reported through `tracing` only
    pub fn log(&self, severity: Severity, message: impl Into<String>) {
        if let Err(e) = self.append(severity, message) {
            error!("failed to write event log {}: {e}", self.path.display());
        }
    }

    /// Drop every entry older than `retention` relative to `now`
    ///
    /// Lines without a parsable timestamp are dropped too. Returns the number
    /// of removed lines.
    pub fn prune(&self, now: DateTime<Local>, retention: TimeDelta) -> MonitorResult<usize> {
        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(prune_file(&self.path, now, retention)?)
    }

    /// Raw bytes of the log file, empty if it does not exist yet
    pub fn contents(&self) -> MonitorResult<Vec<u8>> {
        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    /// Parsed entries currently in the file
    pub fn entries(&self) -> MonitorResult<Vec<LogEntry>> {
        let bytes = self.contents()?;
        Ok(String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(LogEntry::parse)
            .collect())
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    match entry.severity {
        Severity::Error => error!(target: "event_log", "{}", entry.message),
        Severity::Warning | Severity::Suppressed => {
            warn!(target: "event_log", "[{}] {}", entry.severity, entry.message)
        }
        Severity::Info | Severity::Success => info!(target: "event_log", "{}", entry.message),
    }
}

fn prune_file(path: &Path, now: DateTime<Local>, retention: TimeDelta) -> io::Result<usize> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    // a window reaching past the calendar keeps everything
    let Some(cutoff) = now.checked_sub_signed(retention) else {
        return Ok(0);
    };
    let content = String::from_utf8_lossy(&bytes);
    let mut kept = String::with_capacity(content.len());
    let mut removed = 0;

    for line in content.lines() {
        match split_timestamp(line) {
            Some((timestamp, _)) if timestamp >= cutoff => {
                kept.push_str(line);
                kept.push('\n');
            }
            _ => removed += 1,
        }
    }

    if removed == 0 {
        return Ok(0);
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(kept.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    trace!("pruned {removed} line(s) from {}", path.display());
    Ok(removed)
}
