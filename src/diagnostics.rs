//! Two-channel diagnostics.
//!
//! Every message is emitted through `tracing` and mirrored to the host
//! mod-loader's own log, which players can read from the loader UI.

use crate::config::ADDON_NAME;
use std::sync::{Arc, Mutex};

/// Severity forwarded to the host log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// The host mod-loader's log sink
pub trait HostLog: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Host without a log of its own; `tracing` is the only channel
#[derive(Debug, Default)]
pub struct TracingOnly;

impl HostLog for TracingOnly {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Host log that keeps every entry in memory
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far
    pub fn entries(&self) -> Vec<(LogLevel, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries at `level` whose message contains `needle`
    pub fn count_matching(&self, level: LogLevel, needle: &str) -> usize {
        self.entries()
            .iter()
            .filter(|(l, msg)| *l == level && msg.contains(needle))
            .count()
    }
}

impl HostLog for RecordingLog {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((level, message.to_string()));
        }
    }
}

/// Cloneable handle writing to `tracing` and the host log.
///
/// Host-log lines carry the add-on name as a `[name] ` prefix.
#[derive(Clone)]
pub struct Diagnostics {
    addon_name: Arc<str>,
    host: Arc<dyn HostLog>,
}

impl Diagnostics {
    pub fn new(addon_name: &str, host: Arc<dyn HostLog>) -> Self {
        Self {
            addon_name: Arc::from(addon_name),
            host,
        }
    }

    pub fn tracing_only() -> Self {
        Self::new(ADDON_NAME, Arc::new(TracingOnly))
    }

    fn to_host(&self, level: LogLevel, message: &str) {
        self.host
            .log(level, &format!("[{}] {}", self.addon_name, message));
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{}", message);
        self.to_host(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{}", message);
        self.to_host(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{}", message);
        self.to_host(LogLevel::Error, message);
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("addon_name", &self.addon_name)
            .finish_non_exhaustive()
    }
}
