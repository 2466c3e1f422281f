//! Execution log sink: where per-unit progress messages go.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::command::CommandExecutionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub unit: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CommandExecutionStatus>,
}

pub trait LogSink: Send + Sync {
    /// Messages must already be free of secrets.
    fn save_execution_log(
        &self,
        unit: &str,
        message: &str,
        level: LogLevel,
        status: Option<CommandExecutionStatus>,
    );
}

impl<T: LogSink + ?Sized> LogSink for std::sync::Arc<T> {
    fn save_execution_log(
        &self,
        unit: &str,
        message: &str,
        level: LogLevel,
        status: Option<CommandExecutionStatus>,
    ) {
        (**self).save_execution_log(unit, message, level, status);
    }
}

/// Forwards to `tracing` and the terse stderr status line.
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn save_execution_log(
        &self,
        unit: &str,
        message: &str,
        level: LogLevel,
        status: Option<CommandExecutionStatus>,
    ) {
        let status = status.map(|s| s.as_str()).unwrap_or("");
        match level {
            LogLevel::Info => tracing::info!(unit, status, "{}", message),
            LogLevel::Warn => tracing::warn!(unit, status, "{}", message),
            LogLevel::Error => tracing::error!(unit, status, "{}", message),
        }
        log_status!("run", "[{}] {}", unit, message);
    }
}

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn messages_for(&self, unit: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.unit == unit)
            .map(|e| e.message.clone())
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn save_execution_log(
        &self,
        unit: &str,
        message: &str,
        level: LogLevel,
        status: Option<CommandExecutionStatus>,
    ) {
        self.entries.lock().push(LogEntry {
            timestamp: Utc::now(),
            unit: unit.to_string(),
            level,
            message: message.to_string(),
            status,
        });
    }
}

/// Sends every entry to both sinks.
pub struct TeeLogSink<A, B> {
    pub first: A,
    pub second: B,
}

impl<A: LogSink, B: LogSink> LogSink for TeeLogSink<A, B> {
    fn save_execution_log(
        &self,
        unit: &str,
        message: &str,
        level: LogLevel,
        status: Option<CommandExecutionStatus>,
    ) {
        self.first.save_execution_log(unit, message, level, status);
        self.second.save_execution_log(unit, message, level, status);
    }
}
