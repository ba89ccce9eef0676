// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boundary event log
//!
//! A fixed-capacity ring of log entries owned by the gateway and passed to
//! every handler. Entries are stamped with the sequence number of the
//! boundary call that produced them and with their source.
//!
//! # Security
//!
//! - Key material, buffer contents and callback record contents must NEVER
//!   be logged
//! - Rejected addresses and handles may be logged

use core::fmt::{self, Write};
use heapless::String;

use crate::types::ServiceId;

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 96;

/// Log ring size (number of entries)
pub const LOG_BUFFER_SIZE: usize = 32;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LogLevel {
    /// Internal failures
    Error = 0,
    /// Rejected requests and dropped completions
    Warn = 1,
    /// Instance lifecycle
    Info = 2,
    /// Per-operation detail
    Debug = 3,
    /// Very verbose
    Trace = 4,
}

impl LogLevel {
    /// Single-character prefix
    #[must_use]
    pub const fn prefix(&self) -> char {
        match self {
            Self::Error => 'E',
            Self::Warn => 'W',
            Self::Info => 'I',
            Self::Debug => 'D',
            Self::Trace => 'T',
        }
    }
}

/// Component that produced a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSource {
    /// Gateway routing and completion delivery
    Gateway,
    /// A crypto service
    Service(ServiceId),
}

impl LogSource {
    /// Source name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Gateway => "gateway",
            Self::Service(service) => service.name(),
        }
    }
}

impl From<ServiceId> for LogSource {
    fn from(service: ServiceId) -> Self {
        Self::Service(service)
    }
}

/// One log entry
#[derive(Clone)]
pub struct LogEntry {
    /// Severity
    pub level: LogLevel,
    /// Boundary call sequence number
    pub sequence: u32,
    /// Producing component
    pub source: LogSource,
    /// Message text, truncated to [`MAX_LOG_MESSAGE_LEN`]
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:06} {} [{}] {}",
            self.sequence,
            self.level.prefix(),
            self.source.name(),
            self.message
        )
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Ring buffer of log entries; the oldest entry is overwritten when full
pub struct LogBuffer {
    entries: [Option<LogEntry>; LOG_BUFFER_SIZE],
    write_index: usize,
    count: usize,
    overwritten: u32,
    min_level: LogLevel,
}

impl LogBuffer {
    /// Create an empty buffer recording `min_level` and more severe
    #[must_use]
    pub const fn new(min_level: LogLevel) -> Self {
        const NONE: Option<LogEntry> = None;
        Self {
            entries: [NONE; LOG_BUFFER_SIZE],
            write_index: 0,
            count: 0,
            overwritten: 0,
            min_level,
        }
    }

    /// Set the minimum level
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Check if a level is recorded
    #[must_use]
    pub const fn should_log(&self, level: LogLevel) -> bool {
        (level as u8) <= (self.min_level as u8)
    }

    /// Record a formatted message
    pub fn log(&mut self, level: LogLevel, sequence: u32, source: LogSource, args: fmt::Arguments<'_>) {
        if !self.should_log(level) {
            return;
        }

        let mut message = String::<MAX_LOG_MESSAGE_LEN>::new();
        // Overlong messages are truncated at the capacity
        let _ = message.write_fmt(args);

        if self.count == LOG_BUFFER_SIZE {
            self.overwritten = self.overwritten.saturating_add(1);
        } else {
            self.count += 1;
        }
        self.entries[self.write_index] = Some(LogEntry {
            level,
            sequence,
            source,
            message,
        });
        self.write_index = (self.write_index + 1) % LOG_BUFFER_SIZE;
    }

    /// Number of retained entries
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Check if no entries are retained
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Entries lost to wrap-around
    #[must_use]
    pub const fn overwritten(&self) -> u32 {
        self.overwritten
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
        self.write_index = 0;
        self.count = 0;
    }

    /// Iterate over entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        let start = if self.count < LOG_BUFFER_SIZE { 0 } else { self.write_index };
        (0..self.count).filter_map(move |i| self.entries[(start + i) % LOG_BUFFER_SIZE].as_ref())
    }

    /// Number of retained entries at exactly `level`
    #[must_use]
    pub fn count_at(&self, level: LogLevel) -> usize {
        self.iter().filter(|entry| entry.level == level).count()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

/// Log an error
#[macro_export]
macro_rules! log_error {
    ($buffer:expr, $seq:expr, $source:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Error, $seq, $crate::log::LogSource::from($source), format_args!($($arg)*))
    };
}

/// Log a warning
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $seq:expr, $source:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Warn, $seq, $crate::log::LogSource::from($source), format_args!($($arg)*))
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $seq:expr, $source:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Info, $seq, $crate::log::LogSource::from($source), format_args!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $seq:expr, $source:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Debug, $seq, $crate::log::LogSource::from($source), format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let mut log = LogBuffer::new(LogLevel::Warn);
        log_info!(log, 1, LogSource::Gateway, "dropped");
        log_warn!(log, 2, ServiceId::Sha2, "kept {}", 7);
        assert_eq!(log.len(), 1);
        let entry = log.iter().next();
        assert!(entry.is_some_and(|e| e.sequence == 2 && e.source == LogSource::Service(ServiceId::Sha2)));
    }

    #[test]
    fn test_wrap_keeps_newest() {
        let mut log = LogBuffer::new(LogLevel::Debug);
        for i in 0..(LOG_BUFFER_SIZE as u32 + 3) {
            log_debug!(log, i, LogSource::Gateway, "entry");
        }
        assert_eq!(log.len(), LOG_BUFFER_SIZE);
        assert_eq!(log.overwritten(), 3);
        assert_eq!(log.iter().next().map(|e| e.sequence), Some(3));
        assert_eq!(log.iter().last().map(|e| e.sequence), Some(LOG_BUFFER_SIZE as u32 + 2));
    }
}
