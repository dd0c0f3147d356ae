use chrono::Local;
use std::collections::VecDeque;
use std::fmt;

const DEFAULT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    User,
    System,
    Assistant,
    Event,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogKind::User => "USER",
            LogKind::System => "SYSTEM",
            LogKind::Assistant => "JARVIS",
            LogKind::Event => "EVENT",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: u64,
    /// Local `HH:MM:SS`.
    pub time: String,
    pub kind: LogKind,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<6} {}", self.time, self.kind, self.message)
    }
}

/// User-facing activity log, bounded, oldest entries dropped first.
pub struct SystemLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl Default for SystemLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SystemLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity: capacity.max(1), next_id: 1 }
    }

    pub fn push(&mut self, kind: LogKind, message: impl Into<String>) -> &LogEntry {
        let message = message.into();
        match kind {
            LogKind::System => tracing::info!(target: "jarvis::system_log", "{}", message),
            _ => tracing::debug!(target: "jarvis::system_log", kind = %kind, "{}", message),
        }

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let entry = LogEntry {
            id: self.next_id,
            time: Local::now().format("%H:%M:%S").to_string(),
            kind,
            message,
        };
        self.next_id += 1;
        self.entries.push_back(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn system(&mut self, message: impl Into<String>) -> &LogEntry {
        self.push(LogKind::System, message)
    }

    pub fn event(&mut self, message: impl Into<String>) -> &LogEntry {
        self.push(LogKind::Event, message)
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_get_increasing_ids_and_timestamps() {
        let mut log = SystemLog::default();
        log.system("J.A.R.V.I.S. online");
        log.push(LogKind::User, "hello");

        let entries: Vec<_> = log.entries().cloned().collect();
        assert_eq!(entries[0].id, 1);
        assert_eq!(entries[1].id, 2);
        assert_eq!(entries[1].kind, LogKind::User);
        assert!(chrono::NaiveTime::parse_from_str(&entries[0].time, "%H:%M:%S").is_ok());
    }

    #[test]
    fn oldest_entries_are_dropped() {
        let mut log = SystemLog::with_capacity(2);
        log.event("a");
        log.event("b");
        log.event("c");
        let messages: Vec<_> = log.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["b", "c"]);
        assert_eq!(log.entries().last().map(|e| e.id), Some(3));
    }

    #[test]
    fn display_includes_kind_label() {
        let mut log = SystemLog::default();
        let line = log.push(LogKind::Assistant, "At your service.").to_string();
        assert!(line.ends_with("JARVIS At your service."));
    }
}
