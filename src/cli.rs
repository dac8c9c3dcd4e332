//! The log/CLI boundary.
//!
//! The core never draws anything itself; it posts log lines into a
//! level-filtered append-only buffer and mutates entry handles as tasks
//! progress. A terminal frontend is free to render the handles as a
//! spinner tree or to ignore them entirely; nothing here is read back by
//! correctness logic.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Global verbosity selected by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Quiet,
    Standard,
    Verbose,
}

/// Where a task currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Scheduled,
    Building,
    Finished,
    Failed,
}

/// A token handed out when a task begins; the engine mutates it as the
/// task progresses.
pub struct EntryHandle {
    description: String,
    status: Mutex<EntryStatus>,
    highlighted: AtomicBool,
    visible: bool,
    parent: Option<Arc<EntryHandle>>,
}

impl EntryHandle {
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> EntryStatus {
        *self.status.lock()
    }

    pub fn set_status(&self, status: EntryStatus) {
        *self.status.lock() = status;
    }

    pub fn set_highlighted(&self, highlighted: bool) {
        self.highlighted.store(highlighted, Ordering::Relaxed);
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted.load(Ordering::Relaxed)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn parent(&self) -> Option<&Arc<EntryHandle>> {
        self.parent.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub content: String,
}

/// The sink the core posts to.
pub struct Cli {
    log_level: LogLevel,
    interactive: bool,
    buffer: Mutex<Vec<LogEntry>>,
    entries: Mutex<Vec<Arc<EntryHandle>>>,
    skipped_tasks: AtomicUsize,
}

impl Cli {
    pub fn new(log_level: LogLevel) -> Self {
        Cli {
            log_level,
            interactive: console::user_attended(),
            buffer: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
            skipped_tasks: AtomicUsize::new(0),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn write(&self, level: LogLevel, text: &str) {
        if level <= self.log_level {
            if text.ends_with('\n') {
                print!("{}", text);
            } else {
                println!("{}", text);
            }
        }
        self.buffer.lock().push(LogEntry {
            level,
            content: text.to_string(),
        });
    }

    pub fn write_quiet(&self, text: &str) {
        self.write(LogLevel::Quiet, text);
    }

    pub fn write_standard(&self, text: &str) {
        self.write(LogLevel::Standard, text);
    }

    pub fn write_verbose(&self, text: &str) {
        self.write(LogLevel::Verbose, text);
    }

    /// Raw subprocess output, forwarded chunk by chunk.
    pub fn write_to_log(&self, text: &str) {
        self.write(LogLevel::Standard, text);
    }

    /// Diagnostic lines appended after the regular output, bypassing the
    /// level filter.
    pub fn write_to_suffix(&self, text: &str) {
        eprintln!("{}", text);
        self.buffer.lock().push(LogEntry {
            level: LogLevel::Quiet,
            content: text.to_string(),
        });
    }

    pub fn generate_entry(
        &self,
        description: &str,
        status: EntryStatus,
        visible: bool,
    ) -> Arc<EntryHandle> {
        let handle = Arc::new(EntryHandle {
            description: description.to_string(),
            status: Mutex::new(status),
            highlighted: AtomicBool::new(false),
            visible,
            parent: None,
        });
        self.entries.lock().push(handle.clone());
        handle
    }

    pub fn derive_entry_from(
        &self,
        parent: &Arc<EntryHandle>,
        description: &str,
        status: EntryStatus,
        visible: bool,
    ) -> Arc<EntryHandle> {
        let handle = Arc::new(EntryHandle {
            description: description.to_string(),
            status: Mutex::new(status),
            highlighted: AtomicBool::new(false),
            visible,
            parent: Some(parent.clone()),
        });
        self.entries.lock().push(handle.clone());
        handle
    }

    pub fn get_entry_from_description(&self, description: &str) -> Option<Arc<EntryHandle>> {
        self.entries
            .lock()
            .iter()
            .find(|handle| handle.description == description)
            .cloned()
    }

    pub fn increment_skipped_tasks(&self) {
        self.skipped_tasks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn skipped_tasks(&self) -> usize {
        self.skipped_tasks.load(Ordering::Relaxed)
    }

    /// Snapshot of the log buffer.
    pub fn log_buffer(&self) -> Vec<LogEntry> {
        self.buffer.lock().clone()
    }
}
