//! Output sinks: consumers of the change-event stream.
//!
//! The core owns only the event contract; rendering belongs to the sink.
//! `LogSink` routes depth-indented lines through `tracing`, `FileSink`
//! appends them to a file, `MemorySink` collects events for inspection.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{info, warn};

use lorgnette_types::{ChangeEvent, EventKind};

use crate::config::Verbosity;

pub trait EventSink: Send + Sync {
    fn change(&self, event: &ChangeEvent);

    /// Called once on detach.
    fn flush(&self) {}
}

/// One line per event: rank prefix, depth indentation, kind, payload.
pub fn render_line(event: &ChangeEvent) -> String {
    let rank = event
        .rank
        .map(|info| format!("[rank {}] ", info.rank))
        .unwrap_or_default();
    let indent = "| ".repeat(event.depth as usize);
    match event.kind {
        EventKind::Run => format!("{rank}{indent}run {}", event.scope_name),
        EventKind::End => match &event.new {
            Some(result) => format!("{rank}{indent}end {} <- {result}", event.scope_name),
            None => format!("{rank}{indent}end {}", event.scope_name),
        },
        EventKind::Upd | EventKind::Apd | EventKind::Pop => {
            let key = event.key.as_deref().unwrap_or("?");
            let old = event.old.as_deref().unwrap_or("-");
            let new = event.new.as_deref().unwrap_or("-");
            format!(
                "{rank}{indent}{} {}.{key} {old} -> {new}",
                event.kind.label(),
                event.scope_name
            )
        }
    }
}

// ── Log sink ─────────────────────────────────────────────

/// Default sink: event lines through the `tracing` backend. `Forced`
/// verbosity bypasses the backend and prints directly; `Silent` drops
/// everything.
pub struct LogSink {
    verbosity: Verbosity,
}

impl LogSink {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

impl EventSink for LogSink {
    fn change(&self, event: &ChangeEvent) {
        let line = match self.verbosity {
            Verbosity::Silent => return,
            Verbosity::Verbose => format!("L{:<4} {}", event.line, render_line(event)),
            Verbosity::Normal | Verbosity::Forced => render_line(event),
        };
        match self.verbosity {
            Verbosity::Forced => println!("{line}"),
            _ => info!(target: "lorgnette", "{line}"),
        }
    }
}

// ── File sink ────────────────────────────────────────────

pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl EventSink for FileSink {
    fn change(&self, event: &ChangeEvent) {
        let mut writer = self.writer.lock();
        if let Err(err) = writeln!(writer, "{}", render_line(event)) {
            warn!(error = %err, "failed to write trace line");
        }
    }

    fn flush(&self) {
        if let Err(err) = self.writer.lock().flush() {
            warn!(error = %err, "failed to flush trace destination");
        }
    }
}

// ── Memory sink ──────────────────────────────────────────

/// Collects events for test inspection.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventSink for MemorySink {
    fn change(&self, event: &ChangeEvent) {
        self.events.lock().push(event.clone());
    }
}
