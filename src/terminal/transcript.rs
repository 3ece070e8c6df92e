//! Rendering collaborators.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use super::TerminalId;

/// Draws a terminal's conversation. Called on the UI side only.
pub trait Transcript: Send + Sync {
    /// A command was accepted.
    fn echo(&self, id: TerminalId, line: u32, source: &str);
    /// Routed output written while the terminal's code ran.
    fn output(&self, id: TerminalId, text: &str);
    /// `=> value` or failure text.
    fn result(&self, id: TerminalId, text: &str);
    /// The prompt is open for input.
    fn prompt(&self, id: TerminalId);
    /// Console messages that are not part of evaluation.
    fn notice(&self, id: TerminalId, text: &str);
}

/// Line-mode rendering to the process stdout.
pub struct StdoutTranscript {
    prompt: String,
}

impl StdoutTranscript {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    fn emit(&self, text: &str) {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

impl Transcript for StdoutTranscript {
    // The user's own line is already on screen.
    fn echo(&self, _id: TerminalId, _line: u32, _source: &str) {}

    fn output(&self, _id: TerminalId, text: &str) {
        self.emit(text);
    }

    fn result(&self, _id: TerminalId, text: &str) {
        self.emit(text);
    }

    fn prompt(&self, id: TerminalId) {
        self.emit(&format!("[{id}] {}", self.prompt));
    }

    fn notice(&self, id: TerminalId, text: &str) {
        self.emit(&format!("[{id}] {text}\n"));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Echo { line: u32, source: String },
    Output(String),
    Result(String),
    Prompt,
    Notice(String),
}

/// Keeps everything it is asked to render. For tests and `--run`.
#[derive(Debug, Default)]
pub struct RecordingTranscript {
    entries: Mutex<Vec<(TerminalId, Entry)>>,
}

impl RecordingTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: TerminalId, entry: Entry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, entry));
    }

    pub fn entries(&self) -> Vec<(TerminalId, Entry)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Entries of one terminal.
    pub fn entries_for(&self, id: TerminalId) -> Vec<Entry> {
        self.entries()
            .into_iter()
            .filter(|(owner, _)| *owner == id)
            .map(|(_, entry)| entry)
            .collect()
    }

    /// Result texts of one terminal, in order.
    pub fn results(&self, id: TerminalId) -> Vec<String> {
        self.entries_for(id)
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Result(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Routed output of one terminal, concatenated.
    pub fn output(&self, id: TerminalId) -> String {
        self.entries_for(id)
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Output(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl Transcript for RecordingTranscript {
    fn echo(&self, id: TerminalId, line: u32, source: &str) {
        self.record(
            id,
            Entry::Echo {
                line,
                source: source.to_string(),
            },
        );
    }

    fn output(&self, id: TerminalId, text: &str) {
        self.record(id, Entry::Output(text.to_string()));
    }

    fn result(&self, id: TerminalId, text: &str) {
        self.record(id, Entry::Result(text.to_string()));
    }

    fn prompt(&self, id: TerminalId) {
        self.record(id, Entry::Prompt);
    }

    fn notice(&self, id: TerminalId, text: &str) {
        self.record(id, Entry::Notice(text.to_string()));
    }
}
