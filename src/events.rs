//! Worker-to-UI event channel.
//!
//! Workers and routed output run on their own threads; everything they
//! want rendered is sent here and handled by the console loop, which is
//! the only place that touches terminals. Built on an unbounded
//! [`tokio::sync::mpsc`] channel so senders never block.

use tokio::sync::mpsc;

use crate::terminal::TerminalId;

/// Events that flow from workers to the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// Routed standard output for a terminal.
    Output { terminal: TerminalId, text: String },
    /// A command finished; `text` is ready to render.
    Result {
        terminal: TerminalId,
        line: u32,
        text: String,
    },
    /// The terminal's worker stopped on a fatal error.
    WorkerDied { terminal: TerminalId, message: String },
}

impl ConsoleEvent {
    pub fn terminal(&self) -> TerminalId {
        match self {
            ConsoleEvent::Output { terminal, .. }
            | ConsoleEvent::Result { terminal, .. }
            | ConsoleEvent::WorkerDied { terminal, .. } => *terminal,
        }
    }
}

/// Cloneable sending half; hand one to every worker-side callback.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ConsoleEvent>,
}

impl EventSender {
    /// Returns `false` once the console is gone.
    pub fn emit(&self, event: ConsoleEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<ConsoleEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}
