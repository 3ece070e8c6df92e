//! The per-terminal command queue.
//!
//! An unbounded channel: the UI side never blocks on `submit`, the worker
//! blocks on [`CommandReceiver::next_blocking`]. Shutdown travels through
//! the same channel as a sentinel so it lands behind everything queued.

use tokio::sync::mpsc;
use tracing::debug;

use super::error::{EngineError, EngineResult};

/// One submitted command. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Logical line of the command in its terminal.
    pub line: u32,
    pub source: String,
}

impl Command {
    pub fn new(line: u32, source: impl Into<String>) -> Self {
        Self {
            line,
            source: source.into(),
        }
    }
}

#[derive(Debug)]
pub(crate) enum Message {
    Evaluate(Command),
    End,
}

pub(crate) fn channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        CommandSender { tx, ended: false },
        CommandReceiver { rx },
    )
}

#[derive(Debug)]
pub(crate) struct CommandSender {
    tx: mpsc::UnboundedSender<Message>,
    ended: bool,
}

impl CommandSender {
    pub fn submit(&self, command: Command) -> EngineResult<()> {
        if self.ended {
            return Err(EngineError::Ended);
        }
        debug!(line = command.line, "command enqueued");
        self.tx
            .send(Message::Evaluate(command))
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Queue the end sentinel. Idempotent.
    pub fn end(&mut self) {
        if !self.ended {
            self.ended = true;
            // A closed receiver has already stopped; nothing to end.
            let _ = self.tx.send(Message::End);
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

#[derive(Debug)]
pub(crate) struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl CommandReceiver {
    /// Block the calling (non-async) thread for the next message.
    /// `None` once every sender is gone.
    pub fn next_blocking(&mut self) -> Option<Message> {
        self.rx.blocking_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_then_end() {
        let (mut tx, mut rx) = channel();
        tx.submit(Command::new(1, "a")).unwrap();
        tx.submit(Command::new(2, "b")).unwrap();
        tx.end();

        let order: Vec<String> = std::iter::from_fn(|| match rx.next_blocking() {
            Some(Message::Evaluate(cmd)) => Some(cmd.source),
            _ => None,
        })
        .collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn submit_after_end_is_rejected() {
        let (mut tx, _rx) = channel();
        tx.end();
        tx.end();
        assert!(tx.is_ended());
        assert!(matches!(tx.submit(Command::new(1, "x")), Err(EngineError::Ended)));
    }

    #[test]
    fn submit_to_dropped_receiver_fails() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(matches!(
            tx.submit(Command::new(1, "x")),
            Err(EngineError::QueueClosed)
        ));
    }
}
