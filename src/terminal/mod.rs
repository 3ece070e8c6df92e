//! A terminal: prompt, history, lifecycle, and the worker behind them.
//!
//! The terminal lives on the UI side. Its worker reports back through a
//! [`TerminalListener`] and its routed output goes through a
//! [`TerminalSink`]; both turn into [`ConsoleEvent`]s so rendering happens
//! on the UI side only. Once the terminal is closed both of them stop
//! forwarding: output goes to stderr and results are dropped.

pub mod history;
pub mod prompt;
pub mod transcript;

pub use crate::router::SinkId as TerminalId;
pub use history::History;
pub use prompt::{Caret, Prompt, PromptState, Submission};
pub use transcript::{RecordingTranscript, StdoutTranscript, Transcript};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::engine::{Command, EngineError, EvalWorker, ResultListener, WorkerSetup, WorkerStatus};
use crate::events::{ConsoleEvent, EventSender};
use crate::interpreter::Interpreter;
use crate::router::{OutputRouter, Route, Sink};

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("terminal is closed")]
    Closed,

    #[error("input is locked while a command is evaluating")]
    InputLocked,

    #[error("no close decision is pending")]
    NotClosing,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    /// A close was requested mid-evaluation; waiting for a decision.
    Closing,
    Closed,
}

/// What to do with a command still running when its terminal closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseDecision {
    Cancel,
    Kill,
    RunInBackground,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    /// Something is in flight; call [`Terminal::resolve_close`].
    NeedsDecision,
    Cancelled,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Sent to the worker under this logical line.
    Queued { line: u32 },
    /// Blank input; nothing was sent.
    Blank,
}

/// Routed output of a terminal's evaluations.
pub struct TerminalSink {
    id: TerminalId,
    closed: Arc<AtomicBool>,
    events: EventSender,
    /// Takes the output once the terminal is closed.
    fallback: Arc<dyn Sink>,
}

impl Sink for TerminalSink {
    fn write(&self, text: &str) {
        let delivered = !self.closed.load(Ordering::SeqCst)
            && self.events.emit(ConsoleEvent::Output {
                terminal: self.id,
                text: text.to_string(),
            });
        if !delivered {
            self.fallback.write(text);
        }
    }
}

/// Worker callbacks of a terminal.
pub struct TerminalListener {
    id: TerminalId,
    closed: Arc<AtomicBool>,
    events: EventSender,
}

impl ResultListener for TerminalListener {
    fn on_result(&self, line: u32, text: &str) {
        if self.closed.load(Ordering::SeqCst) {
            debug!(terminal = %self.id, line, "terminal closed, result dropped");
            return;
        }
        self.events.emit(ConsoleEvent::Result {
            terminal: self.id,
            line,
            text: text.to_string(),
        });
    }

    fn on_fatal(&self, error: &EngineError) {
        self.events.emit(ConsoleEvent::WorkerDied {
            terminal: self.id,
            message: error.to_string(),
        });
    }
}

/// Shared pieces every terminal of a console needs.
#[derive(Clone)]
pub struct TerminalSetup {
    pub router: Arc<OutputRouter>,
    pub interpreter: Arc<dyn Interpreter>,
    pub events: EventSender,
    pub transcript: Arc<dyn Transcript>,
}

pub struct Terminal {
    id: TerminalId,
    worker: EvalWorker,
    router: Arc<OutputRouter>,
    transcript: Arc<dyn Transcript>,
    closed: Arc<AtomicBool>,
    lifecycle: Lifecycle,
    prompt: Prompt,
    history: History,
    next_line: u32,
}

impl Terminal {
    /// Start the worker and open the prompt.
    pub fn open(id: TerminalId, setup: TerminalSetup) -> Result<Self, TerminalError> {
        let closed = Arc::new(AtomicBool::new(false));
        let sink = Arc::new(TerminalSink {
            id,
            closed: Arc::clone(&closed),
            events: setup.events.clone(),
            fallback: setup.router.fallback(),
        });
        let listener = Arc::new(TerminalListener {
            id,
            closed: Arc::clone(&closed),
            events: setup.events,
        });
        let worker = EvalWorker::spawn(WorkerSetup {
            name: format!("terminal-{id}"),
            route: Route::new(id, sink),
            router: Arc::clone(&setup.router),
            interpreter: setup.interpreter,
            listener,
        })?;

        info!(terminal = %id, "terminal opened");
        let terminal = Self {
            id,
            worker,
            router: setup.router,
            transcript: setup.transcript,
            closed,
            lifecycle: Lifecycle::Open,
            prompt: Prompt::new(),
            history: History::new(),
            next_line: 1,
        };
        terminal.transcript.prompt(id);
        Ok(terminal)
    }

    pub fn id(&self) -> TerminalId {
        self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle == Lifecycle::Closed
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn worker_status(&self) -> WorkerStatus {
        self.worker.status()
    }

    /// A command was submitted and its result has not been rendered yet.
    pub fn is_in_flight(&self) -> bool {
        self.prompt.is_locked() || self.worker.is_evaluating()
    }

    fn ensure_open(&self) -> Result<(), TerminalError> {
        if self.is_closed() {
            Err(TerminalError::Closed)
        } else {
            Ok(())
        }
    }

    /// Replace the input line as if typed.
    pub fn edit(&mut self, text: &str) -> Result<(), TerminalError> {
        self.ensure_open()?;
        self.prompt.edit(text)
    }

    /// Submit whatever is in the input line.
    pub fn submit(&mut self) -> Result<SubmitOutcome, TerminalError> {
        self.ensure_open()?;
        let submission = self.prompt.submit()?;
        let line = self.next_line;
        self.next_line += 1;

        let source = match submission {
            Submission::Blank => {
                self.transcript.prompt(self.id);
                return Ok(SubmitOutcome::Blank);
            }
            Submission::Command(source) => source,
        };

        self.history.push(source.clone());
        self.transcript.echo(self.id, line, &source);
        if let Err(e) = self.worker.submit(Command::new(line, source)) {
            warn!(terminal = %self.id, line, error = %e, "command not accepted");
            self.prompt.complete();
            return Err(e.into());
        }
        Ok(SubmitOutcome::Queued { line })
    }

    /// [`edit`](Self::edit) then [`submit`](Self::submit).
    pub fn submit_line(&mut self, text: &str) -> Result<SubmitOutcome, TerminalError> {
        self.edit(text)?;
        self.submit()
    }

    /// Older history entry into the input, caret at the start.
    /// `Ok(None)` when there is nothing older.
    pub fn history_backward(&mut self) -> Result<Option<&str>, TerminalError> {
        self.ensure_open()?;
        if self.prompt.is_locked() {
            return Err(TerminalError::InputLocked);
        }
        let Some(text) = self.history.backward() else {
            return Ok(None);
        };
        self.prompt.replace(text, Caret::Start)?;
        Ok(Some(self.prompt.input()))
    }

    /// Newer history entry into the input, caret at the end. Moving past
    /// the newest entry leaves an empty input.
    pub fn history_forward(&mut self) -> Result<Option<&str>, TerminalError> {
        self.ensure_open()?;
        if self.prompt.is_locked() {
            return Err(TerminalError::InputLocked);
        }
        let Some(text) = self.history.forward() else {
            return Ok(None);
        };
        self.prompt.replace(text, Caret::End)?;
        Ok(Some(self.prompt.input()))
    }

    /// Render a worker result and re-open the prompt.
    pub fn deliver(&mut self, line: u32, text: &str) {
        if self.is_closed() {
            debug!(terminal = %self.id, line, "delivery after close ignored");
            return;
        }
        self.transcript.result(self.id, text);
        self.prompt.complete();
        self.transcript.prompt(self.id);
    }

    pub fn render_output(&self, text: &str) {
        if self.is_closed() {
            self.router.fallback().write(text);
            return;
        }
        self.transcript.output(self.id, text);
    }

    /// The worker stopped on its own. Nothing more will be evaluated.
    pub fn worker_died(&mut self, message: &str) {
        if self.is_closed() {
            return;
        }
        self.prompt.complete();
        self.transcript
            .notice(self.id, &format!("evaluation stopped: {message}"));
    }

    pub fn notice(&self, text: &str) {
        if !self.is_closed() {
            self.transcript.notice(self.id, text);
        }
    }

    /// Close right away when idle, otherwise ask for a decision.
    pub fn request_close(&mut self) -> CloseOutcome {
        match self.lifecycle {
            Lifecycle::Closed => CloseOutcome::Closed,
            Lifecycle::Closing => CloseOutcome::NeedsDecision,
            Lifecycle::Open if self.is_in_flight() => {
                info!(terminal = %self.id, "close requested mid-evaluation");
                self.lifecycle = Lifecycle::Closing;
                CloseOutcome::NeedsDecision
            }
            Lifecycle::Open => {
                self.mark_closed();
                self.worker.request_graceful_end();
                CloseOutcome::Closed
            }
        }
    }

    pub fn resolve_close(&mut self, decision: CloseDecision) -> Result<CloseOutcome, TerminalError> {
        if self.lifecycle != Lifecycle::Closing {
            return Err(TerminalError::NotClosing);
        }
        info!(terminal = %self.id, ?decision, "close decision");
        match decision {
            CloseDecision::Cancel => {
                self.lifecycle = Lifecycle::Open;
                Ok(CloseOutcome::Cancelled)
            }
            CloseDecision::Kill => {
                self.mark_closed();
                self.worker.request_kill();
                Ok(CloseOutcome::Closed)
            }
            CloseDecision::RunInBackground => {
                self.mark_closed();
                self.worker.request_graceful_end();
                Ok(CloseOutcome::Closed)
            }
        }
    }

    fn mark_closed(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.lifecycle = Lifecycle::Closed;
        self.router.release(self.id);
        info!(terminal = %self.id, "terminal closed");
    }

    /// Block until the worker thread exits. Only useful after a graceful
    /// close; a killed worker is detached.
    pub fn wait(&mut self) {
        self.worker.wait();
    }
}
