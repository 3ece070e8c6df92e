//! The console: terminals, the active one, and the UI side of the loop.
//!
//! Everything that renders or changes a terminal goes through here, on one
//! task. Workers talk back through [`ConsoleEvent`]s which the loop feeds
//! to [`Console::handle_event`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::commands::{CommandRegistry, CommandResult, ConsoleAction, SessionInfo, TerminalSummary};
use crate::config::ConsoleConfig;
use crate::events::{self, ConsoleEvent, EventReceiver};
use crate::interpreter::Interpreter;
use crate::router::OutputRouter;
use crate::terminal::{
    CloseDecision, CloseOutcome, Terminal, TerminalError, TerminalId, TerminalSetup, Transcript,
};

/// Whether the loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Counters for the session summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub commands_evaluated: u64,
    pub terminals_opened: u64,
}

pub struct Console {
    config: ConsoleConfig,
    setup: TerminalSetup,
    registry: CommandRegistry,
    terminals: BTreeMap<TerminalId, Terminal>,
    active: Option<TerminalId>,
    next_id: u64,
    /// Terminal waiting for a `[c]ancel / [k]ill / [b]ackground` answer.
    pending: Option<TerminalId>,
    /// Terminals still to close before a `/quit` completes.
    quit_queue: VecDeque<TerminalId>,
    quitting: bool,
    stats: SessionStats,
}

impl Console {
    /// A console with one terminal open, plus the receiver its loop reads.
    pub fn new(
        config: ConsoleConfig,
        interpreter: Arc<dyn Interpreter>,
        transcript: Arc<dyn Transcript>,
    ) -> Result<(Self, EventReceiver)> {
        Self::with_router(config, interpreter, transcript, Arc::new(OutputRouter::new()))
    }

    pub fn with_router(
        config: ConsoleConfig,
        interpreter: Arc<dyn Interpreter>,
        transcript: Arc<dyn Transcript>,
        router: Arc<OutputRouter>,
    ) -> Result<(Self, EventReceiver)> {
        let (events, receiver) = events::channel();
        let mut console = Self {
            config,
            setup: TerminalSetup {
                router,
                interpreter,
                events,
                transcript,
            },
            registry: CommandRegistry::new(),
            terminals: BTreeMap::new(),
            active: None,
            next_id: 1,
            pending: None,
            quit_queue: VecDeque::new(),
            quitting: false,
            stats: SessionStats::default(),
        };
        console.open_terminal()?;
        Ok((console, receiver))
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn active(&self) -> Option<TerminalId> {
        self.active
    }

    pub fn terminal(&self, id: TerminalId) -> Option<&Terminal> {
        self.terminals.get(&id)
    }

    pub fn terminal_ids(&self) -> Vec<TerminalId> {
        self.terminals.keys().copied().collect()
    }

    /// Waiting for a close decision.
    pub fn pending_decision(&self) -> Option<TerminalId> {
        self.pending
    }

    pub fn open_terminal(&mut self) -> Result<TerminalId, TerminalError> {
        let id = TerminalId(self.next_id);
        self.next_id += 1;
        let terminal = Terminal::open(id, self.setup.clone())?;
        self.terminals.insert(id, terminal);
        self.active = Some(id);
        self.stats.terminals_opened += 1;
        Ok(id)
    }

    /// Show the prompt of the active terminal again.
    pub fn reprompt(&self) {
        if let Some(id) = self.active {
            self.setup.transcript.prompt(id);
        }
    }

    fn notice(&self, text: &str) {
        match self.active.and_then(|id| self.terminals.get(&id)) {
            Some(terminal) => terminal.notice(text),
            None => println!("{text}"),
        }
    }

    fn summaries(&self) -> Vec<TerminalSummary> {
        self.terminals
            .values()
            .map(|t| TerminalSummary {
                id: t.id(),
                lifecycle: t.lifecycle(),
                evaluating: t.is_in_flight(),
                commands: t.history().len(),
            })
            .collect()
    }

    // ── Input ────────────────────────────────────────────────────────────

    /// One line typed by the user.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        if let Some(id) = self.pending {
            return self.answer_close(id, line);
        }

        let summaries = self.summaries();
        let history: Vec<String> = self
            .active
            .and_then(|id| self.terminals.get(&id))
            .map(|t| t.history().entries().to_vec())
            .unwrap_or_default();
        let info = SessionInfo {
            terminals: &summaries,
            active: self.active,
            history: &history,
        };

        match self.registry.dispatch(line, &info).await {
            CommandResult::NotACommand => {
                self.submit(line);
                Flow::Continue
            }
            CommandResult::Handled => {
                self.reprompt();
                Flow::Continue
            }
            CommandResult::Action(action) => self.apply(action),
            CommandResult::Quit => self.begin_quit(),
        }
    }

    fn submit(&mut self, line: &str) {
        let Some(terminal) = self.active.and_then(|id| self.terminals.get_mut(&id)) else {
            println!("no terminal open; /new opens one, /quit exits");
            return;
        };
        match terminal.submit_line(line) {
            Ok(_) => {}
            Err(TerminalError::InputLocked) => {
                terminal.notice("still evaluating; input is locked until the result arrives");
            }
            Err(e) => {
                terminal.notice(&format!("not submitted: {e}"));
                self.reprompt();
            }
        }
    }

    fn apply(&mut self, action: ConsoleAction) -> Flow {
        match action {
            ConsoleAction::OpenTerminal => match self.open_terminal() {
                Ok(id) => info!(terminal = %id, "opened from console"),
                Err(e) => {
                    println!("  ✗ could not open terminal: {e}");
                    self.reprompt();
                }
            },
            ConsoleAction::Switch(id) => {
                if self.terminals.contains_key(&id) {
                    self.active = Some(id);
                } else {
                    println!("  ✗ no terminal [{id}]");
                }
                self.reprompt();
            }
            ConsoleAction::Close(target) => {
                let Some(id) = target.or(self.active) else {
                    println!("  no terminal to close");
                    return Flow::Continue;
                };
                if !self.terminals.contains_key(&id) {
                    println!("  ✗ no terminal [{id}]");
                    self.reprompt();
                    return Flow::Continue;
                }
                self.close(id);
                if self.pending.is_none() {
                    self.reprompt();
                }
            }
        }
        Flow::Continue
    }

    // ── Closing ──────────────────────────────────────────────────────────

    /// Start closing `id`, settling the decision by policy when it can.
    fn close(&mut self, id: TerminalId) {
        let Some(terminal) = self.terminals.get_mut(&id) else {
            return;
        };
        match terminal.request_close() {
            CloseOutcome::Closed | CloseOutcome::Cancelled => self.forget(id),
            CloseOutcome::NeedsDecision => match self.config.close_policy.decision() {
                Some(decision) => self.decide(id, decision),
                None => {
                    self.pending = Some(id);
                    println!(
                        "terminal [{id}] is still evaluating. [c]ancel / [k]ill / [b]ackground?"
                    );
                }
            },
        }
    }

    fn answer_close(&mut self, id: TerminalId, answer: &str) -> Flow {
        let decision = match answer.trim().to_ascii_lowercase().as_str() {
            "c" | "cancel" => CloseDecision::Cancel,
            "k" | "kill" => CloseDecision::Kill,
            "b" | "background" => CloseDecision::RunInBackground,
            _ => {
                println!("answer c (cancel), k (kill) or b (background)");
                return Flow::Continue;
            }
        };
        self.pending = None;
        self.decide(id, decision);

        if decision == CloseDecision::Cancel && self.quitting {
            // Cancelling one terminal cancels the whole quit.
            self.quitting = false;
            self.quit_queue.clear();
            println!("quit cancelled");
        }
        if self.quitting {
            return self.continue_quit();
        }
        self.reprompt();
        Flow::Continue
    }

    fn decide(&mut self, id: TerminalId, decision: CloseDecision) {
        let Some(terminal) = self.terminals.get_mut(&id) else {
            return;
        };
        match terminal.resolve_close(decision) {
            Ok(CloseOutcome::Closed) => self.forget(id),
            Ok(_) => {}
            Err(e) => debug!(terminal = %id, error = %e, "close decision not applied"),
        }
    }

    /// Drop a closed terminal and pick another active one.
    fn forget(&mut self, id: TerminalId) {
        self.terminals.remove(&id);
        if self.active == Some(id) {
            self.active = self.terminals.keys().next_back().copied();
        }
    }

    fn begin_quit(&mut self) -> Flow {
        self.quitting = true;
        self.quit_queue = self.terminals.keys().copied().collect();
        self.continue_quit()
    }

    fn continue_quit(&mut self) -> Flow {
        while let Some(id) = self.quit_queue.pop_front() {
            self.close(id);
            if self.pending.is_some() {
                return Flow::Continue;
            }
        }
        Flow::Quit
    }

    /// Close everything without asking (EOF, Ctrl-C). In-flight commands
    /// get the policy's exit decision.
    pub fn shutdown(&mut self) {
        let decision = self.config.close_policy.exit_decision();
        self.pending = None;
        self.quit_queue.clear();
        for id in self.terminal_ids() {
            if let Some(terminal) = self.terminals.get_mut(&id)
                && terminal.request_close() == CloseOutcome::NeedsDecision
            {
                self.decide(id, decision);
            }
            self.forget(id);
        }
        info!(?decision, "console shut down");
    }

    // ── Worker events ────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: ConsoleEvent) {
        let id = event.terminal();
        let Some(terminal) = self.terminals.get_mut(&id) else {
            // The terminal closed while the event was queued.
            if let ConsoleEvent::Output { text, .. } = &event {
                self.setup.router.fallback().write(text);
            }
            debug!(terminal = %id, "event for closed terminal dropped");
            return;
        };
        match event {
            ConsoleEvent::Output { text, .. } => terminal.render_output(&text),
            ConsoleEvent::Result { line, text, .. } => {
                self.stats.commands_evaluated += 1;
                terminal.deliver(line, &text);
            }
            ConsoleEvent::WorkerDied { message, .. } => terminal.worker_died(&message),
        }
    }
}
