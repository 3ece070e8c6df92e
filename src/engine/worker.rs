//! One evaluation worker per terminal.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use super::context::{ExecutionContext, KillSwitch};
use super::error::{EngineError, EngineResult};
use super::queue::{self, Command, CommandReceiver, CommandSender, Message};
use super::sanitize::{format_failure, format_value};
use crate::consts::EVAL_STACK_SIZE;
use crate::interpreter::{EvalRequest, Environment, Failure, Interpreter, SourceLocation, Value};
use crate::router::{OutputRouter, Route};

/// Receives what the worker produces. Called on the worker thread.
pub trait ResultListener: Send + Sync {
    /// Exactly once per evaluated command, unless the worker was killed.
    fn on_result(&self, line: u32, text: &str);

    /// The worker hit an engine-side failure and stopped.
    fn on_fatal(&self, error: &EngineError) {
        let _ = error;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Evaluating { line: u32 },
    /// Drained its queue after a graceful end.
    Ended,
    Killed,
    /// Stopped on a fatal engine error.
    Dead,
}

impl WorkerStatus {
    fn is_stopped(&self) -> bool {
        matches!(self, WorkerStatus::Killed | WorkerStatus::Dead)
    }
}

/// Everything needed to start a worker.
pub struct WorkerSetup {
    pub name: String,
    /// Where output written during evaluation goes.
    pub route: Route,
    pub router: Arc<OutputRouter>,
    pub interpreter: Arc<dyn Interpreter>,
    pub listener: Arc<dyn ResultListener>,
}

struct Shared {
    status: Mutex<WorkerStatus>,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, WorkerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle the terminal keeps to its worker thread.
pub struct EvalWorker {
    name: String,
    sender: CommandSender,
    shared: Arc<Shared>,
    kill: Arc<KillSwitch>,
    handle: Option<JoinHandle<()>>,
}

impl EvalWorker {
    pub fn spawn(setup: WorkerSetup) -> EngineResult<Self> {
        let (sender, receiver) = queue::channel();
        let shared = Arc::new(Shared {
            status: Mutex::new(WorkerStatus::Idle),
        });
        let kill = Arc::new(KillSwitch::new());

        let worker = WorkerLoop {
            name: setup.name.clone(),
            receiver,
            shared: Arc::clone(&shared),
            context: ExecutionContext::with_kill_switch(setup.router, Arc::clone(&kill)),
            route: setup.route,
            interpreter: setup.interpreter,
            listener: setup.listener,
        };

        let handle = thread::Builder::new()
            .name(setup.name.clone())
            .stack_size(EVAL_STACK_SIZE)
            .spawn(move || worker.run())?;

        info!(worker = %setup.name, "worker started");
        Ok(Self {
            name: setup.name,
            sender,
            shared,
            kill,
            handle: Some(handle),
        })
    }

    /// Queue a command. Never blocks.
    pub fn submit(&self, command: Command) -> EngineResult<()> {
        if self.shared.status().is_stopped() {
            warn!(worker = %self.name, line = command.line, "submission to stopped worker rejected");
            return Err(EngineError::WorkerDead);
        }
        self.sender.submit(command).inspect_err(|e| {
            warn!(worker = %self.name, error = %e, "submission rejected");
        })
    }

    /// Finish what is queued, then stop.
    pub fn request_graceful_end(&mut self) {
        info!(worker = %self.name, "graceful end requested");
        self.sender.end();
    }

    /// Stop now: flip the kill switch, drop any pending delivery, and
    /// detach the thread.
    pub fn request_kill(&mut self) {
        info!(worker = %self.name, "kill requested");
        self.sender.end();
        {
            let mut status = self.shared.status();
            if *status != WorkerStatus::Dead {
                *status = WorkerStatus::Killed;
            }
        }
        self.kill.kill();
        self.handle.take();
    }

    pub fn is_evaluating(&self) -> bool {
        matches!(*self.shared.status(), WorkerStatus::Evaluating { .. })
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared.status().clone()
    }

    pub fn is_accepting(&self) -> bool {
        !self.sender.is_ended() && !self.shared.status().is_stopped()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until the thread exits. Returns immediately for a killed
    /// worker, whose thread is detached.
    pub fn wait(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!(worker = %self.name, "worker thread panicked");
        }
    }
}

struct WorkerLoop {
    name: String,
    receiver: CommandReceiver,
    shared: Arc<Shared>,
    context: ExecutionContext,
    route: Route,
    interpreter: Arc<dyn Interpreter>,
    listener: Arc<dyn ResultListener>,
}

impl WorkerLoop {
    fn run(mut self) {
        let mut env = self.interpreter.create_environment();
        while let Some(message) = self.receiver.next_blocking() {
            let command = match message {
                Message::Evaluate(command) => command,
                Message::End => break,
            };
            if !self.begin(&command) {
                break;
            }
            match self.evaluate(&command, &mut env) {
                Ok(text) => self.deliver(command.line, &text),
                Err(fatal) => {
                    self.fail(&fatal);
                    return;
                }
            }
        }
        self.finish();
    }

    /// Mark the command in flight. `false` once killed.
    fn begin(&self, command: &Command) -> bool {
        let mut status = self.shared.status();
        if status.is_stopped() {
            return false;
        }
        debug!(worker = %self.name, line = command.line, "command dequeued");
        *status = WorkerStatus::Evaluating { line: command.line };
        true
    }

    fn evaluate(&self, command: &Command, env: &mut Environment) -> EngineResult<String> {
        let guard = self
            .context
            .router()
            .register_current(self.route.clone())?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.invoke(command, env)));
        guard.release();

        match outcome {
            Ok((Ok(value), _)) => Ok(format_value(&value)),
            Ok((Err(failure), site)) => {
                debug!(worker = %self.name, line = command.line, kind = %failure.kind, "evaluation failed");
                Ok(format_failure(&failure, &site))
            }
            Err(payload) => Err(EngineError::InterpreterPanic(panic_message(payload))),
        }
    }

    /// The one place the interpreter is called. Its location is the marker
    /// that separates user frames from engine frames.
    #[track_caller]
    fn invoke(
        &self,
        command: &Command,
        env: &mut Environment,
    ) -> (Result<Value, Failure>, SourceLocation) {
        let site = SourceLocation::caller();
        let request = EvalRequest {
            source: &command.source,
            line: command.line,
            site: site.clone(),
            context: &self.context,
        };
        (self.interpreter.evaluate(&request, env), site)
    }

    /// Hand the result over, unless the worker was killed meanwhile.
    /// Runs under the status lock so a kill cannot slip in between.
    fn deliver(&self, line: u32, text: &str) {
        let mut status = self.shared.status();
        if status.is_stopped() {
            debug!(worker = %self.name, line, "worker killed, result dropped");
            return;
        }
        *status = WorkerStatus::Idle;
        self.listener.on_result(line, text);
    }

    fn fail(&self, fatal: &EngineError) {
        eprintln!("hotconsole: worker {} stopped: {fatal}", self.name);
        error!(worker = %self.name, error = %fatal, "worker stopped on fatal error");
        let mut status = self.shared.status();
        if *status == WorkerStatus::Killed {
            return;
        }
        *status = WorkerStatus::Dead;
        self.listener.on_fatal(fatal);
    }

    fn finish(&self) {
        let mut status = self.shared.status();
        if !status.is_stopped() {
            *status = WorkerStatus::Ended;
        }
        info!(worker = %self.name, status = ?*status, "worker stopped");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::mock::MockInterpreter;
    use crate::router::{Sink, SinkId};
    use std::sync::mpsc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Channel(mpsc::Sender<(u32, String)>);

    impl ResultListener for Channel {
        fn on_result(&self, line: u32, text: &str) {
            let _ = self.0.send((line, text.to_string()));
        }

        fn on_fatal(&self, error: &EngineError) {
            let _ = self.0.send((0, format!("fatal: {error}")));
        }
    }

    struct Discard;

    impl Sink for Discard {
        fn write(&self, _text: &str) {}
    }

    fn start(interpreter: MockInterpreter) -> (EvalWorker, mpsc::Receiver<(u32, String)>) {
        let (tx, rx) = mpsc::channel();
        let worker = EvalWorker::spawn(WorkerSetup {
            name: "test-worker".into(),
            route: Route::new(SinkId(1), Arc::new(Discard)),
            router: Arc::new(OutputRouter::new()),
            interpreter: Arc::new(interpreter),
            listener: Arc::new(Channel(tx)),
        })
        .unwrap();
        (worker, rx)
    }

    #[test]
    fn delivers_value_text() {
        let (worker, rx) = start(MockInterpreter::scripted(vec![Ok(Value::Int(42))]));
        worker.submit(Command::new(1, "x")).unwrap();
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (1, "=> 42\n".to_string()));
    }

    #[test]
    fn failure_trace_is_cut_at_the_call_site() {
        let interpreter = MockInterpreter::new(|request, _| {
            Err(Failure::new("RuntimeError", "boom").with_trace(vec![
                crate::interpreter::Frame::new(SourceLocation::new("console", 1), "<main>"),
                crate::interpreter::Frame::new(request.site.clone(), "evaluate"),
            ]))
        });
        let (worker, rx) = start(interpreter);
        worker.submit(Command::new(1, "raise 'boom'")).unwrap();
        let (_, text) = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(text, "RuntimeError: boom\nconsole:1:in `<main>'\n");
        assert!(!text.contains("worker.rs"));
    }

    #[test]
    fn call_site_is_in_the_worker() {
        let interpreter = MockInterpreter::new(|request, _| {
            Ok(Value::Str(request.site.file.to_string()))
        });
        let (worker, rx) = start(interpreter);
        worker.submit(Command::new(1, "")).unwrap();
        let (_, text) = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(text.contains("worker.rs"), "{text}");
    }

    #[test]
    fn graceful_end_drains_queue_then_rejects() {
        let (mut worker, rx) = start(MockInterpreter::echo());
        worker.submit(Command::new(1, "a")).unwrap();
        worker.submit(Command::new(2, "b")).unwrap();
        worker.request_graceful_end();
        assert!(matches!(
            worker.submit(Command::new(3, "c")),
            Err(EngineError::Ended)
        ));
        worker.wait();

        let got: Vec<(u32, String)> = rx.try_iter().collect();
        assert_eq!(got, [(1, "=> \"a\"\n".into()), (2, "=> \"b\"\n".into())]);
        assert_eq!(worker.status(), WorkerStatus::Ended);
        assert!(!worker.is_accepting());
    }

    #[test]
    fn panic_is_fatal_and_stops_the_worker() {
        let interpreter = MockInterpreter::new(|_, _| panic!("interpreter bug"));
        let (mut worker, rx) = start(interpreter);
        worker.submit(Command::new(1, "x")).unwrap();
        let (_, text) = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(text.starts_with("fatal: interpreter panicked: interpreter bug"));
        worker.wait();
        assert_eq!(worker.status(), WorkerStatus::Dead);
        assert!(matches!(
            worker.submit(Command::new(2, "y")),
            Err(EngineError::WorkerDead)
        ));
    }

    #[test]
    fn kill_during_evaluation_drops_the_result() {
        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = Mutex::new(started_tx);
        let interpreter = MockInterpreter::new(move |request, _| {
            let _ = started_tx.lock().unwrap().send(());
            request.context.sleep(Duration::from_secs(30));
            Ok(Value::Nil)
        });
        let (mut worker, rx) = start(interpreter);
        worker.submit(Command::new(1, "sleep")).unwrap();
        started_rx.recv_timeout(TIMEOUT).unwrap();
        assert!(worker.is_evaluating());

        worker.request_kill();
        assert_eq!(worker.status(), WorkerStatus::Killed);
        assert!(matches!(
            worker.submit(Command::new(2, "x")),
            Err(EngineError::WorkerDead)
        ));
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }
}
