use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hotconsole::engine::{Command, EvalWorker, ResultListener, WorkerSetup, WorkerStatus};
use hotconsole::interpreter::mock::MockInterpreter;
use hotconsole::consts::MAX_DEPTH_LIMIT;
use hotconsole::interpreter::script::{ScriptConfig, ScriptInterpreter};
use hotconsole::interpreter::{Interpreter, Value};
use hotconsole::router::{OutputRouter, Route, Sink, SinkId};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Results(Mutex<mpsc::Sender<(u32, String)>>);

impl ResultListener for Results {
    fn on_result(&self, line: u32, text: &str) {
        let _ = self.0.lock().unwrap().send((line, text.to_string()));
    }
}

#[derive(Default)]
struct Collect(Mutex<String>);

impl Sink for Collect {
    fn write(&self, text: &str) {
        self.0.lock().unwrap().push_str(text);
    }
}

struct Harness {
    worker: EvalWorker,
    results: mpsc::Receiver<(u32, String)>,
    output: Arc<Collect>,
    next_line: u32,
}

impl Harness {
    fn new(interpreter: Arc<dyn Interpreter>) -> Self {
        let (tx, rx) = mpsc::channel();
        let output = Arc::new(Collect::default());
        let worker = EvalWorker::spawn(WorkerSetup {
            name: "engine-test".into(),
            route: Route::new(SinkId(1), output.clone()),
            router: Arc::new(OutputRouter::new()),
            interpreter,
            listener: Arc::new(Results(Mutex::new(tx))),
        })
        .unwrap();
        Self {
            worker,
            results: rx,
            output,
            next_line: 1,
        }
    }

    fn script() -> Self {
        Self::new(Arc::new(ScriptInterpreter::default()))
    }

    fn submit(&mut self, source: &str) -> u32 {
        let line = self.next_line;
        self.next_line += 1;
        self.worker.submit(Command::new(line, source)).unwrap();
        line
    }

    fn eval(&mut self, source: &str) -> String {
        let line = self.submit(source);
        let (got, text) = self.results.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(got, line);
        text
    }
}

#[test]
fn bindings_persist_across_commands() {
    let mut h = Harness::script();
    assert_eq!(h.eval("x = 40"), "=> 40\n");
    assert_eq!(h.eval("x + 2"), "=> 42\n");
}

#[test]
fn raise_shows_kind_and_message_without_engine_frames() {
    let mut h = Harness::script();
    let text = h.eval("raise 'boom'");
    assert!(text.starts_with("RuntimeError: boom\n"), "{text}");
    assert!(text.contains("console:1:in `<main>'"), "{text}");
    assert!(!text.contains("worker.rs"), "{text}");
    assert!(!text.contains("evaluate"), "{text}");
}

#[test]
fn syntax_error_has_no_trace_lines() {
    let mut h = Harness::script();
    let text = h.eval("1 +");
    assert!(text.starts_with("SyntaxError: console:1:"), "{text}");
    assert_eq!(text.lines().count(), 1, "{text}");
}

#[test]
fn failures_do_not_stop_the_loop() {
    let mut h = Harness::script();
    assert!(h.eval("1 / 0").starts_with("ZeroDivisionError"));
    assert_eq!(h.eval("1 + 1"), "=> 2\n");
}

#[test]
fn oversized_string_repeat_fails_and_worker_survives() {
    let mut h = Harness::script();
    let text = h.eval("'ab' * 9223372036854775807");
    assert!(text.starts_with("ArgumentError: argument too big"), "{text}");
    assert_eq!(h.worker.status(), WorkerStatus::Idle);
    assert_eq!(h.eval("'ab' * 2"), "=> \"abab\"\n");
}

#[test]
fn out_of_range_sleep_fails_and_worker_survives() {
    let mut h = Harness::script();
    let text = h.eval("sleep(9223372036854775807.0 * 9223372036854775807.0)");
    assert!(text.starts_with("ArgumentError: sleep duration out of range"), "{text}");
    assert_eq!(h.eval("1 + 1"), "=> 2\n");
}

#[test]
fn recursion_at_the_depth_limit_stays_on_the_stack() {
    let mut h = Harness::new(Arc::new(ScriptInterpreter::new(ScriptConfig {
        max_depth: MAX_DEPTH_LIMIT,
        ..ScriptConfig::default()
    })));
    h.eval("def f(n) = n == 0 ? 0 : f(n - 1)");
    assert_eq!(h.eval("f(2000)"), "=> 0\n");
    let text = h.eval("f(200000)");
    assert!(text.starts_with("SystemStackError"), "{text}");
    assert_eq!(h.eval("f(3)"), "=> 0\n");
}

#[test]
fn commands_run_in_order_without_overlap() {
    let busy = Arc::new(AtomicBool::new(false));
    let overlapped = Arc::new(AtomicBool::new(false));
    let interpreter = {
        let busy = Arc::clone(&busy);
        let overlapped = Arc::clone(&overlapped);
        MockInterpreter::new(move |request, _| {
            if busy.swap(true, Ordering::SeqCst) {
                overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(5));
            busy.store(false, Ordering::SeqCst);
            Ok(Value::Int(i64::from(request.line)))
        })
    };
    let mut h = Harness::new(Arc::new(interpreter));

    let lines: Vec<u32> = (0..10).map(|i| h.submit(&format!("cmd {i}"))).collect();
    let delivered: Vec<u32> = (0..10)
        .map(|_| h.results.recv_timeout(TIMEOUT).unwrap().0)
        .collect();

    assert_eq!(delivered, lines);
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[test]
fn print_reaches_the_worker_route() {
    let mut h = Harness::script();
    assert_eq!(h.eval("puts('hello')"), "=> nil\n");
    assert_eq!(*h.output.0.lock().unwrap(), "hello\n");
}

#[test]
fn spawned_thread_output_follows_the_terminal() {
    let mut h = Harness::script();
    h.eval("def shout(s) = puts(s)");
    h.eval("join(spawn(shout, 'from thread'))");
    assert_eq!(*h.output.0.lock().unwrap(), "from thread\n");
}

#[test]
fn kill_stops_a_sleeping_script_without_result() {
    let mut h = Harness::script();
    h.submit("sleep(60000)");
    let deadline = std::time::Instant::now() + TIMEOUT;
    while !h.worker.is_evaluating() {
        assert!(std::time::Instant::now() < deadline, "never started");
        std::thread::sleep(Duration::from_millis(2));
    }

    h.worker.request_kill();
    assert_eq!(h.worker.status(), WorkerStatus::Killed);
    assert!(h.results.recv_timeout(Duration::from_millis(300)).is_err());
    assert!(h.worker.submit(Command::new(99, "1")).is_err());
}

#[test]
fn graceful_end_finishes_queued_work() {
    let mut h = Harness::script();
    h.submit("a = 1");
    h.submit("a + 1");
    h.worker.request_graceful_end();
    assert!(h.worker.submit(Command::new(3, "a")).is_err());
    h.worker.wait();

    let texts: Vec<String> = h.results.try_iter().map(|(_, text)| text).collect();
    assert_eq!(texts, ["=> 1\n", "=> 2\n"]);
    assert_eq!(h.worker.status(), WorkerStatus::Ended);
}
