use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{EvalRequest, Environment, Failure, Interpreter, Value};

type Handler = dyn Fn(&EvalRequest<'_>, &mut Environment) -> Result<Value, Failure> + Send + Sync;

/// An interpreter for tests, backed by a closure.
pub struct MockInterpreter {
    handler: Box<Handler>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockInterpreter {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&EvalRequest<'_>, &mut Environment) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Returns pre-defined outcomes in order, then fails.
    pub fn scripted(outcomes: Vec<Result<Value, Failure>>) -> Self {
        let index = AtomicUsize::new(0);
        Self::new(move |_, _| {
            let i = index.fetch_add(1, Ordering::SeqCst);
            outcomes.get(i).cloned().unwrap_or_else(|| {
                Err(Failure::new(
                    "RuntimeError",
                    format!("MockInterpreter: no more outcomes (called {} times)", i + 1),
                ))
            })
        })
    }

    /// Echo every command back as a string value.
    pub fn echo() -> Self {
        Self::new(|request, _| Ok(Value::Str(request.source.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Sources evaluated so far, in order.
    pub fn seen(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Interpreter for MockInterpreter {
    fn name(&self) -> &str {
        "mock"
    }

    fn evaluate(&self, request: &EvalRequest<'_>, env: &mut Environment) -> Result<Value, Failure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.source.to_string());
        (self.handler)(request, env)
    }
}
