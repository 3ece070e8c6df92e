use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use super::Failure;
use super::script::ast::Expr;

/// A user-defined function: `def name(params) = body`.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

/// Runtime values.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Function(Arc<Function>),
    Thread(ThreadHandle),
}

impl Value {
    /// Human-readable representation shown after `=> `.
    pub fn inspect(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => format!("{x:?}"),
            Value::Str(s) => format!("{s:?}"),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::inspect).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Function(f) => format!("#<def {}({})>", f.name, f.params.join(", ")),
            Value::Thread(t) => format!("#<thread {}>", t.id()),
        }
    }

    /// Text used by `print` and `str`: strings unquoted, everything else
    /// as [`inspect`](Self::inspect).
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.inspect(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::Thread(_) => "thread",
        }
    }

    /// `nil` and `false` are falsy, everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => a.id() == b.id(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

type Outcome = Result<Value, Failure>;

struct ThreadSlot {
    id: u64,
    handle: Mutex<Option<JoinHandle<Outcome>>>,
    outcome: Mutex<Option<Outcome>>,
}

/// A thread started by evaluated code.
#[derive(Clone)]
pub struct ThreadHandle {
    slot: Arc<ThreadSlot>,
}

impl ThreadHandle {
    pub fn new(handle: JoinHandle<Outcome>) -> Self {
        Self {
            slot: Arc::new(ThreadSlot {
                id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
                handle: Mutex::new(Some(handle)),
                outcome: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.slot.id
    }

    /// Wait for the thread and return what it evaluated to.
    /// The outcome is cached, so joining twice yields the same answer.
    pub fn join(&self) -> Outcome {
        let mut outcome = self
            .slot
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(done) = outcome.as_ref() {
            return done.clone();
        }

        let handle = self
            .slot
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let result = match handle {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(Failure::new("ThreadError", "thread panicked"))),
            None => Err(Failure::new("ThreadError", "thread was never started")),
        };
        *outcome = Some(result.clone());
        result
    }

    pub fn is_finished(&self) -> bool {
        let handle = self
            .slot
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle").field("id", &self.id()).finish()
    }
}
