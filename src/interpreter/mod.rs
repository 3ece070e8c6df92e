//! The evaluator capability the engine drives.
//!
//! The engine never parses or executes source text itself. It hands each
//! command to an [`Interpreter`] together with the terminal's persistent
//! [`Environment`] and gets back a [`Value`] or a [`Failure`] with a
//! structured trace. [`script`] is the built-in language, [`mock`] a
//! closure-backed double for tests.

pub mod env;
pub mod mock;
pub mod script;
pub mod value;

pub use env::Environment;
pub use value::{Function, ThreadHandle, Value};

use std::borrow::Cow;
use std::fmt;
use std::panic::Location;

use crate::engine::ExecutionContext;

/// File identity plus line. Compared structurally, never as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: Cow<'static, str>,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<Cow<'static, str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Location of whoever called the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: Cow::Borrowed(location.file()),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// One entry of a failure trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub location: SourceLocation,
    pub label: String,
}

impl Frame {
    pub fn new(location: SourceLocation, label: impl Into<String>) -> Self {
        Self {
            location,
            label: label.into(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:in `{}'", self.location, self.label)
    }
}

/// Evaluated code raised. `trace` is innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: String,
    pub message: String,
    pub trace: Vec<Frame>,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }

    pub fn with_trace(mut self, trace: Vec<Frame>) -> Self {
        self.trace = trace;
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Failure {}

/// Everything an interpreter needs for one command.
pub struct EvalRequest<'a> {
    pub source: &'a str,
    /// Logical line of the command in its terminal.
    pub line: u32,
    /// Where the engine invoked the interpreter. Interpreters end their
    /// traces with a frame at this location so it can be cut off.
    pub site: SourceLocation,
    /// Routing, kill switch and thread spawning for the evaluated code.
    pub context: &'a ExecutionContext,
}

/// Parses and executes source text against an environment.
///
/// Runs synchronously on the worker thread for the full duration of a
/// command. Long-running implementations should poll
/// [`ExecutionContext::is_killed`] so a kill can stop them.
pub trait Interpreter: Send + Sync {
    /// Short name for banners and logs.
    fn name(&self) -> &str;

    /// A fresh environment for a new terminal.
    fn create_environment(&self) -> Environment {
        Environment::new()
    }

    fn evaluate(&self, request: &EvalRequest<'_>, env: &mut Environment) -> Result<Value, Failure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_points_at_call_site() {
        let here = line!() + 1;
        let location = SourceLocation::caller();
        assert_eq!(location.line, here);
        assert!(location.file.ends_with("mod.rs"));
    }

    #[test]
    fn frame_display() {
        let frame = Frame::new(SourceLocation::new("console", 3), "f");
        assert_eq!(frame.to_string(), "console:3:in `f'");
    }

    #[test]
    fn failure_display() {
        let failure = Failure::new("RuntimeError", "boom");
        assert_eq!(failure.to_string(), "RuntimeError: boom");
        assert!(failure.trace.is_empty());
    }
}
