//! The built-in expression language.
//!
//! Small and Ruby-flavoured: assignments persist in the terminal's
//! environment, `def f(a) = expr` defines functions, `raise` fails the
//! command and `spawn`/`join` run functions on threads whose output is
//! routed back to the spawning terminal.

pub mod ast;
mod eval;
pub mod lexer;
pub mod parser;

use crate::consts::{DEFAULT_MAX_DEPTH, DEFAULT_SOURCE_LABEL};
use crate::interpreter::{EvalRequest, Environment, Failure, Frame, Interpreter, Value};

use eval::Evaluation;

/// Knobs of the built-in language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    /// File name shown in trace frames.
    pub source_label: String,
    /// Deepest call nesting before `SystemStackError`.
    pub max_depth: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            source_label: DEFAULT_SOURCE_LABEL.to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptInterpreter {
    config: ScriptConfig,
}

impl ScriptInterpreter {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }
}

impl Interpreter for ScriptInterpreter {
    fn name(&self) -> &str {
        "script"
    }

    fn evaluate(&self, request: &EvalRequest<'_>, env: &mut Environment) -> Result<Value, Failure> {
        let label = &self.config.source_label;
        let program = lexer::tokenize(request.source, request.line)
            .and_then(parser::parse)
            .map_err(|e| {
                Failure::new("SyntaxError", format!("{label}:{}: {}", e.line, e.message))
                    .with_trace(vec![Frame::new(request.site.clone(), "evaluate")])
            })?;

        Evaluation::new(
            env,
            request.context,
            label,
            Some(&request.site),
            self.config.max_depth,
        )
        .run(&program, request.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ExecutionContext;
    use crate::interpreter::SourceLocation;
    use crate::router::{OutputRouter, Sink};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Collect(Mutex<String>);

    impl Sink for Collect {
        fn write(&self, text: &str) {
            self.0.lock().unwrap().push_str(text);
        }
    }

    struct Harness {
        interpreter: ScriptInterpreter,
        env: Environment,
        context: ExecutionContext,
        output: Arc<Collect>,
        site: SourceLocation,
        line: u32,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(ScriptConfig::default())
        }

        fn with_config(config: ScriptConfig) -> Self {
            let output = Arc::new(Collect::default());
            let router = Arc::new(OutputRouter::with_fallback(output.clone()));
            Self {
                interpreter: ScriptInterpreter::new(config),
                env: Environment::new(),
                context: ExecutionContext::new(router),
                output,
                site: SourceLocation::new("engine.rs", 99),
                line: 0,
            }
        }

        fn eval(&mut self, source: &str) -> Result<Value, Failure> {
            self.line += 1;
            let request = EvalRequest {
                source,
                line: self.line,
                site: self.site.clone(),
                context: &self.context,
            };
            self.interpreter.evaluate(&request, &mut self.env)
        }

        fn output(&self) -> String {
            self.output.0.lock().unwrap().clone()
        }
    }

    #[test]
    fn bindings_persist_between_commands() {
        let mut h = Harness::new();
        assert_eq!(h.eval("x = 40").unwrap(), Value::Int(40));
        assert_eq!(h.eval("x + 2").unwrap(), Value::Int(42));
    }

    #[test]
    fn last_statement_is_the_result() {
        let mut h = Harness::new();
        assert_eq!(h.eval("a = 1; b = 2; a + b").unwrap(), Value::Int(3));
        assert_eq!(h.eval("").unwrap(), Value::Nil);
    }

    #[test]
    fn arithmetic_follows_floor_semantics() {
        let mut h = Harness::new();
        assert_eq!(h.eval("-7 / 2").unwrap(), Value::Int(-4));
        assert_eq!(h.eval("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(h.eval("1 + 0.5").unwrap(), Value::Float(1.5));
        assert_eq!(h.eval("'ab' * 2").unwrap(), Value::Str("abab".into()));
    }

    #[test]
    fn raise_reports_kind_message_and_trace() {
        let mut h = Harness::new();
        let failure = h.eval("raise 'boom'").unwrap_err();
        assert_eq!(failure.kind, "RuntimeError");
        assert_eq!(failure.message, "boom");
        let rendered: Vec<String> = failure.trace.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["console:1:in `<main>'", "engine.rs:99:in `evaluate'"]);
    }

    #[test]
    fn nested_calls_appear_innermost_first() {
        let mut h = Harness::new();
        h.eval("def inner() = raise 'deep'").unwrap();
        h.eval("def outer() = inner()").unwrap();
        let failure = h.eval("outer()").unwrap_err();
        let labels: Vec<&str> = failure.trace.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["inner", "outer", "<main>", "evaluate"]);
        assert_eq!(failure.trace[0].location, SourceLocation::new("console", 1));
        assert_eq!(failure.trace[2].location, SourceLocation::new("console", 3));
    }

    #[test]
    fn failed_call_leaves_no_inner_scope_behind() {
        let mut h = Harness::new();
        h.eval("def f(a) = raise a").unwrap();
        assert!(h.eval("f('x')").is_err());
        assert!(matches!(h.eval("a").unwrap_err().kind.as_str(), "NameError"));
        assert_eq!(h.env.depth(), 1);
    }

    #[test]
    fn syntax_error_carries_only_the_call_site() {
        let mut h = Harness::new();
        let failure = h.eval("x = ").unwrap_err();
        assert_eq!(failure.kind, "SyntaxError");
        assert!(failure.message.starts_with("console:1:"));
        assert_eq!(failure.trace, vec![Frame::new(h.site.clone(), "evaluate")]);
    }

    #[test]
    fn runtime_error_kinds() {
        let mut h = Harness::new();
        assert_eq!(h.eval("nope").unwrap_err().kind, "NameError");
        assert_eq!(h.eval("1 / 0").unwrap_err().kind, "ZeroDivisionError");
        assert_eq!(h.eval("1 + 'a'").unwrap_err().kind, "TypeError");
        assert_eq!(h.eval("1 < 'a'").unwrap_err().kind, "ArgumentError");
        assert_eq!(h.eval("9223372036854775807 + 1").unwrap_err().kind, "RangeError");
        h.eval("def f(a) = a").unwrap();
        let failure = h.eval("f(1, 2)").unwrap_err();
        assert_eq!(failure.kind, "ArgumentError");
        assert_eq!(failure.message, "wrong number of arguments (given 2, expected 1)");
    }

    #[test]
    fn runaway_recursion_hits_the_depth_limit() {
        let mut h = Harness::with_config(ScriptConfig {
            max_depth: 32,
            ..ScriptConfig::default()
        });
        h.eval("def down(n) = down(n + 1)").unwrap();
        let failure = h.eval("down(0)").unwrap_err();
        assert_eq!(failure.kind, "SystemStackError");
        assert_eq!(failure.message, "stack level too deep");
    }

    #[test]
    fn recursion_within_limit_works() {
        let mut h = Harness::with_config(ScriptConfig {
            max_depth: 32,
            ..ScriptConfig::default()
        });
        h.eval("def fact(n) = n <= 1 ? 1 : n * fact(n - 1)").unwrap();
        assert_eq!(h.eval("fact(10)").unwrap(), Value::Int(3_628_800));
    }

    #[test]
    fn print_goes_through_the_router() {
        let mut h = Harness::new();
        h.eval("puts('hello', 1)").unwrap();
        h.eval("print('a', 'b')").unwrap();
        assert_eq!(h.output(), "hello\n1\nab");
    }

    #[test]
    fn spawn_and_join_return_the_thread_value() {
        let mut h = Harness::new();
        h.eval("def twice(n) = n * 2").unwrap();
        h.eval("t = spawn(twice, 21)").unwrap();
        assert_eq!(h.eval("join(t)").unwrap(), Value::Int(42));
    }

    #[test]
    fn joined_failure_keeps_the_call_site_last() {
        let mut h = Harness::new();
        h.eval("def bad() = raise 'in thread'").unwrap();
        let failure = h.eval("join(spawn(bad))").unwrap_err();
        assert_eq!(failure.message, "in thread");
        let labels: Vec<&str> = failure.trace.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, ["bad", "<thread>", "<main>", "evaluate"]);
    }

    #[test]
    fn killed_context_interrupts_evaluation() {
        let mut h = Harness::new();
        h.context.kill_switch().kill();
        let failure = h.eval("sleep(10000)").unwrap_err();
        assert_eq!(failure.kind, "Interrupt");
    }

    #[test]
    fn builtins_can_be_shadowed() {
        let mut h = Harness::new();
        h.eval("def len(x) = 0").unwrap();
        assert_eq!(h.eval("len([1, 2])").unwrap(), Value::Int(0));
        assert_eq!(h.eval("str(1.0) + type(nil)").unwrap(), Value::Str("1.0nil".into()));
    }

    #[test]
    fn indexing_lists_and_strings() {
        let mut h = Harness::new();
        assert_eq!(h.eval("[1, 2, 3][-1]").unwrap(), Value::Int(3));
        assert_eq!(h.eval("[1][5]").unwrap(), Value::Nil);
        assert_eq!(h.eval("'abc'[1]").unwrap(), Value::Str("b".into()));
    }
}
