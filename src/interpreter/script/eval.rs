//! Tree-walking evaluation of a parsed [`Program`].

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use super::ast::{BinOp, Expr, ExprKind, Program, Stmt, UnaryOp};
use crate::consts::{MAX_EVAL_NESTING, MAX_STRING_BYTES};
use crate::engine::ExecutionContext;
use crate::interpreter::{
    Environment, Failure, Frame, Function, SourceLocation, ThreadHandle, Value,
};
use crate::router::RoutedStdout;

struct CallFrame {
    label: String,
    line: u32,
}

/// State of one evaluation: a command on a worker, or a spawned thread.
pub(super) struct Evaluation<'a> {
    env: &'a mut Environment,
    context: &'a ExecutionContext,
    file: &'a str,
    site: Option<&'a SourceLocation>,
    frames: Vec<CallFrame>,
    max_depth: usize,
    /// Live `expr` recursion; bounded so evaluation never exhausts the thread stack.
    nesting: usize,
    out: RoutedStdout,
}

impl<'a> Evaluation<'a> {
    pub(super) fn new(
        env: &'a mut Environment,
        context: &'a ExecutionContext,
        file: &'a str,
        site: Option<&'a SourceLocation>,
        max_depth: usize,
    ) -> Self {
        Self {
            env,
            context,
            file,
            site,
            frames: Vec::new(),
            max_depth,
            nesting: 0,
            out: context.stdout(),
        }
    }

    /// Run every statement; the value of the last one is the result.
    pub(super) fn run(&mut self, program: &Program, line: u32) -> Result<Value, Failure> {
        self.enter("<main>", line);
        let mut last = Value::Nil;
        for stmt in &program.statements {
            last = self.statement(stmt)?;
        }
        self.frames.pop();
        Ok(last)
    }

    fn enter(&mut self, label: &str, line: u32) {
        self.frames.push(CallFrame {
            label: label.to_string(),
            line,
        });
    }

    // ── Failures ─────────────────────────────────────────────────────────

    /// Active calls innermost first, then the engine's call site.
    fn trace(&self) -> Vec<Frame> {
        let mut trace: Vec<Frame> = self
            .frames
            .iter()
            .rev()
            .map(|frame| {
                Frame::new(
                    SourceLocation::new(self.file.to_string(), frame.line),
                    frame.label.clone(),
                )
            })
            .collect();
        if let Some(site) = self.site {
            trace.push(Frame::new(site.clone(), "evaluate"));
        }
        trace
    }

    fn fail(&self, kind: &str, message: impl Into<String>) -> Failure {
        Failure::new(kind, message).with_trace(self.trace())
    }

    /// Record progress and honour the kill switch.
    fn tick(&mut self, line: u32) -> Result<(), Failure> {
        self.set_line(line);
        if self.context.is_killed() {
            return Err(self.fail("Interrupt", "evaluation killed"));
        }
        Ok(())
    }

    fn set_line(&mut self, line: u32) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn statement(&mut self, stmt: &Stmt) -> Result<Value, Failure> {
        self.tick(stmt.line())?;
        match stmt {
            Stmt::Def {
                name, params, body, ..
            } => {
                let function = Value::Function(Arc::new(Function {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                }));
                self.env.define(name, function.clone());
                Ok(function)
            }
            Stmt::Assign { name, value, .. } => {
                let value = self.expr(value)?;
                self.env.define(name, value.clone());
                Ok(value)
            }
            Stmt::Raise { value, line } => {
                let value = self.expr(value)?;
                self.set_line(*line);
                Err(self.fail("RuntimeError", value.to_text()))
            }
            Stmt::Expr(expr) => self.expr(expr),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expr(&mut self, expr: &Expr) -> Result<Value, Failure> {
        if self.nesting >= MAX_EVAL_NESTING {
            return Err(self.fail("SystemStackError", "stack level too deep"));
        }
        self.nesting += 1;
        let value = self.eval_expr(expr);
        self.nesting -= 1;
        value
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, Failure> {
        self.tick(expr.line)?;
        match &expr.kind {
            ExprKind::Int(n) => Ok(Value::Int(*n)),
            ExprKind::Float(x) => Ok(Value::Float(*x)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::List(items) => Ok(Value::List(self.exprs(items)?)),
            ExprKind::Ident(name) => self.lookup(name),
            ExprKind::Unary { op, operand } => {
                let value = self.expr(operand)?;
                self.set_line(expr.line);
                self.unary(*op, value)
            }
            ExprKind::Binary { left, op, right } => match op {
                BinOp::And => {
                    let left = self.expr(left)?;
                    if left.is_truthy() { self.expr(right) } else { Ok(left) }
                }
                BinOp::Or => {
                    let left = self.expr(left)?;
                    if left.is_truthy() { Ok(left) } else { self.expr(right) }
                }
                _ => {
                    let left = self.expr(left)?;
                    let right = self.expr(right)?;
                    self.set_line(expr.line);
                    self.binary(*op, left, right)
                }
            },
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                if self.expr(cond)?.is_truthy() {
                    self.expr(then)
                } else {
                    self.expr(otherwise)
                }
            }
            ExprKind::Call { callee, args } => {
                let args = self.exprs(args)?;
                self.set_line(expr.line);
                if let ExprKind::Ident(name) = &callee.kind
                    && !self.env.contains(name)
                {
                    return self.builtin(name, args);
                }
                match self.expr(callee)? {
                    Value::Function(function) => {
                        self.set_line(expr.line);
                        self.call(&function, args)
                    }
                    other => Err(self.fail(
                        "TypeError",
                        format!("{} is not callable", other.type_name()),
                    )),
                }
            }
            ExprKind::Index { target, index } => {
                let target = self.expr(target)?;
                let index = self.expr(index)?;
                self.set_line(expr.line);
                self.index(target, index)
            }
        }
    }

    fn exprs(&mut self, items: &[Expr]) -> Result<Vec<Value>, Failure> {
        items.iter().map(|item| self.expr(item)).collect()
    }

    fn lookup(&self, name: &str) -> Result<Value, Failure> {
        self.env.get(name).cloned().ok_or_else(|| {
            self.fail(
                "NameError",
                format!("undefined local variable or method `{name}'"),
            )
        })
    }

    fn call(&mut self, function: &Function, args: Vec<Value>) -> Result<Value, Failure> {
        if args.len() != function.params.len() {
            return Err(self.fail(
                "ArgumentError",
                format!(
                    "wrong number of arguments (given {}, expected {})",
                    args.len(),
                    function.params.len()
                ),
            ));
        }
        if self.frames.len() >= self.max_depth {
            return Err(self.fail("SystemStackError", "stack level too deep"));
        }

        self.enter(&function.name, function.body.line);
        self.env.push_scope();
        for (param, value) in function.params.iter().zip(args) {
            self.env.define(param, value);
        }
        let result = self.expr(&function.body);
        self.env.pop_scope();
        self.frames.pop();
        result
    }

    fn unary(&self, op: UnaryOp, value: Value) -> Result<Value, Failure> {
        match (op, value) {
            (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
            (UnaryOp::Neg, Value::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| self.fail("RangeError", "integer overflow")),
            (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
            (UnaryOp::Neg, other) => Err(self.fail(
                "TypeError",
                format!("undefined unary minus for {}", other.type_name()),
            )),
        }
    }

    fn binary(&self, op: BinOp, left: Value, right: Value) -> Result<Value, Failure> {
        use Value::{Float, Int, List, Str};

        let overflow = || self.fail("RangeError", "integer overflow");
        match (op, left, right) {
            (BinOp::Eq, l, r) => Ok(Value::Bool(l == r)),
            (BinOp::Ne, l, r) => Ok(Value::Bool(l != r)),
            (BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, l, r) => self.compare(op, &l, &r),

            (BinOp::Add, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(overflow),
            (BinOp::Sub, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or_else(overflow),
            (BinOp::Mul, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or_else(overflow),
            (BinOp::Div, Int(_), Int(0)) | (BinOp::Rem, Int(_), Int(0)) => {
                Err(self.fail("ZeroDivisionError", "divided by 0"))
            }
            (BinOp::Div, Int(a), Int(b)) => floor_div(a, b).map(Int).ok_or_else(overflow),
            (BinOp::Rem, Int(a), Int(b)) => floor_rem(a, b).map(Int).ok_or_else(overflow),

            (BinOp::Add, Str(a), Str(b)) => Ok(Str(a + &b)),
            (BinOp::Mul, Str(s), Int(n)) => {
                let Ok(n) = usize::try_from(n) else {
                    return Err(self.fail("ArgumentError", "negative argument"));
                };
                match s.len().checked_mul(n) {
                    Some(len) if len <= MAX_STRING_BYTES => Ok(Str(s.repeat(n))),
                    _ => Err(self.fail("ArgumentError", "argument too big")),
                }
            }
            (BinOp::Add, List(mut a), List(b)) => {
                a.extend(b);
                Ok(List(a))
            }

            (op, l, r) => match (as_float(&l), as_float(&r)) {
                (Some(a), Some(b)) => Ok(Float(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    _ => {
                        let r = a % b;
                        if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
                    }
                })),
                _ => Err(self.fail(
                    "TypeError",
                    format!(
                        "unsupported operand types for {}: {} and {}",
                        op.symbol(),
                        l.type_name(),
                        r.type_name()
                    ),
                )),
            },
        }
    }

    fn compare(&self, op: BinOp, left: &Value, right: &Value) -> Result<Value, Failure> {
        let ordering = match (left, right) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (l, r) => match (as_float(l), as_float(r)) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        let Some(ordering) = ordering else {
            return Err(self.fail(
                "ArgumentError",
                format!(
                    "comparison of {} with {} failed",
                    left.type_name(),
                    right.type_name()
                ),
            ));
        };
        Ok(Value::Bool(match op {
            BinOp::Lt => ordering.is_lt(),
            BinOp::Le => ordering.is_le(),
            BinOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        }))
    }

    /// `xs[i]`: negative indices count from the end; misses are `nil`.
    fn index(&self, target: Value, index: Value) -> Result<Value, Failure> {
        let Value::Int(i) = index else {
            return Err(self.fail(
                "TypeError",
                format!("no implicit conversion of {} into int", index.type_name()),
            ));
        };
        let resolve = |len: usize| -> Option<usize> {
            let len = i64::try_from(len).ok()?;
            let i = if i < 0 { len + i } else { i };
            (0..len).contains(&i).then(|| i as usize)
        };
        match target {
            Value::List(items) => Ok(resolve(items.len())
                .and_then(|i| items.into_iter().nth(i))
                .unwrap_or(Value::Nil)),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                Ok(resolve(chars.len())
                    .map(|i| Value::Str(chars[i].to_string()))
                    .unwrap_or(Value::Nil))
            }
            other => Err(self.fail(
                "TypeError",
                format!("{} cannot be indexed", other.type_name()),
            )),
        }
    }

    // ── Builtins ─────────────────────────────────────────────────────────

    fn arity(&self, name: &str, args: &[Value], expected: usize) -> Result<(), Failure> {
        if args.len() == expected {
            return Ok(());
        }
        Err(self.fail(
            "ArgumentError",
            format!(
                "wrong number of arguments to {name} (given {}, expected {expected})",
                args.len()
            ),
        ))
    }

    fn emit(&mut self, text: &str) -> Result<(), Failure> {
        self.out
            .write_all(text.as_bytes())
            .map_err(|e| self.fail("RuntimeError", format!("write failed: {e}")))
    }

    fn builtin(&mut self, name: &str, mut args: Vec<Value>) -> Result<Value, Failure> {
        match name {
            "print" => {
                let text: String = args.iter().map(Value::to_text).collect();
                self.emit(&text)?;
                Ok(Value::Nil)
            }
            "puts" => {
                let mut text = String::new();
                for arg in &args {
                    text.push_str(&arg.to_text());
                    text.push('\n');
                }
                if args.is_empty() {
                    text.push('\n');
                }
                self.emit(&text)?;
                Ok(Value::Nil)
            }
            "sleep" => {
                self.arity(name, &args, 1)?;
                let millis = match args[0] {
                    Value::Int(ms) if ms >= 0 => ms as f64,
                    Value::Float(ms) if ms >= 0.0 && ms.is_finite() => ms,
                    ref other => {
                        return Err(self.fail(
                            "ArgumentError",
                            format!("sleep needs a non-negative duration, got {}", other.inspect()),
                        ));
                    }
                };
                let Ok(duration) = Duration::try_from_secs_f64(millis / 1000.0) else {
                    return Err(self.fail(
                        "ArgumentError",
                        format!("sleep duration out of range: {}", args[0].inspect()),
                    ));
                };
                if !self.context.sleep(duration) {
                    return Err(self.fail("Interrupt", "evaluation killed"));
                }
                Ok(Value::Nil)
            }
            "spawn" => self.spawn(args),
            "join" => {
                self.arity(name, &args, 1)?;
                let Value::Thread(handle) = &args[0] else {
                    return Err(self.fail(
                        "TypeError",
                        format!("cannot join {}", args[0].type_name()),
                    ));
                };
                handle.join().map_err(|mut failure| {
                    failure.trace.extend(self.trace());
                    failure
                })
            }
            "len" => {
                self.arity(name, &args, 1)?;
                let len = match &args[0] {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    other => {
                        return Err(self.fail(
                            "TypeError",
                            format!("{} has no length", other.type_name()),
                        ));
                    }
                };
                i64::try_from(len)
                    .map(Value::Int)
                    .map_err(|_| self.fail("RangeError", "length out of range"))
            }
            "str" => {
                self.arity(name, &args, 1)?;
                Ok(Value::Str(args.remove(0).to_text()))
            }
            "type" => {
                self.arity(name, &args, 1)?;
                Ok(Value::Str(args[0].type_name().to_string()))
            }
            _ => Err(self.fail("NameError", format!("undefined method `{name}'"))),
        }
    }

    /// `spawn(f, args...)`: run `f` on a new thread that starts from a
    /// snapshot of the global bindings and shares this evaluation's routing
    /// and kill switch.
    fn spawn(&mut self, mut args: Vec<Value>) -> Result<Value, Failure> {
        if args.is_empty() {
            return Err(self.fail(
                "ArgumentError",
                "wrong number of arguments to spawn (given 0, expected 1+)",
            ));
        }
        let Value::Function(function) = args.remove(0) else {
            return Err(self.fail("TypeError", "spawn needs a function"));
        };

        let globals = self.env.global_bindings().clone();
        let file = self.file.to_string();
        let max_depth = self.max_depth;
        let line = self.frames.last().map_or(0, |frame| frame.line);

        let handle = self
            .context
            .spawn("script-thread", move |context| {
                let mut env = Environment::from_globals(globals);
                let mut evaluation = Evaluation::new(&mut env, context, &file, None, max_depth);
                evaluation.enter("<thread>", line);
                evaluation.call(&function, args)
            })
            .map_err(|e| self.fail("ThreadError", e.to_string()))?;

        Ok(Value::Thread(ThreadHandle::new(handle)))
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// Integer division rounding toward negative infinity.
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Remainder taking the sign of the divisor.
fn floor_rem(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        Some(r + b)
    } else {
        Some(r)
    }
}
