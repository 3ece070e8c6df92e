//! Tokens to a [`Program`].
//!
//! Precedence, lowest first:
//! 1. `c ? a : b`
//! 2. `||`
//! 3. `&&`
//! 4. `==`, `!=`
//! 5. `<`, `<=`, `>`, `>=`
//! 6. `+`, `-`
//! 7. `*`, `/`, `%`
//! 8. unary `-`, `!`
//! 9. calls `f(x)` and indexing `xs[i]`

use super::ast::{BinOp, Expr, ExprKind, Program, Stmt, UnaryOp};
use super::lexer::{SyntaxError, Token, TokenKind};

/// Nesting limit for expressions; keeps pathological input off the stack.
const MAX_NESTING: u32 = 64;

pub fn parse(tokens: Vec<Token>) -> Result<Program, SyntaxError> {
    Parser {
        tokens,
        pos: 0,
        nesting: 0,
    }
    .program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: u32,
}

impl Parser {
    // ── Token cursor ─────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        // tokenize() always ends the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_second(&self) -> &TokenKind {
        let index = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn line(&self) -> u32 {
        self.peek().line
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), SyntaxError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {kind}")))
        }
    }

    fn unexpected(&self, context: &str) -> SyntaxError {
        SyntaxError::new(
            self.line(),
            format!("unexpected {}, {context}", self.peek_kind()),
        )
    }

    fn skip_newlines(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline | TokenKind::Semicolon) {
            self.advance();
        }
    }

    // ── Statements ───────────────────────────────────────────────────────

    fn program(mut self) -> Result<Program, SyntaxError> {
        let mut statements = Vec::new();
        self.skip_separators();
        while *self.peek_kind() != TokenKind::Eof {
            statements.push(self.statement()?);
            match self.peek_kind() {
                TokenKind::Newline | TokenKind::Semicolon => self.skip_separators(),
                TokenKind::Eof => {}
                _ => return Err(self.unexpected("expected end of statement")),
            }
        }
        Ok(Program { statements })
    }

    fn statement(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        match self.peek_kind().clone() {
            TokenKind::Def => self.definition(),
            TokenKind::Raise => {
                self.advance();
                let value = self.expression()?;
                Ok(Stmt::Raise { value, line })
            }
            TokenKind::Ident(name) if *self.peek_second() == TokenKind::Assign => {
                self.advance();
                self.advance();
                let value = self.expression()?;
                Ok(Stmt::Assign { name, value, line })
            }
            _ => Ok(Stmt::Expr(self.expression()?)),
        }
    }

    fn definition(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        self.expect(&TokenKind::Def)?;
        let name = self.identifier("expected function name")?;
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.eat(&TokenKind::RParen) {
            loop {
                let param = self.identifier("expected parameter name")?;
                if params.contains(&param) {
                    return Err(SyntaxError::new(
                        self.line(),
                        format!("duplicated argument name `{param}'"),
                    ));
                }
                params.push(param);
                if self.eat(&TokenKind::RParen) {
                    break;
                }
                self.expect(&TokenKind::Comma)?;
            }
        }
        self.expect(&TokenKind::Assign)?;
        self.skip_newlines();
        let body = self.expression()?;
        Ok(Stmt::Def {
            name,
            params,
            body,
            line,
        })
    }

    fn identifier(&mut self, context: &str) -> Result<String, SyntaxError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected(context)),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────

    fn expression(&mut self) -> Result<Expr, SyntaxError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(SyntaxError::new(self.line(), "expression nested too deeply"));
        }
        let result = self.ternary();
        self.nesting -= 1;
        result
    }

    fn ternary(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.binary_level(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        let line = cond.line;
        let then = self.expression()?;
        self.expect(&TokenKind::Colon)?;
        let otherwise = self.expression()?;
        Ok(Expr::new(
            ExprKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            line,
        ))
    }

    /// Left-associative binary levels, loosest first.
    fn binary_level(&mut self, level: usize) -> Result<Expr, SyntaxError> {
        const LEVELS: &[&[(TokenKind, BinOp)]] = &[
            &[(TokenKind::OrOr, BinOp::Or)],
            &[(TokenKind::AndAnd, BinOp::And)],
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::NotEq, BinOp::Ne)],
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Ge, BinOp::Ge),
            ],
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Rem),
            ],
        ];

        let Some(operators) = LEVELS.get(level) else {
            return self.unary();
        };

        let mut left = self.binary_level(level + 1)?;
        loop {
            let Some(op) = operators
                .iter()
                .find(|(kind, _)| kind == self.peek_kind())
                .map(|(_, op)| *op)
            else {
                return Ok(left);
            };
            self.advance();
            self.skip_newlines();
            let right = self.binary_level(level + 1)?;
            let line = left.line;
            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                line,
            );
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.advance();
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(SyntaxError::new(line, "expression nested too deeply"));
        }
        let operand = self.unary();
        self.nesting -= 1;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand?),
            },
            line,
        ))
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            let line = expr.line;
            if self.eat(&TokenKind::LParen) {
                let args = self.list_tail(&TokenKind::RParen)?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    line,
                );
            } else if self.eat(&TokenKind::LBracket) {
                self.skip_newlines();
                let index = self.expression()?;
                self.skip_newlines();
                self.expect(&TokenKind::RBracket)?;
                expr = Expr::new(
                    ExprKind::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                );
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma-separated expressions up to `close`; the opener is consumed.
    fn list_tail(&mut self, close: &TokenKind) -> Result<Vec<Expr>, SyntaxError> {
        let mut items = Vec::new();
        self.skip_newlines();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            self.skip_newlines();
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(&TokenKind::Comma)?;
            self.skip_newlines();
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::Int(n) => ExprKind::Int(n),
            TokenKind::Float(x) => ExprKind::Float(x),
            TokenKind::Str(s) => ExprKind::Str(s),
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Nil => ExprKind::Nil,
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::LBracket => ExprKind::List(self.list_tail(&TokenKind::RBracket)?),
            TokenKind::LParen => {
                self.skip_newlines();
                let inner = self.expression()?;
                self.skip_newlines();
                self.expect(&TokenKind::RParen)?;
                return Ok(inner);
            }
            other => {
                return Err(SyntaxError::new(
                    token.line,
                    format!("unexpected {other}, expected an expression"),
                ));
            }
        };
        Ok(Expr::new(kind, token.line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::script::lexer::tokenize;

    fn parse_src(source: &str) -> Result<Program, SyntaxError> {
        parse(tokenize(source, 1)?)
    }

    fn single_expr(source: &str) -> ExprKind {
        let program = parse_src(source).unwrap();
        match program.statements.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr.kind,
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn assignment_statement() {
        let program = parse_src("x = 40").unwrap();
        assert!(matches!(
            &program.statements[0],
            Stmt::Assign { name, value, line: 1 } if name == "x" && value.kind == ExprKind::Int(40)
        ));
    }

    #[test]
    fn equality_is_not_assignment() {
        assert!(matches!(
            single_expr("x == 40"),
            ExprKind::Binary { op: BinOp::Eq, .. }
        ));
    }

    #[test]
    fn multiplication_binds_tighter() {
        let ExprKind::Binary { op, right, .. } = single_expr("1 + 2 * 3") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn subtraction_is_left_associative() {
        let ExprKind::Binary { left, .. } = single_expr("10 - 3 - 2") else {
            panic!("expected binary");
        };
        assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Sub, .. }));
    }

    #[test]
    fn definition_with_params() {
        let program = parse_src("def add(a, b) = a + b").unwrap();
        assert!(matches!(
            &program.statements[0],
            Stmt::Def { name, params, .. } if name == "add" && params == &["a", "b"]
        ));
    }

    #[test]
    fn duplicate_params_rejected() {
        assert!(parse_src("def f(a, a) = a").is_err());
    }

    #[test]
    fn raise_statement() {
        let program = parse_src("raise 'boom'").unwrap();
        assert!(matches!(&program.statements[0], Stmt::Raise { .. }));
    }

    #[test]
    fn statements_split_on_semicolons_and_newlines() {
        let program = parse_src("a = 1; b = 2\n\nc = 3;").unwrap();
        assert_eq!(program.statements.len(), 3);
        assert_eq!(program.statements[2].line(), 3);
    }

    #[test]
    fn call_index_and_ternary() {
        assert!(matches!(single_expr("f(1, 2)"), ExprKind::Call { args, .. } if args.len() == 2));
        assert!(matches!(single_expr("xs[0]"), ExprKind::Index { .. }));
        assert!(matches!(single_expr("a ? 1 : 2"), ExprKind::Ternary { .. }));
    }

    #[test]
    fn list_may_span_lines() {
        assert!(matches!(single_expr("[1,\n 2,\n 3]"), ExprKind::List(items) if items.len() == 3));
    }

    #[test]
    fn missing_operand_reports_line() {
        let err = parse_src("x = 1\ny = ").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("expected an expression"));
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        assert!(parse_src("1 2").is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let source = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        let err = parse_src(&source).unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn empty_program() {
        assert!(parse_src("  \n ; ").unwrap().statements.is_empty());
    }
}
