//! Source text to tokens.
//!
//! Lines are absolute: the first line of a command is the command's
//! logical line in its terminal, so traces point at what the user typed.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Def,
    Raise,
    True,
    False,
    Nil,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Newline,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,
    Question,
    Colon,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "integer {n}"),
            TokenKind::Float(x) => write!(f, "float {x:?}"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Ident(name) => write!(f, "identifier `{name}'"),
            TokenKind::Def => f.write_str("`def'"),
            TokenKind::Raise => f.write_str("`raise'"),
            TokenKind::True => f.write_str("`true'"),
            TokenKind::False => f.write_str("`false'"),
            TokenKind::Nil => f.write_str("`nil'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Semicolon => f.write_str("';'"),
            TokenKind::Newline => f.write_str("newline"),
            TokenKind::Assign => f.write_str("'='"),
            TokenKind::EqEq => f.write_str("'=='"),
            TokenKind::NotEq => f.write_str("'!='"),
            TokenKind::Lt => f.write_str("'<'"),
            TokenKind::Le => f.write_str("'<='"),
            TokenKind::Gt => f.write_str("'>'"),
            TokenKind::Ge => f.write_str("'>='"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Percent => f.write_str("'%'"),
            TokenKind::Bang => f.write_str("'!'"),
            TokenKind::AndAnd => f.write_str("'&&'"),
            TokenKind::OrOr => f.write_str("'||'"),
            TokenKind::Question => f.write_str("'?'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

/// Lexing or parsing went wrong at `line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

struct Lexer<'src> {
    chars: Peekable<Chars<'src>>,
    line: u32,
    tokens: Vec<Token>,
}

/// Tokenize `source`, numbering lines from `first_line`.
/// The result always ends with [`TokenKind::Eof`].
pub fn tokenize(source: &str, first_line: u32) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: first_line,
        tokens: Vec::new(),
    };
    lexer.run()?;
    let line = lexer.line;
    lexer.tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(lexer.tokens)
}

impl Lexer<'_> {
    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    /// Push `double` when the next char is `second`, else `single`.
    fn pick(&mut self, second: char, double: TokenKind, single: TokenKind) {
        if self.chars.peek() == Some(&second) {
            self.chars.next();
            self.push(double);
        } else {
            self.push(single);
        }
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while let Some(c) = self.chars.next() {
            match c {
                '\n' => {
                    self.push(TokenKind::Newline);
                    self.line += 1;
                }
                c if c.is_whitespace() => {}
                '#' => {
                    while self.chars.peek().is_some_and(|&c| c != '\n') {
                        self.chars.next();
                    }
                }
                '(' => self.push(TokenKind::LParen),
                ')' => self.push(TokenKind::RParen),
                '[' => self.push(TokenKind::LBracket),
                ']' => self.push(TokenKind::RBracket),
                ',' => self.push(TokenKind::Comma),
                ';' => self.push(TokenKind::Semicolon),
                '+' => self.push(TokenKind::Plus),
                '-' => self.push(TokenKind::Minus),
                '*' => self.push(TokenKind::Star),
                '/' => self.push(TokenKind::Slash),
                '%' => self.push(TokenKind::Percent),
                '?' => self.push(TokenKind::Question),
                ':' => self.push(TokenKind::Colon),
                '=' => self.pick('=', TokenKind::EqEq, TokenKind::Assign),
                '!' => self.pick('=', TokenKind::NotEq, TokenKind::Bang),
                '<' => self.pick('=', TokenKind::Le, TokenKind::Lt),
                '>' => self.pick('=', TokenKind::Ge, TokenKind::Gt),
                '&' | '|' => {
                    if self.chars.next_if_eq(&c).is_none() {
                        return Err(SyntaxError::new(
                            self.line,
                            format!("unexpected character '{c}'"),
                        ));
                    }
                    let kind = if c == '&' {
                        TokenKind::AndAnd
                    } else {
                        TokenKind::OrOr
                    };
                    self.push(kind);
                }
                '\'' | '"' => self.string(c)?,
                c if c.is_ascii_digit() => self.number(c)?,
                c if c.is_alphabetic() || c == '_' => self.word(c),
                other => {
                    return Err(SyntaxError::new(
                        self.line,
                        format!("unexpected character '{other}'"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn string(&mut self, quote: char) -> Result<(), SyntaxError> {
        let start = self.line;
        let mut text = String::new();
        loop {
            match self.chars.next() {
                None => return Err(SyntaxError::new(start, "unterminated string literal")),
                Some(c) if c == quote => break,
                Some('\\') => match self.chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c @ ('\\' | '\'' | '"')) => text.push(c),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => return Err(SyntaxError::new(start, "unterminated string literal")),
                },
                Some(c) => {
                    if c == '\n' {
                        self.line += 1;
                    }
                    text.push(c);
                }
            }
        }
        self.tokens.push(Token {
            kind: TokenKind::Str(text),
            line: start,
        });
        Ok(())
    }

    fn number(&mut self, first: char) -> Result<(), SyntaxError> {
        let mut digits = String::from(first);
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '_') {
            if c != '_' {
                digits.push(c);
            }
        }

        // `1.5` is a float; `1.` followed by anything else is not.
        let mut lookahead = self.chars.clone();
        if lookahead.next() == Some('.') && lookahead.peek().is_some_and(char::is_ascii_digit) {
            self.chars.next();
            digits.push('.');
            while let Some(c) = self.chars.next_if(char::is_ascii_digit) {
                digits.push(c);
            }
            let value = digits
                .parse::<f64>()
                .map_err(|_| SyntaxError::new(self.line, format!("invalid float literal {digits}")))?;
            self.push(TokenKind::Float(value));
            return Ok(());
        }

        let value = digits
            .parse::<i64>()
            .map_err(|_| SyntaxError::new(self.line, format!("integer literal {digits} is too large")))?;
        self.push(TokenKind::Int(value));
        Ok(())
    }

    fn word(&mut self, first: char) {
        let mut word = String::from(first);
        while let Some(c) = self.chars.next_if(|c| c.is_alphanumeric() || *c == '_') {
            word.push(c);
        }
        let kind = match word.as_str() {
            "def" => TokenKind::Def,
            "raise" => TokenKind::Raise,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            _ => TokenKind::Ident(word),
        };
        self.push(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source, 1)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn assignment() {
        assert_eq!(
            kinds("x = 40"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Int(40),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("== != <= >= && || < > ! ="),
            vec![
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Bang,
                TokenKind::Assign,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1_000 2.5"),
            vec![TokenKind::Int(1000), TokenKind::Float(2.5), TokenKind::Eof]
        );
    }

    #[test]
    fn strings_with_either_quote_and_escapes() {
        assert_eq!(
            kinds(r#"'boom' "a\n\"b\"""#),
            vec![
                TokenKind::Str("boom".into()),
                TokenKind::Str("a\n\"b\"".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(
            kinds("def raise true false nil"),
            vec![
                TokenKind::Def,
                TokenKind::Raise,
                TokenKind::True,
                TokenKind::False,
                TokenKind::Nil,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("1 # one"), vec![TokenKind::Int(1), TokenKind::Eof]);
    }

    #[test]
    fn lines_start_at_first_line() {
        let tokens = tokenize("a\nb", 7).unwrap();
        assert_eq!(tokens[0].line, 7);
        assert_eq!(tokens[1].kind, TokenKind::Newline);
        assert_eq!(tokens[2].line, 8);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("'oops", 3).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn single_ampersand_is_an_error() {
        assert!(tokenize("a & b", 1).is_err());
    }

    #[test]
    fn huge_integer_is_an_error() {
        assert!(tokenize("99999999999999999999", 1).is_err());
    }
}
