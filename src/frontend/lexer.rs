//! Tokenizer for mini-C

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use once_cell::sync::Lazy;

use crate::util::diagnostic::{Diagnostic, DiagnosticCode};
use crate::util::span::{Position, Span};

/// Token kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    KwInt,
    KwVoid,
    KwAuto,
    KwExtern,
    KwIf,
    KwElse,
    KwWhile,
    KwReturn,

    Identifier(String),
    IntLiteral(i64),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Not,

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,

    Eof,
}

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("int", TokenKind::KwInt),
        ("void", TokenKind::KwVoid),
        ("auto", TokenKind::KwAuto),
        ("extern", TokenKind::KwExtern),
        ("if", TokenKind::KwIf),
        ("else", TokenKind::KwElse),
        ("while", TokenKind::KwWhile),
        ("return", TokenKind::KwReturn),
    ])
});

/// Token with its location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokenization failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    /// Input ends inside a construct, e.g. a block comment
    Incomplete,
    Invalid(Diagnostic),
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position::with_offset(self.line, self.column, self.offset)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(
        &mut self,
        expected: char,
    ) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    match lookahead.peek() {
                        Some('/') => {
                            while let Some(c) = self.advance() {
                                if c == '\n' {
                                    break;
                                }
                            }
                        }
                        Some('*') => {
                            self.advance();
                            self.advance();
                            let mut closed = false;
                            while let Some(c) = self.advance() {
                                if c == '*' && self.eat('/') {
                                    closed = true;
                                    break;
                                }
                            }
                            if !closed {
                                return Err(LexError::Incomplete);
                            }
                        }
                        _ => return Ok(()),
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        let start = self.position();
        let Some(c) = self.advance() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                span: Span::new(start, start),
            });
        };

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '=' if self.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Assign,
            '!' if self.eat('=') => TokenKind::Neq,
            '!' => TokenKind::Not,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            c if c.is_ascii_digit() => self.number(c, start)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.word(c),
            c => {
                return Err(LexError::Invalid(Diagnostic::new(
                    DiagnosticCode::InvalidCharacter,
                    format!("unexpected character `{}`", c),
                    Span::new(start, self.position()),
                )))
            }
        };
        Ok(Token {
            kind,
            span: Span::new(start, self.position()),
        })
    }

    fn number(
        &mut self,
        first: char,
        start: Position,
    ) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            text.push(c);
            self.advance();
        }
        text.parse::<i64>().map(TokenKind::IntLiteral).map_err(|_| {
            LexError::Invalid(Diagnostic::new(
                DiagnosticCode::InvalidLiteral,
                format!("integer literal `{}` is out of range", text),
                Span::new(start, self.position()),
            ))
        })
    }

    fn word(
        &mut self,
        first: char,
    ) -> TokenKind {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            text.push(c);
            self.advance();
        }
        KEYWORDS
            .get(text.as_str())
            .cloned()
            .unwrap_or(TokenKind::Identifier(text))
    }
}

/// Tokenize a complete source text; the result always ends with `Eof`
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    tracing::trace!("tokenized {} bytes into {} tokens", source.len(), tokens.len());
    Ok(tokens)
}
