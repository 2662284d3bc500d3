//! Input wrapping
//!
//! Statements and expressions are not legal at top level, so they are placed
//! inside a synthetic, uniquely named function that the engine can run. The
//! decision is a cheap lexical scan, never a parse.

use tracing::debug;

use super::naming::UniqueNamer;
use crate::util::span::SourceShim;

/// Keywords that can only start a top-level declaration
const DECLARATION_KEYWORDS: &[&str] = &["int", "void", "auto", "extern"];

/// How wrapped input is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapKind {
    /// A single expression whose value is returned
    Value,
    /// A statement sequence whose results are discarded
    Statements,
}

/// Input embedded in a synthetic function
#[derive(Debug, Clone)]
pub struct WrappedInput {
    /// Full text handed to the compiler
    pub text: String,
    /// Name of the synthetic function
    pub entry: String,
    /// Maps diagnostics back onto the user's text
    pub shim: SourceShim,
}

/// Decides whether input needs wrapping and performs it
#[derive(Debug, Default)]
pub struct InputWrapper {
    namer: UniqueNamer,
}

impl InputWrapper {
    /// Create a wrapper with a fresh namer
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the underlying namer
    pub fn namer_mut(&mut self) -> &mut UniqueNamer {
        &mut self.namer
    }

    /// Check whether `text` is a bare statement or expression sequence
    pub fn needs_wrapping(
        &self,
        text: &str,
    ) -> bool {
        match first_word(text) {
            Some(word) => !DECLARATION_KEYWORDS.contains(&word),
            None => !skip_trivia(text).is_empty(),
        }
    }

    /// How `text` should be wrapped to yield a value.
    ///
    /// A single expression returns its value; anything with statement
    /// structure runs as a statement sequence.
    pub fn value_kind(text: &str) -> WrapKind {
        let body = text.trim_end();
        let body = body.strip_suffix(';').unwrap_or(body);
        let statement_start = matches!(
            first_word(body),
            Some("if") | Some("while") | Some("return") | Some("else")
        );
        if statement_start || body.contains(';') || body.contains('{') {
            WrapKind::Statements
        } else {
            WrapKind::Value
        }
    }

    /// Wrap `text` in a fresh function.
    ///
    /// `is_taken` rejects candidate names that are already declared.
    pub fn wrap(
        &mut self,
        text: &str,
        kind: WrapKind,
        is_taken: impl Fn(&str) -> bool,
    ) -> WrappedInput {
        let mut entry = self.namer.reserve();
        while is_taken(&entry) {
            entry = self.namer.reserve();
        }

        // The user's text always starts on line 2 so locations shift by one.
        let body = text.trim_end();
        let wrapped = match kind {
            WrapKind::Value => {
                let expr = body.strip_suffix(';').unwrap_or(body);
                format!("auto {}() {{ return (\n{}\n); }}", entry, expr)
            }
            WrapKind::Statements => format!("void {}() {{\n{}\n;}}", entry, body),
        };
        debug!("wrapped input as `{}`", entry);

        WrappedInput {
            text: wrapped,
            entry,
            shim: SourceShim::new(1, body),
        }
    }

    /// Append continuation `text` to `buffer`.
    ///
    /// A `//` comment still open at the end of `buffer` ends with its chunk,
    /// the way it ends with the line in a terminal.
    pub fn join_continuation(
        buffer: &mut String,
        text: &str,
    ) {
        if ends_in_line_comment(buffer) {
            buffer.push('\n');
        }
        buffer.push_str(text);
    }

    /// Check if input is lexically complete.
    ///
    /// Unbalanced delimiters, open strings and open block comments mean more
    /// input is expected. A stray closer is left for the parser to report.
    pub fn is_complete(code: &str) -> bool {
        let mut braces = 0usize;
        let mut brackets = 0usize;
        let mut parens = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut chars = code.chars().peekable();

        while let Some(c) = chars.next() {
            if escaped {
                escaped = false;
                continue;
            }
            if in_string {
                match c {
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }

            match c {
                '"' => in_string = true,
                '/' if chars.peek() == Some(&'/') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut closed = false;
                    while let Some(c) = chars.next() {
                        if c == '*' && chars.peek() == Some(&'/') {
                            chars.next();
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return false;
                    }
                }
                '{' => braces += 1,
                '[' => brackets += 1,
                '(' => parens += 1,
                '}' => {
                    if braces == 0 {
                        return true;
                    }
                    braces -= 1;
                }
                ']' => {
                    if brackets == 0 {
                        return true;
                    }
                    brackets -= 1;
                }
                ')' => {
                    if parens == 0 {
                        return true;
                    }
                    parens -= 1;
                }
                _ => {}
            }
        }

        braces == 0 && brackets == 0 && parens == 0 && !in_string
    }
}

/// Whether `code` ends inside a `//` comment
fn ends_in_line_comment(code: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;
    let mut in_comment = false;
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        if escaped {
            escaped = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '/' if chars.peek() == Some(&'/') => {
                chars.next();
                in_comment = true;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    in_comment
}

/// First identifier-like word after whitespace and comments
fn first_word(text: &str) -> Option<&str> {
    let rest = skip_trivia(text);
    let end = rest
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if end == 0 {
        None
    } else {
        Some(&rest[..end])
    }
}

fn skip_trivia(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if let Some(rest) = text.strip_prefix("//") {
            text = rest.find('\n').map(|i| &rest[i..]).unwrap_or("");
        } else if let Some(rest) = text.strip_prefix("/*") {
            text = rest.find("*/").map(|i| &rest[i + 2..]).unwrap_or("");
        } else {
            return text;
        }
    }
}
