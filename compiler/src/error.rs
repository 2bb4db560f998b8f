use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::tokenizer::Token;

/// Number of source lines shown above and below the failing line.
const SNIPPET_CONTEXT_LINES: usize = 2;

#[derive(Debug, Error)]
pub enum ScgError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid configuration: {0}")]
    Config(serde_json::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which stage rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Unterminated block or string, unexpected bracket, unexpected keyword.
    Lex,
    /// A token's text does not have exactly one interpretation.
    Grammar,
    /// Unknown type or package, duplicate name, bad index, bad literal.
    Semantic,
    /// Circular reference or wire-ID collision.
    Graph,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Lex      => "lex",
            ErrorKind::Grammar  => "grammar",
            ErrorKind::Semantic => "semantic",
            ErrorKind::Graph    => "graph",
        };
        f.write_str(name)
    }
}

/// The single error carrier for every compiler stage.
///
/// The filename and source text are attached by whoever knows them (the file
/// assembler for per-file stages, the resolver for global passes), so lower
/// stages only need to supply the offending token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind:     ErrorKind,
    pub message:  String,
    pub token:    Option<Token>,
    pub filename: Option<String>,
    pub content:  Option<String>,
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, token: Option<&Token>) -> Self {
        ParseError {
            kind,
            message:  message.into(),
            token:    token.cloned(),
            filename: None,
            content:  None,
        }
    }

    pub fn lex(message: impl Into<String>, token: &Token) -> Self {
        Self::new(ErrorKind::Lex, message, Some(token))
    }

    pub fn grammar(message: impl Into<String>, token: &Token) -> Self {
        Self::new(ErrorKind::Grammar, message, Some(token))
    }

    pub fn semantic(message: impl Into<String>, token: &Token) -> Self {
        Self::new(ErrorKind::Semantic, message, Some(token))
    }

    pub fn graph(message: impl Into<String>, token: Option<&Token>) -> Self {
        Self::new(ErrorKind::Graph, message, token)
    }

    /// Attaches file context unless an inner stage already did.
    pub fn in_file(mut self, filename: &str, content: &str) -> Self {
        if self.filename.is_none() {
            self.filename = Some(filename.to_string());
            self.content = Some(content.to_string());
        }
        self
    }

    /// Renders the lines around the failing token with a caret under its span.
    ///
    /// Returns `None` when either the token or the source text is unknown.
    pub fn snippet(&self) -> Option<String> {
        let token = self.token.as_ref()?;
        let content = self.content.as_deref()?;
        Some(render_snippet(content, token))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)?;
        if let Some(filename) = &self.filename {
            write!(f, ", file: {}", filename)?;
        }
        if let Some(token) = &self.token {
            write!(f, ", line: {}, character: {}", token.line_start + 1, token.col_start + 1)?;
        }
        if let Some(snippet) = self.snippet() {
            write!(f, "\n{}", snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

fn render_snippet(content: &str, token: &Token) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.is_empty() {
        return String::new();
    }
    let target = token.line_start.min(lines.len() - 1);
    let first = target.saturating_sub(SNIPPET_CONTEXT_LINES);
    let last = (target + SNIPPET_CONTEXT_LINES).min(lines.len() - 1);
    let width = (last + 1).to_string().len();

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate().take(last + 1).skip(first) {
        out.push_str(&format!("{:>width$} | {}\n", i + 1, line, width = width));
        if i == target {
            let line_len = line.chars().count();
            let start = token.col_start.min(line_len);
            let end = if token.line_end == token.line_start {
                token.col_end.min(line_len)
            } else {
                line_len
            };
            let tail = end.saturating_sub(start + 1);
            // Tabs are echoed so the caret lines up however the terminal expands them.
            let pad: String = line
                .chars()
                .take(start)
                .map(|c| if c == '\t' { '\t' } else { ' ' })
                .collect();
            out.push_str(&format!(
                "{} | {}^{}\n",
                " ".repeat(width),
                pad,
                "~".repeat(tail)
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::TokenKind;

    fn span(line: usize, col_start: usize, col_end: usize) -> Token {
        Token {
            content:    String::new(),
            kind:       TokenKind::Unknown,
            line_start: line,
            line_end:   line,
            col_start,
            col_end,
        }
    }

    #[test]
    fn test_snippet_places_caret_under_span() {
        let content = "package a;\n\nmessage A {\n    Missing m = 0;\n}\n";
        let err = ParseError::semantic("type \"Missing\" not found", &span(3, 4, 11))
            .in_file("a.scg", content);

        let snippet = err.snippet().unwrap();
        let lines: Vec<&str> = snippet.lines().collect();
        assert_eq!(lines[0], "2 | ");
        assert_eq!(lines[2], "4 |     Missing m = 0;");
        assert_eq!(lines[3], "  |     ^~~~~~~");
        assert_eq!(lines.last().unwrap(), &"6 | ");
    }

    #[test]
    fn test_snippet_caret_follows_tabs() {
        let content = "message A {\n\t\tMissing m = 0;\n}";
        let err = ParseError::semantic("type \"Missing\" not found", &span(1, 2, 9)).in_file("a.scg", content);
        let snippet = err.snippet().unwrap();
        let lines: Vec<&str> = snippet.lines().collect();
        assert_eq!(lines[1], "2 | \t\tMissing m = 0;");
        assert_eq!(lines[2], "  | \t\t^~~~~~");
    }

    #[test]
    fn test_display_includes_location() {
        let err = ParseError::lex("unexpected end of file", &span(0, 3, 3)).in_file("x.scg", "abc");
        let text = err.to_string();
        assert!(text.starts_with("lex error: unexpected end of file, file: x.scg, line: 1, character: 4"));
        assert!(text.contains("1 | abc"));
    }

    #[test]
    fn test_in_file_keeps_inner_context() {
        let err = ParseError::graph("cycle", None)
            .in_file("inner.scg", "")
            .in_file("outer.scg", "");
        assert_eq!(err.filename.as_deref(), Some("inner.scg"));
        assert!(err.snippet().is_none());
    }
}
