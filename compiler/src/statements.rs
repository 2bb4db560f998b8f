use tracing::trace;

use crate::error::ParseError;
use crate::tokenizer::{Token, TokenKind, COMMENT_DELIMITER};

/// Splits a block body into `;`-terminated statements.
///
/// Each statement token starts at its first non-whitespace character and ends
/// just after its `;`, in the coordinates of the original source file. Quoted
/// strings are skipped over, so a `;` inside a literal does not terminate.
/// `what` names the statement kind in the trailing-content error.
pub fn tokenize_statements(body: &Token, kind: TokenKind, what: &str) -> Result<Vec<Token>, ParseError> {
    let mut statements = Vec::new();

    let mut line = body.line_start;
    let mut col = body.col_start;

    let mut current = Token { kind, ..Token::default() };
    let mut started = false;
    let mut in_comment = false;
    let mut in_string = false;
    let mut escaped = false;

    for c in body.content.chars() {
        if !started && !c.is_whitespace() && c != COMMENT_DELIMITER && !in_comment {
            started = true;
            current.line_start = line;
            current.col_start = col;
        }

        if c == '\n' {
            line += 1;
            col = 0;
            in_comment = false;
        } else {
            col += 1;
        }

        if !in_string && (c == COMMENT_DELIMITER || in_comment) {
            in_comment = true;
            if started {
                current.content.push(' ');
            }
            continue;
        }

        if !started {
            continue;
        }
        current.content.push(c);

        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ';' {
            current.line_end = line;
            current.col_end = col;
            trace!(kind = ?kind, line = current.line_start, "tokenized statement");
            statements.push(std::mem::replace(&mut current, Token { kind, ..Token::default() }));
            started = false;
        }
    }

    if !current.content.trim().is_empty() {
        return Err(ParseError::lex(format!("unexpected end of {} declaration", what), body));
    }

    Ok(statements)
}
