use regex::Regex;

use crate::error::ParseError;
use crate::tokenizer::Token;

/// The single match of a pattern over a token, with every capture group
/// converted back into a positioned token. Groups that did not participate in
/// the match are `None`.
#[derive(Debug, Clone)]
pub struct Match {
    pub whole:    Token,
    pub captures: Vec<Option<Token>>,
}

impl Match {
    /// Capture group `index` (1-based, like regex group numbers). Group 0 is
    /// [`Match::whole`] and is never returned here.
    pub fn group(&self, index: usize) -> Option<&Token> {
        index
            .checked_sub(1)
            .and_then(|i| self.captures.get(i))
            .and_then(Option::as_ref)
    }

    /// Content of capture group `index`, or `""` when it did not participate.
    pub fn text(&self, index: usize) -> &str {
        self.group(index).map(|t| t.content.as_str()).unwrap_or("")
    }
}

/// Requires `re` to match `input` exactly once.
pub fn find_one_match(re: &Regex, input: &Token) -> Result<Match, ParseError> {
    match find_one_or_no_match(re, input)? {
        Some(m) => Ok(m),
        None => Err(ParseError::grammar("could not find any matches", input)),
    }
}

/// Like [`find_one_match`] but treats zero matches as `Ok(None)`.
pub fn find_one_or_no_match(re: &Regex, input: &Token) -> Result<Option<Match>, ParseError> {
    let mut all = re.captures_iter(&input.content);
    let Some(caps) = all.next() else {
        return Ok(None);
    };
    if all.next().is_some() {
        return Err(ParseError::grammar("found multiple matches", input));
    }

    let mut groups = caps.iter();
    let whole = match groups.next().flatten() {
        Some(m) => sub_token(input, m.start(), m.end()),
        None => return Err(ParseError::grammar("internal parsing error: empty match", input)),
    };
    let captures = groups
        .map(|g| g.map(|m| sub_token(input, m.start(), m.end())))
        .collect();

    Ok(Some(Match { whole, captures }))
}

/// Builds a token for the byte range `start..end` of `input.content`, placing
/// it in source coordinates by replaying the characters that precede it.
pub fn sub_token(input: &Token, start: usize, end: usize) -> Token {
    let mut line = input.line_start;
    let mut col = input.col_start;
    let mut token = Token {
        content: input.content[start..end].to_string(),
        kind:    input.kind,
        ..Token::default()
    };

    for (offset, c) in input.content.char_indices() {
        if offset == start {
            token.line_start = line;
            token.col_start = col;
        }
        if offset == end {
            token.line_end = line;
            token.col_end = col;
            return token;
        }
        if c == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }

    if start == input.content.len() {
        token.line_start = line;
        token.col_start = col;
    }
    token.line_end = line;
    token.col_end = col;
    token
}
