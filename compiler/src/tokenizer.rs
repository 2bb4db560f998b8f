use serde::Serialize;
use tracing::trace;

use crate::error::ParseError;

pub const COMMENT_DELIMITER: char = '#';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    #[default]
    Unknown,
    Package,
    Typedef,
    Const,
    Message,
    Enum,
    Service,
    Stream,
    MessageField,
    EnumValue,
    ServiceMethod,
    StreamMethod,
}

/// A span of source text. Lines and columns are 0-based; `col_start` is
/// inclusive and `col_end` exclusive. Columns count characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Token {
    pub content:    String,
    pub kind:       TokenKind,
    pub line_start: usize,
    pub line_end:   usize,
    pub col_start:  usize,
    pub col_end:    usize,
}

impl Token {
    /// An empty token marking a single position.
    pub fn at(line: usize, col: usize) -> Token {
        Token::span(line, col, col)
    }

    /// An empty token covering `col_start..col_end` of a single line.
    pub fn span(line: usize, col_start: usize, col_end: usize) -> Token {
        Token {
            content:    String::new(),
            kind:       TokenKind::Unknown,
            line_start: line,
            line_end:   line,
            col_start,
            col_end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    ExpectingName,
    ExpectingOpenBrace,
    InBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageState {
    ExpectingName,
    ExpectingSemicolon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypedefState {
    ExpectingName,
    ExpectingAssignment,
    ExpectingType,
    ExpectingSemicolon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConstState {
    ExpectingType,
    ExpectingName,
    ExpectingAssignment,
    ExpectingValue,
    ExpectingSemicolon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Keyword,
    Block(BlockState),
    Package(PackageState),
    Typedef(TypedefState),
    Const(ConstState),
}

enum CharClass {
    Space,
    Comment,
    Other,
}

struct Tokenizer {
    state:      State,
    line:       usize,
    col:        usize,
    in_comment: bool,
    in_string:  bool,
    escaped:    bool,
    in_word:    bool,
    word:       String,
    word_start: (usize, usize),
    current:    Token,
    tokens:     Vec<Token>,
}

/// Splits a source file into top-level declaration tokens.
///
/// Comments are blanked to spaces inside token content so that character
/// offsets within a token still map onto the original source.
pub fn tokenize_file(content: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokenizer = Tokenizer::new();
    for c in content.chars() {
        tokenizer.consume(c)?;
    }
    tokenizer.finish()
}

impl Tokenizer {
    fn new() -> Self {
        Tokenizer {
            state:      State::Keyword,
            line:       0,
            col:        0,
            in_comment: false,
            in_string:  false,
            escaped:    false,
            in_word:    false,
            word:       String::new(),
            word_start: (0, 0),
            current:    Token::default(),
            tokens:     Vec::new(),
        }
    }

    /// Error located at the character consumed last.
    fn error(&self, message: impl Into<String>) -> ParseError {
        let col = self.col.saturating_sub(1);
        ParseError::lex(message, &Token::span(self.line, col, col + 1))
    }

    /// Error located at the cursor, before any character is consumed there.
    fn error_at_cursor(&self, message: impl Into<String>) -> ParseError {
        ParseError::lex(message, &Token::at(self.line, self.col))
    }

    fn word_error(&self) -> ParseError {
        let (line, col) = self.word_start;
        ParseError::lex(
            format!("unexpected keyword `{}`", self.word),
            &Token::span(line, col, col + self.word.chars().count()),
        )
    }

    fn unexpected_char(&self, c: char) -> ParseError {
        self.error(format!("unexpected character `{}`", c))
    }

    fn consume(&mut self, c: char) -> Result<(), ParseError> {
        if self.in_string && c == '\n' {
            return Err(self.error_at_cursor("unterminated string literal"));
        }

        if c == '\n' {
            self.line += 1;
            self.col = 0;
            self.in_comment = false;
        } else {
            self.col += 1;
        }

        if self.in_string {
            self.consume_string(c);
            return Ok(());
        }

        match self.state {
            State::Keyword    => self.consume_keyword(c),
            State::Block(s)   => self.consume_block(s, c),
            State::Package(s) => self.consume_package(s, c),
            State::Typedef(s) => self.consume_typedef(s, c),
            State::Const(s)   => self.consume_const(s, c),
        }
    }

    fn classify(&mut self, c: char) -> CharClass {
        if c.is_whitespace() {
            CharClass::Space
        } else if c == COMMENT_DELIMITER || self.in_comment {
            self.in_comment = true;
            CharClass::Comment
        } else {
            CharClass::Other
        }
    }

    fn consume_string(&mut self, c: char) {
        self.current.content.push(c);
        if self.escaped {
            self.escaped = false;
        } else if c == '\\' {
            self.escaped = true;
        } else if c == '"' {
            self.in_string = false;
        }
    }

    fn push_word_char(&mut self, c: char) {
        if self.word.is_empty() {
            self.word_start = (self.line, self.col.saturating_sub(1));
        }
        self.word.push(c);
        self.in_word = true;
    }

    fn clear_word(&mut self) {
        self.word.clear();
        self.in_word = false;
    }

    fn emit(&mut self) {
        let mut token = std::mem::take(&mut self.current);
        token.line_end = self.line;
        token.col_end = self.col;
        trace!(kind = ?token.kind, line = token.line_start, "tokenized declaration");
        self.tokens.push(token);
        self.clear_word();
        self.state = State::Keyword;
    }

    fn consume_keyword(&mut self, c: char) -> Result<(), ParseError> {
        let break_word = match self.classify(c) {
            CharClass::Space => {
                if self.in_word {
                    self.current.content.push(c);
                }
                true
            }
            CharClass::Comment => {
                if self.in_word {
                    self.current.content.push(' ');
                }
                true
            }
            CharClass::Other => {
                if !self.in_word {
                    self.current.line_start = self.line;
                    self.current.col_start = self.col - 1;
                }
                self.current.content.push(c);
                self.push_word_char(c);
                false
            }
        };

        if break_word && self.in_word {
            let (kind, state) = match self.word.as_str() {
                "message" => (TokenKind::Message, State::Block(BlockState::ExpectingName)),
                "service" => (TokenKind::Service, State::Block(BlockState::ExpectingName)),
                "enum"    => (TokenKind::Enum, State::Block(BlockState::ExpectingName)),
                "stream"  => (TokenKind::Stream, State::Block(BlockState::ExpectingName)),
                "package" => (TokenKind::Package, State::Package(PackageState::ExpectingName)),
                "typedef" => (TokenKind::Typedef, State::Typedef(TypedefState::ExpectingName)),
                "const"   => (TokenKind::Const, State::Const(ConstState::ExpectingType)),
                _ => return Err(self.word_error()),
            };
            self.current.kind = kind;
            self.state = state;
            self.clear_word();
        }
        Ok(())
    }

    fn consume_block(&mut self, state: BlockState, c: char) -> Result<(), ParseError> {
        let break_word = match self.classify(c) {
            CharClass::Space => {
                self.current.content.push(c);
                true
            }
            CharClass::Comment => {
                self.current.content.push(' ');
                true
            }
            CharClass::Other => {
                self.current.content.push(c);
                match (c, state) {
                    ('{', BlockState::InBody) => {
                        return Err(self.error("unexpected opening bracket"));
                    }
                    ('{', BlockState::ExpectingName) if !self.in_word => {
                        return Err(self.error("missing name"));
                    }
                    ('{', _) => {
                        self.state = State::Block(BlockState::InBody);
                        self.clear_word();
                    }
                    ('}', BlockState::InBody) => self.emit(),
                    ('}', _) => return Err(self.error("unexpected closing bracket")),
                    ('"', BlockState::InBody) => self.in_string = true,
                    (_, BlockState::InBody) => {}
                    (_, BlockState::ExpectingOpenBrace) => return Err(self.unexpected_char(c)),
                    (_, BlockState::ExpectingName) => self.push_word_char(c),
                }
                false
            }
        };

        if break_word && self.in_word && state == BlockState::ExpectingName {
            self.state = State::Block(BlockState::ExpectingOpenBrace);
            self.clear_word();
        }
        Ok(())
    }

    fn consume_package(&mut self, state: PackageState, c: char) -> Result<(), ParseError> {
        let break_word = match self.classify(c) {
            CharClass::Space => {
                self.current.content.push(c);
                true
            }
            CharClass::Comment => {
                self.current.content.push(' ');
                true
            }
            CharClass::Other => {
                self.current.content.push(c);
                match (c, state) {
                    (';', PackageState::ExpectingName) if !self.in_word => {
                        return Err(self.error("unexpected semi-colon"));
                    }
                    (';', _) => self.emit(),
                    (_, PackageState::ExpectingSemicolon) => return Err(self.unexpected_char(c)),
                    (_, PackageState::ExpectingName) => self.push_word_char(c),
                }
                false
            }
        };

        if break_word && self.in_word && state == PackageState::ExpectingName {
            self.state = State::Package(PackageState::ExpectingSemicolon);
            self.clear_word();
        }
        Ok(())
    }

    fn consume_typedef(&mut self, state: TypedefState, c: char) -> Result<(), ParseError> {
        let break_word = match self.classify(c) {
            CharClass::Space => {
                self.current.content.push(c);
                true
            }
            CharClass::Comment => {
                self.current.content.push(' ');
                true
            }
            CharClass::Other => {
                self.current.content.push(c);
                match (c, state) {
                    ('=', TypedefState::ExpectingAssignment) => {
                        self.state = State::Typedef(TypedefState::ExpectingType);
                        self.clear_word();
                    }
                    ('=', TypedefState::ExpectingName) if self.in_word => {
                        self.state = State::Typedef(TypedefState::ExpectingType);
                        self.clear_word();
                    }
                    ('=', _) => return Err(self.error("unexpected '=' operator")),
                    (';', TypedefState::ExpectingSemicolon) => self.emit(),
                    (';', TypedefState::ExpectingType) if self.in_word => self.emit(),
                    (';', _) => return Err(self.error("unexpected semi-colon")),
                    (_, TypedefState::ExpectingAssignment | TypedefState::ExpectingSemicolon) => {
                        return Err(self.unexpected_char(c));
                    }
                    _ => self.push_word_char(c),
                }
                false
            }
        };

        if break_word && self.in_word {
            let next = match state {
                TypedefState::ExpectingName => TypedefState::ExpectingAssignment,
                TypedefState::ExpectingType => TypedefState::ExpectingSemicolon,
                _ => return Err(self.word_error()),
            };
            self.state = State::Typedef(next);
            self.clear_word();
        }
        Ok(())
    }

    fn consume_const(&mut self, state: ConstState, c: char) -> Result<(), ParseError> {
        let break_word = match self.classify(c) {
            CharClass::Space => {
                self.current.content.push(c);
                true
            }
            CharClass::Comment => {
                self.current.content.push(' ');
                true
            }
            CharClass::Other => {
                self.current.content.push(c);
                match (c, state) {
                    ('=', ConstState::ExpectingAssignment) => {
                        self.state = State::Const(ConstState::ExpectingValue);
                        self.clear_word();
                    }
                    ('=', ConstState::ExpectingName) if self.in_word => {
                        self.state = State::Const(ConstState::ExpectingValue);
                        self.clear_word();
                    }
                    ('=', _) => return Err(self.error("unexpected '=' operator")),
                    (';', ConstState::ExpectingSemicolon) => self.emit(),
                    (';', ConstState::ExpectingValue) if self.in_word => self.emit(),
                    (';', _) => return Err(self.error("unexpected semi-colon")),
                    ('"', ConstState::ExpectingValue) if !self.in_word => {
                        self.in_string = true;
                        self.in_word = true;
                    }
                    (_, ConstState::ExpectingAssignment | ConstState::ExpectingSemicolon) => {
                        return Err(self.unexpected_char(c));
                    }
                    _ => self.push_word_char(c),
                }
                false
            }
        };

        if break_word && self.in_word {
            let next = match state {
                ConstState::ExpectingType  => ConstState::ExpectingName,
                ConstState::ExpectingName  => ConstState::ExpectingAssignment,
                ConstState::ExpectingValue => ConstState::ExpectingSemicolon,
                _ => return Err(self.word_error()),
            };
            self.state = State::Const(next);
            self.clear_word();
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<Token>, ParseError> {
        match self.state {
            State::Keyword => {
                if self.in_word {
                    return Err(self.word_error());
                }
            }
            _ => return Err(self.error_at_cursor("unexpected end of file")),
        }
        Ok(self.tokens)
    }
}

/// Returns the source text covered by `token`, with `#` comments blanked the
/// same way the tokenizer blanks them.
pub fn source_for_span(content: &str, token: &Token) -> String {
    let mut out = String::new();
    for (line_no, line) in content.split('\n').enumerate() {
        if line_no < token.line_start || line_no > token.line_end {
            continue;
        }
        if line_no > token.line_start {
            out.push('\n');
        }
        let mut in_comment = false;
        for (col, c) in line.chars().enumerate() {
            if line_no == token.line_start && col < token.col_start {
                continue;
            }
            if line_no == token.line_end && col >= token.col_end {
                break;
            }
            if c == COMMENT_DELIMITER && !in_comment && !inside_quotes(&out) {
                in_comment = true;
            }
            out.push(if in_comment && !c.is_whitespace() { ' ' } else { c });
        }
    }
    out
}

fn inside_quotes(prefix: &str) -> bool {
    let mut inside = false;
    let mut escaped = false;
    for c in prefix.chars() {
        if c == '\n' {
            inside = false;
        } else if escaped {
            escaped = false;
        } else if inside && c == '\\' {
            escaped = true;
        } else if c == '"' {
            inside = !inside;
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn lex_error(input: &str) -> ParseError {
        let err = tokenize_file(input).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex, "expected a lex error but got {:?}", err);
        err
    }

    #[test]
    fn test_tokenize_declarations() {
        let input = "package a.b.c;\ntypedef UserID = uint64;\nmessage User {\n    UserID id = 0; # the id\n}\n";
        let tokens = tokenize_file(input).unwrap();
        assert_eq!(tokens.len(), 3);

        assert_eq!(tokens[0], Token {
            content:    "package a.b.c;".into(),
            kind:       TokenKind::Package,
            line_start: 0,
            line_end:   0,
            col_start:  0,
            col_end:    14,
        });
        assert_eq!(tokens[1].kind, TokenKind::Typedef);
        assert_eq!(tokens[1].content, "typedef UserID = uint64;");
        assert_eq!((tokens[1].line_start, tokens[1].col_end), (1, 24));

        assert_eq!(tokens[2].kind, TokenKind::Message);
        assert_eq!(tokens[2].content, "message User {\n    UserID id = 0;         \n}");
        assert_eq!((tokens[2].line_start, tokens[2].col_start), (2, 0));
        assert_eq!((tokens[2].line_end, tokens[2].col_end), (4, 1));
    }

    #[test]
    fn test_tokenize_all_keywords() {
        let input = r#"
            package p;
            typedef Id = uint64;
            const string Greeting = "hello \"world\"";
            enum Status { Active = 0; Inactive "inactive_value" = 1; }
            message User { Id id = 0; }
            service Users { rpc Get (User) returns (User); }
            stream Feed { server Push (User) returns (User); }
        "#;
        let kinds: Vec<TokenKind> = tokenize_file(input).unwrap().into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![
            TokenKind::Package,
            TokenKind::Typedef,
            TokenKind::Const,
            TokenKind::Enum,
            TokenKind::Message,
            TokenKind::Service,
            TokenKind::Stream,
        ]);
    }

    #[test]
    fn test_token_spans_round_trip() {
        let input = concat!(
            "# header comment\n",
            "package demo; # trailing\n",
            "\n",
            "message Point {   # open\n",
            "    float32 x = 0;\n",
            "    float32 y = 1; # } not a close\n",
            "}\n",
            "const string Name = \"a # not a comment\";\n",
            "enum Axis { X \"x;}\" = 0; }\n",
        );
        let tokens = tokenize_file(input).unwrap();
        assert_eq!(tokens.len(), 4);
        for token in &tokens {
            assert_eq!(source_for_span(input, token), token.content, "span mismatch for {:?}", token.kind);
        }
    }

    #[test]
    fn test_comment_inside_block_does_not_close() {
        let tokens = tokenize_file("message A { # }\n int32 x = 0; }").unwrap();
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].content.ends_with("int32 x = 0; }"));
    }

    #[test]
    fn test_escaped_quote_in_const() {
        let tokens = tokenize_file(r#"const string S = "a\"b";"#).unwrap();
        assert_eq!(tokens[0].content, r#"const string S = "a\"b";"#);
    }

    #[test]
    fn test_tokenize_unexpected_keyword() {
        let err = lex_error("package a;\nfoo bar");
        assert_eq!(err.message, "unexpected keyword `foo`");
        let err = lex_error("package a;\nmessag");
        assert_eq!(err.message, "unexpected keyword `messag`");
    }

    #[test]
    fn test_tokenize_unexpected_end_of_file() {
        let err = lex_error("message A {\n  int32 x = 0;\n");
        assert_eq!(err.message, "unexpected end of file");
        let err = lex_error(r#"const string S = "unterminated"#);
        assert_eq!(err.message, "unexpected end of file");
    }

    #[test]
    fn test_tokenize_unterminated_string() {
        let err = lex_error("const string S = \"unterminated;\n");
        assert_eq!(err.message, "unterminated string literal");
        let err = lex_error("const string S = \"escaped end \\\";\n");
        assert_eq!(err.message, "unterminated string literal");
    }

    #[test]
    fn test_tokenize_unquoted_const_words() {
        let err = lex_error("const string S = no quotes ;");
        assert_eq!(err.message, "unexpected character `q`");
    }

    #[test]
    fn test_tokenize_block_bracket_errors() {
        assert_eq!(lex_error("message {}").message, "missing name");
        assert_eq!(lex_error("message A { { }").message, "unexpected opening bracket");
        assert_eq!(lex_error("message A B {}").message, "unexpected character `B`");
        assert_eq!(lex_error("enum A } ").message, "unexpected closing bracket");
    }

    #[test]
    fn test_tokenize_linear_declaration_errors() {
        assert_eq!(lex_error("package ;").message, "unexpected semi-colon");
        assert_eq!(lex_error("package a b;").message, "unexpected character `b`");
        assert_eq!(lex_error("typedef = uint8;").message, "unexpected '=' operator");
        assert_eq!(lex_error("typedef A uint8;").message, "unexpected character `u`");
    }

    #[test]
    fn test_error_position() {
        let err = lex_error("package a;\n  oops x");
        let token = err.token.unwrap();
        assert_eq!((token.line_start, token.col_start, token.col_end), (1, 2, 6));

        let err = lex_error("package a;\noops");
        assert_eq!(err.message, "unexpected keyword `oops`");
        assert_eq!(err.token.unwrap().col_start, 0);

        let err = lex_error("  oops\npackage a;");
        let token = err.token.unwrap();
        assert_eq!((token.line_start, token.col_start, token.col_end), (0, 2, 6));
    }

    #[test]
    fn test_error_points_at_offending_character() {
        let err = lex_error("package a b;");
        let token = err.token.clone().unwrap();
        assert_eq!((token.col_start, token.col_end), (10, 11));

        let err = err.in_file("a.scg", "package a b;");
        let rendered = err.to_string();
        assert!(rendered.starts_with("lex error: unexpected character `b`, file: a.scg, line: 1, character: 11"));
        assert!(rendered.contains("  |           ^"));

        let err = lex_error("const string S = \"open\n");
        assert_eq!(err.token.unwrap().col_start, 22);
    }
}
