use miette::SourceSpan;

use crate::{
    lexer::{
        error::LexError,
        tokens::{Token, TokenKind},
    },
    utils::loc::{byte_offset_to_line_col, span_to_line_end},
};

const TAB_WIDTH: usize = 8;

/// Split `contents` into tokens, synthesizing `Newline`, `Indent` and
/// `Dedent` from the layout of the source.
///
/// `filename` only names the source in diagnostics.
pub fn lex<'a>(filename: &str, contents: &'a str) -> Result<Vec<Token<'a>>, LexError> {
    Lexer::new(filename, contents).run()
}

struct Lexer<'f, 'a> {
    filename: &'f str,
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    indents: Vec<usize>,
    // Open parentheses; newlines inside them are not significant.
    depth: usize,
    at_line_start: bool,
    // (offset, line, offset of that line's first byte) of the last token.
    cursor: (usize, usize, usize),
    tokens: Vec<Token<'a>>,
}

impl<'f, 'a> Lexer<'f, 'a> {
    fn new(filename: &'f str, src: &'a str) -> Self {
        Self {
            filename,
            src,
            bytes: src.as_bytes(),
            pos: 0,
            indents: vec![0],
            depth: 0,
            at_line_start: true,
            cursor: (0, 1, 0),
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token<'a>>, LexError> {
        while self.pos < self.bytes.len() {
            if self.at_line_start && self.depth == 0 && !self.indentation()? {
                continue;
            }
            self.token()?;
        }

        if !self.at_line_start {
            self.push_empty(TokenKind::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_empty(TokenKind::Dedent);
        }
        self.push_empty(TokenKind::Eof);

        Ok(self.tokens)
    }

    fn error(
        &self,
        span: SourceSpan,
        label: impl Into<String>,
        message: impl Into<String>,
    ) -> LexError {
        LexError::new(self.filename, self.src, span, label, message)
    }

    /// Line and column of `offset`, scanning forward from the previous token.
    fn locate(&mut self, offset: usize) -> (usize, usize) {
        let (from, mut line, mut line_start) = self.cursor;
        if offset < from {
            return byte_offset_to_line_col(self.src, offset);
        }
        for (i, &b) in self.bytes[from..offset].iter().enumerate() {
            if b == b'\n' {
                line += 1;
                line_start = from + i + 1;
            }
        }
        self.cursor = (offset, line, line_start);
        (line, offset - line_start + 1)
    }

    fn push(&mut self, kind: TokenKind<'a>, start: usize) {
        let len = self.pos - start;
        let (line, column) = self.locate(start);
        self.tokens.push(Token::new(kind, start, len, line, column));
    }

    fn push_empty(&mut self, kind: TokenKind<'a>) {
        let (line, column) = self.locate(self.pos);
        self.tokens.push(Token::new(kind, self.pos, 0, line, column));
    }

    fn single(&mut self, kind: TokenKind<'a>, width: usize) {
        let start = self.pos;
        self.pos += width;
        self.push(kind, start);
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn current_indent(&self) -> usize {
        self.indents.last().copied().unwrap_or(0)
    }

    fn skip_comment(&mut self) {
        while let Some(b) = self.peek_at(0) {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Measure the indentation of a new line. Returns `false` when the line
    /// holds nothing but whitespace or a comment (it is consumed entirely).
    fn indentation(&mut self) -> Result<bool, LexError> {
        let start = self.pos;
        let mut width = 0;
        while let Some(b) = self.peek_at(0) {
            match b {
                b' ' => width += 1,
                b'\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                b'\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek_at(0) {
            None => return Ok(false),
            Some(b'\n') => {
                self.pos += 1;
                return Ok(false);
            }
            Some(b'#' | b'\r') => {
                self.skip_comment();
                if self.peek_at(0).is_some() {
                    self.pos += 1;
                }
                return Ok(false);
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        if width > self.current_indent() {
            self.indents.push(width);
            self.push(TokenKind::Indent, start);
        } else if width < self.current_indent() {
            while width < self.current_indent() {
                self.indents.pop();
                self.push_empty(TokenKind::Dedent);
            }
            if width != self.current_indent() {
                return Err(self.error(
                    SourceSpan::from(start..self.pos),
                    "this indentation",
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(true)
    }

    fn token(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let Some(b) = self.peek_at(0) else {
            return Ok(());
        };

        match b {
            b' ' | b'\t' | b'\r' | b'\x0c' => self.pos += 1,
            b'#' => self.skip_comment(),
            b'\n' => {
                self.pos += 1;
                if self.depth == 0 {
                    self.push(TokenKind::Newline, start);
                    self.at_line_start = true;
                }
            }
            b'0'..=b'9' => self.number(start)?,
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.word(start),
            b'\'' | b'"' => self.string(start, b)?,
            b'(' => {
                self.depth += 1;
                self.single(TokenKind::LParen, 1);
            }
            b')' => {
                self.depth = self.depth.saturating_sub(1);
                self.single(TokenKind::RParen, 1);
            }
            b',' => self.single(TokenKind::Comma, 1),
            b':' => self.single(TokenKind::Colon, 1),
            b'.' => self.single(TokenKind::Dot, 1),
            b'+' => self.single(TokenKind::Plus, 1),
            b'-' => self.single(TokenKind::Minus, 1),
            b'*' => self.single(TokenKind::Star, 1),
            b'%' => self.single(TokenKind::Percent, 1),
            b'/' => {
                if self.peek_at(1) == Some(b'/') {
                    self.single(TokenKind::DoubleSlash, 2);
                } else {
                    return Err(self.error(
                        SourceSpan::from((start, 1)),
                        "use `//` for integer division",
                        "true division is not supported",
                    ));
                }
            }
            b'=' => match self.peek_at(1) {
                Some(b'=') => self.single(TokenKind::EqEq, 2),
                _ => self.single(TokenKind::Assign, 1),
            },
            b'!' => match self.peek_at(1) {
                Some(b'=') => self.single(TokenKind::NotEq, 2),
                _ => {
                    return Err(self.error(
                        SourceSpan::from((start, 1)),
                        "did you mean `not`?",
                        "unexpected character `!`",
                    ));
                }
            },
            b'<' => match self.peek_at(1) {
                Some(b'=') => self.single(TokenKind::Le, 2),
                _ => self.single(TokenKind::Lt, 1),
            },
            b'>' => match self.peek_at(1) {
                Some(b'=') => self.single(TokenKind::Ge, 2),
                _ => self.single(TokenKind::Gt, 1),
            },
            _ => {
                let ch = self.src[start..].chars().next().unwrap_or('\u{fffd}');
                return Err(self.error(
                    SourceSpan::from((start, ch.len_utf8())),
                    "not valid here",
                    format!("unexpected character `{ch}`"),
                ));
            }
        }
        Ok(())
    }

    fn number(&mut self, start: usize) -> Result<(), LexError> {
        while matches!(self.peek_at(0), Some(b'0'..=b'9' | b'_')) {
            self.pos += 1;
        }
        let trailing_word = matches!(self.peek_at(0), Some(b) if b.is_ascii_alphabetic());
        while matches!(self.peek_at(0), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }

        let text = &self.src[start..self.pos];
        let span = SourceSpan::from(start..self.pos);
        if trailing_word || text.ends_with('_') || text.contains("__") {
            return Err(self.error(span, "here", "invalid integer literal"));
        }

        let digits: String = text.chars().filter(|c| *c != '_').collect();
        let value = digits.parse::<i64>().map_err(|_| {
            self.error(
                span,
                "does not fit in 64 bits",
                "integer literal is too large",
            )
        })?;
        self.push(TokenKind::Int(value), start);
        Ok(())
    }

    fn word(&mut self, start: usize) {
        while matches!(self.peek_at(0), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier(text));
        self.push(kind, start);
    }

    fn string(&mut self, start: usize, quote: u8) -> Result<(), LexError> {
        self.pos += 1;
        let mut value = String::new();

        loop {
            match self.peek_at(0) {
                None | Some(b'\n') => {
                    return Err(self.error(
                        span_to_line_end(self.src, start),
                        "string starts here",
                        "unterminated string literal",
                    ));
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let Some(ch) = self.src[self.pos..].chars().next() else {
                        return Err(self.error(
                            span_to_line_end(self.src, start),
                            "string starts here",
                            "unterminated string literal",
                        ));
                    };
                    match ch {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        'r' => value.push('\r'),
                        '0' => value.push('\0'),
                        '\\' | '\'' | '"' => value.push(ch),
                        '\n' => {}
                        other => {
                            value.push('\\');
                            value.push(other);
                        }
                    }
                    self.pos += ch.len_utf8();
                }
                Some(_) => {
                    let run_start = self.pos;
                    while let Some(b) = self.peek_at(0) {
                        if b == quote || b == b'\\' || b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                    value.push_str(&self.src[run_start..self.pos]);
                }
            }
        }

        self.push(TokenKind::Str(value), start);
        Ok(())
    }
}
