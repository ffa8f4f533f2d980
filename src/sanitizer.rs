//! Statement sanitization for safe, low-cardinality reporting.
//!
//! [`sanitize`] rewrites literal values to `?` so that queries differing only
//! in their literals report the same text. The text sent to the driver is
//! never touched; only the reported copy is rewritten.
//!
//! ## Literal grammar
//!
//! | input | reported as |
//! |-------|-------------|
//! | `'text'`, `'it''s'`, `N'x'`, `E'x'`, `X'ff'`, `B'01'` | `?` |
//! | `$$body$$`, `$tag$body$tag$` | `?` |
//! | `42`, `3.14`, `.5`, `1e10`, `0x1F` | `?` (a sign stays: `-3` is `-?`) |
//! | `?`, `$2`, `?2`, `:2`, `:name`, `@name` | unchanged, recorded as placeholders |
//! | `"Ident"`, `` `ident` `` | unchanged |
//! | `NULL`, `TRUE`, `FALSE`, keywords, `col1` | unchanged |
//! | `-- comment`, `/* comment */` | removed |
//!
//! Whitespace runs collapse to a single space. Strings follow standard SQL
//! quoting: only a doubled quote escapes, backslashes are ordinary characters.
//!
//! An unterminated string, quoted identifier, dollar quote or block comment
//! makes the whole statement unparseable. The result then carries the raw
//! text, no operation, no table and no placeholders.

use thiserror::Error;

use crate::parser::{parse_operation, table_for, SqlOperation};

/// A bind site found while scanning a statement, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// A `?` marker.
    Positional,
    /// A numbered marker: `$N`, `?N` or `:N`.
    Numbered { sigil: char, index: u32 },
    /// A `:name` or `@name` marker, sigil included.
    Named(String),
    /// A literal replaced by `?`, with its original source text.
    Literal(String),
}

/// The reportable form of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedStatement {
    pub text: String,
    pub operation: Option<SqlOperation>,
    pub table: Option<String>,
    pub placeholders: Vec<Placeholder>,
}

impl SanitizedStatement {
    fn raw(raw: &str) -> Self {
        Self {
            text: raw.to_owned(),
            operation: None,
            table: None,
            placeholders: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
enum Anomaly {
    #[error("unterminated string literal at byte {0}")]
    String(usize),
    #[error("unterminated quoted identifier at byte {0}")]
    Identifier(usize),
    #[error("unterminated dollar-quoted string at byte {0}")]
    DollarQuote(usize),
    #[error("unterminated block comment at byte {0}")]
    Comment(usize),
}

/// Sanitize `raw` and extract its operation and primary table.
///
/// Never fails: statements that cannot be scanned are reported verbatim.
pub fn sanitize(raw: &str) -> SanitizedStatement {
    match Scanner::new(raw).run() {
        Ok((text, placeholders)) => {
            let operation = parse_operation(&text);
            let table = operation.and_then(|op| table_for(op, &text));
            SanitizedStatement {
                text,
                operation,
                table,
                placeholders,
            }
        }
        Err(anomaly) => {
            tracing::debug!(%anomaly, "statement not sanitized, reporting raw text");
            SanitizedStatement::raw(raw)
        }
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_char(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit() || b == b'$'
}

/// Byte-level scanner. Only ASCII bytes are ever split on, so every slice
/// taken from `src` falls on a char boundary.
struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: String,
    placeholders: Vec<Placeholder>,
    pending_space: bool,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            out: String::with_capacity(src.len()),
            placeholders: Vec::new(),
            pending_space: false,
        }
    }

    fn run(mut self) -> Result<(String, Vec<Placeholder>), Anomaly> {
        while let Some(b) = self.peek(0) {
            match b {
                b if b.is_ascii_whitespace() => {
                    self.pos += 1;
                    self.pending_space = true;
                }
                b'-' if self.peek(1) == Some(b'-') => self.line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.block_comment()?,
                b'\'' => self.string_literal(self.pos)?,
                b'"' | b'`' => self.quoted_identifier(b)?,
                b'?' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.numbered(),
                b'?' => {
                    self.copy(self.pos + 1);
                    self.placeholders.push(Placeholder::Positional);
                }
                b'$' => self.dollar()?,
                b':' | b'@' => self.named(b),
                b'0'..=b'9' => self.number(),
                b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
                b if is_ident_start(b) => self.word()?,
                _ => self.copy(self.pos + 1),
            }
        }
        Ok((self.out, self.placeholders))
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, token: &str) {
        if self.pending_space && !self.out.is_empty() {
            self.out.push(' ');
        }
        self.pending_space = false;
        self.out.push_str(token);
    }

    /// Copy source text from the cursor up to `end` and advance.
    fn copy(&mut self, end: usize) {
        let src = self.src;
        self.push(&src[self.pos..end]);
        self.pos = end;
    }

    fn literal(&mut self, start: usize, end: usize) {
        self.push("?");
        self.placeholders
            .push(Placeholder::Literal(self.src[start..end].to_owned()));
        self.pos = end;
    }

    fn skip_while(&mut self, pred: impl Fn(u8) -> bool) {
        while self.peek(0).is_some_and(&pred) {
            self.pos += 1;
        }
    }

    fn line_comment(&mut self) {
        self.skip_while(|b| b != b'\n');
        self.pending_space = true;
    }

    fn block_comment(&mut self) -> Result<(), Anomaly> {
        let start = self.pos;
        let end = self.src[start + 2..]
            .find("*/")
            .ok_or(Anomaly::Comment(start))?;
        self.pos = start + 2 + end + 2;
        self.pending_space = true;
        Ok(())
    }

    /// Scan a quoted run whose opening `quote` is at the cursor. A doubled
    /// quote is an escape. Returns the offset just past the closing quote.
    fn closing_quote(&self, quote: u8) -> Option<usize> {
        let mut i = self.pos + 1;
        while i < self.bytes.len() {
            if self.bytes[i] == quote {
                if self.bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                    continue;
                }
                return Some(i + 1);
            }
            i += 1;
        }
        None
    }

    /// A string literal whose opening quote is at the cursor; `start` may
    /// point earlier to include a prefix such as `N` or `E`.
    fn string_literal(&mut self, start: usize) -> Result<(), Anomaly> {
        let end = self.closing_quote(b'\'').ok_or(Anomaly::String(start))?;
        self.literal(start, end);
        Ok(())
    }

    fn quoted_identifier(&mut self, quote: u8) -> Result<(), Anomaly> {
        let end = self
            .closing_quote(quote)
            .ok_or(Anomaly::Identifier(self.pos))?;
        self.copy(end);
        Ok(())
    }

    /// A sigil at the cursor followed by digits: `$1`, `?1` or `:1`.
    fn numbered(&mut self) {
        let src = self.src;
        let start = self.pos;
        self.pos += 1;
        self.skip_while(|b| b.is_ascii_digit());
        let text = &src[start..self.pos];
        let placeholder = match text[1..].parse() {
            Ok(index) => Placeholder::Numbered {
                sigil: char::from(self.bytes[start]),
                index,
            },
            Err(_) => Placeholder::Named(text.to_owned()),
        };
        self.push(text);
        self.placeholders.push(placeholder);
    }

    fn dollar(&mut self) -> Result<(), Anomaly> {
        let src = self.src;
        let start = self.pos;

        if self.peek(1).is_some_and(|b| b.is_ascii_digit()) {
            self.numbered();
            return Ok(());
        }

        // $tag$ or $$ opens a dollar-quoted string
        let mut tag_end = start + 1;
        while self
            .bytes
            .get(tag_end)
            .is_some_and(|&b| is_ident_char(b) && b != b'$')
        {
            tag_end += 1;
        }
        if self.bytes.get(tag_end) != Some(&b'$') {
            self.copy(start + 1);
            return Ok(());
        }

        let tag = &src[start..=tag_end];
        let body = tag_end + 1;
        let close = src[body..]
            .find(tag)
            .ok_or(Anomaly::DollarQuote(start))?;
        self.literal(start, body + close + tag.len());
        Ok(())
    }

    fn named(&mut self, sigil: u8) {
        let src = self.src;
        let start = self.pos;
        match self.peek(1) {
            // `::` casts and `@@` system variables are not placeholders
            Some(b) if b == sigil => self.copy(start + 2),
            Some(b) if sigil == b':' && b.is_ascii_digit() => self.numbered(),
            Some(b) if is_ident_start(b) => {
                self.pos += 1;
                self.skip_while(is_ident_char);
                let text = &src[start..self.pos];
                self.push(text);
                self.placeholders.push(Placeholder::Named(text.to_owned()));
            }
            _ => self.copy(start + 1),
        }
    }

    fn number(&mut self) {
        let start = self.pos;
        let is_hex = self.peek(0) == Some(b'0')
            && matches!(self.peek(1), Some(b'x' | b'X'))
            && self.peek(2).is_some_and(|b| b.is_ascii_hexdigit());

        if is_hex {
            self.pos += 2;
            self.skip_while(|b| b.is_ascii_hexdigit());
        } else {
            self.skip_while(|b| b.is_ascii_digit());
            if self.peek(0) == Some(b'.') {
                self.pos += 1;
                self.skip_while(|b| b.is_ascii_digit());
            }
            if matches!(self.peek(0), Some(b'e' | b'E')) {
                let digits_at = match self.peek(1) {
                    Some(b'+' | b'-') => 2,
                    _ => 1,
                };
                if self.peek(digits_at).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += digits_at;
                    self.skip_while(|b| b.is_ascii_digit());
                }
            }
        }
        // trailing identifier characters (`1st`) belong to the same token
        self.skip_while(is_ident_char);
        self.literal(start, self.pos);
    }

    fn word(&mut self) -> Result<(), Anomaly> {
        let src = self.src;
        let start = self.pos;
        self.skip_while(is_ident_char);
        let word = &src[start..self.pos];

        let is_string_prefix = ["N", "E", "X", "B"]
            .iter()
            .any(|p| word.eq_ignore_ascii_case(p));
        if is_string_prefix && self.peek(0) == Some(b'\'') {
            return self.string_literal(start);
        }

        self.push(word);
        Ok(())
    }
}
