//! Low-level script scanning.
//!
//! Tcl-style source has no token grammar separate from its structure:
//! whether `$` substitutes depends on whether the surrounding word is
//! braced, and brackets nest whole scripts. So instead of a token stream
//! this module provides a character [`Scanner`] with line tracking plus
//! the balanced-construct readers (braced words, bracketed scripts) and
//! backslash decoding that the parser builds words from.
//!
//! Errors carry the 1-based line where the offending construct opened,
//! not where the scan ran out of input.

use thiserror::Error;

/// Malformed script text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing close-brace")]
    MissingCloseBrace { line: usize },

    #[error("missing close-bracket")]
    MissingCloseBracket { line: usize },

    #[error("missing \"")]
    MissingQuote { line: usize },

    #[error("missing )")]
    MissingCloseParen { line: usize },

    #[error("extra characters after close-brace")]
    ExtraAfterCloseBrace { line: usize },

    #[error("extra characters after close-quote")]
    ExtraAfterCloseQuote { line: usize },
}

impl ParseError {
    /// Source line the error is attributed to.
    pub fn line(&self) -> usize {
        match self {
            ParseError::MissingCloseBrace { line }
            | ParseError::MissingCloseBracket { line }
            | ParseError::MissingQuote { line }
            | ParseError::MissingCloseParen { line }
            | ParseError::ExtraAfterCloseBrace { line }
            | ParseError::ExtraAfterCloseQuote { line } => *line,
        }
    }
}

/// Character cursor with 1-based line tracking.
#[derive(Debug, Clone)]
pub struct Scanner {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// Consume one character, tracking newlines.
    pub fn next(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// The raw text between two positions.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start.min(self.chars.len())..end.min(self.chars.len())]
            .iter()
            .collect()
    }

    /// Skip spaces, tabs, and backslash-newline continuations (which act
    /// as word separators, not command separators).
    pub fn skip_blank(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.next();
                }
                Some('\\') if self.peek_at(1) == Some('\n') => {
                    self.next();
                    self.next();
                    // A continuation swallows following leading blanks.
                    while matches!(self.peek(), Some(' ' | '\t')) {
                        self.next();
                    }
                }
                _ => return,
            }
        }
    }

    /// True when the cursor sits on a command separator.
    pub fn at_separator(&self) -> bool {
        matches!(self.peek(), Some('\n' | ';'))
    }

    /// Consume a run of command separators and surrounding blanks.
    pub fn skip_separators(&mut self) {
        loop {
            self.skip_blank();
            if self.at_separator() {
                self.next();
            } else {
                return;
            }
        }
    }

    /// Skip a `#` comment through end of line, honoring backslash-newline
    /// continuation of the comment.
    pub fn skip_comment(&mut self) {
        debug_assert_eq!(self.peek(), Some('#'));
        while let Some(c) = self.peek() {
            if c == '\\' && self.peek_at(1) == Some('\n') {
                self.next();
                self.next();
                continue;
            }
            if c == '\n' {
                return; // leave the newline as a separator
            }
            self.next();
        }
    }

    /// Read a braced word. The cursor must sit on `{`; on success it sits
    /// just past the matching `}` and the returned string is the raw
    /// content with no substitution applied.
    pub fn read_braced(&mut self) -> Result<String, ParseError> {
        let open_line = self.line;
        debug_assert_eq!(self.peek(), Some('{'));
        self.next();
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.next() {
            match c {
                '\\' => {
                    // An escaped character (including `\{`/`\}`) never
                    // affects the depth count.
                    self.next();
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.slice(start, self.pos - 1));
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::MissingCloseBrace { line: open_line })
    }

    /// Read a bracketed script. The cursor must sit on `[`; on success it
    /// sits just past the matching `]` and the returned string is the
    /// inner script. Brackets inside braces and double quotes do not
    /// count toward nesting.
    pub fn read_bracket(&mut self) -> Result<String, ParseError> {
        let open_line = self.line;
        debug_assert_eq!(self.peek(), Some('['));
        self.next();
        let start = self.pos;
        let mut depth = 1usize;
        while let Some(c) = self.next() {
            match c {
                '\\' => {
                    self.next();
                }
                '{' => self.skip_braced_tail(open_line)?,
                '"' => self.skip_quoted_tail(open_line)?,
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.slice(start, self.pos - 1));
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::MissingCloseBracket { line: open_line })
    }

    /// Having just consumed `{`, skip to its matching `}`.
    fn skip_braced_tail(&mut self, open_line: usize) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while let Some(c) = self.next() {
            match c {
                '\\' => {
                    self.next();
                }
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(ParseError::MissingCloseBrace { line: open_line })
    }

    /// Having just consumed `"`, skip to the closing quote.
    fn skip_quoted_tail(&mut self, open_line: usize) -> Result<(), ParseError> {
        while let Some(c) = self.next() {
            match c {
                '\\' => {
                    self.next();
                }
                '"' => return Ok(()),
                _ => {}
            }
        }
        Err(ParseError::MissingQuote { line: open_line })
    }

    /// Decode a backslash escape. The cursor must sit on the backslash;
    /// on return it sits past the full sequence. Returns
    /// `(decoded, raw)` — raw is the exact source text consumed.
    pub fn read_escape(&mut self) -> (String, String) {
        let start = self.pos;
        debug_assert_eq!(self.peek(), Some('\\'));
        self.next();
        let Some(c) = self.next() else {
            return ("\\".to_string(), self.slice(start, self.pos));
        };
        let decoded = match c {
            'a' => "\x07".to_string(),
            'b' => "\x08".to_string(),
            'f' => "\x0c".to_string(),
            'n' => "\n".to_string(),
            'r' => "\r".to_string(),
            't' => "\t".to_string(),
            'v' => "\x0b".to_string(),
            '\n' => {
                // Backslash-newline plus following blanks collapses to a
                // single space.
                while matches!(self.peek(), Some(' ' | '\t')) {
                    self.next();
                }
                " ".to_string()
            }
            'x' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match self.peek().and_then(|d| d.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            digits += 1;
                            self.next();
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    "x".to_string()
                } else {
                    char::from_u32(value).unwrap_or('\u{fffd}').to_string()
                }
            }
            'u' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 4 {
                    match self.peek().and_then(|d| d.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            digits += 1;
                            self.next();
                        }
                        None => break,
                    }
                }
                if digits == 0 {
                    "u".to_string()
                } else {
                    char::from_u32(value).unwrap_or('\u{fffd}').to_string()
                }
            }
            '0'..='7' => {
                let mut value = c.to_digit(8).unwrap_or(0);
                let mut digits = 1;
                while digits < 3 {
                    match self.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            digits += 1;
                            self.next();
                        }
                        None => break,
                    }
                }
                char::from_u32(value).unwrap_or('\u{fffd}').to_string()
            }
            other => other.to_string(),
        };
        (decoded, self.slice(start, self.pos))
    }
}
