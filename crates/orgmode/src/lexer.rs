//! Character cursor shared by the parser and the external scanner.
//!
//! The lexer follows tree-sitter's `TSLexer` contract: the scanner may
//! [`advance`](Lexer::advance) past the end of the token it is recognising and
//! uses [`mark_end`](Lexer::mark_end) to say where the token actually stops.
//! When a token is accepted the cursor is moved back to the marked end.

/// A position in the source text.
///
/// `column` is a byte offset within the row, as in tree-sitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    /// Zero-based line number.
    pub row: usize,
    /// Zero-based byte offset within the line.
    pub column: usize,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// A byte range together with its start and end points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    /// Offset of the first byte.
    pub start_byte: usize,
    /// Offset one past the last byte.
    pub end_byte: usize,
    /// Position of the first byte.
    pub start: Point,
    /// Position one past the last byte.
    pub end: Point,
}

impl Span {
    /// A zero-width span at `at`.
    #[must_use]
    pub fn empty(at: Checkpoint) -> Self {
        Self {
            start_byte: at.pos,
            end_byte: at.pos,
            start: at.point,
            end: at.point,
        }
    }

    /// Returns `true` if the span covers no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_byte == self.end_byte
    }

    /// The span between two cursor positions.
    #[must_use]
    pub fn between(start: Checkpoint, end: Checkpoint) -> Self {
        Self {
            start_byte: start.pos,
            end_byte: end.pos,
            start: start.point,
            end: end.point,
        }
    }

    /// From the start of `self` to the end of `other`.
    #[must_use]
    pub fn join(&self, other: &Span) -> Self {
        Self {
            start_byte: self.start_byte,
            end_byte: other.end_byte,
            start: self.start,
            end: other.end,
        }
    }

    /// From the start of `self` to `end`.
    #[must_use]
    pub fn until(&self, end: Checkpoint) -> Self {
        Self {
            start_byte: self.start_byte,
            end_byte: end.pos,
            start: self.start,
            end: end.point,
        }
    }

    /// Sub-span of a single-line span, `start..end` being byte offsets into
    /// the source.
    #[must_use]
    pub fn sub(&self, start: usize, end: usize) -> Self {
        let row = self.start.row;
        let base = self.start.column;
        Self {
            start_byte: start,
            end_byte: end,
            start: Point::new(row, base + (start - self.start_byte)),
            end: Point::new(row, base + (end - self.start_byte)),
        }
    }
}

/// A saved cursor position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pos: usize,
    point: Point,
    char_column: usize,
}

impl Checkpoint {
    /// Byte offset of this position.
    #[must_use]
    pub fn byte(&self) -> usize {
        self.pos
    }

    /// Row and byte column of this position.
    #[must_use]
    pub fn point(&self) -> Point {
        self.point
    }
}

/// Cursor over the source text.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    cursor: Checkpoint,
    token_start: Checkpoint,
    marked: Checkpoint,
}

pub(crate) fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned at the start of `src`.
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            cursor: Checkpoint::default(),
            token_start: Checkpoint::default(),
            marked: Checkpoint::default(),
        }
    }

    /// The full source text.
    #[must_use]
    pub fn source(&self) -> &'a str {
        self.src
    }

    /// The character under the cursor, or `None` at end of input.
    #[must_use]
    pub fn lookahead(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Returns `true` if the lookahead is `c`.
    #[must_use]
    pub fn at(&self, c: char) -> bool {
        self.lookahead() == Some(c)
    }

    /// Returns `true` at end of input.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.cursor.pos >= self.src.len()
    }

    /// The unread remainder of the source.
    #[must_use]
    pub fn rest(&self) -> &'a str {
        &self.src[self.cursor.pos..]
    }

    /// Column of the cursor, counted in characters.
    #[must_use]
    pub fn column(&self) -> usize {
        self.cursor.char_column
    }

    /// Moves the cursor past the lookahead character.
    pub fn advance(&mut self) {
        let Some(c) = self.lookahead() else {
            return;
        };
        self.cursor.pos += c.len_utf8();
        if c == '\n' {
            self.cursor.point = Point::new(self.cursor.point.row + 1, 0);
            self.cursor.char_column = 0;
        } else {
            self.cursor.point.column += c.len_utf8();
            self.cursor.char_column += 1;
        }
    }

    /// Advances over `n` characters.
    pub fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }

    /// Records the cursor as the end of the current token.
    pub fn mark_end(&mut self) {
        self.marked = self.cursor;
    }

    /// Starts a new token at the cursor.
    pub fn start_token(&mut self) {
        self.token_start = self.cursor;
        self.marked = self.cursor;
    }

    /// Accepts the current token: the cursor moves to the marked end and the
    /// span from token start to that end is returned.
    pub fn finish_token(&mut self) -> Span {
        self.cursor = self.marked;
        Span {
            start_byte: self.token_start.pos,
            end_byte: self.marked.pos,
            start: self.token_start.point,
            end: self.marked.point,
        }
    }

    /// Abandons the current token and puts the cursor back at its start.
    pub fn rewind(&mut self) {
        self.cursor = self.token_start;
        self.marked = self.token_start;
    }

    /// Saves the cursor.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        self.cursor
    }

    /// Restores a saved cursor.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.cursor = checkpoint;
        self.token_start = checkpoint;
        self.marked = checkpoint;
    }

    /// Skips spaces and tabs.
    pub fn skip_blanks(&mut self) {
        while self.lookahead().is_some_and(is_blank) {
            self.advance();
        }
    }

    /// Returns `true` at end of input or before `\n` / `\r\n`.
    #[must_use]
    pub fn at_line_end(&self) -> bool {
        let rest = self.rest();
        rest.is_empty() || rest.starts_with('\n') || rest.starts_with("\r\n")
    }

    /// Returns `true` if only spaces and tabs remain before the end of the line.
    #[must_use]
    pub fn rest_of_line_is_blank(&self) -> bool {
        self.line_remainder().trim_matches(is_blank).is_empty()
    }

    /// The remainder of the current line, without the line terminator.
    #[must_use]
    pub fn line_remainder(&self) -> &'a str {
        let rest = self.rest();
        let line = rest.split('\n').next().unwrap_or(rest);
        line.strip_suffix('\r').unwrap_or(line)
    }

    /// Returns `true` if the token being scanned is the first thing on its
    /// line, ignoring indentation.
    #[must_use]
    pub fn token_at_line_start(&self) -> bool {
        self.only_blanks_before(self.token_start.pos)
    }

    /// Returns `true` if only indentation precedes the cursor on its line.
    #[must_use]
    pub fn at_line_start(&self) -> bool {
        self.only_blanks_before(self.cursor.pos)
    }

    fn only_blanks_before(&self, pos: usize) -> bool {
        let before = &self.src[..pos];
        let line = before.rsplit('\n').next().unwrap_or(before);
        line.chars().all(is_blank)
    }

    /// Case-insensitive prefix test at the cursor.
    #[must_use]
    pub fn starts_with_ignore_case(&self, prefix: &str) -> bool {
        self.rest()
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    }

    /// Returns `true` if `word` is next, followed by whitespace or end of
    /// input.
    #[must_use]
    pub fn word_ahead(&self, word: &str) -> bool {
        self.rest().strip_prefix(word).is_some_and(|after| {
            after.chars().next().is_none_or(char::is_whitespace)
        })
    }

    /// Returns `true` at column 0 in front of `*`s followed by a space or tab.
    #[must_use]
    pub fn at_heading_start(&self) -> bool {
        if self.column() != 0 {
            return false;
        }
        let after = self.rest().trim_start_matches('*');
        after.len() < self.rest().len() && after.starts_with(is_blank)
    }

    /// Consumes `\r?\n[ \t]*`, returning `false` if the cursor is not at a
    /// line break.
    pub fn eat_blank_line(&mut self) -> bool {
        if self.at('\r') && self.rest().starts_with("\r\n") {
            self.advance();
        }
        if !self.at('\n') {
            return false;
        }
        self.advance();
        self.skip_blanks();
        true
    }

    /// Moves the cursor past the end of the current line, including its
    /// terminator.
    pub fn skip_line(&mut self) {
        while let Some(c) = self.lookahead() {
            self.advance();
            if c == '\n' {
                break;
            }
        }
    }
}
