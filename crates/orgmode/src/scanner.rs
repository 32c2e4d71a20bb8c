//! The external scanner.
//!
//! Org-mode is context sensitive: whether `*` opens a heading, a list item or
//! bold text depends on the column, on the enclosing list and on the markup
//! already open on the line. [`Scanner`] keeps that context in a handful of
//! stacks and recognises the tokens listed in
//! [`EXTERNALS`](crate::grammar::orgmode::EXTERNALS). It is asked for a token
//! together with the set of token types the parser can accept at that point,
//! the same protocol tree-sitter uses for external scanners.
//!
//! The scanner state can be serialized into a small byte buffer and restored
//! from it.

use crate::grammar::orgmode::EXTERNALS;
use crate::lexer::{is_blank, Lexer};
use thiserror::Error;

/// Size of the buffer scanner state must fit into.
pub const SERIALIZATION_BUFFER_SIZE: usize = 1024;

macro_rules! token_types {
    ($($(#[$doc:meta])* $variant:ident),* $(,)?) => {
        /// Tokens recognised by the [`Scanner`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum TokenType {
            $($(#[$doc])* $variant,)*
        }

        impl TokenType {
            /// Every token type, in scanner order.
            pub const ALL: &'static [TokenType] = &[$(TokenType::$variant),*];
        }
    };
}

token_types! {
    /// `#+begin_`
    BlockBeginMarker,
    /// `#+end_`
    BlockEndMarker,
    /// The name following `#+begin_` or `#+begin:`.
    BlockBeginName,
    /// The name following `#+end_`, matching the innermost open block.
    BlockEndName,
    /// `:NAME:` alone on its line.
    DrawerName,
    /// `:end:` closing the innermost drawer.
    DrawerEnd,
    /// `:NAME:` at the start of a property drawer line.
    PropertyName,
    /// The stars of a heading.
    Stars,
    /// Zero-width end of a section.
    EndSection,
    /// A list item bullet.
    Bullet,
    /// Zero-width start of a list.
    ListStart,
    /// Zero-width end of a list.
    ListEnd,
    /// Opening `*`.
    BoldStart,
    /// Closing `*`.
    BoldEnd,
    /// Opening `/`.
    ItalicStart,
    /// Closing `/`.
    ItalicEnd,
    /// Opening `_`.
    UnderlineStart,
    /// Closing `_`.
    UnderlineEnd,
    /// Opening `=`.
    VerbatimStart,
    /// Closing `=`.
    VerbatimEnd,
    /// Opening `~`.
    CodeInlineStart,
    /// Closing `~`.
    CodeInlineEnd,
    /// Opening `+`.
    StrikethroughStart,
    /// Closing `+`.
    StrikethroughEnd,
    /// A run of non-whitespace characters.
    Word,
    /// Only valid while the parser is recovering from an error.
    ErrorSentinel,
}

const MARKUP_STARTS: [TokenType; 6] = [
    TokenType::BoldStart,
    TokenType::ItalicStart,
    TokenType::UnderlineStart,
    TokenType::VerbatimStart,
    TokenType::CodeInlineStart,
    TokenType::StrikethroughStart,
];

const MARKUP_ENDS: [TokenType; 6] = [
    TokenType::BoldEnd,
    TokenType::ItalicEnd,
    TokenType::UnderlineEnd,
    TokenType::VerbatimEnd,
    TokenType::CodeInlineEnd,
    TokenType::StrikethroughEnd,
];

const MARKUP_CHARS: [char; 6] = ['*', '/', '_', '=', '~', '+'];

impl TokenType {
    /// The external symbol this token produces in the grammar.
    #[must_use]
    pub fn grammar_name(self) -> &'static str {
        EXTERNALS[self as usize]
    }

    /// The delimiter character of a markup start or end token.
    #[must_use]
    pub fn markup_char(self) -> Option<char> {
        self.markup_index().map(|i| MARKUP_CHARS[i])
    }

    /// Index into the markup tables (bold, italic, underline, verbatim, code,
    /// strikethrough).
    #[must_use]
    pub fn markup_index(self) -> Option<usize> {
        MARKUP_STARTS
            .iter()
            .position(|&t| t == self)
            .or_else(|| MARKUP_ENDS.iter().position(|&t| t == self))
    }

    /// Returns `true` for the six markup start tokens.
    #[must_use]
    pub fn is_markup_start(self) -> bool {
        MARKUP_STARTS.contains(&self)
    }

    /// The end token matching a markup start token.
    #[must_use]
    pub fn markup_end(self) -> Option<TokenType> {
        MARKUP_STARTS
            .iter()
            .position(|&t| t == self)
            .map(|i| MARKUP_ENDS[i])
    }
}

/// The set of token types the parser can accept at the current position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ValidSymbols(u32);

impl ValidSymbols {
    /// The empty set.
    pub const NONE: Self = Self(0);

    /// A set holding exactly `tokens`.
    #[must_use]
    pub fn of(tokens: &[TokenType]) -> Self {
        tokens.iter().fold(Self::NONE, |set, &t| set.with(t))
    }

    /// All six markup start tokens.
    #[must_use]
    pub fn markup_starts() -> Self {
        Self::of(&MARKUP_STARTS)
    }

    /// Adds `token` to the set.
    #[must_use]
    pub const fn with(self, token: TokenType) -> Self {
        Self(self.0 | 1 << token as u32)
    }

    /// Removes `token` from the set.
    #[must_use]
    pub const fn without(self, token: TokenType) -> Self {
        Self(self.0 & !(1 << token as u32))
    }

    /// Union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set difference.
    #[must_use]
    pub const fn minus(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Returns `true` if `token` is in the set.
    #[must_use]
    pub const fn contains(self, token: TokenType) -> bool {
        self.0 & (1 << token as u32) != 0
    }
}

/// The kind of drawer currently open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawerKind {
    /// Any drawer other than `:PROPERTIES:`.
    Normal,
    /// A `:PROPERTIES:` drawer, whose lines are node properties.
    Property,
}

impl DrawerKind {
    fn to_byte(self) -> u8 {
        match self {
            DrawerKind::Normal => b'N',
            DrawerKind::Property => b'P',
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'N' => Some(DrawerKind::Normal),
            b'P' => Some(DrawerKind::Property),
            _ => None,
        }
    }
}

/// Errors raised while serializing or restoring scanner state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScannerStateError {
    /// A stack holds more entries than a one-byte count can describe.
    #[error("{stack} stack has {len} entries, at most 255 can be serialized")]
    TooManyEntries {
        /// Which stack overflowed.
        stack: &'static str,
        /// Its length.
        len: usize,
    },

    /// A level or indentation does not fit in one byte.
    #[error("{stack} value {value} does not fit in a byte")]
    ValueOutOfRange {
        /// Which stack held the value.
        stack: &'static str,
        /// The offending value.
        value: usize,
    },

    /// The serialized state exceeds [`SERIALIZATION_BUFFER_SIZE`].
    #[error("serialized scanner state is {0} bytes, the limit is {SERIALIZATION_BUFFER_SIZE}")]
    TooLarge(usize),

    /// The buffer ended in the middle of a stack.
    #[error("scanner state truncated at byte {0}")]
    Truncated(usize),

    /// Bytes left over after the last stack.
    #[error("{0} trailing bytes after the scanner state")]
    TrailingBytes(usize),

    /// A byte that is not a valid entry for its stack.
    #[error("invalid {stack} entry {byte:#04x}")]
    InvalidEntry {
        /// Which stack the byte belonged to.
        stack: &'static str,
        /// The offending byte.
        byte: u8,
    },
}

/// Context kept by the external scanner between tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scanner {
    section_levels: Vec<usize>,
    list_indents: Vec<usize>,
    drawers: Vec<DrawerKind>,
    markup: Vec<char>,
    block_names: Vec<String>,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_property_name_char(c: char) -> bool {
    is_name_char(c) || c == '+'
}

fn scan_while(lexer: &mut Lexer<'_>, pred: impl Fn(char) -> bool) -> Option<String> {
    let mut name = String::new();
    while let Some(c) = lexer.lookahead().filter(|&c| pred(c)) {
        name.push(c);
        lexer.advance();
    }
    (!name.is_empty()).then_some(name)
}

/// Advances over as much of `literal` as matches, ignoring ASCII case, and
/// returns the number of characters matched.
fn scan_literal(lexer: &mut Lexer<'_>, literal: &str) -> usize {
    let mut len = 0;
    for expected in literal.chars() {
        match lexer.lookahead() {
            Some(c) if c.eq_ignore_ascii_case(&expected) => lexer.advance(),
            _ => break,
        }
        len += 1;
    }
    len
}

impl Scanner {
    /// Creates a scanner with every stack empty.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Level of the innermost open section, `0` at top level.
    #[must_use]
    pub fn section_level(&self) -> usize {
        self.section_levels.last().copied().unwrap_or(0)
    }

    /// Indentation of the innermost open list.
    #[must_use]
    pub fn list_indent(&self) -> Option<usize> {
        self.list_indents.last().copied()
    }

    /// Kind of the innermost open drawer.
    #[must_use]
    pub fn drawer(&self) -> Option<DrawerKind> {
        self.drawers.last().copied()
    }

    /// Name of the innermost open block.
    #[must_use]
    pub fn block_name(&self) -> Option<&str> {
        self.block_names.last().map(String::as_str)
    }

    /// Returns `true` if no context is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.section_levels.is_empty()
            && self.list_indents.is_empty()
            && self.drawers.is_empty()
            && self.markup.is_empty()
            && self.block_names.is_empty()
    }

    /// Closes the innermost section without a token.
    pub fn close_section(&mut self) {
        self.section_levels.pop();
    }

    /// Closes the innermost list without a token.
    pub fn close_list(&mut self) {
        self.list_indents.pop();
    }

    /// Closes the innermost drawer without a token.
    pub fn close_drawer(&mut self) {
        self.drawers.pop();
    }

    /// Closes the innermost block without a token.
    pub fn close_block(&mut self) {
        self.block_names.pop();
    }

    fn is_word_char(&self, c: char) -> bool {
        // words can't contain a markup delimiter that is currently open,
        // otherwise they would swallow its end.
        c != '\0' && !c.is_whitespace() && !self.markup.contains(&c)
    }

    fn finish_word(&self, lexer: &mut Lexer<'_>, valid: ValidSymbols) -> Option<TokenType> {
        if !valid.contains(TokenType::Word) {
            return None;
        }
        while lexer.lookahead().is_some_and(|c| self.is_word_char(c)) {
            lexer.advance();
        }
        lexer.mark_end();
        Some(TokenType::Word)
    }

    /// Recognises the next token, if any of the `valid` ones starts at the
    /// cursor.
    ///
    /// The lexer's token must have been started at the cursor; on success the
    /// token ends at the lexer's marked end.
    pub fn scan(&mut self, lexer: &mut Lexer<'_>, valid: ValidSymbols) -> Option<TokenType> {
        if lexer.at('\n') {
            self.markup.clear();
        }

        if valid.contains(TokenType::ErrorSentinel) {
            log::trace!(target: "orgmode::scanner", "error recovery, refusing to scan");
            return None;
        }

        lexer.mark_end();

        let col = lexer.column();
        let indent = self.list_indent();
        let in_drawer = self.drawer();
        let mut fail: Option<char> = None;

        log::trace!(
            target: "orgmode::scanner",
            "col: {col}; indent: {indent:?}; drawer: {in_drawer:?}; lookahead: {:?}",
            lexer.lookahead()
        );

        if valid.contains(TokenType::EndSection) && lexer.eof() {
            log::trace!(target: "orgmode::scanner", "ending section due to EOF");
            self.section_levels.pop();
            return Some(TokenType::EndSection);
        }

        let can_end_list =
            lexer.eof() || indent.is_some_and(|i| col < i) || lexer.at_heading_start();
        if valid.contains(TokenType::ListEnd) && can_end_list {
            log::trace!(target: "orgmode::scanner", "ending list");
            self.list_indents.pop();
            return Some(TokenType::ListEnd);
        }

        if let Some(token) = self.scan_markup_end(lexer, valid) {
            return Some(token);
        }

        // bullets need trailing whitespace and markup needs the opposite, so
        // trying bullets first cannot steal a markup start.
        if (valid.contains(TokenType::Bullet) || valid.contains(TokenType::ListStart))
            && lexer.token_at_line_start()
        {
            if let Some(token) = self.scan_list_token(lexer, valid, col, indent) {
                return Some(token);
            }
            lexer.rewind();
            lexer.mark_end();
        }

        if let Some(token) = self.scan_markup_start(lexer, valid, &mut fail) {
            return Some(token);
        }

        if fail.is_none()
            && valid.contains(TokenType::Stars)
            && lexer.column() == 0
            && lexer.at('*')
        {
            return self.scan_stars(lexer, valid, 0);
        }

        if fail == Some('*') && valid.contains(TokenType::Stars) && lexer.column() == 1 {
            return self.scan_stars(lexer, valid, 1);
        }

        if fail.is_none()
            && in_drawer == Some(DrawerKind::Property)
            && valid.contains(TokenType::PropertyName)
            && lexer.at(':')
        {
            log::trace!(target: "orgmode::scanner", "looking for a property name");
            lexer.advance();
            let Some(name) = scan_while(lexer, is_property_name_char) else {
                return self.finish_word(lexer, valid);
            };
            if !lexer.at(':') {
                return self.finish_word(lexer, valid);
            }
            lexer.advance();
            if name.eq_ignore_ascii_case("end") {
                return self.scan_drawer_end_name(lexer, valid);
            }
            log::trace!(target: "orgmode::scanner", "property name {name:?}");
            lexer.mark_end();
            return Some(TokenType::PropertyName);
        }

        if fail.is_none()
            && in_drawer != Some(DrawerKind::Property)
            && valid.contains(TokenType::DrawerName)
            && lexer.at(':')
        {
            lexer.advance();
            let Some(name) = scan_while(lexer, is_name_char) else {
                return self.finish_word(lexer, valid);
            };
            if !lexer.at(':') {
                log::trace!(target: "orgmode::scanner", "no closing ':', scanning a word");
                return self.finish_word(lexer, valid);
            }
            lexer.advance();
            if name.eq_ignore_ascii_case("end") {
                return self.scan_drawer_end_name(lexer, valid);
            }
            if !lexer.rest_of_line_is_blank() {
                return self.finish_word(lexer, valid);
            }

            let kind = if name.eq_ignore_ascii_case("properties") {
                DrawerKind::Property
            } else {
                DrawerKind::Normal
            };
            log::trace!(target: "orgmode::scanner", "opening {kind:?} drawer {name:?}");
            self.drawers.push(kind);
            lexer.mark_end();
            return Some(TokenType::DrawerName);
        }

        if fail.is_none() && valid.contains(TokenType::DrawerEnd) && in_drawer.is_some() {
            let len = scan_literal(lexer, ":end:");
            if len == 5 {
                lexer.mark_end();
                self.drawers.pop();
                return Some(TokenType::DrawerEnd);
            } else if len > 0 {
                log::trace!(target: "orgmode::scanner", "partial drawer end, scanning a word");
                return self.finish_word(lexer, valid);
            }
        }

        if fail.is_none() && valid.contains(TokenType::BlockBeginName) {
            let name = scan_while(lexer, |c| !c.is_whitespace())?;
            log::trace!(target: "orgmode::scanner", "block begin name {name:?}");
            self.block_names.push(name);
            lexer.mark_end();
            return Some(TokenType::BlockBeginName);
        }

        if fail.is_none() && valid.contains(TokenType::BlockEndName) {
            return self.scan_block_end_name(lexer, valid);
        }

        if fail.is_none() && valid.contains(TokenType::BlockEndMarker) {
            let len = scan_literal(lexer, "#+end_");
            if len == 6 {
                lexer.mark_end();
                return Some(TokenType::BlockEndMarker);
            } else if len > 0 {
                return self.finish_word(lexer, valid);
            }
        }

        if fail.is_none() && valid.contains(TokenType::BlockBeginMarker) {
            let len = scan_literal(lexer, "#+begin_");
            if len == 8 {
                lexer.mark_end();
                return Some(TokenType::BlockBeginMarker);
            } else if len > 0 {
                log::trace!(target: "orgmode::scanner", "not a block begin, scanning a word");
                return self.finish_word(lexer, valid);
            }
        }

        // can do this even after a failed markup start, reusing its character
        if valid.contains(TokenType::Word)
            && (fail.is_some_and(|c| self.is_word_char(c))
                || lexer.lookahead().is_some_and(|c| self.is_word_char(c)))
        {
            return self.finish_word(lexer, valid);
        }

        None
    }

    fn scan_drawer_end_name(
        &mut self,
        lexer: &mut Lexer<'_>,
        valid: ValidSymbols,
    ) -> Option<TokenType> {
        if valid.contains(TokenType::DrawerEnd) && self.drawer().is_some() {
            self.drawers.pop();
            lexer.mark_end();
            return Some(TokenType::DrawerEnd);
        }
        self.finish_word(lexer, valid)
    }

    fn scan_block_end_name(
        &mut self,
        lexer: &mut Lexer<'_>,
        valid: ValidSymbols,
    ) -> Option<TokenType> {
        let name = scan_while(lexer, |c| !c.is_whitespace())?;
        let Some(top) = self.block_names.last() else {
            log::trace!(target: "orgmode::scanner", "block end name {name:?} with no open block");
            return None;
        };

        if top.eq_ignore_ascii_case(&name) {
            self.block_names.pop();
            lexer.mark_end();
            Some(TokenType::BlockEndName)
        } else {
            log::trace!(target: "orgmode::scanner", "block end {name:?} does not close {top:?}");
            self.finish_word(lexer, valid)
        }
    }

    fn scan_stars(
        &mut self,
        lexer: &mut Lexer<'_>,
        valid: ValidSymbols,
        found_already: usize,
    ) -> Option<TokenType> {
        let mut level = found_already;
        while lexer.at('*') {
            lexer.advance();
            level += 1;
        }

        if !lexer.lookahead().is_some_and(is_blank) {
            // a heading's stars must be followed by whitespace.
            return None;
        }

        if valid.contains(TokenType::EndSection) && level <= self.section_level() {
            log::trace!(target: "orgmode::scanner", "level {level} heading ends the section");
            self.section_levels.pop();
            return Some(TokenType::EndSection);
        }

        log::trace!(target: "orgmode::scanner", "stars, level {level}");
        lexer.mark_end();
        self.section_levels.push(level);
        Some(TokenType::Stars)
    }

    fn scan_markup_end(&mut self, lexer: &mut Lexer<'_>, valid: ValidSymbols) -> Option<TokenType> {
        self.markup.last()?;

        for (&token, &ch) in MARKUP_ENDS.iter().zip(&MARKUP_CHARS) {
            if valid.contains(token) && lexer.at(ch) {
                lexer.advance();
                lexer.mark_end();
                log::trace!(target: "orgmode::scanner", "scanned {ch:?}, markup end");
                self.markup.pop();
                return Some(token);
            }
        }

        None
    }

    fn scan_markup_start(
        &mut self,
        lexer: &mut Lexer<'_>,
        valid: ValidSymbols,
        fail: &mut Option<char>,
    ) -> Option<TokenType> {
        for (&token, &ch) in MARKUP_STARTS.iter().zip(&MARKUP_CHARS) {
            if fail.is_some() {
                break;
            }
            if valid.contains(token) && lexer.at(ch) {
                lexer.advance();

                match lexer.lookahead() {
                    Some(next) if !next.is_whitespace() && next != ch => {
                        lexer.mark_end();
                        self.markup.push(ch);
                        log::trace!(target: "orgmode::scanner", "scanned {ch:?}, markup start");
                        return Some(token);
                    }
                    _ => {
                        // nothing to wrap, or a doubled delimiter
                        log::trace!(target: "orgmode::scanner", "failed to scan {ch:?} as markup start");
                        *fail = Some(ch);
                    }
                }
            }
        }

        None
    }

    fn scan_list_token(
        &mut self,
        lexer: &mut Lexer<'_>,
        valid: ValidSymbols,
        col: usize,
        indent: Option<usize>,
    ) -> Option<TokenType> {
        if !scan_bullet(lexer) {
            return None;
        }

        if valid.contains(TokenType::ListStart) && indent.is_none_or(|i| col > i) {
            // zero width: the bullet itself is scanned again as `Bullet`.
            log::trace!(target: "orgmode::scanner", "list start at column {col}");
            self.list_indents.push(col);
            return Some(TokenType::ListStart);
        }

        if valid.contains(TokenType::Bullet) && indent == Some(col) {
            lexer.mark_end();
            log::trace!(target: "orgmode::scanner", "bullet at column {col}");
            return Some(TokenType::Bullet);
        }

        None
    }

    /// Serializes the scanner state.
    ///
    /// Each stack is written as a one-byte count followed by one byte per
    /// entry: section levels, list indents, drawer kinds (`N` or `P`), open
    /// markup characters. Block names follow as a count and NUL-terminated
    /// strings.
    ///
    /// # Errors
    ///
    /// Fails if a stack holds more than 255 entries, a level or indentation
    /// exceeds 255, or the result is larger than [`SERIALIZATION_BUFFER_SIZE`].
    pub fn serialize(&self) -> Result<Vec<u8>, ScannerStateError> {
        fn count(stack: &'static str, len: usize) -> Result<u8, ScannerStateError> {
            u8::try_from(len).map_err(|_| ScannerStateError::TooManyEntries { stack, len })
        }

        fn small(stack: &'static str, value: usize) -> Result<u8, ScannerStateError> {
            u8::try_from(value).map_err(|_| ScannerStateError::ValueOutOfRange { stack, value })
        }

        let mut buffer = Vec::new();

        for (stack, values) in [
            ("section level", &self.section_levels),
            ("list indent", &self.list_indents),
        ] {
            buffer.push(count(stack, values.len())?);
            for &value in values {
                buffer.push(small(stack, value)?);
            }
        }

        buffer.push(count("drawer", self.drawers.len())?);
        buffer.extend(self.drawers.iter().map(|d| d.to_byte()));

        buffer.push(count("markup", self.markup.len())?);
        for &ch in &self.markup {
            // markup delimiters are all ASCII
            let mut utf8 = [0; 4];
            buffer.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
        }

        buffer.push(count("block name", self.block_names.len())?);
        for name in &self.block_names {
            buffer.extend_from_slice(name.as_bytes());
            buffer.push(0);
        }

        if buffer.len() > SERIALIZATION_BUFFER_SIZE {
            return Err(ScannerStateError::TooLarge(buffer.len()));
        }

        log::trace!(target: "orgmode::scanner", "serialized {} bytes", buffer.len());
        Ok(buffer)
    }

    /// Restores a scanner from [`serialize`](Self::serialize) output. An
    /// empty buffer yields the initial state.
    ///
    /// # Errors
    ///
    /// Fails on truncated input, on bytes that are not valid entries (block
    /// names must be UTF-8), and on bytes left over after the last stack.
    pub fn deserialize(buffer: &[u8]) -> Result<Self, ScannerStateError> {
        let mut scanner = Self::new();
        if buffer.is_empty() {
            return Ok(scanner);
        }

        let mut reader = Reader { buffer, pos: 0 };

        for stack in [&mut scanner.section_levels, &mut scanner.list_indents] {
            let n = reader.byte()?;
            for _ in 0..n {
                stack.push(usize::from(reader.byte()?));
            }
        }

        let n = reader.byte()?;
        for _ in 0..n {
            let byte = reader.byte()?;
            let kind = DrawerKind::from_byte(byte).ok_or(ScannerStateError::InvalidEntry {
                stack: "drawer",
                byte,
            })?;
            scanner.drawers.push(kind);
        }

        let n = reader.byte()?;
        for _ in 0..n {
            let byte = reader.byte()?;
            let ch = char::from(byte);
            if !MARKUP_CHARS.contains(&ch) {
                return Err(ScannerStateError::InvalidEntry {
                    stack: "markup",
                    byte,
                });
            }
            scanner.markup.push(ch);
        }

        let n = reader.byte()?;
        for _ in 0..n {
            scanner.block_names.push(reader.c_string()?);
        }

        let trailing = buffer.len() - reader.pos;
        if trailing > 0 {
            return Err(ScannerStateError::TrailingBytes(trailing));
        }

        log::trace!(target: "orgmode::scanner", "deserialized {} bytes", reader.pos);
        Ok(scanner)
    }
}

struct Reader<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8, ScannerStateError> {
        let byte = *self
            .buffer
            .get(self.pos)
            .ok_or(ScannerStateError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn c_string(&mut self) -> Result<String, ScannerStateError> {
        let rest = &self.buffer[self.pos..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ScannerStateError::Truncated(self.buffer.len()))?;
        let name = std::str::from_utf8(&rest[..len]).map_err(|e| {
            ScannerStateError::InvalidEntry {
                stack: "block name",
                byte: rest[e.valid_up_to()],
            }
        })?;
        self.pos += len + 1;
        Ok(name.to_owned())
    }
}

/// Advances over a list bullet (`-`, `+`, `*` off column 0, `1.` or `1)`)
/// and reports whether one was found. A bullet must be followed by whitespace,
/// which is left unread.
fn scan_bullet(lexer: &mut Lexer<'_>) -> bool {
    let found = match lexer.lookahead() {
        Some('-' | '+') => true,
        Some('*') => lexer.column() > 0,
        Some(c) if c.is_ascii_digit() => {
            while lexer.lookahead().is_some_and(|c| c.is_ascii_digit()) {
                lexer.advance();
            }
            matches!(lexer.lookahead(), Some('.' | ')'))
        }
        _ => false,
    };

    if !found {
        return false;
    }
    lexer.advance();

    // we need at least one space following a bullet
    lexer.lookahead().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_one(scanner: &mut Scanner, src: &str, valid: &[TokenType]) -> Option<(TokenType, String)> {
        let mut lexer = Lexer::new(src);
        lexer.start_token();
        let token = scanner.scan(&mut lexer, ValidSymbols::of(valid))?;
        let span = lexer.finish_token();
        Some((token, src[span.start_byte..span.end_byte].to_owned()))
    }

    #[test]
    fn test_valid_symbols_set_operations() {
        let set = ValidSymbols::of(&[TokenType::Word, TokenType::Stars]);
        assert!(set.contains(TokenType::Word));
        assert!(!set.contains(TokenType::Bullet));
        assert!(!set.without(TokenType::Word).contains(TokenType::Word));
        let all = set.union(ValidSymbols::markup_starts());
        assert!(all.contains(TokenType::BoldStart));
        assert!(!all.minus(ValidSymbols::markup_starts()).contains(TokenType::BoldStart));
    }

    #[test]
    fn test_token_names_match_grammar_externals() {
        assert_eq!(TokenType::ALL.len(), EXTERNALS.len());
        assert_eq!(TokenType::Stars.grammar_name(), "stars");
        assert_eq!(TokenType::Word.grammar_name(), "word");
        assert_eq!(TokenType::CodeInlineEnd.grammar_name(), "_code_end");
    }

    #[test]
    fn test_stars_push_and_end_section_pops() {
        let mut scanner = Scanner::new();
        let stars = scan_one(&mut scanner, "** Heading", &[TokenType::Stars]);
        assert_eq!(stars, Some((TokenType::Stars, "**".to_owned())));
        assert_eq!(scanner.section_level(), 2);

        let valid = [TokenType::Stars, TokenType::EndSection];
        let end = scan_one(&mut scanner, "* Next", &valid);
        assert_eq!(end, Some((TokenType::EndSection, String::new())));
        assert_eq!(scanner.section_level(), 0);
    }

    #[test]
    fn test_deeper_stars_open_a_subsection() {
        let mut scanner = Scanner::new();
        scan_one(&mut scanner, "* A", &[TokenType::Stars]);
        let valid = [TokenType::Stars, TokenType::EndSection];
        let sub = scan_one(&mut scanner, "** B", &valid);
        assert_eq!(sub.map(|(t, _)| t), Some(TokenType::Stars));
        assert_eq!(scanner.section_level(), 2);
    }

    #[test]
    fn test_end_section_at_eof() {
        let mut scanner = Scanner::new();
        scan_one(&mut scanner, "* A", &[TokenType::Stars]);
        let end = scan_one(&mut scanner, "", &[TokenType::EndSection]);
        assert_eq!(end.map(|(t, _)| t), Some(TokenType::EndSection));
        assert!(scanner.is_empty());
    }

    #[test]
    fn test_markup_start_requires_content() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::BoldStart, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "*bold*", &valid),
            Some((TokenType::BoldStart, "*".to_owned()))
        );
        assert_eq!(scanner.markup, vec!['*']);

        let mut scanner = Scanner::new();
        assert_eq!(
            scan_one(&mut scanner, "* x", &valid),
            Some((TokenType::Word, "*".to_owned()))
        );
        assert_eq!(
            scan_one(&mut scanner, "**", &valid),
            Some((TokenType::Word, "**".to_owned()))
        );
        assert!(scanner.markup.is_empty());
    }

    #[test]
    fn test_words_stop_at_open_markup() {
        let mut scanner = Scanner::new();
        scanner.markup.push('*');
        let valid = [TokenType::BoldEnd, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "bold* tail", &valid),
            Some((TokenType::Word, "bold".to_owned()))
        );
        assert_eq!(
            scan_one(&mut scanner, "* tail", &valid),
            Some((TokenType::BoldEnd, "*".to_owned()))
        );
        assert!(scanner.markup.is_empty());
    }

    #[test]
    fn test_newline_clears_markup() {
        let mut scanner = Scanner::new();
        scanner.markup.push('/');
        assert_eq!(scan_one(&mut scanner, "\n", &[TokenType::Word]), None);
        assert!(scanner.markup.is_empty());
    }

    #[test]
    fn test_list_start_then_bullet() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::ListStart, TokenType::Bullet, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "- item", &valid),
            Some((TokenType::ListStart, String::new()))
        );
        assert_eq!(scanner.list_indent(), Some(0));
        assert_eq!(
            scan_one(&mut scanner, "- item", &valid),
            Some((TokenType::Bullet, "-".to_owned()))
        );
        assert_eq!(
            scan_one(&mut scanner, "12) item", &valid),
            Some((TokenType::Bullet, "12)".to_owned()))
        );
    }

    #[test]
    fn test_bullet_needs_whitespace() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::ListStart, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "-5 degrees", &valid),
            Some((TokenType::Word, "-5".to_owned()))
        );
        assert_eq!(
            scan_one(&mut scanner, "1999 was", &valid),
            Some((TokenType::Word, "1999".to_owned()))
        );
        assert!(scanner.list_indent().is_none());
    }

    #[test]
    fn test_star_bullet_only_off_column_zero() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::ListStart, TokenType::Word];
        let mut lexer = Lexer::new("  * item");
        lexer.skip_blanks();
        lexer.start_token();
        assert_eq!(
            scanner.scan(&mut lexer, ValidSymbols::of(&valid)),
            Some(TokenType::ListStart)
        );
        assert_eq!(scanner.list_indent(), Some(2));
    }

    #[test]
    fn test_list_end_on_dedent() {
        let mut scanner = Scanner::new();
        scanner.list_indents.push(2);
        let valid = [TokenType::ListEnd, TokenType::Bullet, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "text", &valid),
            Some((TokenType::ListEnd, String::new()))
        );
        assert!(scanner.list_indent().is_none());
    }

    #[test]
    fn test_list_end_before_heading() {
        let mut scanner = Scanner::new();
        scanner.list_indents.push(0);
        let valid = [TokenType::ListEnd, TokenType::Bullet, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "* Heading", &valid).map(|(t, _)| t),
            Some(TokenType::ListEnd)
        );
    }

    #[test]
    fn test_drawers_and_properties() {
        let mut scanner = Scanner::new();
        let valid = [
            TokenType::DrawerName,
            TokenType::PropertyName,
            TokenType::DrawerEnd,
            TokenType::Word,
        ];
        assert_eq!(
            scan_one(&mut scanner, ":PROPERTIES:\n", &valid),
            Some((TokenType::DrawerName, ":PROPERTIES:".to_owned()))
        );
        assert_eq!(scanner.drawer(), Some(DrawerKind::Property));
        assert_eq!(
            scan_one(&mut scanner, ":CUSTOM_ID: intro", &valid),
            Some((TokenType::PropertyName, ":CUSTOM_ID:".to_owned()))
        );
        assert_eq!(
            scan_one(&mut scanner, ":END:", &valid),
            Some((TokenType::DrawerEnd, ":END:".to_owned()))
        );
        assert!(scanner.drawer().is_none());
    }

    #[test]
    fn test_drawer_name_must_stand_alone() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::DrawerName, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, ":note: not a drawer", &valid),
            Some((TokenType::Word, ":note:".to_owned()))
        );
        assert_eq!(
            scan_one(&mut scanner, ":half", &valid),
            Some((TokenType::Word, ":half".to_owned()))
        );
        assert!(scanner.drawer().is_none());
    }

    #[test]
    fn test_stray_drawer_end_is_a_word() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::DrawerName, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, ":end:", &valid),
            Some((TokenType::Word, ":end:".to_owned()))
        );
    }

    #[test]
    fn test_block_markers_and_names() {
        let mut scanner = Scanner::new();
        let begin = [TokenType::BlockBeginMarker, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "#+BEGIN_QUOTE", &begin),
            Some((TokenType::BlockBeginMarker, "#+BEGIN_".to_owned()))
        );
        assert_eq!(
            scan_one(&mut scanner, "QUOTE\n", &[TokenType::BlockBeginName]),
            Some((TokenType::BlockBeginName, "QUOTE".to_owned()))
        );
        assert_eq!(scanner.block_name(), Some("QUOTE"));

        let end_name = [TokenType::BlockEndName, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "example", &end_name),
            Some((TokenType::Word, "example".to_owned()))
        );
        assert_eq!(scanner.block_name(), Some("QUOTE"));
        assert_eq!(
            scan_one(&mut scanner, "quote", &end_name),
            Some((TokenType::BlockEndName, "quote".to_owned()))
        );
        assert!(scanner.block_name().is_none());
    }

    #[test]
    fn test_partial_marker_is_a_whole_word() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::BlockBeginMarker, TokenType::Word];
        assert_eq!(
            scan_one(&mut scanner, "#+title: Notes", &valid),
            Some((TokenType::Word, "#+title:".to_owned()))
        );
    }

    #[test]
    fn test_error_sentinel_refuses() {
        let mut scanner = Scanner::new();
        let valid = [TokenType::ErrorSentinel, TokenType::Word];
        assert_eq!(scan_one(&mut scanner, "word", &valid), None);
    }

    #[test]
    fn test_serialize_round_trip_layout() {
        let mut scanner = Scanner::new();
        scanner.section_levels = vec![1, 3];
        scanner.list_indents = vec![2];
        scanner.drawers = vec![DrawerKind::Property];
        scanner.markup = vec!['/'];
        scanner.block_names = vec!["src".to_owned()];

        let bytes = scanner.serialize().unwrap();
        assert_eq!(
            bytes,
            vec![2, 1, 3, 1, 2, 1, b'P', 1, b'/', 1, b's', b'r', b'c', 0]
        );
        assert_eq!(Scanner::deserialize(&bytes).unwrap(), scanner);
    }

    #[test]
    fn test_empty_buffer_is_initial_state() {
        assert_eq!(Scanner::deserialize(&[]).unwrap(), Scanner::new());
        assert_eq!(Scanner::new().serialize().unwrap(), vec![0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_deserialize_rejects_bad_input() {
        assert_eq!(
            Scanner::deserialize(&[2, 1]),
            Err(ScannerStateError::Truncated(2))
        );
        assert_eq!(
            Scanner::deserialize(&[0, 0, 1, b'Q']),
            Err(ScannerStateError::InvalidEntry {
                stack: "drawer",
                byte: b'Q'
            })
        );
        assert!(matches!(
            Scanner::deserialize(&[0, 0, 0, 0, 1, b'x']),
            Err(ScannerStateError::Truncated(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_invalid_names_and_leftovers() {
        assert_eq!(
            Scanner::deserialize(&[0, 0, 0, 0, 1, b's', 0xff, 0]),
            Err(ScannerStateError::InvalidEntry {
                stack: "block name",
                byte: 0xff
            })
        );
        assert_eq!(
            Scanner::deserialize(&[0, 0, 0, 0, 0, 7, 7]),
            Err(ScannerStateError::TrailingBytes(2))
        );

        let mut scanner = Scanner::new();
        scanner.block_names = vec!["résumé".to_owned()];
        let bytes = scanner.serialize().unwrap();
        assert_eq!(Scanner::deserialize(&bytes).unwrap(), scanner);
    }

    #[test]
    fn test_serialize_rejects_oversized_state() {
        let mut scanner = Scanner::new();
        scanner.list_indents.push(300);
        assert!(matches!(
            scanner.serialize(),
            Err(ScannerStateError::ValueOutOfRange { value: 300, .. })
        ));

        let mut scanner = Scanner::new();
        scanner.block_names = vec!["x".repeat(200); 6];
        assert!(matches!(
            scanner.serialize(),
            Err(ScannerStateError::TooLarge(_))
        ));
    }
}
