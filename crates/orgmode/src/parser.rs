//! Recursive-descent parser for Org documents.
//!
//! Each construct of [`orgmode_grammar`](crate::grammar::orgmode::orgmode_grammar)
//! has a hand-written parsing function that builds the same node shapes. The
//! functions ask the [`Scanner`] for every context-sensitive token, passing
//! the set of tokens allowed at that point, the way the tree-sitter runtime
//! drives an external scanner. Plain literals (`TODO`, `[#A]`, `[X]`,
//! `#+begin:`) and hidden blank lines are read directly.
//!
//! Parsing never fails. Text that fits no construct is read as words, and a
//! container left open at a heading or at end of input gets a zero-width
//! missing terminator. Sections, containers and markup nest at most
//! [`MAX_NESTING`] deep; past that, openers are read as words and deeper
//! headings start sibling sections.

use thiserror::Error;

use crate::grammar::orgmode::GRAMMAR_NAME;
use crate::language::{Language, LanguageError, LANGUAGE_VERSION, MIN_COMPATIBLE_LANGUAGE_VERSION};
use crate::lexer::{is_blank, Checkpoint, Lexer, Span};
use crate::scanner::{Scanner, TokenType, ValidSymbols};
use crate::tree::{Node, Tree};

/// Errors returned by [`Parser::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// [`Parser::set_language`] was never called.
    #[error("no language set on the parser")]
    NoLanguage,
}

/// Parses Org documents into [`Tree`]s.
#[derive(Debug, Default)]
pub struct Parser {
    language: Option<Language>,
}

impl Parser {
    /// Creates a parser with no language.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the language used by later calls to [`parse`](Self::parse).
    ///
    /// # Errors
    ///
    /// Returns [`LanguageError::Version`] if the language's ABI version is not
    /// supported and [`LanguageError::Unsupported`] if it was built from a
    /// grammar other than Org's.
    pub fn set_language(&mut self, language: &Language) -> Result<(), LanguageError> {
        let version = language.version();
        if !(MIN_COMPATIBLE_LANGUAGE_VERSION..=LANGUAGE_VERSION).contains(&version) {
            return Err(LanguageError::Version {
                found: version,
                min: MIN_COMPATIBLE_LANGUAGE_VERSION,
                max: LANGUAGE_VERSION,
            });
        }
        if language.name() != GRAMMAR_NAME {
            return Err(LanguageError::Unsupported(language.name().to_owned()));
        }
        self.language = Some(language.clone());
        Ok(())
    }

    /// The language set on this parser.
    #[must_use]
    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    /// Parses `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::NoLanguage`] if no language has been set.
    pub fn parse(&mut self, text: &str) -> Result<Tree, ParseError> {
        let language = self.language.clone().ok_or(ParseError::NoLanguage)?;
        let root = ParseState::new(text).document();
        log::debug!(
            "parsed {} bytes into {} nodes",
            text.len(),
            root.walk().count()
        );
        Ok(Tree::new(root, text.to_owned(), language))
    }
}

/// How deep sections, blocks, drawers, lists and markup may nest.
pub const MAX_NESTING: usize = 128;

/// Raw blocks keep their body verbatim.
const RAW_BLOCKS: [&str; 4] = ["src", "example", "export", "comment"];

fn is_raw_block(name: &str) -> bool {
    RAW_BLOCKS.iter().any(|raw| raw.eq_ignore_ascii_case(name))
}

/// An open container whose terminator ends every element nested in it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Block(String),
    DynamicBlock,
    Drawer,
}

impl Frame {
    /// Returns `true` if the terminator of this container starts at the
    /// cursor, the first thing on its line.
    fn ends_at(&self, lexer: &Lexer<'_>) -> bool {
        if !lexer.at_line_start() {
            return false;
        }
        match self {
            Self::Block(name) => {
                lexer.starts_with_ignore_case("#+end_")
                    && lexer.rest()[6..]
                        .split(char::is_whitespace)
                        .next()
                        .is_some_and(|end| end.eq_ignore_ascii_case(name))
            }
            Self::DynamicBlock => lexer.starts_with_ignore_case("#+end:"),
            Self::Drawer => {
                lexer.starts_with_ignore_case(":end:")
                    && lexer.line_remainder()[5..].trim_matches(is_blank).is_empty()
            }
        }
    }
}

type Token = (TokenType, Span);

/// Elements read by [`ParseState::elements`].
struct Elements {
    nodes: Vec<Node>,
    /// From the first consumed token, hidden blank lines included, to the
    /// last.
    span: Option<Span>,
    /// A list token that ends the enclosing list item.
    pending: Option<Token>,
}

impl Elements {
    fn into_node(self, kind: &'static str) -> Option<Node> {
        let span = self.span?;
        (!self.nodes.is_empty()).then(|| Node::branch(kind, span, self.nodes))
    }
}

struct Snapshot {
    cursor: Checkpoint,
    scanner: Scanner,
    last_end: Checkpoint,
}

struct ParseState<'a> {
    lexer: Lexer<'a>,
    scanner: Scanner,
    frames: Vec<Frame>,
    /// End of the last consumed token.
    last_end: Checkpoint,
    /// Open sections, containers and markup spans.
    depth: usize,
}

impl<'a> ParseState<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lexer: Lexer::new(text),
            scanner: Scanner::new(),
            frames: Vec::new(),
            last_end: Checkpoint::default(),
            depth: 0,
        }
    }

    /// Runs `parse` one nesting level deeper.
    fn nest<T>(&mut self, parse: impl FnOnce(&mut Self) -> T) -> T {
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn can_nest(&self) -> bool {
        self.depth < MAX_NESTING
    }

    fn markup_starts(&self) -> ValidSymbols {
        if self.can_nest() {
            ValidSymbols::markup_starts()
        } else {
            ValidSymbols::NONE
        }
    }

    /// Tokens that may start an element. Blocks and drawers have to open a
    /// line.
    fn element_symbols(&self, line_start: bool) -> ValidSymbols {
        let leaves = ValidSymbols::of(&[TokenType::PropertyName, TokenType::Word]);
        if !self.can_nest() {
            return leaves;
        }
        let symbols = leaves
            .with(TokenType::ListStart)
            .union(ValidSymbols::markup_starts());
        if line_start {
            symbols
                .with(TokenType::BlockBeginMarker)
                .with(TokenType::DrawerName)
        } else {
            symbols
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            cursor: self.lexer.checkpoint(),
            scanner: self.scanner.clone(),
            last_end: self.last_end,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.lexer.restore(snapshot.cursor);
        self.scanner = snapshot.scanner;
        self.last_end = snapshot.last_end;
    }

    /// Runs the scanner with `valid` at the cursor.
    fn scan(&mut self, valid: ValidSymbols) -> Option<Token> {
        self.lexer.start_token();
        let Some(token) = self.scanner.scan(&mut self.lexer, valid) else {
            self.lexer.rewind();
            return None;
        };
        let span = self.lexer.finish_token();
        if !span.is_empty() {
            self.last_end = self.lexer.checkpoint();
        }
        log::trace!("{} at {}", token.grammar_name(), span.start);
        Some((token, span))
    }

    /// Consumes `chars` characters as one token.
    fn take(&mut self, chars: usize) -> Span {
        self.lexer.start_token();
        self.lexer.advance_by(chars);
        self.lexer.mark_end();
        let span = self.lexer.finish_token();
        self.last_end = self.lexer.checkpoint();
        span
    }

    /// Consumes a hidden `_blank_line`.
    fn blank_line(&mut self) -> bool {
        self.lexer.skip_blanks();
        let eaten = self.lexer.eat_blank_line();
        if eaten {
            self.last_end = self.lexer.checkpoint();
        }
        eaten
    }

    /// A missing zero-width node at the end of the last token.
    fn missing(&self, kind: &'static str, named: bool) -> Node {
        log::debug!("missing {kind} at {}", self.last_end.point());
        Node::missing(kind, named, Span::empty(self.last_end))
    }

    /// Consumes one character as an `ERROR` node.
    fn error_char(&mut self) -> Node {
        log::debug!("unexpected {:?} at {}", self.lexer.lookahead(), self.lexer.checkpoint().point());
        Node::error(self.take(1))
    }

    fn at_enclosing_end(&self) -> bool {
        self.frames.iter().any(|frame| frame.ends_at(&self.lexer))
    }

    fn document(mut self) -> Node {
        let mut children = Vec::new();
        if let Some(body) = self.elements(ValidSymbols::NONE).into_node("body") {
            children.push(body);
        }

        while !self.lexer.eof() {
            match self.scan(ValidSymbols::of(&[TokenType::Stars])) {
                Some((_, stars)) => children.push(self.nest(|p| p.section(stars))),
                None => children.push(self.error_char()),
            }
            self.lexer.skip_blanks();
        }

        let span = Span::between(Checkpoint::default(), self.lexer.checkpoint());
        Node::branch("document", span, children)
    }

    fn section(&mut self, stars: Span) -> Node {
        let mut children = vec![self.heading(stars)];
        if let Some(body) = self.elements(ValidSymbols::NONE).into_node("body") {
            children.push(body);
        }

        loop {
            // too deep for subsections: a deeper heading closes this section
            // and starts a sibling instead
            let valid = if self.can_nest() {
                ValidSymbols::of(&[TokenType::Stars, TokenType::EndSection])
            } else {
                ValidSymbols::of(&[TokenType::EndSection])
            };
            match self.scan(valid) {
                Some((TokenType::Stars, stars)) => {
                    let subsection = self.nest(|p| p.section(stars));
                    children.push(subsection.with_field("subsection"));
                }
                Some((TokenType::EndSection, _)) => break,
                _ => {
                    self.scanner.close_section();
                    break;
                }
            }
        }

        Node::branch("section", stars.until(self.last_end), children)
    }

    fn heading(&mut self, stars: Span) -> Node {
        let mut children = vec![Node::leaf("stars", stars)];

        self.lexer.skip_blanks();
        if self.lexer.word_ahead("TODO") || self.lexer.word_ahead("DONE") {
            children.push(Node::leaf("keyword", self.take(4)));
            self.lexer.skip_blanks();
        }
        if priority_ahead(self.lexer.rest()) {
            children.push(Node::leaf("priority", self.take(4)));
            self.lexer.skip_blanks();
        }
        if self.lexer.word_ahead("COMMENT") {
            children.push(Node::anonymous("COMMENT", self.take(7)));
        }

        let mut objects = self.objects_until_line_end();
        let tags = objects
            .last()
            .filter(|node| node.kind() == "word")
            .and_then(|word| heading_tags(word, self.lexer.source()));
        if tags.is_some() {
            objects.pop();
        }
        let title_span = objects
            .first()
            .zip(objects.last())
            .map(|(first, last)| first.span().join(&last.span()));
        if let Some(span) = title_span {
            children.push(Node::branch("title", span, objects).with_field("title"));
        }
        if let Some(tags) = tags {
            children.push(tags.with_field("tags"));
        }

        while self.blank_line() {}

        Node::branch("heading", stars.until(self.last_end), children)
    }

    /// Reads objects up to the end of the line.
    fn objects_until_line_end(&mut self) -> Vec<Node> {
        let valid = self.markup_starts().with(TokenType::Word);
        let mut objects = Vec::new();
        loop {
            self.lexer.skip_blanks();
            if self.lexer.at_line_end() {
                return objects;
            }
            let snapshot = self.snapshot();
            let node = match self.scan(valid) {
                Some((TokenType::Word, span)) => Some(Node::leaf("word", span)),
                Some((token, span)) if token.is_markup_start() => {
                    self.markup_or_word(token, span, snapshot)
                }
                _ => None,
            };
            objects.push(node.unwrap_or_else(|| self.error_char()));
        }
    }

    /// Reads elements until end of input, a heading, the terminator of an
    /// enclosing container or, when `extra` allows list tokens, the end of
    /// the current list item.
    fn elements(&mut self, extra: ValidSymbols) -> Elements {
        let mut nodes = Vec::new();
        let mut start: Option<Checkpoint> = None;
        let mut pending = None;

        loop {
            self.lexer.skip_blanks();
            if self.lexer.eof() || self.lexer.at_heading_start() {
                if extra.contains(TokenType::ListEnd) {
                    pending = self.scan(ValidSymbols::of(&[TokenType::ListEnd]));
                }
                break;
            }
            if self.at_enclosing_end() {
                break;
            }

            let here = self.lexer.checkpoint();
            if self.blank_line() {
                start.get_or_insert(here);
                continue;
            }

            let line_start = self.lexer.at_line_start();
            if line_start && self.can_nest() && self.lexer.starts_with_ignore_case("#+begin:") {
                if let Some(node) = self.nest(Self::dynamic_block) {
                    start.get_or_insert(here);
                    nodes.push(node);
                    continue;
                }
            }

            let before = self.last_end;
            let snapshot = self.snapshot();
            let valid = self.element_symbols(line_start).union(extra);
            let Some((token, span)) = self.scan(valid) else {
                start.get_or_insert(here);
                nodes.push(self.error_char());
                continue;
            };

            let node = match token {
                TokenType::Bullet | TokenType::ListEnd => {
                    self.last_end = before;
                    pending = Some((token, span));
                    break;
                }
                TokenType::ListStart => Some(self.nest(Self::list)),
                TokenType::BlockBeginMarker => {
                    self.nest(|p| p.greater_block(span)).or_else(|| {
                        self.restore(snapshot);
                        self.word()
                    })
                }
                TokenType::DrawerName => Some(self.nest(|p| p.drawer(span))),
                TokenType::PropertyName => Some(self.node_property(span)),
                TokenType::Word => Some(Node::leaf("word", span)),
                token if token.is_markup_start() => self.markup_or_word(token, span, snapshot),
                _ => None,
            };
            start.get_or_insert(here);
            nodes.push(node.unwrap_or_else(|| self.error_char()));
        }

        Elements {
            nodes,
            span: start.map(|start| Span::between(start, self.last_end)),
            pending,
        }
    }

    /// Rescans the cursor as a plain word.
    fn word(&mut self) -> Option<Node> {
        self.scan(ValidSymbols::of(&[TokenType::Word]))
            .map(|(_, span)| Node::leaf("word", span))
    }

    /// Reads a markup object whose start token has been scanned, falling back
    /// to a word from `snapshot` if it is never closed.
    fn markup_or_word(&mut self, start: TokenType, span: Span, snapshot: Snapshot) -> Option<Node> {
        if let Some(node) = self.nest(|p| p.markup(start, span)) {
            return Some(node);
        }
        log::trace!("unterminated markup at {}, reading a word", span.start);
        self.restore(snapshot);
        self.word()
    }

    fn markup(&mut self, start: TokenType, start_span: Span) -> Option<Node> {
        let end = start.markup_end()?;
        let kind = MARKUP_KINDS[start.markup_index()?];
        let valid = self.markup_starts().with(end).with(TokenType::Word);

        let mut children = Vec::new();
        loop {
            self.lexer.skip_blanks();
            if self.lexer.at_line_end() {
                return None;
            }
            let snapshot = self.snapshot();
            match self.scan(valid)? {
                (token, end_span) if token == end => {
                    if children.is_empty() {
                        return None;
                    }
                    return Some(Node::branch(kind, start_span.join(&end_span), children));
                }
                (TokenType::Word, span) => children.push(Node::leaf("word", span)),
                (token, span) if token.is_markup_start() => {
                    children.push(self.markup_or_word(token, span, snapshot)?);
                }
                _ => return None,
            }
        }
    }

    /// Reads the value running to the end of the line, without trailing
    /// blanks.
    fn value(&mut self) -> Option<Node> {
        self.lexer.skip_blanks();
        let value = self.lexer.line_remainder().trim_end_matches(is_blank);
        if value.is_empty() {
            return None;
        }
        let span = self.take(value.chars().count());
        Some(Node::leaf("value", span))
    }

    fn greater_block(&mut self, marker: Span) -> Option<Node> {
        self.lexer.skip_blanks();
        let (_, name_span) = self.scan(ValidSymbols::of(&[TokenType::BlockBeginName]))?;
        let name = self.lexer.source()[name_span.start_byte..name_span.end_byte].to_owned();

        let mut children = vec![Node::leaf("block_begin_name", name_span)];
        if let Some(params) = self.value() {
            children.push(params.with_field("params"));
        }
        self.blank_line();

        let frame = Frame::Block(name.clone());
        let body = if is_raw_block(&name) {
            self.raw_content(&frame)
        } else {
            self.frames.push(frame.clone());
            let elements = self.elements(ValidSymbols::NONE);
            self.frames.pop();
            elements.into_node("body")
        };
        if let Some(body) = body {
            children.push(body.with_field("body"));
        }

        self.lexer.skip_blanks();
        let end_name = if frame.ends_at(&self.lexer) {
            self.scan(ValidSymbols::of(&[TokenType::BlockEndMarker]));
            self.lexer.skip_blanks();
            self.scan(ValidSymbols::of(&[TokenType::BlockEndName]))
        } else {
            None
        };
        match end_name {
            Some((_, span)) => children.push(Node::leaf("block_end_name", span)),
            None => {
                log::debug!("block {name:?} is never closed");
                self.scanner.close_block();
                children.push(self.missing("block_end_name", true));
            }
        }

        Some(Node::branch("greater_block", marker.until(self.last_end), children))
    }

    /// Reads the lines of a raw block up to its terminator.
    fn raw_content(&mut self, frame: &Frame) -> Option<Node> {
        let start = self.lexer.checkpoint();
        let mut end = None;
        loop {
            if self.lexer.eof() || self.lexer.at_heading_start() {
                break;
            }
            let mut probe = self.lexer.clone();
            probe.skip_blanks();
            if frame.ends_at(&probe) {
                self.lexer = probe;
                break;
            }
            self.lexer.skip_line();
            end = Some(self.lexer.checkpoint());
        }
        let end = end?;
        self.last_end = end;
        Some(Node::leaf("block_content", Span::between(start, end)))
    }

    fn dynamic_block(&mut self) -> Option<Node> {
        let snapshot = self.snapshot();
        let begin = self.take(8);
        self.lexer.skip_blanks();
        let Some((_, name_span)) = self.scan(ValidSymbols::of(&[TokenType::BlockBeginName])) else {
            self.restore(snapshot);
            return None;
        };

        let mut children = vec![
            Node::anonymous("#+begin:", begin),
            Node::leaf("block_begin_name", name_span),
        ];
        if let Some(params) = self.value() {
            children.push(params.with_field("params"));
        }
        self.blank_line();

        self.frames.push(Frame::DynamicBlock);
        let contents = self.elements(ValidSymbols::NONE);
        self.frames.pop();
        if let Some(contents) = contents.into_node("contents") {
            children.push(contents.with_field("contents"));
        }

        self.lexer.skip_blanks();
        if Frame::DynamicBlock.ends_at(&self.lexer) {
            children.push(Node::anonymous("#+end:", self.take(6)));
            self.lexer.skip_blanks();
            let end_name = if self.lexer.at_line_end() {
                None
            } else {
                self.scan(ValidSymbols::of(&[TokenType::BlockEndName]))
            };
            match end_name {
                Some((_, span)) => children.push(Node::leaf("block_end_name", span)),
                None => self.scanner.close_block(),
            }
        } else {
            log::debug!("dynamic block is never closed");
            self.scanner.close_block();
            children.push(self.missing("#+end:", false));
        }

        Some(Node::branch("dynamic_block", begin.until(self.last_end), children))
    }

    fn drawer(&mut self, name: Span) -> Node {
        let mut children = vec![Node::leaf("drawer_name", name)];
        self.blank_line();

        self.frames.push(Frame::Drawer);
        let contents = self.elements(ValidSymbols::NONE);
        self.frames.pop();
        if let Some(contents) = contents.into_node("contents") {
            children.push(contents.with_field("contents"));
        }

        self.lexer.skip_blanks();
        let end = if Frame::Drawer.ends_at(&self.lexer) {
            self.scan(ValidSymbols::of(&[TokenType::DrawerEnd]))
        } else {
            None
        };
        match end {
            Some((_, span)) => children.push(Node::leaf("drawer_end", span)),
            None => {
                log::debug!("drawer is never closed");
                self.scanner.close_drawer();
                children.push(self.missing("drawer_end", true));
            }
        }

        Node::branch("drawer", name.until(self.last_end), children)
    }

    fn node_property(&mut self, name: Span) -> Node {
        let mut children = vec![Node::leaf("property_name", name).with_field("name")];
        if let Some(value) = self.value() {
            children.push(value.with_field("value"));
        }
        Node::branch("node_property", name.until(self.last_end), children)
    }

    /// Reads a list whose zero-width start has been scanned.
    fn list(&mut self) -> Node {
        let start = self.lexer.checkpoint();
        let mut items = Vec::new();
        let mut next = self.list_token();
        loop {
            match next {
                Some((TokenType::Bullet, bullet)) => {
                    let (item, pending) = self.list_item(bullet);
                    items.push(item);
                    next = match pending {
                        Some(token) => Some(token),
                        None => self.list_token(),
                    };
                }
                Some((TokenType::ListEnd, _)) => break,
                _ => {
                    self.scanner.close_list();
                    break;
                }
            }
        }
        Node::branch("list", Span::between(start, self.last_end), items)
    }

    fn list_token(&mut self) -> Option<Token> {
        self.lexer.skip_blanks();
        if self.at_enclosing_end() {
            return None;
        }
        self.scan(ValidSymbols::of(&[TokenType::Bullet, TokenType::ListEnd]))
    }

    fn list_item(&mut self, bullet: Span) -> (Node, Option<Token>) {
        let mut children = vec![Node::leaf("bullet", bullet)];
        self.lexer.skip_blanks();
        if checkbox_ahead(self.lexer.rest()) {
            children.push(Node::leaf("checkbox", self.take(3)).with_field("checkbox"));
        }

        let Elements {
            nodes,
            span,
            pending,
        } = self.elements(ValidSymbols::of(&[TokenType::Bullet, TokenType::ListEnd]));
        let content = Elements {
            nodes,
            span,
            pending: None,
        };
        if let Some(content) = content.into_node("content") {
            children.push(content.with_field("content"));
        }

        let item = Node::branch("list_item", bullet.until(self.last_end), children);
        (item, pending)
    }
}

/// Markup node kinds, in scanner markup order.
const MARKUP_KINDS: [&str; 6] = [
    "bold",
    "italic",
    "underline",
    "verbatim",
    "code",
    "strikethrough",
];

/// `[#X]` followed by whitespace or end of input.
fn priority_ahead(rest: &str) -> bool {
    let bytes = rest.as_bytes();
    bytes.len() >= 4
        && bytes.starts_with(b"[#")
        && bytes[2].is_ascii_alphanumeric()
        && bytes[3] == b']'
        && rest[4..].chars().next().is_none_or(char::is_whitespace)
}

/// `[ ]`, `[-]` or `[X]` followed by whitespace or end of input.
fn checkbox_ahead(rest: &str) -> bool {
    ["[ ]", "[-]", "[X]"].iter().any(|checkbox| {
        rest.strip_prefix(checkbox)
            .is_some_and(|after| after.chars().next().is_none_or(char::is_whitespace))
    })
}

/// Reads a heading's last word as tags, e.g. `:work:urgent:`.
fn heading_tags(word: &Node, source: &str) -> Option<Node> {
    let span = word.span();
    let text = word.utf8_text(source);
    let inner = text.strip_prefix(':')?.strip_suffix(':')?;
    let is_tag_char = |c: char| c.is_alphanumeric() || "_@#%".contains(c);
    if inner
        .split(':')
        .any(|tag| tag.is_empty() || !tag.chars().all(is_tag_char))
    {
        return None;
    }

    let mut offset = span.start_byte + 1;
    let children = inner
        .split(':')
        .map(|tag| {
            let start = offset;
            offset += tag.len() + 1;
            Node::leaf("tag", span.sub(start, start + tag.len()))
        })
        .collect();
    Some(Node::branch("tags", span, children))
}
