//! Concrete syntax trees.
//!
//! A [`Tree`] owns its source text and the [`Language`] it was parsed with.
//! [`Node`]s follow tree-sitter's vocabulary: named and anonymous nodes,
//! fields, zero-width *missing* nodes and `ERROR` nodes.

use facet::Facet;

use crate::language::{Language, ERROR_KIND};
use crate::lexer::{Point, Span};

/// A node of the syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: &'static str,
    named: bool,
    missing: bool,
    field: Option<&'static str>,
    span: Span,
    children: Vec<Node>,
}

impl Node {
    pub(crate) fn leaf(kind: &'static str, span: Span) -> Self {
        Self::branch(kind, span, Vec::new())
    }

    pub(crate) fn anonymous(kind: &'static str, span: Span) -> Self {
        Self {
            named: false,
            ..Self::leaf(kind, span)
        }
    }

    pub(crate) fn branch(kind: &'static str, span: Span, children: Vec<Node>) -> Self {
        Self {
            kind,
            named: true,
            missing: false,
            field: None,
            span,
            children,
        }
    }

    /// A zero-width node standing in for a required token that was not found.
    pub(crate) fn missing(kind: &'static str, named: bool, span: Span) -> Self {
        Self {
            named,
            missing: true,
            ..Self::leaf(kind, span)
        }
    }

    pub(crate) fn error(span: Span) -> Self {
        Self::leaf(ERROR_KIND, span)
    }

    pub(crate) fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    pub(crate) fn span(&self) -> Span {
        self.span
    }

    /// The node's kind, e.g. `"heading"` or `"#+begin:"`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Returns `true` for nodes named by a grammar rule, `false` for
    /// anonymous literals.
    #[must_use]
    pub fn is_named(&self) -> bool {
        self.named
    }

    /// Returns `true` for zero-width nodes inserted in place of a token that
    /// was required but absent.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.missing
    }

    /// Returns `true` for `ERROR` nodes.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == ERROR_KIND
    }

    /// Returns `true` if this node or any descendant is an error or missing.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.walk().any(|node| node.is_error() || node.missing)
    }

    /// Byte offset where this node starts.
    #[must_use]
    pub fn start_byte(&self) -> usize {
        self.span.start_byte
    }

    /// Byte offset where this node ends.
    #[must_use]
    pub fn end_byte(&self) -> usize {
        self.span.end_byte
    }

    /// The node's byte range.
    #[must_use]
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.span.start_byte..self.span.end_byte
    }

    /// Row and byte column where this node starts.
    #[must_use]
    pub fn start_position(&self) -> Point {
        self.span.start
    }

    /// Row and byte column where this node ends.
    #[must_use]
    pub fn end_position(&self) -> Point {
        self.span.end
    }

    /// Field name this node has within its parent.
    #[must_use]
    pub fn field_name(&self) -> Option<&'static str> {
        self.field
    }

    /// All children, named and anonymous.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// The `i`th child.
    #[must_use]
    pub fn child(&self, i: usize) -> Option<&Node> {
        self.children.get(i)
    }

    /// Number of children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// The named children.
    pub fn named_children(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|c| c.named)
    }

    /// Number of named children.
    #[must_use]
    pub fn named_child_count(&self) -> usize {
        self.named_children().count()
    }

    /// First child with field `name`.
    #[must_use]
    pub fn child_by_field_name(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.field == Some(name))
    }

    /// Every child with field `name`.
    pub fn children_by_field_name<'n>(&'n self, name: &'n str) -> impl Iterator<Item = &'n Node> {
        self.children.iter().filter(move |c| c.field == Some(name))
    }

    /// The text this node covers in `source`.
    #[must_use]
    pub fn utf8_text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.byte_range()).unwrap_or_default()
    }

    /// Pre-order traversal of this node and its descendants.
    #[must_use]
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Renders the node in tree-sitter's s-expression format.
    ///
    /// Only named nodes are printed. Children with a field are prefixed with
    /// `field: ` and missing nodes print as `(MISSING kind)`.
    #[must_use]
    pub fn to_sexp(&self) -> String {
        enum Step<'t> {
            Open(&'t Node, bool),
            Close,
        }

        let mut out = String::new();
        let mut steps = vec![Step::Open(self, false)];
        while let Some(step) = steps.pop() {
            let Step::Open(node, is_child) = step else {
                out.push(')');
                continue;
            };
            if is_child {
                out.push(' ');
                if let Some(field) = node.field {
                    out.push_str(field);
                    out.push_str(": ");
                }
            }
            out.push('(');
            if node.missing {
                out.push_str("MISSING ");
                if node.named {
                    out.push_str(node.kind);
                } else {
                    out.push('"');
                    out.push_str(node.kind);
                    out.push('"');
                }
            } else {
                out.push_str(node.kind);
            }

            steps.push(Step::Close);
            // a missing literal still needs to show up
            let shown = node.children.iter().filter(|c| c.named || c.missing);
            steps.extend(shown.rev().map(|c| Step::Open(c, true)));
        }
        out
    }

    /// Converts the node into its serializable form, with the text of leaf
    /// nodes taken from `source`.
    #[must_use]
    pub fn to_json_node(&self, source: &str) -> JsonNode {
        // each entry holds a node and its children converted so far
        let mut stack: Vec<(&Node, Vec<JsonNode>)> = vec![(self, Vec::new())];
        let mut root = None;
        while let Some((node, converted)) = stack.pop() {
            if let Some(child) = node.children.get(converted.len()) {
                stack.push((node, converted));
                stack.push((child, Vec::with_capacity(child.children.len())));
                continue;
            }
            let json = node.json_with_children(source, converted);
            match stack.last_mut() {
                Some((_, siblings)) => siblings.push(json),
                None => root = Some(json),
            }
        }
        root.unwrap_or_else(|| self.json_with_children(source, Vec::new()))
    }

    fn json_with_children(&self, source: &str, children: Vec<JsonNode>) -> JsonNode {
        JsonNode {
            kind: self.kind.to_owned(),
            named: self.named,
            missing: self.missing,
            field: self.field.map(str::to_owned),
            start_byte: self.span.start_byte,
            end_byte: self.span.end_byte,
            start_row: self.span.start.row,
            start_column: self.span.start.column,
            end_row: self.span.end.row,
            end_column: self.span.end.column,
            text: self
                .children
                .is_empty()
                .then(|| self.utf8_text(source).to_owned()),
            children,
        }
    }
}

/// Pre-order iterator returned by [`Node::walk`].
#[derive(Debug)]
pub struct Walk<'t> {
    stack: Vec<&'t Node>,
}

impl<'t> Iterator for Walk<'t> {
    type Item = &'t Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Serializable form of a [`Node`], as printed by `orgmode parse --json`.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct JsonNode {
    /// Node kind.
    pub kind: String,
    /// Whether the node is named.
    pub named: bool,
    /// Whether the node is a missing placeholder.
    pub missing: bool,
    /// Field name within the parent.
    pub field: Option<String>,
    /// Start byte offset.
    pub start_byte: usize,
    /// End byte offset.
    pub end_byte: usize,
    /// Start row.
    pub start_row: usize,
    /// Start column, in bytes.
    pub start_column: usize,
    /// End row.
    pub end_row: usize,
    /// End column, in bytes.
    pub end_column: usize,
    /// Source text, for leaves only.
    pub text: Option<String>,
    /// Child nodes.
    pub children: Vec<JsonNode>,
}

/// The result of parsing a document.
#[derive(Debug, Clone)]
pub struct Tree {
    root: Node,
    source: String,
    language: Language,
}

impl Tree {
    pub(crate) fn new(root: Node, source: String, language: Language) -> Self {
        Self {
            root,
            source,
            language,
        }
    }

    /// The `document` node spanning the whole input.
    #[must_use]
    pub fn root_node(&self) -> &Node {
        &self.root
    }

    /// The parsed text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The language the tree was parsed with.
    #[must_use]
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Returns `true` if the tree contains error or missing nodes.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.root.has_error()
    }

    /// The root node as an s-expression.
    #[must_use]
    pub fn to_sexp(&self) -> String {
        self.root.to_sexp()
    }

    /// The whole tree as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        facet_json::to_string(&self.root.to_json_node(&self.source))
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        // take the nodes apart one level at a time instead of recursing
        let mut nodes = std::mem::take(&mut self.root.children);
        while let Some(mut node) = nodes.pop() {
            nodes.append(&mut node.children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::language;

    fn span(start: usize, end: usize) -> Span {
        Span {
            start_byte: start,
            end_byte: end,
            start: Point::new(0, start),
            end: Point::new(0, end),
        }
    }

    fn sample() -> Node {
        let title = Node::branch("title", span(2, 7), vec![Node::leaf("word", span(2, 7))])
            .with_field("title");
        let heading = Node::branch(
            "heading",
            span(0, 7),
            vec![
                Node::leaf("stars", span(0, 1)),
                Node::anonymous("COMMENT", span(1, 1)),
                title,
            ],
        );
        Node::branch("document", span(0, 7), vec![heading])
    }

    #[test]
    fn test_sexp_skips_anonymous_nodes() {
        assert_eq!(
            sample().to_sexp(),
            "(document (heading (stars) title: (title (word))))"
        );
    }

    #[test]
    fn test_sexp_prints_missing_nodes() {
        let block = Node::branch(
            "drawer",
            span(0, 5),
            vec![
                Node::leaf("drawer_name", span(0, 5)),
                Node::missing("drawer_end", true, span(5, 5)),
                Node::missing("#+end:", false, span(5, 5)),
            ],
        );
        assert_eq!(
            block.to_sexp(),
            "(drawer (drawer_name) (MISSING drawer_end) (MISSING \"#+end:\"))"
        );
        assert!(block.has_error());
        assert!(!sample().has_error());
    }

    #[test]
    fn test_walk_is_pre_order() {
        let kinds: Vec<_> = sample().walk().map(Node::kind).collect();
        assert_eq!(
            kinds,
            ["document", "heading", "stars", "COMMENT", "title", "word"]
        );
    }

    #[test]
    fn test_field_lookup_and_text() {
        let root = sample();
        let heading = root.child(0).unwrap();
        let title = heading.child_by_field_name("title").unwrap();
        assert_eq!(title.kind(), "title");
        assert_eq!(title.utf8_text("* Hello"), "Hello");
        assert!(heading.child_by_field_name("tags").is_none());
        assert_eq!(heading.child_count(), 3);
        assert_eq!(heading.named_child_count(), 2);
    }

    #[test]
    fn test_field_lookup_outlives_the_name() {
        let root = sample();
        let heading = root.child(0).unwrap();
        let title = {
            let name = String::from("title");
            heading.child_by_field_name(&name)
        };
        assert_eq!(title.map(Node::kind), Some("title"));
        assert_eq!(heading.children_by_field_name("title").count(), 1);
    }

    fn nested(depth: usize) -> Node {
        let mut node = Node::leaf("word", span(0, 1));
        for _ in 0..depth {
            node = Node::branch("bold", span(0, 1), vec![node]);
        }
        node
    }

    #[test]
    fn test_deep_trees_render_iteratively() {
        let tree = Tree::new(nested(100_000), "x".to_owned(), language().unwrap());
        assert!(!tree.has_error());
        let sexp = tree.to_sexp();
        assert!(sexp.starts_with("(bold (bold (bold"));
        assert!(sexp.ends_with("(word)))))"));
        assert_eq!(sexp.matches('(').count(), 100_001);
    }

    #[test]
    fn test_json_node_keeps_nesting() {
        let json = nested(1_000).to_json_node("x");
        let mut depth = 0;
        let mut node = &json;
        while let Some(child) = node.children.first() {
            depth += 1;
            node = child;
        }
        assert_eq!(depth, 1_000);
        assert_eq!(node.text.as_deref(), Some("x"));
    }

    #[test]
    fn test_json_node_carries_leaf_text() {
        let json = sample().to_json_node("* Hello");
        let word = &json.children[0].children[2].children[0];
        assert_eq!(word.kind, "word");
        assert_eq!(word.text.as_deref(), Some("Hello"));
        assert_eq!(json.text, None);
        assert_eq!(json.children[0].children[2].field.as_deref(), Some("title"));
    }
}
