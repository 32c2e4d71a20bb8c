//! The Org-mode grammar, written with the rule constructors from
//! [`rules`](super::rules).
//!
//! Rule names starting with `_` are hidden: they never appear as nodes in a
//! syntax tree. The external tokens are produced by
//! [`Scanner`](crate::scanner::Scanner) and are listed in the same order as
//! [`TokenType`](crate::scanner::TokenType).

use std::collections::HashMap;

use super::rules::{
    alias, choice, field, optional, pattern, prec, prec_left, repeat, repeat1, seq, string,
    symbol, token, Rule,
};
use super::Grammar;

/// Name of the bundled grammar.
pub const GRAMMAR_NAME: &str = "orgmode";

/// The rule every document is parsed from.
pub const START_RULE: &str = "document";

/// External tokens, in scanner order.
pub const EXTERNALS: [&str; 26] = [
    "_block_begin_marker",
    "_block_end_marker",
    "block_begin_name",
    "block_end_name",
    "drawer_name",
    "drawer_end",
    "property_name",
    "stars",
    "_end_section",
    "bullet",
    "_list_start",
    "_list_end",
    "_bold_start",
    "_bold_end",
    "_italic_start",
    "_italic_end",
    "_underline_start",
    "_underline_end",
    "_verbatim_start",
    "_verbatim_end",
    "_code_start",
    "_code_end",
    "_strikethrough_start",
    "_strikethrough_end",
    "word",
    "error_sentinel",
];

/// Inline markup kinds with their delimiting external tokens.
const MARKUP: [(&str, &str, &str); 6] = [
    ("bold", "_bold_start", "_bold_end"),
    ("italic", "_italic_start", "_italic_end"),
    ("underline", "_underline_start", "_underline_end"),
    ("verbatim", "_verbatim_start", "_verbatim_end"),
    ("code", "_code_start", "_code_end"),
    ("strikethrough", "_strikethrough_start", "_strikethrough_end"),
];

fn elements(alias_name: &str) -> Rule {
    alias(repeat(symbol("element")), alias_name, true)
}

fn params() -> Rule {
    optional(seq([symbol("_space"), field("params", symbol("value"))]))
}

/// Builds the Org-mode grammar.
#[must_use]
pub fn orgmode_grammar() -> Grammar {
    let mut rules: HashMap<String, Rule> = HashMap::new();
    let mut def = |name: &str, rule: Rule| {
        rules.insert(name.to_owned(), rule);
    };

    def(
        "document",
        seq([optional(symbol("body")), repeat(symbol("section"))]),
    );

    def(
        "element",
        choice([
            symbol("greater_block"),
            symbol("dynamic_block"),
            symbol("drawer"),
            symbol("node_property"),
            symbol("list"),
            symbol("object"),
            symbol("_blank_line"),
        ]),
    );

    def("body", prec_left(0, repeat1(symbol("element"))));

    def(
        "section",
        seq([
            symbol("heading"),
            optional(symbol("body")),
            repeat(field("subsection", symbol("section"))),
            symbol("_end_section"),
        ]),
    );

    def(
        "heading",
        prec_left(
            0,
            seq([
                symbol("stars"),
                symbol("_space"),
                optional(symbol("keyword")),
                optional(symbol("priority")),
                optional(string("COMMENT")),
                optional(field("title", symbol("title"))),
                optional(field("tags", symbol("tags"))),
                repeat1(symbol("_blank_line")),
            ]),
        ),
    );

    def("keyword", choice([string("TODO"), string("DONE")]));
    def("priority", pattern(r"\[#[a-zA-Z0-9]\]"));
    def("title", repeat1(symbol("object")));
    def(
        "tags",
        seq([string(":"), repeat1(seq([symbol("tag"), string(":")]))]),
    );
    def("tag", pattern(r"[\w@#%]+"));

    def("value", pattern(r"[^\n]+"));

    def(
        "greater_block",
        seq([
            symbol("_block_begin_marker"),
            symbol("block_begin_name"),
            params(),
            symbol("_blank_line"),
            optional(field(
                "body",
                choice([symbol("body"), symbol("block_content")]),
            )),
            symbol("_block_end_marker"),
            symbol("block_end_name"),
        ]),
    );

    def("block_content", token(repeat1(pattern(r"[^\n]*\r?\n"))));

    def(
        "dynamic_block",
        seq([
            string("#+begin:"),
            symbol("block_begin_name"),
            params(),
            symbol("_blank_line"),
            field("contents", elements("contents")),
            string("#+end:"),
            optional(symbol("block_end_name")),
        ]),
    );

    def(
        "drawer",
        seq([
            symbol("drawer_name"),
            symbol("_blank_line"),
            field("contents", elements("contents")),
            symbol("drawer_end"),
        ]),
    );

    def(
        "node_property",
        prec(
            1,
            seq([
                field("name", symbol("property_name")),
                optional(seq([symbol("_space"), field("value", symbol("value"))])),
            ]),
        ),
    );

    def(
        "list",
        prec_left(
            0,
            seq([
                symbol("_list_start"),
                repeat(symbol("list_item")),
                symbol("_list_end"),
            ]),
        ),
    );

    def(
        "list_item",
        prec(
            1,
            seq([
                symbol("bullet"),
                optional(field("checkbox", symbol("checkbox"))),
                field("content", elements("content")),
            ]),
        ),
    );

    def(
        "checkbox",
        choice([string("[ ]"), string("[-]"), string("[X]")]),
    );

    let mut objects = vec![symbol("word")];
    for (name, start, end) in MARKUP {
        objects.push(symbol(name));
        def(
            name,
            seq([symbol(start), repeat1(symbol("object")), symbol(end)]),
        );
    }
    def("object", choice(objects));

    def("_blank_line", pattern(r"\r?\n[ \t]*"));
    def("_space", pattern(r"[ \t]+"));

    Grammar {
        schema: Some(
            "https://tree-sitter.github.io/tree-sitter/assets/schemas/grammar.schema.json"
                .to_owned(),
        ),
        name: GRAMMAR_NAME.to_owned(),
        inherits: None,
        rules,
        extras: Some(vec![pattern(r"[ \t]+")]),
        externals: Some(EXTERNALS.into_iter().map(symbol).collect()),
        inline: None,
        precedences: None,
        conflicts: None,
        reserved: None,
        word: None,
        supertypes: Some(vec!["element".to_owned(), "object".to_owned()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    #[test]
    fn test_bundled_grammar_validates() {
        let grammar = orgmode_grammar();
        assert!(validate(&grammar, START_RULE).is_ok());
    }

    #[test]
    fn test_externals_follow_scanner_order() {
        let grammar = orgmode_grammar();
        let names = grammar.external_names();
        assert_eq!(names.len(), EXTERNALS.len());
        assert_eq!(names[7], "stars");
        assert_eq!(names[24], "word");
    }

    #[test]
    fn test_every_markup_kind_is_an_object() {
        let grammar = orgmode_grammar();
        let object = grammar.rule("object").unwrap();
        let names: Vec<_> = object.members.iter().filter_map(Rule::symbol_name).collect();
        for (name, _, _) in MARKUP {
            assert!(names.contains(&name), "{name} missing from object");
            assert!(grammar.rule(name).is_some());
        }
    }

    #[test]
    fn test_heading_is_left_associative() {
        let grammar = orgmode_grammar();
        let heading = grammar.rule("heading").unwrap();
        assert_eq!(heading.type_name(), "PREC_LEFT");
        assert_eq!(heading.precedence(), Some(0));
    }
}
