//! Loading the bundled grammar, the way editor bindings do it.

use orgmode::{language, Parser, LANGUAGE_VERSION};

#[test]
fn test_can_load_grammar() {
    let language = language().expect("Error loading org mode grammar");
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .expect("Error loading org mode grammar");
    assert_eq!(language.version(), LANGUAGE_VERSION);
}

#[test]
fn test_loading_twice_gives_the_same_language() {
    assert_eq!(language().unwrap(), language().unwrap());
}

#[test]
fn test_parse_sample_document() {
    let text = "\
#+TITLE: Notes

* TODO [#B] Plan the week :work:
:PROPERTIES:
:CREATED: 2024-01-01
:END:
- [ ] write the *report*
- [X] read ~mail~
  1. inbox
  2. archive

** DONE Review
#+begin_src sh
ls -la
#+end_src
";
    let mut parser = Parser::new();
    parser.set_language(&language().unwrap()).unwrap();
    let tree = parser.parse(text).unwrap();

    assert!(!tree.has_error(), "{}", tree.to_sexp());
    let root = tree.root_node();
    assert_eq!(root.kind(), "document");
    assert_eq!(root.end_byte(), text.len());

    let kinds: Vec<_> = root.walk().map(|n| n.kind()).collect();
    for kind in [
        "body", "section", "heading", "keyword", "priority", "tags", "drawer", "node_property",
        "list", "checkbox", "bold", "code", "greater_block", "block_content",
    ] {
        assert!(kinds.contains(&kind), "no {kind} in {}", tree.to_sexp());
    }

    let subsection = root
        .walk()
        .find(|n| n.field_name() == Some("subsection"))
        .unwrap();
    let title = subsection
        .child(0)
        .and_then(|h| h.child_by_field_name("title"))
        .unwrap();
    assert_eq!(title.utf8_text(text), "Review");
}
