//! A Rust-native Org-mode grammar.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::multiple_crate_versions)]

/// Core structures and parsing logic for Tree-sitter grammars.
///
/// This module defines the declarative shape of the language: the grammar
/// JSON model, the rule constructors, and the Org grammar written with them.
/// Everything else builds upon these types.
pub mod grammar;

/// Grammar validation and consistency checking utilities.
///
/// Validation protects the language handle from malformed grammars. It
/// enforces Tree-sitter's invariants and ensures that what's loaded is also
/// semantically meaningful.
pub mod validate;

/// The loadable language handle and its symbol tables.
pub mod language;

/// Character cursor shared by the scanner and the parser.
pub mod lexer;

/// The external scanner for Org's context-sensitive tokens.
pub mod scanner;

/// Recursive-descent parser producing [`Tree`]s.
pub mod parser;

/// Concrete syntax trees.
pub mod tree;

pub use grammar::{parse_grammar, Grammar, GrammarError, Rule};
pub use language::{language, Language, LanguageError, LANGUAGE_VERSION};
pub use lexer::{Point, Span};
pub use parser::{ParseError, Parser};
pub use tree::{JsonNode, Node, Tree};
pub use validate::{validate, ValidationError};
