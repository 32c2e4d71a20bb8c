//! Core structures and parsing logic for Tree-sitter grammars.
//!
//! This module defines the internal representation of a grammar as parsed from
//! Tree-sitter's JSON format. It uses [`serde_json`] for (de)serialization and
//! provides ergonomic accessors for inspecting rule properties and structure.
//! The bundled Org grammar itself lives in [`orgmode`].

pub mod orgmode;
pub mod rules;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use rules::{Rule, RuleType, RuleValue};

/// Represents a full Tree-sitter grammar definition.
///
/// This structure directly mirrors the serialized JSON format produced by
/// `tree-sitter generate` (`src/grammar.json`). It captures the complete rule
/// set along with auxiliary metadata such as precedences, conflicts, and
/// supertypes.
///
/// See <https://tree-sitter.github.io/tree-sitter/assets/schemas/grammar.schema.json>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    /// Optional `$schema` field from the JSON, typically used for schema
    /// validation or editor integration.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// The short name of the grammar (e.g. `"orgmode"`).
    pub name: String,

    /// Optional name of a base grammar that this one inherits from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,

    /// Map of all rule identifiers to their corresponding definitions.
    pub rules: HashMap<String, Rule>,

    /// “Extras” that may appear between other tokens, such as whitespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extras: Option<Vec<Rule>>,

    /// Rules implemented externally via a scanner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub externals: Option<Vec<Rule>>,

    /// Names of rules that should be inlined into other rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<Vec<String>>,

    /// Precedence declarations that control operator binding order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedences: Option<Vec<Vec<Rule>>>,

    /// Explicit conflict groups expected during parsing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<Vec<String>>>,

    /// Context-specific reserved word definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<HashMap<String, Vec<Rule>>>,

    /// The special rule name used to identify word tokens (keywords, identifiers, etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,

    /// A list of node supertypes, grouping related syntactic forms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supertypes: Option<Vec<String>>,
}

/// Parse a JSON grammar definition into a strongly typed [`Grammar`] structure.
///
/// # Errors
///
/// Returns [`GrammarError::JsonParse`] if the provided string is not valid JSON
/// or fails schema deserialization.
pub fn parse_grammar(json: &str) -> Result<Grammar, GrammarError> {
    serde_json::from_str(json).map_err(|e| GrammarError::JsonParse(e.to_string()))
}

/// Possible errors raised during grammar parsing or validation.
#[derive(Debug, Clone, Error)]
pub enum GrammarError {
    /// The input JSON was syntactically invalid or structurally mismatched.
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Higher-level structural or semantic validation failure.
    #[error("validation error: {0}")]
    Validation(String),
}

impl Grammar {
    /// Serializes the grammar back into Tree-sitter's JSON format.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Names of the externally scanned tokens, in declaration order.
    ///
    /// The order matters: it is the index space of the external scanner's
    /// token types.
    #[must_use]
    pub fn external_names(&self) -> Vec<&str> {
        self.externals
            .iter()
            .flatten()
            .filter_map(Rule::symbol_name)
            .collect()
    }

    /// Returns `true` if `name` is declared as an external token.
    #[must_use]
    pub fn is_external(&self, name: &str) -> bool {
        self.external_names().contains(&name)
    }

    /// Returns `true` if `name` is declared as a supertype.
    #[must_use]
    pub fn is_supertype(&self, name: &str) -> bool {
        self.supertypes
            .as_ref()
            .is_some_and(|s| s.iter().any(|n| n == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_grammar() {
        let json = r#"{
            "name": "test",
            "rules": {
                "document": {
                    "type": "SYMBOL",
                    "name": "heading"
                },
                "heading": {
                    "type": "CHOICE",
                    "members": [
                        {
                            "type": "STRING",
                            "value": "TODO"
                        },
                        {
                            "type": "PATTERN",
                            "value": "[0-9]+"
                        }
                    ]
                }
            }
        }"#;

        let grammar = parse_grammar(json).unwrap();
        assert_eq!(grammar.name, "test");
        assert_eq!(grammar.rules.len(), 2);
        assert!(grammar.external_names().is_empty());
    }

    #[test]
    fn test_parse_externals_and_supertypes() {
        let json = r#"{
            "name": "test",
            "rules": {
                "document": {"type": "SYMBOL", "name": "stars"}
            },
            "externals": [
                {"type": "SYMBOL", "name": "stars"},
                {"type": "SYMBOL", "name": "_end_section"}
            ],
            "supertypes": ["document"]
        }"#;

        let grammar = parse_grammar(json).unwrap();
        assert_eq!(grammar.external_names(), vec!["stars", "_end_section"]);
        assert!(grammar.is_external("stars"));
        assert!(!grammar.is_external("document"));
        assert!(grammar.is_supertype("document"));
    }

    /// Trimmed output of `tree-sitter generate` for a small Org grammar.
    const GENERATED: &str = r#"{
  "$schema": "https://tree-sitter.github.io/tree-sitter/assets/schemas/grammar.schema.json",
  "name": "orgmode",
  "rules": {
    "document": {
      "type": "SEQ",
      "members": [
        {"type": "CHOICE", "members": [{"type": "SYMBOL", "name": "body"}, {"type": "BLANK"}]},
        {"type": "REPEAT", "content": {"type": "SYMBOL", "name": "section"}}
      ]
    },
    "body": {"type": "REPEAT1", "content": {"type": "SYMBOL", "name": "word"}},
    "section": {
      "type": "PREC_LEFT",
      "value": 1,
      "content": {
        "type": "SEQ",
        "members": [
          {"type": "SYMBOL", "name": "stars"},
          {"type": "CHOICE", "members": [{"type": "STRING", "value": "TODO"}, {"type": "STRING", "value": "DONE"}]},
          {
            "type": "FIELD",
            "name": "title",
            "content": {"type": "ALIAS", "content": {"type": "SYMBOL", "name": "body"}, "named": true, "value": "title"}
          }
        ]
      }
    }
  },
  "extras": [{"type": "PATTERN", "value": "[ \\t]"}],
  "conflicts": [],
  "precedences": [],
  "externals": [{"type": "SYMBOL", "name": "stars"}, {"type": "SYMBOL", "name": "word"}],
  "inline": [],
  "supertypes": [],
  "reserved": {}
}"#;

    #[test]
    fn test_parse_generated_grammar_json() {
        let grammar = parse_grammar(GENERATED).unwrap();
        assert_eq!(grammar.rules.len(), 3);
        assert_eq!(grammar.rule("section").unwrap().precedence(), Some(1));
        assert_eq!(grammar.external_names(), vec!["stars", "word"]);

        let extras = grammar.extras.as_ref().unwrap();
        assert_eq!(extras[0].pattern_value(), Some("[ \\t]"));
    }

    #[test]
    fn test_to_json_writes_grammar_json() {
        let grammar = parse_grammar(GENERATED).unwrap();
        let json = grammar.to_json();

        assert!(json.contains(r#"{"type":"STRING","value":"TODO"}"#));
        assert!(json.contains(r#""type":"PREC_LEFT","value":1,"#));
        assert!(json.contains(r#"{"type":"BLANK"}"#));
        assert!(json.contains(r#""$schema":"#));
        assert!(!json.contains("null"));
        assert!(!json.contains(r#""members":[]"#));
        assert!(!json.contains("inherits"));
        assert_eq!(parse_grammar(&json).unwrap(), grammar);
    }

    #[test]
    fn test_bundled_grammar_round_trips() {
        let grammar = orgmode::orgmode_grammar();
        let json = grammar.to_json();
        assert!(json.contains(r#""value":"TODO""#));
        assert!(!json.contains("null"));
        assert_eq!(parse_grammar(&json).unwrap(), grammar);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = parse_grammar("{ not json").unwrap_err();
        assert!(matches!(err, GrammarError::JsonParse(_)));
        assert!(err.to_string().starts_with("JSON parse error"));
    }
}
