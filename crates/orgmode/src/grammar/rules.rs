//! Core types for representing Tree-sitter grammar rules.
//!
//! This module contains the types used to model grammar rules and their
//! structure according to the Tree-sitter JSON schema, along with a set of
//! constructors that mirror the `grammar.js` DSL (`seq`, `choice`, `field`...)
//! so grammars can be written directly in Rust.

use serde::{Deserialize, Serialize};

/// Represents a grammar rule in the Tree-sitter format.
///
/// Each rule corresponds to a node in the grammar's rule graph, identified by a
/// [`RuleType`] and containing type-specific fields such as `members` or
/// `content`.
///
/// A `Rule` can be atomic (like a literal or regex) or composite
/// (like a sequence, choice, or precedence group). Together, they
/// form a self-describing syntax graph. Absent fields are left out when the
/// rule is written back to JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// The discriminant identifying what kind of rule this is.
    #[serde(rename = "type")]
    pub rule_type: RuleType,

    /// Optional literal or numeric value, depending on rule kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RuleValue>,

    /// Optional name used by `SYMBOL`, `FIELD`, or `ALIAS` rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional nested rule for unary constructs such as `REPEAT` or `PREC`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Box<Rule>>,

    /// List of child rules for compound constructs (`SEQ`, `CHOICE`, etc.).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<Rule>,

    /// Whether the node produced by this rule is named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named: Option<bool>,

    /// Regex flags of a `PATTERN` rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,

    /// Optional context label used for reserved-word handling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_name: Option<String>,
}

/// A literal or numeric value attached to a rule node.
///
/// `RuleValue` abstracts small scalar payloads that alter how a rule behaves,
/// such as precedence numbers or literal match text. In JSON it is a bare
/// string or integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    /// A string literal value (e.g. `"TODO"`, `"#+begin:"`).
    String(String),

    /// An integer numeric value (used by precedence modifiers).
    Integer(i32),
}

/// The enumeration of all recognized Tree-sitter rule types.
///
/// Each variant corresponds to one of the `type` strings found in the JSON
/// grammar format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// An empty production.
    Blank,
    /// A literal string token.
    String,
    /// A regular-expression pattern token.
    Pattern,
    /// A reference to another named rule.
    Symbol,
    /// A rule that matches one of several alternatives.
    Choice,
    /// A sequential composition of member rules.
    Seq,
    /// A zero-or-more repetition of a rule.
    Repeat,
    /// A one-or-more repetition of a rule.
    #[serde(rename = "REPEAT1")]
    Repeat1,
    /// A generic precedence wrapper.
    Prec,
    /// A left-associative precedence wrapper.
    PrecLeft,
    /// A right-associative precedence wrapper.
    PrecRight,
    /// A dynamic (runtime) precedence wrapper.
    PrecDynamic,
    /// A named field applied to a subrule.
    Field,
    /// An alias providing an alternate node name.
    Alias,
    /// A tokenization wrapper.
    Token,
    /// A token that must appear immediately without leading trivia.
    ImmediateToken,
    /// A reserved internal placeholder.
    Reserved,
}

impl Rule {
    fn new(rule_type: RuleType) -> Self {
        Self {
            rule_type,
            value: None,
            name: None,
            content: None,
            members: Vec::new(),
            named: None,
            flags: None,
            context_name: None,
        }
    }

    fn wrap(rule_type: RuleType, content: Rule) -> Self {
        Self {
            content: Some(Box::new(content)),
            ..Self::new(rule_type)
        }
    }

    /// Returns the canonical string name of this rule type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self.rule_type {
            RuleType::Blank => "BLANK",
            RuleType::String => "STRING",
            RuleType::Pattern => "PATTERN",
            RuleType::Symbol => "SYMBOL",
            RuleType::Choice => "CHOICE",
            RuleType::Seq => "SEQ",
            RuleType::Repeat => "REPEAT",
            RuleType::Repeat1 => "REPEAT1",
            RuleType::Prec => "PREC",
            RuleType::PrecLeft => "PREC_LEFT",
            RuleType::PrecRight => "PREC_RIGHT",
            RuleType::PrecDynamic => "PREC_DYNAMIC",
            RuleType::Field => "FIELD",
            RuleType::Alias => "ALIAS",
            RuleType::Token => "TOKEN",
            RuleType::ImmediateToken => "IMMEDIATE_TOKEN",
            RuleType::Reserved => "RESERVED",
        }
    }

    /// Returns `true` if this rule represents a terminal (lexical) token.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.rule_type, RuleType::String | RuleType::Pattern)
    }

    /// Returns `true` if this rule is a symbol reference.
    #[must_use]
    pub fn is_symbol(&self) -> bool {
        matches!(self.rule_type, RuleType::Symbol)
    }

    /// Returns the referenced symbol name, if applicable.
    #[must_use]
    pub fn symbol_name(&self) -> Option<&str> {
        if self.is_symbol() {
            self.name.as_deref()
        } else {
            None
        }
    }

    /// Returns the numeric precedence value if this rule is a precedence wrapper.
    #[must_use]
    pub fn precedence(&self) -> Option<i32> {
        match self.rule_type {
            RuleType::Prec | RuleType::PrecLeft | RuleType::PrecRight | RuleType::PrecDynamic => {
                self.value.as_ref().and_then(|v| match v {
                    RuleValue::Integer(i) => Some(*i),
                    RuleValue::String(_) => None,
                })
            }
            _ => None,
        }
    }

    /// Returns the literal string value if this is a `STRING` rule.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        if matches!(self.rule_type, RuleType::String) {
            self.value.as_ref().and_then(|v| match v {
                RuleValue::String(s) => Some(s.as_str()),
                RuleValue::Integer(_) => None,
            })
        } else {
            None
        }
    }

    /// Returns the pattern source if this is a `PATTERN` rule.
    #[must_use]
    pub fn pattern_value(&self) -> Option<&str> {
        if matches!(self.rule_type, RuleType::Pattern) {
            self.value.as_ref().and_then(|v| match v {
                RuleValue::String(s) => Some(s.as_str()),
                RuleValue::Integer(_) => None,
            })
        } else {
            None
        }
    }

    /// Returns the direct sub-rules of this rule, whether stored as
    /// `members` or as a single `content`.
    pub fn children(&self) -> impl Iterator<Item = &Rule> {
        self.members.iter().chain(self.content.as_deref())
    }
}

/// The empty production.
#[must_use]
pub fn blank() -> Rule {
    Rule::new(RuleType::Blank)
}

/// A literal token such as `"TODO"`.
#[must_use]
pub fn string(value: &str) -> Rule {
    Rule {
        value: Some(RuleValue::String(value.to_owned())),
        ..Rule::new(RuleType::String)
    }
}

/// A regular-expression token such as `/[^\n]+/`.
#[must_use]
pub fn pattern(value: &str) -> Rule {
    Rule {
        value: Some(RuleValue::String(value.to_owned())),
        ..Rule::new(RuleType::Pattern)
    }
}

/// A reference to the rule or external token called `name`.
#[must_use]
pub fn symbol(name: &str) -> Rule {
    Rule {
        name: Some(name.to_owned()),
        ..Rule::new(RuleType::Symbol)
    }
}

/// Every member, in order.
#[must_use]
pub fn seq(members: impl IntoIterator<Item = Rule>) -> Rule {
    Rule {
        members: members.into_iter().collect(),
        ..Rule::new(RuleType::Seq)
    }
}

/// Exactly one of the members.
#[must_use]
pub fn choice(members: impl IntoIterator<Item = Rule>) -> Rule {
    Rule {
        members: members.into_iter().collect(),
        ..Rule::new(RuleType::Choice)
    }
}

/// `choice(rule, blank)`, exactly as `tree-sitter generate` lowers it.
#[must_use]
pub fn optional(rule: Rule) -> Rule {
    choice([rule, blank()])
}

/// Zero or more repetitions.
#[must_use]
pub fn repeat(rule: Rule) -> Rule {
    Rule::wrap(RuleType::Repeat, rule)
}

/// One or more repetitions.
#[must_use]
pub fn repeat1(rule: Rule) -> Rule {
    Rule::wrap(RuleType::Repeat1, rule)
}

/// Names the child produced by `rule` as `name`.
#[must_use]
pub fn field(name: &str, rule: Rule) -> Rule {
    Rule {
        name: Some(name.to_owned()),
        ..Rule::wrap(RuleType::Field, rule)
    }
}

/// Renames the node produced by `rule`. The new name is stored as the
/// rule's `value`, as in `grammar.json`.
#[must_use]
pub fn alias(rule: Rule, name: &str, named: bool) -> Rule {
    Rule {
        value: Some(RuleValue::String(name.to_owned())),
        named: Some(named),
        ..Rule::wrap(RuleType::Alias, rule)
    }
}

/// Plain precedence.
#[must_use]
pub fn prec(level: i32, rule: Rule) -> Rule {
    Rule {
        value: Some(RuleValue::Integer(level)),
        ..Rule::wrap(RuleType::Prec, rule)
    }
}

/// Left-associative precedence.
#[must_use]
pub fn prec_left(level: i32, rule: Rule) -> Rule {
    Rule {
        value: Some(RuleValue::Integer(level)),
        ..Rule::wrap(RuleType::PrecLeft, rule)
    }
}

/// Right-associative precedence.
#[must_use]
pub fn prec_right(level: i32, rule: Rule) -> Rule {
    Rule {
        value: Some(RuleValue::Integer(level)),
        ..Rule::wrap(RuleType::PrecRight, rule)
    }
}

/// Collapses `rule` into a single token.
#[must_use]
pub fn token(rule: Rule) -> Rule {
    Rule::wrap(RuleType::Token, rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_rule() {
        let json = r#"{
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
        }"#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert!(matches!(rule.rule_type, RuleType::Choice));
        assert_eq!(rule.members.len(), 2);
        assert_eq!(rule.members[0].string_value(), Some("TODO"));
        assert_eq!(rule.members[1].pattern_value(), Some("[0-9]+"));
    }

    #[test]
    fn test_parse_precedence() {
        let json = r#"{
            "type": "PREC_LEFT",
            "value": 1,
            "content": {
                "type": "SEQ",
                "members": [
                    {"type": "SYMBOL", "name": "stars"},
                    {"type": "STRING", "value": "COMMENT"},
                    {"type": "SYMBOL", "name": "title"}
                ]
            }
        }"#;

        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.precedence(), Some(1));
        assert!(matches!(rule.rule_type, RuleType::PrecLeft));
    }

    #[test]
    fn test_values_are_bare_scalars() {
        let json = serde_json::to_string(&prec_left(2, string("COMMENT"))).unwrap();
        assert_eq!(
            json,
            r#"{"type":"PREC_LEFT","value":2,"content":{"type":"STRING","value":"COMMENT"}}"#
        );

        let rule: Rule = serde_json::from_str(r#"{"type": "PATTERN", "value": "[0-9]+", "flags": "i"}"#).unwrap();
        assert_eq!(rule.value, Some(RuleValue::String("[0-9]+".to_owned())));
        assert_eq!(rule.flags.as_deref(), Some("i"));
    }

    #[test]
    fn test_constructors_match_generated_shape() {
        let rule = optional(field("title", symbol("title")));
        assert_eq!(rule.type_name(), "CHOICE");
        assert_eq!(rule.members.len(), 2);
        assert_eq!(rule.members[1].type_name(), "BLANK");

        let field_rule = &rule.members[0];
        assert_eq!(field_rule.name.as_deref(), Some("title"));
        assert_eq!(
            field_rule.content.as_deref().and_then(Rule::symbol_name),
            Some("title")
        );
    }

    #[test]
    fn test_children_covers_members_and_content() {
        assert_eq!(seq([symbol("a"), symbol("b")]).children().count(), 2);
        assert_eq!(repeat(symbol("a")).children().count(), 1);
        assert_eq!(string("x").children().count(), 0);
    }

    #[test]
    fn test_alias_and_precedence_accessors() {
        let rule = prec(1, alias(symbol("_word"), "word", true));
        assert_eq!(rule.precedence(), Some(1));
        let inner = rule.content.as_deref().unwrap();
        assert_eq!(inner.named, Some(true));
        assert_eq!(inner.value, Some(RuleValue::String("word".to_owned())));
        assert!(inner.precedence().is_none());
        assert!(!inner.is_terminal());
        assert!(string("[ ]").is_terminal());
    }
}
