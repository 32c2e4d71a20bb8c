//! Validation routines for Tree-sitter grammars.
//!
//! This module performs structural checks over [`Grammar`](crate::grammar::Grammar)
//! definitions, such as verifying symbol references, ensuring all rules are
//! reachable from the start rule, detecting left recursion, and confirming
//! precedence consistency. It runs every time the bundled language is loaded
//! and backs the `orgmode check-grammar` command.

use crate::grammar::{Grammar, Rule, RuleType};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Represents a validation failure encountered when checking a grammar.
///
/// Validation errors indicate issues such as undefined symbols or supertypes
/// that do not name a rule.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ValidationError {
    /// The descriptive human-readable error message.
    pub message: String,
}

impl ValidationError {
    /// Creates a new [`ValidationError`] from a message string.
    fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Performs semantic validation of a [`Grammar`](crate::grammar::Grammar),
/// treating `start` as its entry rule.
///
/// This function runs several consistency passes over the grammar:
///
/// - Checks that all referenced symbols are defined rules or external tokens.
/// - Checks that every supertype names a defined rule.
/// - Warns about rules unreachable from `start`.
/// - Reports immediate left recursion.
/// - Verifies precedence consistency.
///
/// # Errors
///
/// Returns a [`ValidationError`] if any structural rule violation is detected.
pub fn validate(grammar: &Grammar, start: &str) -> Result<(), ValidationError> {
    check_undefined_symbols(grammar)?;

    check_supertypes(grammar)?;

    check_unreachable_rules(grammar, start)?;

    check_left_recursion(grammar);

    check_precedence(grammar);

    Ok(())
}

fn check_undefined_symbols(grammar: &Grammar) -> Result<(), ValidationError> {
    let mut defined: HashSet<&str> = grammar.rules.keys().map(String::as_str).collect();
    defined.extend(grammar.external_names());

    for (rule_name, rule) in &grammar.rules {
        check_rule_symbols(rule, &defined, rule_name)?;
    }

    for extra in grammar.extras.iter().flatten() {
        check_rule_symbols(extra, &defined, "extras")?;
    }

    Ok(())
}

fn check_rule_symbols(
    rule: &Rule,
    defined: &HashSet<&str>,
    context: &str,
) -> Result<(), ValidationError> {
    match rule.rule_type {
        RuleType::Symbol => {
            if let Some(name) = &rule.name {
                if !defined.contains(name.as_str()) {
                    return Err(ValidationError::new(format!(
                        "undefined symbol '{name}' referenced in rule '{context}'"
                    )));
                }
            }
        }

        RuleType::Choice | RuleType::Seq => {
            for member in &rule.members {
                check_rule_symbols(member, defined, context)?;
            }
        }

        RuleType::Repeat
        | RuleType::Repeat1
        | RuleType::Prec
        | RuleType::PrecLeft
        | RuleType::PrecRight
        | RuleType::PrecDynamic
        | RuleType::Field
        | RuleType::Alias
        | RuleType::Token
        | RuleType::ImmediateToken => {
            if let Some(content) = &rule.content {
                check_rule_symbols(content, defined, context)?;
            }
        }

        RuleType::Blank | RuleType::String | RuleType::Pattern | RuleType::Reserved => {
            // terminals: nothing to traverse
        }
    }
    Ok(())
}

fn check_supertypes(grammar: &Grammar) -> Result<(), ValidationError> {
    for name in grammar.supertypes.iter().flatten() {
        if !grammar.rules.contains_key(name) {
            return Err(ValidationError::new(format!(
                "supertype '{name}' is not a defined rule"
            )));
        }
    }
    Ok(())
}

fn check_unreachable_rules(grammar: &Grammar, start: &str) -> Result<(), ValidationError> {
    if !grammar.rules.contains_key(start) {
        return Err(ValidationError::new(format!(
            "start rule '{start}' is not defined"
        )));
    }

    let mut reachable = HashSet::new();
    let mut to_visit = vec![start.to_owned()];
    for extra in grammar.extras.iter().flatten() {
        collect_referenced_symbols(extra, &mut to_visit);
    }

    while let Some(rule_name) = to_visit.pop() {
        if !reachable.insert(rule_name.clone()) {
            continue; // Already visited
        }

        if let Some(rule) = grammar.rules.get(&rule_name) {
            collect_referenced_symbols(rule, &mut to_visit);
        }
    }

    for rule_name in grammar.rules.keys() {
        let inline_contains = grammar
            .inline
            .as_ref()
            .is_some_and(|v| v.contains(rule_name));

        if !reachable.contains(rule_name) && !inline_contains {
            log::warn!("unreachable rule '{rule_name}' in grammar '{}'", grammar.name);
        }
    }

    Ok(())
}

fn collect_referenced_symbols(rule: &Rule, symbols: &mut Vec<String>) {
    if let Some(name) = rule.symbol_name() {
        symbols.push(name.to_owned());
    }
    for child in rule.children() {
        collect_referenced_symbols(child, symbols);
    }
}

fn check_left_recursion(grammar: &Grammar) {
    // Left recursion is legal for an LR table but would loop a naive
    // recursive-descent reading of the grammar, so it is worth surfacing.
    for (rule_name, rule) in &grammar.rules {
        if has_immediate_left_recursion(rule, rule_name) {
            log::info!("rule '{rule_name}' has immediate left recursion");
        }
    }
}

fn has_immediate_left_recursion(rule: &Rule, target: &str) -> bool {
    match rule.rule_type {
        RuleType::Symbol => rule.name.as_deref() == Some(target),

        RuleType::Seq => rule
            .members
            .first()
            .is_some_and(|first| has_immediate_left_recursion(first, target)),

        RuleType::Choice => rule
            .members
            .iter()
            .any(|member| has_immediate_left_recursion(member, target)),

        RuleType::Prec
        | RuleType::PrecLeft
        | RuleType::PrecRight
        | RuleType::PrecDynamic
        | RuleType::Field
        | RuleType::Alias
        | RuleType::Repeat
        | RuleType::Repeat1 => rule
            .content
            .as_deref()
            .is_some_and(|content| has_immediate_left_recursion(content, target)),

        _ => false,
    }
}

fn check_precedence(grammar: &Grammar) {
    let mut prec_levels: HashMap<String, Vec<i32>> = HashMap::new();

    for (rule_name, rule) in &grammar.rules {
        collect_precedence_levels(rule, &mut prec_levels, rule_name);
    }

    for (rule, levels) in &prec_levels {
        if levels.len() > 1 {
            log::warn!("rule '{rule}' has multiple precedence levels: {levels:?}");
        }
    }
}

fn collect_precedence_levels(rule: &Rule, levels: &mut HashMap<String, Vec<i32>>, context: &str) {
    if let Some(p) = rule.precedence() {
        levels.entry(context.to_string()).or_default().push(p);
    }
    for child in rule.children() {
        collect_precedence_levels(child, levels, context);
    }
}
