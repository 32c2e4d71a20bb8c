//! The loadable Org-mode language handle.
//!
//! [`language`] builds the bundled grammar once, validates it and derives the
//! symbol tables a tree-sitter language exposes: node kinds, field names,
//! supertypes and external tokens. Every later call hands out the same
//! handle.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::grammar::orgmode::{orgmode_grammar, GRAMMAR_NAME, START_RULE};
use crate::grammar::{Grammar, Rule, RuleType, RuleValue};
use crate::validate::validate;

/// ABI version of the languages built by this crate.
pub const LANGUAGE_VERSION: usize = 15;

/// Oldest ABI version a [`Parser`](crate::Parser) still accepts.
pub const MIN_COMPATIBLE_LANGUAGE_VERSION: usize = 13;

/// Kind of the node produced for unparseable input. Always symbol `0`.
pub const ERROR_KIND: &str = "ERROR";

/// Errors raised while building or installing a [`Language`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LanguageError {
    /// The grammar failed validation.
    #[error("invalid grammar: {0}")]
    Invalid(String),

    /// The language's ABI version is outside the supported range.
    #[error("incompatible language version {found}, expected {min} through {max}")]
    Version {
        /// Version carried by the language.
        found: usize,
        /// Oldest supported version.
        min: usize,
        /// Newest supported version.
        max: usize,
    },

    /// The language was built from a grammar this parser cannot read.
    #[error("unsupported grammar '{0}'")]
    Unsupported(String),
}

#[derive(PartialEq, Eq)]
struct LanguageInner {
    name: String,
    version: usize,
    grammar: Grammar,
    /// `(kind, named)` indexed by symbol id.
    kinds: Vec<(String, bool)>,
    /// Field names indexed by field id minus one.
    fields: Vec<String>,
    supertypes: Vec<String>,
    externals: Vec<String>,
}

/// A validated grammar together with its symbol tables.
///
/// Cloning is cheap: clones share one allocation.
#[derive(Clone)]
pub struct Language(Arc<LanguageInner>);

static LANGUAGE: OnceLock<Result<Language, LanguageError>> = OnceLock::new();

/// Returns the bundled Org-mode language.
///
/// The language is built and validated on first use and cached afterwards,
/// so repeated calls are cheap and return handles to the same allocation.
///
/// # Errors
///
/// Returns [`LanguageError::Invalid`] if the bundled grammar does not
/// validate.
pub fn language() -> Result<Language, LanguageError> {
    LANGUAGE
        .get_or_init(|| {
            log::debug!("building the {GRAMMAR_NAME} language");
            Language::from_grammar(orgmode_grammar(), START_RULE, LANGUAGE_VERSION)
        })
        .clone()
}

impl Language {
    /// Validates `grammar` from its `start` rule and derives its symbol
    /// tables.
    ///
    /// # Errors
    ///
    /// Returns [`LanguageError::Invalid`] with the validation message.
    pub fn from_grammar(
        grammar: Grammar,
        start: &str,
        version: usize,
    ) -> Result<Self, LanguageError> {
        validate(&grammar, start).map_err(|e| LanguageError::Invalid(e.message))?;

        let mut named = BTreeSet::new();
        let mut anonymous = BTreeSet::new();
        let mut fields = BTreeSet::new();

        for (name, rule) in &grammar.rules {
            if !name.starts_with('_') {
                named.insert(name.clone());
            }
            collect_symbols(rule, &mut anonymous, &mut named, &mut fields);
        }
        let externals: Vec<String> = grammar
            .external_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        named.extend(externals.iter().filter(|n| !n.starts_with('_')).cloned());

        let mut kinds = vec![(ERROR_KIND.to_owned(), true)];
        kinds.extend(named.into_iter().map(|k| (k, true)));
        kinds.extend(anonymous.into_iter().map(|k| (k, false)));

        let supertypes = grammar.supertypes.clone().unwrap_or_default();

        log::debug!(
            "language '{}' has {} node kinds and {} fields",
            grammar.name,
            kinds.len(),
            fields.len()
        );

        Ok(Self(Arc::new(LanguageInner {
            name: grammar.name.clone(),
            version,
            grammar,
            kinds,
            fields: fields.into_iter().collect(),
            supertypes,
            externals,
        })))
    }

    /// Name of the grammar, `"orgmode"` for the bundled language.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// ABI version of this language.
    #[must_use]
    pub fn version(&self) -> usize {
        self.0.version
    }

    /// The grammar this language was built from.
    #[must_use]
    pub fn grammar(&self) -> &Grammar {
        &self.0.grammar
    }

    /// Number of distinct node kinds, including [`ERROR_KIND`].
    #[must_use]
    pub fn node_kind_count(&self) -> usize {
        self.0.kinds.len()
    }

    /// Kind name of symbol `id`.
    #[must_use]
    pub fn node_kind_for_id(&self, id: u16) -> Option<&str> {
        self.0.kinds.get(usize::from(id)).map(|(k, _)| k.as_str())
    }

    /// Returns `true` if symbol `id` is a named node kind.
    #[must_use]
    pub fn node_kind_is_named(&self, id: u16) -> bool {
        self.0.kinds.get(usize::from(id)).is_some_and(|(_, n)| *n)
    }

    /// Symbol id of `kind`, or `0` if the language has no such kind.
    #[must_use]
    pub fn id_for_node_kind(&self, kind: &str, named: bool) -> u16 {
        self.0
            .kinds
            .iter()
            .position(|(k, n)| k == kind && *n == named)
            .and_then(|id| u16::try_from(id).ok())
            .unwrap_or(0)
    }

    /// Number of field names.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.0.fields.len()
    }

    /// Field name for field `id`. Field ids start at `1`.
    #[must_use]
    pub fn field_name_for_id(&self, id: u16) -> Option<&str> {
        let index = usize::from(id).checked_sub(1)?;
        self.0.fields.get(index).map(String::as_str)
    }

    /// Field id of `name`.
    #[must_use]
    pub fn field_id_for_name(&self, name: &str) -> Option<u16> {
        let index = self.0.fields.iter().position(|f| f == name)?;
        u16::try_from(index + 1).ok()
    }

    /// Supertype rule names.
    #[must_use]
    pub fn supertypes(&self) -> &[String] {
        &self.0.supertypes
    }

    /// External token names, in scanner order.
    #[must_use]
    pub fn external_tokens(&self) -> &[String] {
        &self.0.externals
    }
}

fn collect_symbols(
    rule: &Rule,
    anonymous: &mut BTreeSet<String>,
    named: &mut BTreeSet<String>,
    fields: &mut BTreeSet<String>,
) {
    match rule.rule_type {
        RuleType::String => {
            if let Some(value) = rule.string_value() {
                anonymous.insert(value.to_owned());
            }
        }
        RuleType::Field => {
            if let Some(name) = &rule.name {
                fields.insert(name.clone());
            }
        }
        RuleType::Alias => {
            if let Some(RuleValue::String(value)) = &rule.value {
                if rule.named == Some(true) {
                    named.insert(value.clone());
                } else {
                    anonymous.insert(value.clone());
                }
            }
        }
        // the contents of a token are lexed as one leaf
        RuleType::Token | RuleType::ImmediateToken => return,
        _ => {}
    }
    for child in rule.children() {
        collect_symbols(child, anonymous, named, fields);
    }
}

impl PartialEq for Language {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Language {}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Language")
            .field("name", &self.0.name)
            .field("version", &self.0.version)
            .field("node_kinds", &self.0.kinds.len())
            .finish_non_exhaustive()
    }
}
