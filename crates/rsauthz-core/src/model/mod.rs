//! The policy model: section definitions and policy rows.
//!
//! A model maps section kinds (`r`, `p`, `g`, `e`, `m`) to named section
//! definitions. Multiple definitions per kind coexist (`r` and `r2`,
//! `m` and `m2`, ...), selected at enforcement time through an
//! `EnforceContext`. Policy and role sections additionally own their
//! ordered rule rows; effect and matcher sections compile their
//! expression once at definition time.

mod parser;

pub use parser::parse_model;

use std::collections::HashMap;
use std::sync::Arc;

use crate::effect::EffectKind;
use crate::error::{EngineError, EngineResult};
use crate::expr::Expr;

/// Section kind, keyed in model text by its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Request,
    Policy,
    Role,
    Effect,
    Matcher,
}

impl SectionKind {
    /// Canonical single-letter key prefix (`r`, `p`, `g`, `e`, `m`).
    pub fn token(self) -> &'static str {
        match self {
            SectionKind::Request => "r",
            SectionKind::Policy => "p",
            SectionKind::Role => "g",
            SectionKind::Effect => "e",
            SectionKind::Matcher => "m",
        }
    }

    /// Resolves a `[section]` header name.
    pub fn from_header(name: &str) -> Option<SectionKind> {
        match name {
            "request_definition" => Some(SectionKind::Request),
            "policy_definition" => Some(SectionKind::Policy),
            "role_definition" => Some(SectionKind::Role),
            "policy_effect" => Some(SectionKind::Effect),
            "matchers" => Some(SectionKind::Matcher),
            _ => None,
        }
    }
}

/// One named section: its raw definition, parsed field names, rule rows,
/// and (for effect/matcher sections) the compiled form.
#[derive(Debug, Clone, Default)]
pub struct Assertion {
    pub key: String,
    pub value: String,
    /// Field names for request/policy sections; arity placeholders
    /// (`_`) for role sections; empty for effect/matcher.
    pub tokens: Vec<String>,
    /// Ordered rule rows. Unique within the section; insertion order is
    /// preserved and is semantically load-bearing under priority effect.
    pub policy: Vec<Vec<String>>,
    pub(crate) matcher: Option<Arc<Expr>>,
    pub(crate) effect: Option<EffectKind>,
}

impl Assertion {
    pub(crate) fn compiled_matcher(&self) -> EngineResult<Arc<Expr>> {
        self.matcher.clone().ok_or_else(|| EngineError::MalformedModel {
            message: format!("section `{}` holds no matcher expression", self.key),
        })
    }

    pub(crate) fn effect_kind(&self) -> EngineResult<EffectKind> {
        self.effect.ok_or_else(|| EngineError::MalformedModel {
            message: format!("section `{}` holds no effect expression", self.key),
        })
    }
}

/// The full policy definition plus in-memory rule rows.
///
/// Mutated only by policy-management operations; enforcement reads it
/// without copying. The host serializes mutation against enforcement.
#[derive(Debug, Clone, Default)]
pub struct Model {
    sections: HashMap<SectionKind, HashMap<String, Assertion>>,
}

impl Model {
    pub fn new() -> Model {
        Model::default()
    }

    /// Registers a section definition.
    ///
    /// Matcher expressions compile here; effect expressions must map to
    /// a supported strategy; redefining a request/policy section with a
    /// different field count is rejected. All failures are
    /// `MalformedModel` and fatal to the load.
    pub fn add_def(&mut self, kind: SectionKind, key: &str, value: &str) -> EngineResult<()> {
        let mut assertion = Assertion {
            key: key.to_string(),
            value: value.to_string(),
            ..Assertion::default()
        };

        match kind {
            SectionKind::Request | SectionKind::Policy | SectionKind::Role => {
                assertion.tokens = value
                    .split(',')
                    .map(|token| token.trim().to_string())
                    .filter(|token| !token.is_empty())
                    .collect();
                if assertion.tokens.is_empty() {
                    return Err(EngineError::MalformedModel {
                        message: format!("section `{key}` declares no fields"),
                    });
                }
                if let Some(existing) = self.get_assertion(kind, key) {
                    if existing.tokens.len() != assertion.tokens.len() {
                        return Err(EngineError::MalformedModel {
                            message: format!(
                                "section `{key}` redefined with {} fields, previously {}",
                                assertion.tokens.len(),
                                existing.tokens.len()
                            ),
                        });
                    }
                }
            }
            SectionKind::Matcher => {
                let expr = crate::expr::parse(value).map_err(|err| EngineError::MalformedModel {
                    message: format!("matcher `{key}` does not parse: {err}"),
                })?;
                assertion.matcher = Some(Arc::new(expr));
            }
            SectionKind::Effect => {
                let kind = EffectKind::parse(value).ok_or_else(|| EngineError::MalformedModel {
                    message: format!("unsupported effect expression `{value}` in section `{key}`"),
                })?;
                assertion.effect = Some(kind);
            }
        }

        self.sections
            .entry(kind)
            .or_default()
            .insert(key.to_string(), assertion);
        Ok(())
    }

    pub fn get_assertion(&self, kind: SectionKind, key: &str) -> Option<&Assertion> {
        self.sections.get(&kind).and_then(|named| named.get(key))
    }

    pub(crate) fn required_assertion(
        &self,
        kind: SectionKind,
        key: &str,
    ) -> EngineResult<&Assertion> {
        self.get_assertion(kind, key)
            .ok_or_else(|| EngineError::MalformedModel {
                message: format!("model has no `{key}` section of kind `{}`", kind.token()),
            })
    }

    fn assertion_mut(&mut self, kind: SectionKind, key: &str) -> EngineResult<&mut Assertion> {
        self.sections
            .get_mut(&kind)
            .and_then(|named| named.get_mut(key))
            .ok_or_else(|| EngineError::MalformedModel {
                message: format!("model has no `{key}` section of kind `{}`", kind.token()),
            })
    }

    /// Names of the sections of one kind (e.g. every role relation).
    pub fn section_keys(&self, kind: SectionKind) -> Vec<String> {
        self.sections
            .get(&kind)
            .map(|named| named.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Appends a rule row unless an identical row exists. Returns false
    /// ("unaffected") on duplicates; row arity must match the section.
    pub fn add_policy(
        &mut self,
        kind: SectionKind,
        key: &str,
        rule: Vec<String>,
    ) -> EngineResult<bool> {
        let assertion = self.assertion_mut(kind, key)?;
        if rule.len() != assertion.tokens.len() {
            return Err(EngineError::MalformedModel {
                message: format!(
                    "rule for `{key}` has {} fields, section declares {}",
                    rule.len(),
                    assertion.tokens.len()
                ),
            });
        }
        if assertion.policy.contains(&rule) {
            return Ok(false);
        }
        assertion.policy.push(rule);
        Ok(true)
    }

    pub fn add_policies(
        &mut self,
        kind: SectionKind,
        key: &str,
        rules: Vec<Vec<String>>,
    ) -> EngineResult<bool> {
        let mut affected = false;
        for rule in rules {
            affected |= self.add_policy(kind, key, rule)?;
        }
        Ok(affected)
    }

    pub fn has_policy(&self, kind: SectionKind, key: &str, rule: &[String]) -> bool {
        self.get_assertion(kind, key)
            .is_some_and(|assertion| assertion.policy.iter().any(|row| row == rule))
    }

    /// Removes an exact row. Surviving rows keep their order.
    pub fn remove_policy(&mut self, kind: SectionKind, key: &str, rule: &[String]) -> bool {
        let Ok(assertion) = self.assertion_mut(kind, key) else {
            return false;
        };
        let before = assertion.policy.len();
        assertion.policy.retain(|row| row != rule);
        assertion.policy.len() != before
    }

    /// Removes rows whose fields starting at `start_index` equal the
    /// given values positionally; an empty string is a wildcard.
    /// Returns the removed rows (empty means unaffected).
    pub fn remove_filtered_policy(
        &mut self,
        kind: SectionKind,
        key: &str,
        start_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        let Ok(assertion) = self.assertion_mut(kind, key) else {
            return Vec::new();
        };
        let matches = |row: &Vec<String>| {
            field_values.iter().enumerate().all(|(i, value)| {
                value.is_empty() || row.get(start_index + i).map(String::as_str) == Some(value)
            })
        };
        let mut removed = Vec::new();
        assertion.policy.retain(|row| {
            if matches(row) {
                removed.push(row.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Read-only snapshot of a section's rows, for persistence
    /// collaborators and auditing.
    pub fn get_policy(&self, kind: SectionKind, key: &str) -> Vec<Vec<String>> {
        self.get_assertion(kind, key)
            .map(|assertion| assertion.policy.clone())
            .unwrap_or_default()
    }

    pub fn get_filtered_policy(
        &self,
        kind: SectionKind,
        key: &str,
        start_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        let Some(assertion) = self.get_assertion(kind, key) else {
            return Vec::new();
        };
        assertion
            .policy
            .iter()
            .filter(|row| {
                field_values.iter().enumerate().all(|(i, value)| {
                    value.is_empty() || row.get(start_index + i).map(String::as_str) == Some(value.as_str())
                })
            })
            .cloned()
            .collect()
    }

    /// Distinct values of one field across a section's rows, in first-seen
    /// order.
    pub fn get_values_for_field_in_policy(
        &self,
        kind: SectionKind,
        key: &str,
        field_index: usize,
    ) -> Vec<String> {
        let Some(assertion) = self.get_assertion(kind, key) else {
            return Vec::new();
        };
        let mut values = Vec::new();
        for row in &assertion.policy {
            if let Some(value) = row.get(field_index) {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        values
    }

    /// Same, across every section of the kind (e.g. `g` and `g2`).
    pub fn get_values_for_field_in_policy_all_types(
        &self,
        kind: SectionKind,
        field_index: usize,
    ) -> Vec<String> {
        let mut values = Vec::new();
        let mut keys = self.section_keys(kind);
        keys.sort_unstable();
        for key in keys {
            for value in self.get_values_for_field_in_policy(kind, &key, field_index) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        values
    }

    /// Position of a named field within a section, or `None` if absent.
    /// Callers that require the field turn `None` into `FieldNotFound`.
    pub fn field_index(&self, kind: SectionKind, key: &str, label: &str) -> Option<usize> {
        self.get_assertion(kind, key)?
            .tokens
            .iter()
            .position(|token| token == label)
    }

    /// `field_index` for callers that require the field to exist, such
    /// as domain-scoped helpers resolving a `dom` column.
    pub fn required_field_index(
        &self,
        kind: SectionKind,
        key: &str,
        label: &str,
    ) -> EngineResult<usize> {
        self.field_index(kind, key, label)
            .ok_or_else(|| EngineError::FieldNotFound {
                section: key.to_string(),
                field: label.to_string(),
            })
    }

    /// Drops every policy and role row, keeping section definitions.
    pub fn clear_policy(&mut self) {
        for kind in [SectionKind::Policy, SectionKind::Role] {
            if let Some(named) = self.sections.get_mut(&kind) {
                for assertion in named.values_mut() {
                    assertion.policy.clear();
                }
            }
        }
    }
}

impl std::str::FromStr for Model {
    type Err = EngineError;

    fn from_str(text: &str) -> EngineResult<Model> {
        parse_model(text)
    }
}
