// SPDX-License-Identifier: MIT OR Apache-2.0
//! Family names and their parameters.
//!
//! A parametric node class family names its members
//! `<prefix>.<param-1>.<param-2>...`, where each parameter is either an item
//! count or a type name. Everything here is a pure function of strings.

use crate::generic::{innermost_type_name, is_generic_type_name, replace_innermost};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Kind of one name parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamSpec {
    /// Non-negative item count
    Count,
    /// Type name, reverting to `placeholder` when unspecialized
    Type {
        /// Placeholder name
        placeholder: String,
    },
}

/// Value of one name parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamValue {
    /// Item count
    Count(u64),
    /// Type name, concrete or placeholder
    Type(String),
}

impl ParamValue {
    fn render(&self) -> String {
        match self {
            Self::Count(n) => n.to_string(),
            Self::Type(name) => name.clone(),
        }
    }
}

/// Name errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// The name does not have the family's shape
    #[error("{name} is not a member of the {family} family")]
    NameNotInFamily {
        /// Offending name
        name: String,
        /// Family prefix
        family: String,
    },

    /// Parameters do not match the family's signature
    #[error("Parameters do not fit the {family} family")]
    InvalidParameters {
        /// Family prefix
        family: String,
    },
}

/// Name signature of a node class family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilySignature {
    prefix: String,
    params: Vec<ParamSpec>,
}

impl FamilySignature {
    /// Start a signature with no parameters
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            params: Vec::new(),
        }
    }

    /// Append a count parameter
    pub fn with_count(mut self) -> Self {
        self.params.push(ParamSpec::Count);
        self
    }

    /// Append a type parameter
    pub fn with_type(mut self, placeholder: impl Into<String>) -> Self {
        self.params.push(ParamSpec::Type {
            placeholder: placeholder.into(),
        });
        self
    }

    /// Family prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Parameter kinds
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Placeholders of the type parameters, in order
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|p| match p {
            ParamSpec::Type { placeholder } => Some(placeholder.as_str()),
            ParamSpec::Count => None,
        })
    }

    /// Whether a name starts with this family's prefix
    pub fn is_member(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('.'))
    }

    /// Build a member name from parameter values
    pub fn build_name(&self, values: &[ParamValue]) -> Result<String, NameError> {
        self.check(values)?;
        let mut name = self.prefix.clone();
        for value in values {
            name.push('.');
            name.push_str(&value.render());
        }
        Ok(name)
    }

    /// Split a member name into parameter values
    pub fn parse_name(&self, name: &str) -> Result<Vec<ParamValue>, NameError> {
        let not_member = || NameError::NameNotInFamily {
            name: name.to_string(),
            family: self.prefix.clone(),
        };
        let rest = name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(not_member)?;
        let parts: Vec<&str> = rest.split('.').collect();
        if parts.len() != self.params.len() {
            return Err(not_member());
        }
        self.params
            .iter()
            .zip(parts)
            .map(|(kind, part)| {
                let value = match kind {
                    ParamSpec::Count => parse_count(part).map(ParamValue::Count),
                    ParamSpec::Type { .. } => {
                        is_type_name(part).then(|| ParamValue::Type(part.to_string()))
                    }
                };
                value.ok_or_else(not_member)
            })
            .collect()
    }

    /// Name with every type parameter reverted to its placeholder; counts kept
    pub fn revert_to_generic(&self, values: &[ParamValue]) -> Result<String, NameError> {
        let placeholders: Vec<&str> = self.placeholders().collect();
        self.unspecialize(values, &placeholders)
    }

    /// Name with `placeholder` bound to `concrete`.
    ///
    /// Every type parameter whose innermost type is `placeholder` has that
    /// innermost type replaced, so `List_Generic1` bound to `Integer` becomes
    /// `List_Integer`. Other parameters are left untouched.
    pub fn substitute_type(
        &self,
        values: &[ParamValue],
        placeholder: &str,
        concrete: &str,
    ) -> Result<String, NameError> {
        self.check(values)?;
        let values: Vec<ParamValue> = values
            .iter()
            .map(|value| match value {
                ParamValue::Type(name) if innermost_type_name(name) == placeholder => {
                    ParamValue::Type(replace_innermost(name, concrete))
                }
                other => other.clone(),
            })
            .collect();
        self.build_name(&values)
    }

    /// Name with only the listed placeholders reverted
    pub fn unspecialize(
        &self,
        values: &[ParamValue],
        placeholders: &[&str],
    ) -> Result<String, NameError> {
        self.check(values)?;
        let values: Vec<ParamValue> = self
            .params
            .iter()
            .zip(values)
            .map(|(kind, value)| match kind {
                ParamSpec::Type { placeholder } if placeholders.contains(&placeholder.as_str()) => {
                    ParamValue::Type(placeholder.clone())
                }
                _ => value.clone(),
            })
            .collect();
        self.build_name(&values)
    }

    /// Name with the first count parameter moved by `delta`, saturating at zero
    pub fn resize_count(&self, values: &[ParamValue], delta: i64) -> Result<String, NameError> {
        self.check(values)?;
        let mut resized = false;
        let values: Vec<ParamValue> = values
            .iter()
            .map(|value| match value {
                ParamValue::Count(n) if !resized => {
                    resized = true;
                    ParamValue::Count(n.saturating_add_signed(delta))
                }
                other => other.clone(),
            })
            .collect();
        if !resized {
            return Err(self.invalid());
        }
        self.build_name(&values)
    }

    /// Placeholder to bound type, for every type parameter
    pub fn specialization_map(&self, values: &[ParamValue]) -> IndexMap<String, String> {
        self.params
            .iter()
            .zip(values)
            .filter_map(|(kind, value)| match (kind, value) {
                (ParamSpec::Type { placeholder }, ParamValue::Type(bound)) => {
                    Some((placeholder.clone(), bound.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Whether every type parameter is bound to a concrete type
    pub fn is_fully_specialized(values: &[ParamValue]) -> bool {
        values.iter().all(|value| match value {
            ParamValue::Type(name) => !is_generic_type_name(name),
            ParamValue::Count(_) => true,
        })
    }

    fn check(&self, values: &[ParamValue]) -> Result<(), NameError> {
        let fits = values.len() == self.params.len()
            && self.params.iter().zip(values).all(|(kind, value)| match (kind, value) {
                (ParamSpec::Count, ParamValue::Count(_)) => true,
                (ParamSpec::Type { .. }, ParamValue::Type(name)) => is_type_name(name),
                _ => false,
            });
        if fits {
            Ok(())
        } else {
            Err(self.invalid())
        }
    }

    fn invalid(&self) -> NameError {
        NameError::InvalidParameters {
            family: self.prefix.clone(),
        }
    }
}

// Canonical decimal only, so that parse and build are inverses
fn parse_count(part: &str) -> Option<u64> {
    let canonical = !part.is_empty()
        && part.bytes().all(|b| b.is_ascii_digit())
        && (part == "0" || !part.starts_with('0'));
    canonical.then(|| part.parse().ok()).flatten()
}

fn is_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
