//! Environment normalization context
//!
//! Maps literal environment identifiers (account ids, region codes) to
//! symbolic placeholders so that the same resource deployed in two
//! environments reads identically. Built once at startup and shared
//! read-only by every analyzer.

use cloudsweep_common::defaults::{ACCOUNT_ID_PLACEHOLDER, REGION_PLACEHOLDER};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("replacement literal for {placeholder} is empty")]
    EmptyLiteral { placeholder: String },

    /// A literal occurring inside a placeholder would make normalization
    /// rewrite its own output.
    #[error("literal '{literal}' occurs inside placeholder '{placeholder}'")]
    LiteralInsidePlaceholder { literal: String, placeholder: String },

    #[error("literal '{literal}' is mapped to both '{first}' and '{second}'")]
    ConflictingPlaceholder {
        literal: String,
        first: String,
        second: String,
    },
}

/// Immutable literal -> placeholder mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizationContext {
    /// Sorted longest literal first
    replacements: Vec<(String, String)>,
}

impl NormalizationContext {
    pub fn builder() -> NormalizationContextBuilder {
        NormalizationContextBuilder::default()
    }

    /// A context that rewrites nothing
    pub fn identity() -> Self {
        Self::default()
    }

    /// Convenience for the common case: one `(account_id, region)` pair per environment
    pub fn for_environments<'a, I>(environments: I) -> Result<Self, NormalizationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        environments
            .into_iter()
            .fold(Self::builder(), |b, (account, region)| b.environment(account, region))
            .build()
    }

    pub fn replacements(&self) -> &[(String, String)] {
        &self.replacements
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Rewrite every literal occurrence in `input`
    pub fn replace_str(&self, input: &str) -> String {
        let mut out = input.to_string();
        for (literal, placeholder) in &self.replacements {
            if out.contains(literal.as_str()) {
                out = out.replace(literal.as_str(), placeholder);
            }
        }
        out
    }

    /// Rewrite every string value and object key inside `value`.
    ///
    /// Keys that would collapse onto the same rewritten key (e.g. one entry
    /// per region) keep their literal form so no entry is lost.
    pub fn replace_value(&self, value: Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.replace_str(&s)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.replace_value(v)).collect())
            }
            Value::Object(map) => Value::Object(self.replace_object(map)),
            other => other,
        }
    }

    fn replace_object(&self, map: Map<String, Value>) -> Map<String, Value> {
        let renamed: Vec<String> = map.keys().map(|k| self.replace_str(k)).collect();
        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for key in &renamed {
            *occurrences.entry(key.as_str()).or_default() += 1;
        }
        let colliding: HashSet<&str> = occurrences
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(key, _)| key)
            .collect();

        map.into_iter()
            .zip(&renamed)
            .map(|((key, value), new_key)| {
                let key = if colliding.contains(new_key.as_str()) {
                    key
                } else {
                    new_key.clone()
                };
                (key, self.replace_value(value))
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct NormalizationContextBuilder {
    pairs: Vec<(String, String)>,
}

impl NormalizationContextBuilder {
    /// Map `literal` to `placeholder`
    pub fn replace(mut self, literal: impl Into<String>, placeholder: impl Into<String>) -> Self {
        self.pairs.push((literal.into(), placeholder.into()));
        self
    }

    /// Map an environment's account id and region to the standard placeholders
    pub fn environment(self, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        self.replace(account_id, ACCOUNT_ID_PLACEHOLDER)
            .replace(region, REGION_PLACEHOLDER)
    }

    pub fn build(self) -> Result<NormalizationContext, NormalizationError> {
        let mut replacements: Vec<(String, String)> = Vec::with_capacity(self.pairs.len());

        for (literal, placeholder) in self.pairs {
            if literal.is_empty() {
                return Err(NormalizationError::EmptyLiteral { placeholder });
            }
            match replacements.iter().find(|(l, _)| *l == literal) {
                Some((_, existing)) if *existing == placeholder => continue,
                Some((_, existing)) => {
                    return Err(NormalizationError::ConflictingPlaceholder {
                        literal,
                        first: existing.clone(),
                        second: placeholder,
                    });
                }
                None => replacements.push((literal, placeholder)),
            }
        }

        for (literal, _) in &replacements {
            if let Some((_, placeholder)) = replacements
                .iter()
                .find(|(_, p)| p.contains(literal.as_str()))
            {
                return Err(NormalizationError::LiteralInsidePlaceholder {
                    literal: literal.clone(),
                    placeholder: placeholder.clone(),
                });
            }
        }

        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Ok(NormalizationContext { replacements })
    }
}
