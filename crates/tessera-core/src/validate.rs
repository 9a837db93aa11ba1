//! Payload validation.
//!
//! Write payloads are checked against the collection's field declarations
//! before any statement is issued. All failures are collected into a single
//! [`ValidationError`].

use std::collections::{BTreeSet, HashMap};
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::collection::{Collection, FieldDef};
use crate::error::{Result, ValidationError, ValidationErrorKind};
use crate::row::Row;
use crate::value::Value;

/// Compiled patterns shared by every validation call.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> std::result::Result<Regex, regex::Error> {
        if let Ok(cache) = self.cache.read() {
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }
        let regex = Regex::new(pattern)?;
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(pattern.to_string(), regex.clone());
        }
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Whether `value` matches `pattern`. An invalid pattern never matches.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Check that a pattern compiles. Returns the error message if not.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

/// Kind of write being validated.
#[derive(Debug, Clone, Copy)]
pub enum WriteKind<'a> {
    /// Required fields must be present, unless listed in `satisfied`
    /// (foreign keys filled in by a nested belongs-to write).
    Create { satisfied: &'a BTreeSet<String> },
    /// Only the fields present are checked.
    Update,
}

/// Validate a write payload against `collection`.
pub fn validate_write(collection: &Collection, data: &Row, kind: WriteKind<'_>) -> Result<()> {
    let mut errors = ValidationError::new();

    for (name, value) in data.iter() {
        match collection.get_field(name) {
            Some(field) => check_value(field, value, &mut errors),
            None => errors.add(
                name,
                ValidationErrorKind::UnknownField,
                format!("unknown field '{name}' on {}", collection.name),
            ),
        }
    }

    if let WriteKind::Create { satisfied } = kind {
        for field in collection.fields.iter().filter(|f| f.required) {
            let present = data.get(&field.name).is_some_and(|v| !v.is_null());
            if !present && field.default.is_none() && !satisfied.contains(&field.name) {
                errors.add(
                    &field.name,
                    ValidationErrorKind::Required,
                    format!("{} is required", field.name),
                );
            }
        }
    }

    errors.into_result()
}

fn check_value(field: &FieldDef, value: &Value, errors: &mut ValidationError) {
    let name = field.name.as_str();
    if value.is_null() {
        if field.required {
            errors.add(name, ValidationErrorKind::Required, format!("{name} is required"));
        }
        return;
    }
    if !field.sql_type.accepts(value) {
        errors.add(
            name,
            ValidationErrorKind::Type,
            format!(
                "{name} expects {}, got {}",
                field.sql_type.sql_name(),
                value.type_name()
            ),
        );
        return;
    }

    let rules = &field.rules;
    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.min {
            if n < min {
                errors.add(name, ValidationErrorKind::Min, format!("{name} must be >= {min}"));
            }
        }
        if let Some(max) = rules.max {
            if n > max {
                errors.add(name, ValidationErrorKind::Max, format!("{name} must be <= {max}"));
            }
        }
    }
    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = rules.min_length {
            if len < min {
                errors.add(
                    name,
                    ValidationErrorKind::MinLength,
                    format!("{name} must be at least {min} characters"),
                );
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                errors.add(
                    name,
                    ValidationErrorKind::MaxLength,
                    format!("{name} must be at most {max} characters"),
                );
            }
        }
        if let Some(pattern) = &rules.pattern {
            if !matches_pattern(s, pattern) {
                errors.add(
                    name,
                    ValidationErrorKind::Pattern,
                    format!("{name} does not match {pattern}"),
                );
            }
        }
    }
    if !rules.choices.is_empty() {
        let key = value.group_key();
        if !rules.choices.iter().any(|c| c.group_key() == key) {
            errors.add(
                name,
                ValidationErrorKind::Choice,
                format!("{name} must be one of the declared choices"),
            );
        }
    }
}
