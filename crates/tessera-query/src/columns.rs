//! Partial column selection.

use std::collections::BTreeMap;

use serde_json::Value as Json;
use tessera_core::{Collection, Error, Result, ValidationError, ValidationErrorKind, columns};

/// `columns` option of a read.
///
/// If any entry is `true` the selection is in inclusion mode and returns
/// exactly those fields; otherwise it omits the fields set to `false`. The
/// identity is always returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    entries: BTreeMap<String, bool>,
}

impl ColumnSelection {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.entries.insert(field.into(), true);
        self
    }

    #[must_use]
    pub fn omit(mut self, field: impl Into<String>) -> Self {
        self.entries.insert(field.into(), false);
        self
    }

    /// Parse `{"field": true|false, ...}`.
    pub fn from_json(json: &Json) -> Result<Self> {
        let Json::Object(map) = json else {
            return Err(Error::validation(
                "columns",
                ValidationErrorKind::Query,
                "columns must be an object",
            ));
        };
        let mut selection = Self::new();
        for (field, flag) in map {
            let flag = flag.as_bool().ok_or_else(|| {
                Error::validation(
                    field,
                    ValidationErrorKind::Query,
                    format!("column '{field}' must be true or false"),
                )
            })?;
            selection.entries.insert(field.clone(), flag);
        }
        Ok(selection)
    }

    pub fn is_inclusion(&self) -> bool {
        self.entries.values().any(|v| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Output field names of `collection` under this selection, in layout
    /// order.
    pub fn resolve<'c>(&self, collection: &'c Collection) -> Result<Vec<&'c str>> {
        let readable = collection.readable_names();
        let mut errors = ValidationError::new();
        for name in self.entries.keys() {
            if !readable.contains(&name.as_str()) {
                errors.add(
                    name,
                    ValidationErrorKind::UnknownField,
                    format!("unknown column '{name}' on {}", collection.name),
                );
            }
        }
        errors.into_result()?;

        let inclusion = self.is_inclusion();
        Ok(readable
            .into_iter()
            .filter(|name| {
                if *name == columns::ID {
                    return true;
                }
                match self.entries.get(*name) {
                    Some(flag) => *flag,
                    None => !inclusion,
                }
            })
            .collect())
    }
}
