//! Error types.
//!
//! Every failure the engine reports to callers is one variant of [`Error`].
//! Validation, access and schema errors are raised before any I/O; store
//! failures surface as [`Error::Constraint`] or [`Error::Query`].

use std::fmt;

use crate::access::Operation;
use crate::hooks::HookStage;

/// Result alias used by synchronous helpers.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for all Tessera operations.
#[derive(Debug)]
pub enum Error {
    /// Payload or query failed field/schema validation.
    Validation(ValidationError),
    /// An id-targeted operation referenced a missing (or hidden) record.
    NotFound(NotFoundError),
    /// The access predicate rejected the operation.
    AccessDenied(AccessDeniedError),
    /// A `restrict` relation still has dependents.
    RestrictedDelete(RestrictedDeleteError),
    /// A `before*` hook failed; nothing was written.
    HookAbort(HookError),
    /// An `after*` hook failed; the write has already been committed.
    HookFailed(HookError),
    /// The store rejected a statement because of a constraint.
    Constraint(ConstraintError),
    /// Invalid collection declarations.
    Schema(String),
    /// The store could not plan or execute a statement.
    Query(QueryError),
    /// Anything else.
    Custom(String),
}

impl Error {
    /// Single-field validation error.
    pub fn validation(
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Error::Validation(ValidationError {
            errors: vec![FieldValidationError {
                field: field.into(),
                kind,
                message: message.into(),
            }],
        })
    }

    /// Record-not-found error.
    pub fn not_found(collection: impl Into<String>, id: Option<&str>) -> Self {
        Error::NotFound(NotFoundError {
            collection: collection.into(),
            id: id.map(str::to_string),
        })
    }

    /// Query planning/execution error.
    pub fn query(message: impl Into<String>) -> Self {
        Error::Query(QueryError {
            message: message.into(),
        })
    }

    /// Whether this is a [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether this is a [`Error::Validation`].
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "{e}"),
            Error::NotFound(e) => write!(f, "{e}"),
            Error::AccessDenied(e) => write!(f, "{e}"),
            Error::RestrictedDelete(e) => write!(f, "{e}"),
            Error::HookAbort(e) => write!(f, "hook aborted operation: {e}"),
            Error::HookFailed(e) => write!(f, "hook failed after write: {e}"),
            Error::Constraint(e) => write!(f, "{e}"),
            Error::Schema(msg) => write!(f, "schema error: {msg}"),
            Error::Query(e) => write!(f, "{e}"),
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::HookAbort(e) | Error::HookFailed(e) => e
                .source
                .as_deref()
                .map(|s| s as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

/// Kind of a single field validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Required field missing or NULL.
    Required,
    /// Value does not match the column type.
    Type,
    /// Field is not declared on the collection.
    UnknownField,
    /// Numeric value below `min`.
    Min,
    /// Numeric value above `max`.
    Max,
    /// Text shorter than `min_length`.
    MinLength,
    /// Text longer than `max_length`.
    MaxLength,
    /// Text does not match `pattern`.
    Pattern,
    /// Value not among `choices`.
    Choice,
    /// Relation name unknown or nested write not applicable.
    Relation,
    /// Malformed filter, ordering, selection or pagination.
    Query,
    /// Locale not configured.
    Locale,
}

impl ValidationErrorKind {
    /// Stable lowercase identifier.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ValidationErrorKind::Required => "required",
            ValidationErrorKind::Type => "type",
            ValidationErrorKind::UnknownField => "unknown_field",
            ValidationErrorKind::Min => "min",
            ValidationErrorKind::Max => "max",
            ValidationErrorKind::MinLength => "min_length",
            ValidationErrorKind::MaxLength => "max_length",
            ValidationErrorKind::Pattern => "pattern",
            ValidationErrorKind::Choice => "choice",
            ValidationErrorKind::Relation => "relation",
            ValidationErrorKind::Query => "query",
            ValidationErrorKind::Locale => "locale",
        }
    }
}

/// A validation failure on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValidationError {
    /// Field (or option) name.
    pub field: String,
    /// Kind of failure.
    pub kind: ValidationErrorKind,
    /// Human readable message.
    pub message: String,
}

/// One or more field validation failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationError {
    /// All failures found.
    pub errors: Vec<FieldValidationError>,
}

impl ValidationError {
    /// Empty error collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    pub fn add(
        &mut self,
        field: impl Into<String>,
        kind: ValidationErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FieldValidationError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` if empty, otherwise `Err(Error::Validation(self))`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed: ")?;
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

/// Missing record.
#[derive(Debug, Clone, PartialEq)]
pub struct NotFoundError {
    /// Collection name.
    pub collection: String,
    /// Targeted id, if any.
    pub id: Option<String>,
}

impl fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} record '{}' not found", self.collection, id),
            None => write!(f, "{} record not found", self.collection),
        }
    }
}

/// Access predicate rejection.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDeniedError {
    /// Collection name.
    pub collection: String,
    /// Rejected operation.
    pub operation: Operation,
}

impl fmt::Display for AccessDeniedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "access denied: {} on {}",
            self.operation.as_str(),
            self.collection
        )
    }
}

/// Delete blocked by a `restrict` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct RestrictedDeleteError {
    /// Collection of the record being deleted.
    pub collection: String,
    /// Id of the record being deleted.
    pub id: String,
    /// Collection holding the dependents.
    pub dependent: String,
    /// Relation that declared `restrict`.
    pub relation: String,
    /// Number of dependents found.
    pub count: u64,
}

impl fmt::Display for RestrictedDeleteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot delete {} '{}': has {} dependent {} record(s) via '{}'",
            self.collection, self.id, self.count, self.dependent, self.relation
        )
    }
}

/// A hook failure.
#[derive(Debug)]
pub struct HookError {
    /// Collection whose hook failed.
    pub collection: String,
    /// Which hook failed.
    pub stage: HookStage,
    /// Message of the underlying error.
    pub message: String,
    /// The error returned by the hook.
    pub source: Option<Box<Error>>,
}

impl HookError {
    /// Wrap the error a hook returned.
    pub fn new(collection: impl Into<String>, stage: HookStage, source: Error) -> Self {
        Self {
            collection: collection.into(),
            stage,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hook on {}: {}",
            self.stage.as_str(),
            self.collection,
            self.message
        )
    }
}

/// Kind of store constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// Primary key collision.
    PrimaryKey,
    /// Unique constraint violation.
    Unique,
    /// Foreign key violation.
    ForeignKey,
    /// NOT NULL violation.
    NotNull,
}

impl ConstraintKind {
    /// Stable lowercase identifier.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "primary_key",
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign_key",
            ConstraintKind::NotNull => "not_null",
        }
    }
}

/// Store-level constraint violation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintError {
    /// Constraint kind.
    pub kind: ConstraintKind,
    /// Table on which the violation occurred.
    pub table: String,
    /// Columns covered by the constraint.
    pub columns: Vec<String>,
    /// Detail message.
    pub message: String,
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} constraint violated on {}({}): {}",
            self.kind.as_str(),
            self.table,
            self.columns.join(", "),
            self.message
        )
    }
}

/// Statement planning or execution failure.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryError {
    /// Detail message.
    pub message: String,
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query error: {}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_lists_fields() {
        let mut err = ValidationError::new();
        err.add("title", ValidationErrorKind::Required, "is required");
        err.add("views", ValidationErrorKind::Min, "must be >= 0");
        let msg = Error::Validation(err).to_string();
        assert!(msg.contains("title: is required"));
        assert!(msg.contains("views: must be >= 0"));
    }

    #[test]
    fn test_empty_validation_is_ok() {
        assert!(ValidationError::new().into_result().is_ok());
    }

    #[test]
    fn test_hook_error_keeps_source() {
        let err = Error::HookAbort(HookError::new(
            "posts",
            HookStage::BeforeCreate,
            Error::Custom("nope".into()),
        ));
        assert!(err.to_string().contains("beforeCreate hook on posts: nope"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
